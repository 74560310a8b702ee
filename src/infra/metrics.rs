// ============================================================
// Layer 6 — Metrics
// ============================================================
// Two things live here:
//
//   1. Typing / ranking scores over (true labels, predicted labels)
//      pairs — the three standard fine-grained typing metrics:
//
//        strict       an example counts only if both sets are equal
//        loose macro  precision/recall averaged per example
//        loose micro  precision/recall over pooled label counts
//
//      Each returns precision, recall and their F1. For SimpleQA
//      every set has exactly one label, so all three reduce to
//      accuracy; the same code scores multi-label entity typing.
//
//   2. MetricsLogger — appends one CSV row per epoch:
//
//        epoch,train_loss,train_acc,val_acc,val_macro_f1,val_micro_f1
//        1,0.412000,0.553000,0.601000,0.601000,0.601000
//
// Reference: Ling & Weld (2012) FIGER evaluation metrics
//            Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// One example's gold labels and predicted labels
pub type LabelPair = (HashSet<u32>, HashSet<u32>);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prf {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

impl Prf {
    fn new(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self { precision, recall, f1 }
    }
}

pub fn strict(pairs: &[LabelPair]) -> Prf {
    if pairs.is_empty() {
        return Prf::default();
    }
    let correct = pairs.iter().filter(|(t, p)| t == p).count();
    let acc = correct as f64 / pairs.len() as f64;
    Prf::new(acc, acc)
}

pub fn loose_macro(pairs: &[LabelPair]) -> Prf {
    if pairs.is_empty() {
        return Prf::default();
    }
    let (mut p, mut r) = (0.0, 0.0);
    for (truth, pred) in pairs {
        let hit = truth.intersection(pred).count() as f64;
        if !pred.is_empty() {
            p += hit / pred.len() as f64;
        }
        if !truth.is_empty() {
            r += hit / truth.len() as f64;
        }
    }
    let n = pairs.len() as f64;
    Prf::new(p / n, r / n)
}

pub fn loose_micro(pairs: &[LabelPair]) -> Prf {
    let (mut predicted, mut truth, mut correct) = (0usize, 0usize, 0usize);
    for (t, p) in pairs {
        predicted += p.len();
        truth     += t.len();
        correct   += t.intersection(p).count();
    }
    let precision = if predicted > 0 { correct as f64 / predicted as f64 } else { 0.0 };
    let recall    = if truth > 0 { correct as f64 / truth as f64 } else { 0.0 };
    Prf::new(precision, recall)
}

// ─── EvalReport ───────────────────────────────────────────────────────────────
/// Everything one evaluation pass reports
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvalReport {
    pub accuracy:    f64,
    pub strict:      Prf,
    pub loose_macro: Prf,
    pub loose_micro: Prf,
}

impl EvalReport {
    /// `accuracy` is passed in because the trainer counts it on device
    pub fn from_pairs(accuracy: f64, pairs: &[LabelPair]) -> Self {
        Self {
            accuracy,
            strict:      strict(pairs),
            loose_macro: loose_macro(pairs),
            loose_micro: loose_micro(pairs),
        }
    }
}

// ─── EpochMetrics ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,

    /// Mean multi-margin loss over training batches
    pub train_loss: f64,

    /// Fraction of training examples whose gold scored highest
    /// among its sampled candidates
    pub train_acc:  f64,

    /// Ranking over all relations on the dev split
    pub val:        EvalReport,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, train_acc: f64, val: EvalReport) -> Self {
        Self { epoch, train_loss, train_acc, val }
    }

    /// Returns true if this epoch beat the previous best dev accuracy
    pub fn is_improvement(&self, best_val_acc: f64) -> bool {
        self.val.accuracy > best_val_acc
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        // Appending across runs keeps the whole history
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,train_acc,val_acc,val_macro_f1,val_micro_f1")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.train_acc,
            m.val.accuracy,
            m.val.loose_macro.f1,
            m.val.loose_micro.f1,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_acc={:.4}",
            m.epoch,
            m.train_loss,
            m.val.accuracy,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(xs: &[u32]) -> HashSet<u32> {
        xs.iter().copied().collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_strict_requires_exact_sets() {
        let pairs = vec![
            (set(&[1, 2]), set(&[1, 2])),
            (set(&[1, 2]), set(&[1])),
        ];
        let s = strict(&pairs);
        assert!(close(s.precision, 0.5));
        assert!(close(s.f1, 0.5));
    }

    #[test]
    fn test_loose_macro_averages_per_example() {
        let pairs = vec![
            (set(&[1, 2]), set(&[1])),       // p=1,   r=0.5
            (set(&[3]),    set(&[3, 4])),    // p=0.5, r=1
        ];
        let m = loose_macro(&pairs);
        assert!(close(m.precision, 0.75));
        assert!(close(m.recall, 0.75));
        assert!(close(m.f1, 0.75));
    }

    #[test]
    fn test_loose_micro_pools_counts() {
        let pairs = vec![
            (set(&[1, 2]), set(&[1])),
            (set(&[3]),    set(&[3, 4, 5])),
        ];
        let m = loose_micro(&pairs);
        // 2 correct of 4 predicted, 2 correct of 3 true
        assert!(close(m.precision, 0.5));
        assert!(close(m.recall, 2.0 / 3.0));
    }

    #[test]
    fn test_single_label_reduces_to_accuracy() {
        let pairs = vec![
            (set(&[0]), set(&[0])),
            (set(&[0]), set(&[3])),
            (set(&[0]), set(&[0])),
            (set(&[0]), set(&[0])),
        ];
        let r = EvalReport::from_pairs(0.75, &pairs);
        assert!(close(r.strict.f1, 0.75));
        assert!(close(r.loose_macro.f1, 0.75));
        assert!(close(r.loose_micro.f1, 0.75));
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(strict(&[]), Prf::default());
        assert_eq!(loose_macro(&[]), Prf::default());
        assert_eq!(loose_micro(&[]), Prf::default());
    }

    #[test]
    fn test_is_improvement() {
        let val = EvalReport { accuracy: 0.6, ..Default::default() };
        let m = EpochMetrics::new(2, 0.3, 0.7, val);
        assert!(m.is_improvement(0.5));
        assert!(!m.is_improvement(0.6));
    }

    #[test]
    fn test_logger_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path().to_string_lossy()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.5, 0.4, EvalReport::default())).unwrap();
        logger.log(&EpochMetrics::new(2, 0.4, 0.5, EvalReport::default())).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("2,0.400000,0.500000"));
    }
}
