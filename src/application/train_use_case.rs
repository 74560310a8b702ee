// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run over prepared artefacts:
//
//   Step 1: Load vocabulary and triplets   (Layer 4 - data)
//   Step 2: Load pretrained embeddings     (Layer 6 - infra)
//   Step 3: Open train/dev/test datasets   (Layer 4 - data)
//   Step 4: Save config                    (Layer 6 - infra)
//   Step 5: Run training loop              (Layer 5 - ml)
//
// Training draws `ns` negatives per question; dev and test rank
// every relation.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::prepare_use_case::split_paths;
use crate::data::{
    dataset::SimpleQaDataset,
    graph::TripletStore,
    graph::BatchGraphBuilder,
    sampler::CandidateMode,
    vocab::Vocabulary,
};
use crate::domain::traits::Persistable;
use crate::infra::{
    checkpoint::CheckpointManager,
    embedding_store::EmbeddingMatrix,
    metrics::{EvalReport, MetricsLogger},
};
use crate::ml::trainer::{run_training, TrainInputs};

// ─── Training Configuration ──────────────────────────────────────────────────
// Saved next to the checkpoints so evaluation can rebuild the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:       String,
    pub vocab_path:     String,
    pub triplets_path:  String,
    pub embedding_path: Option<String>,
    pub checkpoint_dir: String,
    /// Negatives drawn per training question
    pub ns:             usize,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub word_dim:       usize,
    pub hidden_dim:     usize,
    pub dropout:        f64,
    pub margin:         f64,
    /// Keep pretrained word vectors fixed
    pub freeze:         bool,
    /// Add a reversed copy of every KB edge to the batch graph
    #[serde(default = "default_inverse_edges")]
    pub inverse_edges:  bool,
    pub num_workers:    usize,
    pub seed:           u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:       "data/SimpleQuestions".to_string(),
            vocab_path:     "prepared/vocab.json".to_string(),
            triplets_path:  "prepared/triplets.bin".to_string(),
            embedding_path: None,
            checkpoint_dir: "checkpoints".to_string(),
            ns:             256,
            batch_size:     64,
            epochs:         20,
            lr:             1e-3,
            word_dim:       300,
            hidden_dim:     100,
            dropout:        0.5,
            margin:         0.5,
            freeze:         true,
            inverse_edges:  true,
            num_workers:    2,
            seed:           42,
        }
    }
}

fn default_inverse_edges() -> bool {
    true
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        if self.epochs == 0 {
            anyhow::bail!("epochs must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            anyhow::bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        if self.margin <= 0.0 {
            anyhow::bail!("margin must be positive, got {}", self.margin);
        }
        Ok(())
    }

    pub fn load_vocab(&self) -> Result<Arc<Vocabulary>> {
        let vocab = Vocabulary::load(Path::new(&self.vocab_path)).with_context(|| {
            format!("Cannot load vocabulary '{}'. Run 'build-vocab' first.", self.vocab_path)
        })?;
        Ok(Arc::new(vocab))
    }

    /// Stage B builder for a vocabulary of `total_relations` relations
    pub fn graph_builder(&self, total_relations: usize) -> BatchGraphBuilder {
        let builder = BatchGraphBuilder::new(total_relations);
        if self.inverse_edges {
            builder
        } else {
            builder.without_inverse_edges()
        }
    }

    pub fn load_triplets(&self) -> Result<Arc<TripletStore>> {
        let store = TripletStore::load(Path::new(&self.triplets_path)).with_context(|| {
            format!("Cannot load triplets '{}'. Run 'build-graph' first.", self.triplets_path)
        })?;
        Ok(Arc::new(store))
    }
}

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train and return the test-split report of the final model.
    pub fn execute(&self) -> Result<EvalReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Vocabulary and triplets ───────────────────────────────────
        let vocab = cfg.load_vocab()?;
        let store = cfg.load_triplets()?;
        tracing::info!(
            "Loaded {} words, {} relations, {} triplets",
            vocab.num_words(),
            vocab.num_relations(),
            store.len()
        );
        if store.is_empty() {
            tracing::warn!("Triplet store '{}' is empty, every batch graph will be empty", cfg.triplets_path);
        }

        // ── Step 2: Pretrained word vectors ───────────────────────────────────
        let pretrained = match &cfg.embedding_path {
            Some(path) => Some(
                EmbeddingMatrix::load(Path::new(path))
                    .with_context(|| format!("Cannot load embeddings '{path}'. Run 'embed' first."))?,
            ),
            None => {
                tracing::warn!("No embedding file given, word vectors start random");
                None
            }
        };

        // ── Step 3: Datasets ──────────────────────────────────────────────────
        let splits = split_paths(&cfg.data_dir);
        let train = SimpleQaDataset::open(&splits[0], vocab.clone(), CandidateMode::from_ns(cfg.ns))?;
        let dev   = SimpleQaDataset::open(&splits[1], vocab.clone(), CandidateMode::Exhaustive)?;
        let test  = SimpleQaDataset::open(&splits[2], vocab.clone(), CandidateMode::Exhaustive)?;

        // ── Step 4: Save config for evaluation ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 5: Training loop (Layer 5) ───────────────────────────────────
        let inputs = TrainInputs { vocab, store, train, dev, test, pretrained };
        run_training(cfg, inputs, ckpt_manager, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_batch = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(zero_batch.validate().is_err());

        let full_dropout = TrainConfig { dropout: 1.0, ..TrainConfig::default() };
        assert!(full_dropout.validate().is_err());

        let no_margin = TrainConfig { margin: 0.0, ..TrainConfig::default() };
        assert!(no_margin.validate().is_err());
    }

    #[test]
    fn test_missing_vocab_mentions_build_step() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            vocab_path: dir.path().join("none.json").to_string_lossy().into_owned(),
            ..TrainConfig::default()
        };
        let err = cfg.load_vocab().unwrap_err();
        assert!(format!("{err:#}").contains("build-vocab"));
    }

    #[test]
    fn test_config_without_inverse_edges_field_defaults_on() {
        let mut json = serde_json::to_value(TrainConfig::default()).unwrap();
        json.as_object_mut().unwrap().remove("inverse_edges");
        let cfg: TrainConfig = serde_json::from_value(json).unwrap();
        assert!(cfg.inverse_edges);

        let off = TrainConfig { inverse_edges: false, ..TrainConfig::default() };
        let g = off
            .graph_builder(1)
            .build(&TripletStore::new(vec![crate::domain::triplet::Triplet::new(2, 0, 3)]), &[0]);
        assert_eq!(g.rel, vec![0]);
    }
}
