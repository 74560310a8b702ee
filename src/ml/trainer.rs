// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train on sampled candidates, validate by ranking ALL relations.
//
// Key Burn insights:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns model on MyInnerBackend (Wgpu)
//   - Validation batcher must also use MyInnerBackend
//   - The relation word matrix is built once per backend
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//   - Batches arrive as Result: collation errors abort the epoch
//   - A loader that stops early (Dataset::get gave None) is caught
//     by comparing the rows seen with the dataset length
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, bail, Result};
use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{BatchResult, SimpleQaBatcher},
    dataset::SimpleQaDataset,
    graph::TripletStore,
    vocab::Vocabulary,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::embedding_store::EmbeddingMatrix;
use crate::infra::metrics::{EpochMetrics, EvalReport, LabelPair, MetricsLogger};
use crate::ml::model::{multi_margin_loss, relation_words_tensor, SimpleQaConfig, SimpleQaModel};

pub type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
pub type MyInnerBackend = burn::backend::Wgpu;

/// Everything the loop needs besides hyper-parameters
pub struct TrainInputs {
    pub vocab:      Arc<Vocabulary>,
    pub store:      Arc<TripletStore>,
    pub train:      SimpleQaDataset,
    pub dev:        SimpleQaDataset,
    pub test:       SimpleQaDataset,
    pub pretrained: Option<EmbeddingMatrix>,
}

/// Model hyper-parameters derived from the run config and vocabulary
pub fn model_config(cfg: &TrainConfig, vocab: &Vocabulary) -> SimpleQaConfig {
    SimpleQaConfig::new(vocab.num_words(), vocab.num_relations())
        .with_word_dim(cfg.word_dim)
        .with_hidden_dim(cfg.hidden_dim)
        .with_dropout(cfg.dropout)
}

/// Train, checkpoint every epoch, and return the final test report.
pub fn run_training(
    cfg:          &TrainConfig,
    inputs:       TrainInputs,
    ckpt_manager: CheckpointManager,
    metrics:      MetricsLogger,
) -> Result<EvalReport> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    MyBackend::seed(cfg.seed);

    let TrainInputs { vocab, store, train, dev, test, pretrained } = inputs;
    let n_relations = vocab.num_relations();
    let (train_len, dev_len, test_len) = (train.len(), dev.len(), test.len());

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: SimpleQaModel<MyBackend> = model_config(cfg, &vocab).init(&device);
    if let Some(matrix) = &pretrained {
        model = model.with_pretrained(matrix, cfg.freeze, &device)?;
        tracing::info!("Word embedding initialised from pretrained vectors (freeze={})", cfg.freeze);
    }
    tracing::info!(
        "Model ready: {} words, {} relations, hidden_dim={}",
        vocab.num_words(), n_relations, cfg.hidden_dim
    );

    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    let relation_words_train = relation_words_tensor::<MyBackend>(vocab.relation_word_matrix(), &device);
    let relation_words_valid = relation_words_tensor::<MyInnerBackend>(vocab.relation_word_matrix(), &device);

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_batcher = SimpleQaBatcher::<MyBackend>::new(
        device.clone(),
        store.clone(),
        cfg.graph_builder(n_relations),
    );
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train);

    let valid_batcher = SimpleQaBatcher::<MyInnerBackend>::new(
        device.clone(),
        store.clone(),
        cfg.graph_builder(n_relations),
    );
    let dev_loader = DataLoaderBuilder::new(valid_batcher.clone())
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(dev);
    let test_loader = DataLoaderBuilder::new(valid_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(test);

    let mut best_val_acc = f64::NEG_INFINITY;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut total    = 0usize;

        for batch in train_loader.iter() {
            let batch = batch.map_err(|e| anyhow!("epoch {epoch}: {e}"))?;
            total += batch.labels.dims()[0];
            if batch.graph.is_empty() {
                tracing::trace!("batch graph: no triplet for any gold relation");
            } else {
                tracing::trace!(
                    "batch graph: {} nodes, {} edges",
                    batch.graph.num_nodes(),
                    batch.graph.num_edges()
                );
            }

            let scores = model.forward(batch.question, batch.relation, relation_words_train.clone());
            let loss   = multi_margin_loss(scores.clone(), cfg.margin);

            correct += count_correct(scores, batch.labels);
            loss_sum += loss.clone().into_scalar().elem::<f64>();
            batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);

            tracing::debug!("epoch {} batch {}: loss={:.4}", epoch, batches, loss_sum / batches as f64);
        }

        if total != train_len {
            bail!("epoch {epoch}: training loader yielded {total} of {train_len} examples");
        }

        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let train_acc  = if total   > 0 { correct as f64 / total as f64 } else { 0.0 };

        // dropout disabled, no autodiff graph
        let val = evaluate(&model.valid(), &dev_loader, &relation_words_valid, dev_len)?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | dev_acc={:.1}%",
            epoch, cfg.epochs, train_loss, train_acc * 100.0, val.accuracy * 100.0,
        );

        let row = EpochMetrics::new(epoch, train_loss, train_acc, val);
        if row.is_improvement(best_val_acc) {
            best_val_acc = val.accuracy;
            tracing::info!("New best dev accuracy {:.4} at epoch {}", best_val_acc, epoch);
        }
        metrics.log(&row)?;

        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    let report = evaluate(&model.valid(), &test_loader, &relation_words_valid, test_len)?;
    tracing::info!("Training complete! test accuracy {:.4}", report.accuracy);
    Ok(report)
}

/// Rank candidates for every batch and score the top-1 predictions.
/// `expected` is the dataset length; fewer rows is an error.
pub fn evaluate<B: Backend>(
    model:          &SimpleQaModel<B>,
    loader:         &Arc<dyn DataLoader<BatchResult<B>>>,
    relation_words: &Tensor<B, 2, Int>,
    expected:       usize,
) -> Result<EvalReport> {
    let mut pairs: Vec<LabelPair> = Vec::new();
    let mut correct = 0usize;

    for batch in loader.iter() {
        let batch = batch.map_err(|e| anyhow!("evaluation: {e}"))?;
        let [batch_size, n_candidates] = batch.relation.dims();

        let scores = model.forward(
            batch.question,
            batch.relation.clone(),
            relation_words.clone(),
        );
        let picked: Vec<i64> = scores
            .clone()
            .argmax(1)
            .into_data()
            .iter::<i64>()
            .collect();
        correct += count_correct(scores, batch.labels);

        let candidates: Vec<i64> = batch.relation.into_data().iter::<i64>().collect();
        for (row, &col) in picked.iter().enumerate().take(batch_size) {
            let gold = candidates[row * n_candidates] as u32;
            let pred = candidates[row * n_candidates + col as usize] as u32;
            pairs.push((HashSet::from([gold]), HashSet::from([pred])));
        }
    }

    if pairs.len() != expected {
        bail!("evaluation: loader yielded {} of {} examples", pairs.len(), expected);
    }

    let accuracy = if pairs.is_empty() { 0.0 } else { correct as f64 / pairs.len() as f64 };
    Ok(EvalReport::from_pairs(accuracy, &pairs))
}

/// Rows whose best-scoring candidate is the label column
fn count_correct<B: Backend>(scores: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let predicted = scores.argmax(1).flatten::<1>(0, 1);
    predicted
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::graph::BatchGraphBuilder;
    use crate::data::sampler::CandidateMode;
    use crate::data::vocab::{RelationSet, VocabularyBuilder};
    use burn::backend::NdArray;
    use std::io::Write;

    struct Fixture {
        file:    tempfile::NamedTempFile,
        vocab:   Arc<Vocabulary>,
        dataset: SimpleQaDataset,
    }

    fn fixture() -> Fixture {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "q one\ts\tb").unwrap();
        writeln!(file, "q two\ts\ta").unwrap();
        let rels = RelationSet::from_labels(["a", "b", "c"]);
        let vocab = Arc::new(VocabularyBuilder::build(&[file.path().to_path_buf()], &rels).unwrap());
        let dataset = SimpleQaDataset::open(file.path(), vocab.clone(), CandidateMode::Exhaustive).unwrap();
        Fixture { file, vocab, dataset }
    }

    fn run_evaluate(fx: Fixture, expected: usize) -> Result<EvalReport> {
        let device: <NdArray as Backend>::Device = Default::default();
        let batcher = SimpleQaBatcher::<NdArray>::new(
            device.clone(),
            Arc::new(TripletStore::default()),
            BatchGraphBuilder::new(fx.vocab.num_relations()),
        );
        let loader = DataLoaderBuilder::new(batcher).batch_size(1).build(fx.dataset);
        let model: SimpleQaModel<NdArray> = SimpleQaConfig::new(fx.vocab.num_words(), fx.vocab.num_relations())
            .with_word_dim(4)
            .with_hidden_dim(2)
            .init(&device);
        let words = relation_words_tensor::<NdArray>(fx.vocab.relation_word_matrix(), &device);
        evaluate(&model, &loader, &words, expected)
    }

    #[test]
    fn test_evaluate_ranks_every_row() {
        let fx = fixture();
        let expected = fx.dataset.len();
        let report = run_evaluate(fx, expected).unwrap();
        assert!((0.0..=1.0).contains(&report.accuracy));
    }

    #[test]
    fn test_evaluate_fails_when_a_line_stops_parsing() {
        let fx = fixture();
        let expected = fx.dataset.len();
        // same byte layout, so the open-time index still lines up
        std::fs::write(fx.file.path(), "q one\ts\tb\nq two\ts\tz\n").unwrap();

        let err = run_evaluate(fx, expected).unwrap_err();
        assert!(err.to_string().contains("1 of 2"), "{err}");
    }

    #[test]
    fn test_count_correct_uses_argmax() {
        let device = Default::default();
        let scores = Tensor::<NdArray, 2>::from_floats([[0.9, 0.1], [0.2, 0.7], [0.5, 0.4]], &device);
        let labels = Tensor::<NdArray, 1, Int>::from_ints([0, 0, 0], &device);
        assert_eq!(count_correct(scores, labels), 2);
    }
}
