// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Rebuilds a trained model from its checkpoint directory and ranks
// every relation for each question of one split:
//
//   Step 1: Load train_config.json       (Layer 6 - infra)
//   Step 2: Load vocabulary + triplets   (Layer 4 - data)
//   Step 3: Rebuild model, load weights  (Layer 5 - ml)
//   Step 4: Rank the split               (Layer 5 - ml)

use std::path::Path;

use anyhow::{bail, Result};
use burn::data::{dataloader::DataLoaderBuilder, dataset::Dataset};

use crate::application::prepare_use_case::{split_paths, SPLITS};
use crate::data::{batcher::SimpleQaBatcher, dataset::SimpleQaDataset, sampler::CandidateMode};
use crate::infra::{checkpoint::CheckpointManager, metrics::EvalReport};
use crate::ml::model::relation_words_tensor;
use crate::ml::trainer::{evaluate, model_config, MyInnerBackend};

pub struct EvaluateUseCase {
    ckpt_manager: CheckpointManager,
    /// "train", "dev" or "test"
    split:        String,
    epoch:        Option<usize>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, split: String, epoch: Option<usize>) -> Result<Self> {
        split_index(&split)?;
        Ok(Self {
            ckpt_manager: CheckpointManager::new(checkpoint_dir)?,
            split,
            epoch,
        })
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();

        // ── Step 1-2: Config and prepared artefacts ───────────────────────────
        let cfg   = self.ckpt_manager.load_config()?;
        let vocab = cfg.load_vocab()?;
        let store = cfg.load_triplets()?;

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let model = model_config(&cfg, &vocab).init::<MyInnerBackend>(&device);
        let model = self.ckpt_manager.load_model(model, self.epoch, &device)?;

        // ── Step 4: Rank every relation ───────────────────────────────────────
        let path    = &split_paths(&cfg.data_dir)[split_index(&self.split)?];
        let dataset = SimpleQaDataset::open(Path::new(path), vocab.clone(), CandidateMode::Exhaustive)?;
        let expected = dataset.len();
        let batcher = SimpleQaBatcher::<MyInnerBackend>::new(
            device.clone(),
            store,
            cfg.graph_builder(vocab.num_relations()),
        );
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(dataset);

        let relation_words = relation_words_tensor::<MyInnerBackend>(vocab.relation_word_matrix(), &device);
        let report = evaluate(&model, &loader, &relation_words, expected)?;
        tracing::info!("Evaluated '{}' split: accuracy {:.4}", self.split, report.accuracy);
        Ok(report)
    }
}

/// Position of `split` in the corpus split list
fn split_index(split: &str) -> Result<usize> {
    let file = format!("{split}.tsv");
    match SPLITS.iter().position(|s| *s == file) {
        Some(i) => Ok(i),
        None => bail!("unknown split '{split}', expected one of train, dev, test"),
    }
}
