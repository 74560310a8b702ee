// ============================================================
// Layer 2 — Preparation Use Cases
// ============================================================
// The three offline steps that run once before training:
//
//   build-vocab   train/dev/test.tsv + relation list  → vocab.json
//   build-graph   vocab.json + KB triplet file        → vocab.json (etoi)
//                                                      + triplets.bin
//   embed         vocab.json + GloVe text file        → embeddings.bin
//
// Each step reads what the previous one persisted, so they can be
// re-run independently (e.g. a new relation cap without rebuilding
// the vocabulary).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::graph::{filter_triplets, GraphFilterConfig, DEFAULT_RELATION_CAP};
use crate::data::vocab::{RelationSet, VocabKind, Vocabulary, VocabularyBuilder};
use crate::domain::traits::Persistable;
use crate::infra::embedding_store::EmbeddingMatrix;

/// The corpus splits read from `data_dir`, in this order
pub const SPLITS: [&str; 3] = ["train.tsv", "dev.tsv", "test.tsv"];

pub fn split_paths(data_dir: &str) -> Vec<PathBuf> {
    SPLITS.iter().map(|s| Path::new(data_dir).join(s)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildVocabConfig {
    pub data_dir:      String,
    pub relation_file: String,
    pub vocab_path:    String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildGraphConfig {
    pub vocab_path:    String,
    pub kb_path:       String,
    pub triplets_path: String,
    pub relation_cap:  usize,
}

impl Default for BuildGraphConfig {
    fn default() -> Self {
        Self {
            vocab_path:    "prepared/vocab.json".to_string(),
            kb_path:       "data/kb.tsv".to_string(),
            triplets_path: "prepared/triplets.bin".to_string(),
            relation_cap:  DEFAULT_RELATION_CAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub vocab_path:     String,
    pub glove_path:     String,
    pub embedding_path: String,
    pub dim:            usize,
    pub seed:           u64,
}

// ─── build-vocab ──────────────────────────────────────────────────────────────
pub fn build_vocab(cfg: &BuildVocabConfig) -> Result<Vocabulary> {
    let relations = RelationSet::load(Path::new(&cfg.relation_file))
        .with_context(|| format!("Cannot read relation list '{}'", cfg.relation_file))?;
    if relations.is_empty() {
        anyhow::bail!("relation list '{}' has no usable labels", cfg.relation_file);
    }
    tracing::info!("Loaded {} relation labels from '{}'", relations.len(), cfg.relation_file);

    let vocab = VocabularyBuilder::build(&split_paths(&cfg.data_dir), &relations)
        .with_context(|| format!("Cannot build vocabulary from '{}'", cfg.data_dir))?;

    vocab.save(Path::new(&cfg.vocab_path))?;
    tracing::info!(
        "Vocabulary: {} words, {} relations → '{}'",
        vocab.num_words(),
        vocab.num_relations(),
        cfg.vocab_path
    );
    Ok(vocab)
}

// ─── build-graph ──────────────────────────────────────────────────────────────
/// Stage A: filter the KB and persist both the entity-updated
/// vocabulary and the surviving triplets.
pub fn build_graph(cfg: &BuildGraphConfig) -> Result<Vocabulary> {
    let vocab = Vocabulary::load(Path::new(&cfg.vocab_path))
        .with_context(|| format!("Cannot load vocabulary '{}'. Run 'build-vocab' first.", cfg.vocab_path))?;

    let filter = GraphFilterConfig { relation_cap: cfg.relation_cap };
    let (vocab, store) = filter_triplets(Path::new(&cfg.kb_path), vocab, &filter)
        .with_context(|| format!("Cannot filter triplets from '{}'", cfg.kb_path))?;

    store.save(Path::new(&cfg.triplets_path))?;
    vocab.save(Path::new(&cfg.vocab_path))?;
    tracing::info!(
        "Kept {} triplets over {} entities → '{}'",
        store.len(),
        vocab.len(VocabKind::Entity),
        cfg.triplets_path
    );
    Ok(vocab)
}

// ─── embed ────────────────────────────────────────────────────────────────────
pub fn embed(cfg: &EmbedConfig) -> Result<EmbeddingMatrix> {
    let vocab = Vocabulary::load(Path::new(&cfg.vocab_path))
        .with_context(|| format!("Cannot load vocabulary '{}'", cfg.vocab_path))?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let matrix = EmbeddingMatrix::from_glove(Path::new(&cfg.glove_path), &vocab, cfg.dim, &mut rng)
        .with_context(|| format!("Cannot read word vectors '{}'", cfg.glove_path))?;

    matrix.save(Path::new(&cfg.embedding_path))?;
    tracing::info!("Embedding matrix {}x{} → '{}'", matrix.rows(), matrix.dim(), cfg.embedding_path);
    Ok(matrix)
}
