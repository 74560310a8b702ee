// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand per pipeline step:
//
//   build-vocab → build-graph → embed → train → evaluate
//
// Every step persists what the next one reads, so the paths
// default to the same `prepared/` and `checkpoints/` locations.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::prepare_use_case::{BuildGraphConfig, BuildVocabConfig, EmbedConfig};
use crate::application::train_use_case::TrainConfig;
use crate::data::graph::DEFAULT_RELATION_CAP;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build word and relation vocabularies from the corpus splits
    BuildVocab(BuildVocabArgs),

    /// Filter the knowledge-base triplets and index their entities
    BuildGraph(BuildGraphArgs),

    /// Align pretrained word vectors with the vocabulary
    Embed(EmbedArgs),

    /// Train the relation-matching model
    Train(TrainArgs),

    /// Evaluate a trained checkpoint on one split
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct BuildVocabArgs {
    /// Directory holding train.tsv, dev.tsv and test.tsv
    #[arg(long, default_value = "data/SimpleQuestions")]
    pub data_dir: String,

    /// Relation labels, one per line
    #[arg(long, default_value = "data/relations.txt")]
    pub relation_file: String,

    #[arg(long, default_value = "prepared/vocab.json")]
    pub vocab_path: String,
}

impl From<BuildVocabArgs> for BuildVocabConfig {
    fn from(a: BuildVocabArgs) -> Self {
        BuildVocabConfig {
            data_dir:      a.data_dir,
            relation_file: a.relation_file,
            vocab_path:    a.vocab_path,
        }
    }
}

#[derive(Args, Debug)]
pub struct BuildGraphArgs {
    #[arg(long, default_value = "prepared/vocab.json")]
    pub vocab_path: String,

    /// Whitespace-separated `head relation tail` lines
    #[arg(long, default_value = "data/kb.tsv")]
    pub kb_path: String,

    #[arg(long, default_value = "prepared/triplets.bin")]
    pub triplets_path: String,

    /// Maximum triplets kept per relation
    #[arg(long, default_value_t = DEFAULT_RELATION_CAP)]
    pub relation_cap: usize,
}

impl From<BuildGraphArgs> for BuildGraphConfig {
    fn from(a: BuildGraphArgs) -> Self {
        BuildGraphConfig {
            vocab_path:    a.vocab_path,
            kb_path:       a.kb_path,
            triplets_path: a.triplets_path,
            relation_cap:  a.relation_cap,
        }
    }
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    #[arg(long, default_value = "prepared/vocab.json")]
    pub vocab_path: String,

    /// GloVe-style text file: `word v1 v2 ... vd`
    #[arg(long)]
    pub glove_path: String,

    #[arg(long, default_value = "prepared/embeddings.bin")]
    pub embedding_path: String,

    /// Vector size; must match --word-dim at training time
    #[arg(long, default_value_t = 300)]
    pub dim: usize,

    /// Seed for the random rows of words without a vector
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<EmbedArgs> for EmbedConfig {
    fn from(a: EmbedArgs) -> Self {
        EmbedConfig {
            vocab_path:     a.vocab_path,
            glove_path:     a.glove_path,
            embedding_path: a.embedding_path,
            dim:            a.dim,
            seed:           a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train.tsv, dev.tsv and test.tsv
    #[arg(long, default_value = "data/SimpleQuestions")]
    pub data_dir: String,

    #[arg(long, default_value = "prepared/vocab.json")]
    pub vocab_path: String,

    #[arg(long, default_value = "prepared/triplets.bin")]
    pub triplets_path: String,

    /// Pretrained matrix written by `embed`; random init when absent
    #[arg(long)]
    pub embedding_path: Option<String>,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Negative relations sampled per question; 0 ranks all relations
    #[arg(long, default_value_t = 256)]
    pub ns: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 300)]
    pub word_dim: usize,

    /// LSTM hidden size per direction
    #[arg(long, default_value_t = 100)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 0.5)]
    pub dropout: f64,

    /// Ranking margin between the gold and every negative
    #[arg(long, default_value_t = 0.5)]
    pub margin: f64,

    /// Fine-tune pretrained word vectors instead of freezing them
    #[arg(long)]
    pub tune_embeddings: bool,

    /// Leave out the reversed copy of each KB edge in batch graphs
    #[arg(long)]
    pub no_inverse_edges: bool,

    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:       a.data_dir,
            vocab_path:     a.vocab_path,
            triplets_path:  a.triplets_path,
            embedding_path: a.embedding_path,
            checkpoint_dir: a.checkpoint_dir,
            ns:             a.ns,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            word_dim:       a.word_dim,
            hidden_dim:     a.hidden_dim,
            dropout:        a.dropout,
            margin:         a.margin,
            freeze:         !a.tune_embeddings,
            inverse_edges:  !a.no_inverse_edges,
            num_workers:    a.num_workers,
            seed:           a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// train, dev or test
    #[arg(long, default_value = "test")]
    pub split: String,

    /// Epoch to load; the latest checkpoint when omitted
    #[arg(long)]
    pub epoch: Option<usize>,
}
