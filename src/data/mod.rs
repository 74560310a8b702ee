// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw tab-separated text to tensor batches.
//
//   corpus .tsv files ──► VocabularyBuilder ──► Vocabulary (offline)
//   KB triplet file   ──► filter_triplets   ──► TripletStore (offline)
//
//   per item:   LineIndex ──► read_example ──► CandidateMode::sample
//                                 │
//                                 ▼
//                           SimpleQaDataset  (Burn Dataset)
//   per batch:                    │
//                                 ▼
//                           SimpleQaBatcher  (Burn Batcher)
//                             collate() + BatchGraphBuilder
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Word / relation / entity id mappings
pub mod vocab;

/// Random-access line reading and example parsing
pub mod reader;

/// Candidate list construction (negatives or full ranking)
pub mod sampler;

/// KB triplet filtering (offline) and per-batch graphs (online)
pub mod graph;

/// Burn Dataset over an indexed corpus file
pub mod dataset;

/// Padding, stacking and Burn's Batcher
pub mod batcher;
