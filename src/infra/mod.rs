// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the ml and application layers:
//
//   checkpoint.rs      — model weights via Burn's CompactRecorder,
//                        plus the TrainConfig as JSON so evaluation
//                        can rebuild the same model
//
//   embedding_store.rs — pretrained word vectors read from a
//                        GloVe-style text file, aligned with the
//                        vocabulary and cached with bincode
//
//   metrics.rs         — accuracy and the strict / loose macro /
//                        loose micro label-set scores, plus the
//                        per-epoch CSV logger
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Pretrained embedding matrix
pub mod embedding_store;

/// Evaluation scores and the epoch CSV logger
pub mod metrics;
