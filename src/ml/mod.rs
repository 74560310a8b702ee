// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model and training code that touches Burn tensors with
// gradients lives here. The data layer only builds plain batches
// and Int tensors; the ranking itself happens in this layer.
//
//   model.rs    — The relation-matching network
//                 • word embedding (optionally pretrained, frozen)
//                 • shared BiLSTM word encoder
//                 • stacked BiLSTM question encoder, residual
//                   sum and max-pool
//                 • gate fusing relation embedding with the
//                   encoded relation label words
//                 • cosine score per candidate
//                 • multi-margin ranking loss
//
//   trainer.rs  — Epoch loop over sampled candidates, dev ranking
//                 over every relation, checkpoint and CSV row per
//                 epoch, and the shared `evaluate` pass
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Yu et al. (2017) Improved Neural Relation Detection

/// Relation-matching model and loss
pub mod model;

/// Training loop and evaluation
pub mod trainer;
