// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: each use case wires the data, ml and
// infra layers together for one CLI subcommand.
//
//   prepare_use_case   build-vocab, build-graph, embed
//   train_use_case     train (and the TrainConfig it persists)
//   evaluate_use_case  evaluate a saved checkpoint on one split
//
// No tensor math and no printing here; that belongs to Layers 5
// and 1.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Offline preparation steps
pub mod prepare_use_case;

// The training workflow
pub mod train_use_case;

// Checkpoint evaluation
pub mod evaluate_use_case;
