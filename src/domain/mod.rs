// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
//
//   error.rs    — PipelineError, the typed failure taxonomy
//   example.rs  — one parsed corpus record + its candidate list
//   triplet.rs  — integer knowledge-base facts
//   traits.rs   — Persistable, implemented by every on-disk artefact
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

pub mod error;

// A question/relation record and the candidates ranked against it
pub mod example;

// (head, relation, tail) facts from the knowledge base
pub mod triplet;

pub mod traits;
