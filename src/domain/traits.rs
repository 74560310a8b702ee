// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Persistable is the single seam between domain values and the
// disk. Vocabulary, TripletStore and EmbeddingMatrix all implement
// it, each picking its own format (JSON for the human-readable
// vocabulary, bincode for the large numeric artefacts).
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use crate::domain::error::Result;

// ─── Persistable ──────────────────────────────────────────────────────────────
/// Any component whose state can be saved and restored from disk.
pub trait Persistable: Sized {
    /// Save this component's state to the given path
    fn save(&self, path: &Path) -> Result<()>;

    /// Load a component's state from the given path.
    fn load(path: &Path) -> Result<Self>;
}
