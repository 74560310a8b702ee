// Integer knowledge-base facts, as persisted by the graph builder.

use serde::{Deserialize, Serialize};

/// (head entity id, relation id, tail entity id)
///
/// Entity ids come from `etoi`, relation ids from `rtoi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triplet {
    pub head:     u32,
    pub relation: u32,
    pub tail:     u32,
}

impl Triplet {
    pub fn new(head: u32, relation: u32, tail: u32) -> Self {
        Self { head, relation, tail }
    }
}
