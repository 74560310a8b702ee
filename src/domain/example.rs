// ============================================================
// Layer 3 — Example and CandidateList
// ============================================================
// An Example is one corpus line after it has been mapped through
// the vocabulary:
//
//   "what is the capital of france \t capital of \t capital_of"
//        │                              │             │
//        ▼                              ▼             ▼
//   question: [w1, w2, ...]   relation_words: [...]  relation: r
//
// A CandidateList is the set of relations the model ranks for one
// example. The gold relation ALWAYS sits at position 0, which is why
// the batch labels are a column of zeros.

use serde::{Deserialize, Serialize};

/// One parsed (question, relation-surface, gold relation) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// 1-based line number in the source file — the example's identity
    pub line: usize,

    /// Question word ids (unknown words map to 1)
    pub question: Vec<u32>,

    /// Word ids of the relation's surface form, padded to a fixed length
    pub relation_words: Vec<u32>,

    /// Gold relation id from `rtoi`
    pub relation: u32,
}

/// Ordered candidate relation ids; `ids[0]` is the gold relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateList {
    ids: Vec<u32>,
}

impl CandidateList {
    /// Callers are trusted to put gold first and avoid duplicates;
    /// the sampler is the only producer in this crate.
    pub(crate) fn from_ids(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    pub fn gold(&self) -> u32 {
        self.ids[0]
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gold_is_first() {
        let c = CandidateList::from_ids(vec![4, 0, 9]);
        assert_eq!(c.gold(), 4);
        assert_eq!(c.len(), 3);
    }
}
