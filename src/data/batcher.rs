// ============================================================
// Layer 4 — Batch Collator
// ============================================================
// Turns a Vec of (Example, CandidateList) into one training batch.
//
// Two steps, kept apart on purpose:
//
//   collate()          plain Rust, no tensors
//     • pad questions to the longest one in the batch (id 0)
//     • stack candidate lists into a [batch, n_candidates] matrix
//       (every list must have the same length)
//     • labels = [0; batch] — the gold is always candidate 0
//     • Stage B graph over the batch's gold relations
//
//   SimpleQaBatcher    Burn's Batcher trait
//     • calls collate()
//     • flattens + reshapes the matrices into Int tensors on the
//       target device, exactly like the flat → [N, S] trick:
//       [q1_t1, ..., q1_tS, q2_t1, ..., qN_tS] → [N, S]
//
// The Batcher trait cannot return an error, so its output type is
// itself a Result; the training loop unwraps it with `?`.
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors)

use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::SimpleQaItem;
use crate::data::graph::{BatchGraph, BatchGraphBuilder, TripletStore};
use crate::data::vocab::PAD_ID;
use crate::domain::error::{PipelineError, Result};
use crate::domain::example::{CandidateList, Example};

// ─── Batch (framework-free) ───────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// [batch, seq_len] question word ids, right-padded with PAD_ID
    pub question: Vec<Vec<u32>>,
    /// [batch, n_candidates] candidate relation ids, gold in column 0
    pub relation: Vec<Vec<u32>>,
    /// [batch] index of the gold candidate — always 0
    pub labels:   Vec<u32>,
    /// KB subgraph for this batch's gold relations
    pub graph:    BatchGraph,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.question.len()
    }

    /// Padded question length (at least 1 so tensors never have a zero dim)
    pub fn seq_len(&self) -> usize {
        self.question.first().map_or(0, Vec::len)
    }

    pub fn num_candidates(&self) -> usize {
        self.relation.first().map_or(0, Vec::len)
    }
}

/// Collate examples into a Batch. Pure: same input, same output.
pub fn collate(
    items:   &[(Example, CandidateList)],
    store:   &TripletStore,
    builder: &BatchGraphBuilder,
) -> Result<Batch> {
    if let Some(index) = items.iter().position(|(_, c)| c.is_empty()) {
        return Err(PipelineError::InvalidConfig(format!("candidate list {index} is empty")));
    }
    let expected = items.first().map_or(0, |(_, c)| c.len());
    for (index, (_, candidates)) in items.iter().enumerate() {
        if candidates.len() != expected {
            return Err(PipelineError::InconsistentBatch {
                index,
                expected,
                found: candidates.len(),
            });
        }
    }

    let seq_len = items
        .iter()
        .map(|(e, _)| e.question.len())
        .max()
        .unwrap_or(0)
        .max(1);

    let question = items
        .iter()
        .map(|(e, _)| {
            let mut row = e.question.clone();
            row.resize(seq_len, PAD_ID);
            row
        })
        .collect();

    let relation = items.iter().map(|(_, c)| c.ids().to_vec()).collect();

    let gold: Vec<u32> = items.iter().map(|(_, c)| c.gold()).collect();
    let graph = builder.build(store, &gold);

    Ok(Batch {
        question,
        relation,
        labels: vec![0; items.len()],
        graph,
    })
}

// ─── SimpleQaBatch (tensors) ──────────────────────────────────────────────────
/// A batch ready for the model forward pass.
///
/// B is the Burn Backend — generic so the same batcher serves the
/// autodiff training backend and the plain validation backend.
#[derive(Debug, Clone)]
pub struct SimpleQaBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub question: Tensor<B, 2, Int>,

    /// [batch_size, n_candidates]
    pub relation: Tensor<B, 2, Int>,

    /// [batch_size], all zeros
    pub labels:   Tensor<B, 1, Int>,

    /// Kept on the host; empty batches have no tensor form
    pub graph:    BatchGraph,
}

impl Batch {
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> SimpleQaBatch<B> {
        let batch_size = self.len();

        let question_flat: Vec<i32> = self
            .question
            .iter()
            .flat_map(|row| row.iter().map(|&x| x as i32))
            .collect();

        let relation_flat: Vec<i32> = self
            .relation
            .iter()
            .flat_map(|row| row.iter().map(|&x| x as i32))
            .collect();

        let labels: Vec<i32> = self.labels.iter().map(|&x| x as i32).collect();

        let question = Tensor::<B, 1, Int>::from_ints(question_flat.as_slice(), device)
            .reshape([batch_size, self.seq_len()]);

        let relation = Tensor::<B, 1, Int>::from_ints(relation_flat.as_slice(), device)
            .reshape([batch_size, self.num_candidates()]);

        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        SimpleQaBatch {
            question,
            relation,
            labels,
            graph: self.graph.clone(),
        }
    }
}

// ─── SimpleQaBatcher ──────────────────────────────────────────────────────────
/// What the DataLoader yields: a batch, or the reason collation failed.
pub type BatchResult<B> = std::result::Result<SimpleQaBatch<B>, Arc<PipelineError>>;

#[derive(Clone, Debug)]
pub struct SimpleQaBatcher<B: Backend> {
    device:  B::Device,
    store:   Arc<TripletStore>,
    builder: BatchGraphBuilder,
}

impl<B: Backend> SimpleQaBatcher<B> {
    pub fn new(device: B::Device, store: Arc<TripletStore>, builder: BatchGraphBuilder) -> Self {
        Self { device, store, builder }
    }
}

impl<B: Backend> Batcher<SimpleQaItem, BatchResult<B>> for SimpleQaBatcher<B> {
    fn batch(&self, items: Vec<SimpleQaItem>) -> BatchResult<B> {
        let pairs: Vec<(Example, CandidateList)> = items
            .into_iter()
            .map(|item| (item.example, item.candidates))
            .collect();

        let batch = collate(&pairs, &self.store, &self.builder).map_err(Arc::new)?;
        Ok(batch.to_tensors(&self.device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sampler::sample;
    use crate::domain::triplet::Triplet;
    use burn::backend::NdArray;
    use rand::{rngs::StdRng, SeedableRng};

    fn example(line: usize, question: Vec<u32>, relation: u32) -> Example {
        Example { line, question, relation_words: vec![0; 20], relation }
    }

    fn candidates(gold: u32, total: usize, ns: usize) -> CandidateList {
        sample(gold, total, ns, &mut StdRng::seed_from_u64(gold as u64)).unwrap()
    }

    #[test]
    fn test_pads_to_longest_and_keeps_order() {
        let items = vec![
            (example(1, vec![5, 6], 0), candidates(0, 5, 2)),
            (example(2, vec![7, 8, 9, 10], 1), candidates(1, 5, 2)),
        ];
        let b = collate(&items, &TripletStore::default(), &BatchGraphBuilder::new(5)).unwrap();

        assert_eq!(b.question, vec![vec![5, 6, 0, 0], vec![7, 8, 9, 10]]);
        assert_eq!(b.labels, vec![0, 0]);
        assert_eq!(b.relation[0][0], 0);
        assert_eq!(b.relation[1][0], 1);
        assert_eq!(b.num_candidates(), 3);
    }

    #[test]
    fn test_ragged_candidates_rejected() {
        let items = vec![
            (example(1, vec![5], 0), candidates(0, 5, 2)),
            (example(2, vec![6], 1), candidates(1, 5, 0)),
        ];
        let err = collate(&items, &TripletStore::default(), &BatchGraphBuilder::new(5)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InconsistentBatch { index: 1, expected: 3, found: 5 }
        ));
    }

    #[test]
    fn test_empty_kb_match_gives_empty_graph() {
        let store = TripletStore::new(vec![Triplet::new(2, 4, 3)]);
        let items = vec![(example(1, vec![5], 0), candidates(0, 5, 0))];
        let b = collate(&items, &store, &BatchGraphBuilder::new(5)).unwrap();
        assert!(b.graph.is_empty());
        assert!(b.graph.rel.is_empty());
    }

    #[test]
    fn test_graph_attached_for_gold_only() {
        let store = TripletStore::new(vec![Triplet::new(2, 0, 3), Triplet::new(4, 1, 5)]);
        // candidates include relation 1, but only gold 0 selects triplets
        let items = vec![(example(1, vec![5], 0), candidates(0, 2, 0))];
        let b = collate(&items, &store, &BatchGraphBuilder::new(2)).unwrap();
        assert_eq!(b.graph.uniq_v, vec![2, 3]);
    }

    #[test]
    fn test_empty_candidate_list_rejected() {
        let items = vec![(example(1, vec![5], 0), CandidateList::from_ids(vec![]))];
        let err = collate(&items, &TripletStore::default(), &BatchGraphBuilder::new(5)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_inverse_edges_follow_builder() {
        let store = TripletStore::new(vec![Triplet::new(2, 0, 3)]);
        let items = vec![(example(1, vec![5], 0), candidates(0, 2, 0))];
        let with = collate(&items, &store, &BatchGraphBuilder::new(2)).unwrap();
        let without = collate(&items, &store, &BatchGraphBuilder::new(2).without_inverse_edges()).unwrap();
        // inverse edge 3 -> 2 sorts first by destination
        assert_eq!(with.graph.rel, vec![2, 0]);
        assert_eq!(without.graph.rel, vec![0]);
    }

    #[test]
    fn test_empty_questions_still_one_column() {
        let items = vec![(example(1, vec![], 0), candidates(0, 3, 1))];
        let b = collate(&items, &TripletStore::default(), &BatchGraphBuilder::new(3)).unwrap();
        assert_eq!(b.question, vec![vec![PAD_ID]]);
    }

    #[test]
    fn test_batcher_tensor_shapes() {
        let device = Default::default();
        let batcher = SimpleQaBatcher::<NdArray>::new(
            device,
            Arc::new(TripletStore::default()),
            BatchGraphBuilder::new(6),
        );
        let items = vec![
            SimpleQaItem { example: example(1, vec![2, 3, 4], 0), candidates: candidates(0, 6, 3) },
            SimpleQaItem { example: example(2, vec![5], 2), candidates: candidates(2, 6, 3) },
        ];
        let batch = batcher.batch(items).unwrap();
        assert_eq!(batch.question.dims(), [2, 3]);
        assert_eq!(batch.relation.dims(), [2, 4]);
        assert_eq!(batch.labels.dims(), [2]);
    }
}
