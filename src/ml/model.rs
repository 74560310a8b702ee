use anyhow::{bail, Result};
use burn::{
    module::Param,
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        Linear, LinearConfig,
        Lstm, LstmConfig,
    },
    prelude::*,
    tensor::{activation::sigmoid, TensorData},
};

use crate::data::vocab::PAD_ID;
use crate::infra::embedding_store::EmbeddingMatrix;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SimpleQaConfig {
    pub n_words:     usize,
    pub n_relations: usize,
    #[config(default = 300)]
    pub word_dim:    usize,
    #[config(default = 100)]
    pub hidden_dim:  usize,
    #[config(default = 0.5)]
    pub dropout:     f64,
}

impl SimpleQaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SimpleQaModel<B> {
        let repr_dim = 2 * self.hidden_dim;

        // EmbeddingConfig never passes fan-in/fan-out, which Xavier needs
        let mut relation_embedding = EmbeddingConfig::new(self.n_relations, repr_dim).init(device);
        relation_embedding.weight = Initializer::XavierUniform { gain: 1.0 }.init_with(
            [self.n_relations, repr_dim],
            Some(self.n_relations),
            Some(repr_dim),
            device,
        );

        SimpleQaModel {
            word_embedding: EmbeddingConfig::new(self.n_words, self.word_dim).init(device),
            relation_embedding,
            word_encoder: MaskedBiLstm::new(self.word_dim, self.hidden_dim, device),
            question_encoder: MaskedBiLstm::new(repr_dim, self.hidden_dim, device),
            gate: GateNetwork {
                linear: LinearConfig::new(2 * repr_dim, repr_dim).init(device),
            },
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Bidirectional LSTM over right-padded rows.
///
/// The backward direction reads each row reversed within its own
/// length, so trailing pads never reach a real token's state:
///
///   ids      [a b c 0 0]
///   reversed [c b a 0 0]   → backward LSTM → flipped back
///
/// Output is [n, len, 2h]; positions past a row's length hold
/// values that callers mask out.
#[derive(Module, Debug)]
pub struct MaskedBiLstm<B: Backend> {
    pub fwd: Lstm<B>,
    pub bwd: Lstm<B>,
}

impl<B: Backend> MaskedBiLstm<B> {
    pub fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            fwd: LstmConfig::new(d_input, d_hidden, true).init(device),
            bwd: LstmConfig::new(d_input, d_hidden, true).init(device),
        }
    }

    /// x: [n, len, d_input], mask: [n, len] with 1.0 on real tokens
    pub fn forward(&self, x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 3> {
        let [n, len, d_input] = x.dims();
        let order = reverse_within_length(mask);

        let (forward_out, _) = self.fwd.forward(x.clone(), None);

        let reversed = x.gather(1, order.clone().reshape([n, len, 1]).expand([n, len, d_input]));
        let (backward_out, _) = self.bwd.forward(reversed, None);
        let d_hidden = backward_out.dims()[2];
        // the permutation is its own inverse
        let backward_out = backward_out.gather(1, order.reshape([n, len, 1]).expand([n, len, d_hidden]));

        Tensor::cat(vec![forward_out, backward_out], 2)
    }
}

/// Per-row gather indices that reverse positions [0, length) and keep
/// the padding positions in place.
fn reverse_within_length<B: Backend>(mask: Tensor<B, 2>) -> Tensor<B, 2, Int> {
    let [n, len] = mask.dims();
    let device = mask.device();

    let lengths = mask.sum_dim(1).int().expand([n, len]);
    let positions = Tensor::<B, 1, Int>::arange(0..len as i64, &device)
        .reshape([1, len])
        .expand([n, len]);

    let reversed = lengths.clone() - positions.clone() - 1;
    let inside = positions.clone().lower(lengths);
    positions.mask_where(inside, reversed)
}

/// g = σ(W[a; b]);  out = g·a + (1 − g)·b
#[derive(Module, Debug)]
pub struct GateNetwork<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> GateNetwork<B> {
    pub fn forward(&self, a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
        let g = sigmoid(self.linear.forward(Tensor::cat(vec![a.clone(), b.clone()], 1)));
        g.clone() * a + (g.neg() + 1.0) * b
    }
}

#[derive(Module, Debug)]
pub struct SimpleQaModel<B: Backend> {
    pub word_embedding:     Embedding<B>,
    pub relation_embedding: Embedding<B>,
    pub word_encoder:       MaskedBiLstm<B>,
    pub question_encoder:   MaskedBiLstm<B>,
    pub gate:               GateNetwork<B>,
    pub dropout:            Dropout,
}

impl<B: Backend> SimpleQaModel<B> {
    /// Replace the word embedding with pretrained vectors.
    pub fn with_pretrained(
        mut self,
        matrix: &EmbeddingMatrix,
        freeze: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let [n_words, word_dim] = self.word_embedding.weight.val().dims();
        if matrix.rows() != n_words || matrix.dim() != word_dim {
            bail!(
                "pretrained matrix is {}x{}, model expects {}x{}",
                matrix.rows(), matrix.dim(), n_words, word_dim
            );
        }
        let weight = Tensor::<B, 2>::from_data(
            TensorData::new(matrix.data().to_vec(), [n_words, word_dim]),
            device,
        );
        self.word_embedding.weight = Param::from_tensor(weight).set_require_grad(!freeze);
        Ok(self)
    }

    /// question:       [batch, seq_len]
    /// relation:       [batch, n_candidates]  candidate relation ids
    /// relation_words: [n_relations, 20]      every relation's word ids
    ///
    /// → cosine scores [batch, n_candidates]
    pub fn forward(
        &self,
        question:       Tensor<B, 2, Int>,
        relation:       Tensor<B, 2, Int>,
        relation_words: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, n_candidates] = relation.dims();

        // ── Question: two stacked BiLSTMs, residual sum, max-pool ─────────────
        let q_mask = not_pad(question.clone());
        let q = self.dropout.forward(self.word_embedding.forward(question));
        let low  = self.word_encoder.forward(q, q_mask.clone());
        let high = self.question_encoder.forward(low.clone(), q_mask.clone());
        let question_repr = masked_max_pool(low + high, q_mask); // [batch, 2h]

        // ── Relations: embedding ⊕ encoded label words, fused by the gate ────
        let w_mask = not_pad(relation_words.clone());
        let words = self.dropout.forward(self.word_embedding.forward(relation_words));
        let words = self.word_encoder.forward(words, w_mask.clone());
        let words_repr = masked_mean_pool(words, w_mask); // [n_relations, 2h]

        let single_repr   = self.relation_embedding.weight.val();
        let relation_repr = self.gate.forward(single_repr, words_repr);
        let repr_dim      = relation_repr.dims()[1];

        let candidates = relation_repr
            .select(0, relation.reshape([batch_size * n_candidates]))
            .reshape([batch_size, n_candidates, repr_dim]);

        cosine_scores(candidates, question_repr.unsqueeze_dim::<3>(1))
    }
}

/// 1.0 for real tokens, 0.0 for padding
fn not_pad<B: Backend>(ids: Tensor<B, 2, Int>) -> Tensor<B, 2> {
    ids.equal_elem(PAD_ID as i32).bool_not().float()
}

fn masked_max_pool<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, len, dim] = x.dims();
    // pads pushed far below any real activation
    let penalty = (mask.reshape([n, len, 1]) - 1.0).expand([n, len, dim]) * 1e4;
    (x + penalty).max_dim(1).reshape([n, dim])
}

fn masked_mean_pool<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, len, dim] = x.dims();
    let lengths = mask.clone().sum_dim(1).clamp_min(1.0).expand([n, dim]);
    let mask = mask.reshape([n, len, 1]).expand([n, len, dim]);
    (x * mask).sum_dim(1).reshape([n, dim]) / lengths
}

/// candidates: [batch, n, dim], query: [batch, 1, dim] → [batch, n]
fn cosine_scores<B: Backend>(candidates: Tensor<B, 3>, query: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch_size, n, dim] = candidates.dims();
    let query = query.expand([batch_size, n, dim]);

    let dot = (candidates.clone() * query.clone()).sum_dim(2);
    let c_norm = candidates.powf_scalar(2.0).sum_dim(2).sqrt();
    let q_norm = query.powf_scalar(2.0).sum_dim(2).sqrt();

    (dot / (c_norm * q_norm).clamp_min(1e-8)).reshape([batch_size, n])
}

/// Multi-class hinge loss with the gold in column 0:
///   mean_i Σ_{j≠0} max(0, margin − s_i0 + s_ij) / n_candidates
pub fn multi_margin_loss<B: Backend>(scores: Tensor<B, 2>, margin: f64) -> Tensor<B, 1> {
    let [batch_size, n] = scores.dims();
    let gold = scores.clone().slice([0..batch_size, 0..1]).expand([batch_size, n]);
    let hinge = (scores - gold + margin).clamp_min(0.0);
    // column 0 always contributes exactly `margin`
    ((hinge.sum_dim(1) - margin) / n as f64).mean()
}

/// Relation word matrix as an Int tensor [n_relations, 20]
pub fn relation_words_tensor<B: Backend>(rows: &[Vec<u32>], device: &B::Device) -> Tensor<B, 2, Int> {
    let width = rows.first().map_or(0, Vec::len);
    let flat: Vec<i32> = rows.iter().flatten().map(|&x| x as i32).collect();
    Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny() -> SimpleQaConfig {
        SimpleQaConfig::new(12, 5).with_word_dim(8).with_hidden_dim(4)
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: SimpleQaModel<TestBackend> = tiny().init(&device);

        let question = Tensor::<TestBackend, 2, Int>::from_ints([[2, 3, 4], [5, 0, 0]], &device);
        let relation = Tensor::<TestBackend, 2, Int>::from_ints([[0, 1, 2], [3, 4, 0]], &device);
        let rows: Vec<Vec<u32>> = (0..5).map(|r| vec![r + 2, 0, 0, 0]).collect();
        let words = relation_words_tensor::<TestBackend>(&rows, &device);

        let scores = model.forward(question, relation, words);
        assert_eq!(scores.dims(), [2, 3]);

        let max = scores.abs().max().into_scalar();
        assert!(max <= 1.0 + 1e-4);
    }

    #[test]
    fn test_question_score_ignores_batch_padding() {
        let device = Default::default();
        let model: SimpleQaModel<TestBackend> = tiny().init(&device);
        let rows: Vec<Vec<u32>> = (0..5).map(|r| vec![r + 2, r + 3, 0, 0]).collect();
        let words = relation_words_tensor::<TestBackend>(&rows, &device);

        let alone = model.forward(
            Tensor::<TestBackend, 2, Int>::from_ints([[2, 3]], &device),
            Tensor::<TestBackend, 2, Int>::from_ints([[0, 1, 2, 3]], &device),
            words.clone(),
        );
        let batched = model.forward(
            Tensor::<TestBackend, 2, Int>::from_ints([[2, 3, 0, 0, 0, 0], [5, 6, 7, 8, 9, 10]], &device),
            Tensor::<TestBackend, 2, Int>::from_ints([[0, 1, 2, 3], [4, 3, 2, 1]], &device),
            words,
        );

        let alone: Vec<f32> = alone.into_data().iter::<f32>().collect();
        let batched: Vec<f32> = batched.slice([0..1, 0..4]).into_data().iter::<f32>().collect();
        for (a, b) in alone.iter().zip(&batched) {
            assert!((a - b).abs() < 1e-5, "{alone:?} vs {batched:?}");
        }
    }

    #[test]
    fn test_reverse_within_length() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 1.0, 0.0], [1.0, 0.0, 0.0, 0.0]], &device);
        let order: Vec<i64> = reverse_within_length(mask).into_data().iter::<i64>().collect();
        assert_eq!(order, vec![2, 1, 0, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_margin_loss_zero_when_gold_wins_by_margin() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 2>::from_floats([[0.9, 0.1, 0.2], [0.8, 0.0, 0.1]], &device);
        let loss = multi_margin_loss(scores, 0.5).into_scalar();
        assert!(loss.abs() < 1e-6);
    }

    #[test]
    fn test_margin_loss_penalises_violations() {
        let device = Default::default();
        // one violation of 0.5 - 0.2 + 0.4 = 0.7, divided by 2 candidates
        let scores = Tensor::<TestBackend, 2>::from_floats([[0.2, 0.4]], &device);
        let loss = multi_margin_loss(scores, 0.5).into_scalar();
        assert!((loss - 0.35).abs() < 1e-5);
    }

    #[test]
    fn test_pretrained_shape_checked() {
        let device = Default::default();
        let model: SimpleQaModel<TestBackend> = tiny().init(&device);
        let mut vocab = crate::data::vocab::Vocabulary::new();
        vocab.renew(crate::data::vocab::VocabKind::Word, ["a"]);
        let path = {
            use std::io::Write;
            let mut f = tempfile::NamedTempFile::new().unwrap();
            writeln!(f, "a 1 2").unwrap();
            f.into_temp_path()
        };
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(0);
        let matrix = EmbeddingMatrix::from_glove(&path, &vocab, 2, &mut rng).unwrap();
        assert!(model.with_pretrained(&matrix, true, &device).is_err());
    }
}
