// ============================================================
// Layer 6 — Pretrained Embedding Store
// ============================================================
// Builds the [n_words, dim] word-vector matrix the model starts
// from, indexed by the vocabulary's word ids.
//
// Input is a GloVe-style text file, one word per line:
//
//   the 0.418 0.24968 -0.41242 ...
//   . . . 0.0123 -0.553 ...        ← some tokens contain spaces
//
// so the LAST `dim` fields are the vector and everything before
// them is the word.
//
// Rows:
//   <pad>          zeros
//   found in file  copied
//   otherwise      uniform in [-0.25, 0.25]
//
// The matrix is persisted with bincode — it is large and never
// read by a human.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::data::vocab::{VocabKind, Vocabulary, PAD_ID};
use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::Persistable;

const INIT_RANGE: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    rows: usize,
    dim:  usize,
    /// Row-major, rows * dim values
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[cfg(test)]
    pub fn row(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Build the matrix for `vocab` from a GloVe-style file.
    pub fn from_glove<R: Rng + ?Sized>(
        path:  &Path,
        vocab: &Vocabulary,
        dim:   usize,
        rng:   &mut R,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(PipelineError::InvalidConfig("embedding dim must be positive".to_string()));
        }

        let rows = vocab.num_words();
        let mut data: Vec<f32> = (0..rows * dim)
            .map(|_| rng.gen_range(-INIT_RANGE..=INIT_RANGE))
            .collect();
        let pad = PAD_ID as usize * dim;
        data[pad..pad + dim].fill(0.0);

        let source = path.display().to_string();
        let mut found = 0usize;

        for (i, line) in BufReader::new(File::open(path)?).lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split(' ').filter(|f| !f.is_empty()).collect();
            if fields.len() <= dim {
                return Err(PipelineError::format(
                    &source,
                    i + 1,
                    format!("expected a word and {dim} values, found {} fields", fields.len()),
                ));
            }

            let split = fields.len() - dim;
            let word = fields[..split].join(" ");
            let Some(id) = vocab.get(VocabKind::Word, &word) else {
                continue;
            };
            if id == PAD_ID {
                continue;
            }

            let start = id as usize * dim;
            for (slot, value) in data[start..start + dim].iter_mut().zip(&fields[split..]) {
                *slot = value.parse().map_err(|_| {
                    PipelineError::format(&source, i + 1, format!("'{value}' is not a number"))
                })?;
            }
            found += 1;
        }

        tracing::info!(
            "Pretrained vectors found for {}/{} words (dim={})",
            found,
            rows,
            dim
        );
        Ok(Self { rows, dim, data })
    }
}

impl Persistable for EmbeddingMatrix {
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        bincode::serialize_into(BufWriter::new(File::create(path)?), self)?;
        tracing::debug!("Saved {}x{} embedding matrix to '{}'", self.rows, self.dim, path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let matrix: Self = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
        if matrix.data.len() != matrix.rows * matrix.dim {
            return Err(PipelineError::InvalidConfig(format!(
                "embedding file '{}' is truncated",
                path.display()
            )));
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::io::Write;

    fn vocab() -> Vocabulary {
        let mut v = Vocabulary::new();
        v.renew(VocabKind::Word, ["capital", "france", ". . ."]);
        v
    }

    #[test]
    fn test_rows_follow_vocab_ids() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "france 1.0 2.0 3.0").unwrap();
        writeln!(f, "unrelated 9 9 9").unwrap();
        writeln!(f, ". . . 4 5 6").unwrap();

        let v = vocab();
        let m = EmbeddingMatrix::from_glove(f.path(), &v, 3, &mut StdRng::seed_from_u64(3)).unwrap();

        assert_eq!(m.rows(), v.num_words());
        assert_eq!(m.row(PAD_ID), &[0.0, 0.0, 0.0]);
        assert_eq!(m.row(v.word_id("france")), &[1.0, 2.0, 3.0]);
        assert_eq!(m.row(v.word_id(". . .")), &[4.0, 5.0, 6.0]);
        assert!(m.row(v.word_id("capital")).iter().all(|x| x.abs() <= INIT_RANGE));
    }

    #[test]
    fn test_short_line_is_format_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "france 1.0").unwrap();
        let err = EmbeddingMatrix::from_glove(f.path(), &vocab(), 3, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, PipelineError::Format { line: 1, .. }));
    }

    #[test]
    fn test_persist_roundtrip() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "capital 0.5 0.5").unwrap();
        let m = EmbeddingMatrix::from_glove(f.path(), &vocab(), 2, &mut StdRng::seed_from_u64(1)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.bin");
        m.save(&path).unwrap();
        assert_eq!(EmbeddingMatrix::load(&path).unwrap(), m);
    }
}
