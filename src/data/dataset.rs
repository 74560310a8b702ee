// ============================================================
// Layer 4 — SimpleQA Dataset
// ============================================================
// Implements Burn's Dataset trait over a corpus file that is
// NEVER loaded whole. Each get(i):
//
//   1. fetches line i+1 through the shared LineIndex
//   2. parses it through the shared Vocabulary
//   3. draws the candidate list (sampled or exhaustive)
//
// All state is immutable and behind Arc, so the DataLoader can call
// get() from several worker threads at once.
//
// Every line is parsed once in open(), so a malformed line or an
// unknown relation label fails there with its typed error. Dataset::get
// returns Option, not Result: if the file changes after open and a line
// stops parsing, get logs at error level and returns None. The loader
// then ends early, and the training loop and evaluation catch that by
// comparing the rows they saw with len().
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use std::{path::Path, sync::Arc};

use burn::data::dataset::Dataset;

use crate::data::reader::{check_examples, read_example, LineIndex};
use crate::data::sampler::CandidateMode;
use crate::data::vocab::Vocabulary;
use crate::domain::error::Result;
use crate::domain::example::{CandidateList, Example};

/// One dataset item: the parsed example and what it is ranked against.
#[derive(Debug, Clone)]
pub struct SimpleQaItem {
    pub example:    Example,
    pub candidates: CandidateList,
}

pub struct SimpleQaDataset {
    index: Arc<LineIndex>,
    vocab: Arc<Vocabulary>,
    mode:  CandidateMode,
}

impl SimpleQaDataset {
    /// Index `path`, check `mode` against the relation count and parse
    /// every line once.
    pub fn open(path: &Path, vocab: Arc<Vocabulary>, mode: CandidateMode) -> Result<Self> {
        mode.validate(vocab.num_relations())?;
        let index = Arc::new(LineIndex::build(path)?);
        check_examples(&index, &vocab)?;
        tracing::info!(
            "Opened '{}' with {} examples, {} candidates each",
            path.display(),
            index.line_count(),
            mode.list_len(vocab.num_relations())
        );
        Ok(Self { index, vocab, mode })
    }

    /// Fallible version of `get`; `item` is 0-based.
    pub fn read(&self, item: usize) -> Result<SimpleQaItem> {
        let example = read_example(&self.index, item + 1, &self.vocab)?;
        let candidates = self.mode.sample(
            example.relation,
            self.vocab.num_relations(),
            &mut rand::thread_rng(),
        )?;
        Ok(SimpleQaItem { example, candidates })
    }
}

impl Dataset<SimpleQaItem> for SimpleQaDataset {
    fn get(&self, index: usize) -> Option<SimpleQaItem> {
        if index >= self.len() {
            return None;
        }
        match self.read(index) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!(
                    "Cannot read item {} of '{}': {}",
                    index,
                    self.index.path().display(),
                    e
                );
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.index.line_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab::{RelationSet, VocabularyBuilder};
    use crate::domain::error::PipelineError;
    use std::io::Write;

    fn setup(lines: &[&str], relations: &[&str]) -> (tempfile::NamedTempFile, Arc<Vocabulary>) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        let rels = RelationSet::from_labels(relations.iter().copied());
        let vocab = VocabularyBuilder::build(&[f.path().to_path_buf()], &rels).unwrap();
        (f, Arc::new(vocab))
    }

    #[test]
    fn test_capital_of_with_two_negatives() {
        let (f, vocab) = setup(
            &["what is the capital of france\tcapital of\tcapital_of"],
            &["capital_of", "born_in", "wrote", "directed"],
        );
        let ds = SimpleQaDataset::open(f.path(), vocab.clone(), CandidateMode::Sampled(2)).unwrap();

        let item = ds.get(0).unwrap();
        assert_eq!(item.candidates.len(), 3);
        assert_eq!(item.candidates.gold(), vocab.relation_id("capital_of").unwrap());
        assert_eq!(item.example.question.len(), 6);
    }

    #[test]
    fn test_exhaustive_lists_cover_every_relation() {
        let (f, vocab) = setup(&["q one\ts\tb", "q two\ts\ta"], &["a", "b", "c"]);
        let ds = SimpleQaDataset::open(f.path(), vocab, CandidateMode::Exhaustive).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().candidates.ids(), &[1, 0, 2]);
        assert_eq!(ds.get(1).unwrap().candidates.ids(), &[0, 1, 2]);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_too_many_negatives_rejected_on_open() {
        let (f, vocab) = setup(&["q\ts\ta"], &["a", "b"]);
        let err = SimpleQaDataset::open(f.path(), vocab, CandidateMode::Sampled(2)).err().unwrap();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_relation_rejected_on_open() {
        let (_f, vocab) = setup(&["q\ts\ta"], &["a", "b"]);
        let mut other = tempfile::NamedTempFile::new().unwrap();
        writeln!(other, "q\ts\ta").unwrap();
        writeln!(other, "q\ts\tzzz").unwrap();

        let err = SimpleQaDataset::open(other.path(), vocab, CandidateMode::Exhaustive).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownRelation(ref r) if r == "zzz"));
    }

    #[test]
    fn test_malformed_line_rejected_on_open() {
        let (f, vocab) = setup(&["q\ts\ta"], &["a", "b"]);
        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "q\ts\ta").unwrap();
        writeln!(broken, "only two\tfields").unwrap();
        drop(f);

        let err = SimpleQaDataset::open(broken.path(), vocab, CandidateMode::Exhaustive).err().unwrap();
        assert!(matches!(err, PipelineError::Format { line: 2, .. }));
    }

    #[test]
    fn test_line_changed_after_open_surfaces_through_read() {
        let (f, vocab) = setup(&["q one\ts\ta", "q two\ts\tb"], &["a", "b"]);
        let ds = SimpleQaDataset::open(f.path(), vocab, CandidateMode::Exhaustive).unwrap();
        // same byte layout, so the offsets stay valid
        std::fs::write(f.path(), "q one\ts\ta\nq two\ts\tz\n").unwrap();

        assert!(ds.get(0).is_some());
        assert!(matches!(ds.read(1), Err(PipelineError::UnknownRelation(_))));
        assert!(ds.get(1).is_none());
    }
}
