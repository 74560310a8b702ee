// ============================================================
// Layer 4 — Example Reader
// ============================================================
// Reads ONE example from a corpus file without loading the file.
//
// How random access works:
//   On construction LineIndex scans the file once and records the
//   byte offset where every line starts:
//
//     offsets[0] = 0          "what is ...\tcapital of\tcapital_of\n"
//     offsets[1] = 48         "who wrote ...\t...\n"
//     ...
//
//   Fetching line n is then a seek to offsets[n-1] and a single
//   read_line. Only the offsets stay in memory, so corpora larger
//   than RAM are fine.
//
// Concurrency:
//   Every fetch opens its own file handle, so one LineIndex can be
//   shared (Arc) across DataLoader worker threads with no locking.
//
// Reference: Rust Book §9 (Error Handling)
//            std::io::Seek documentation

use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::data::vocab::Vocabulary;
use crate::domain::error::{PipelineError, Result};
use crate::domain::example::Example;

/// Split one corpus line into (question, relation surface, relation label).
///
/// Only the line ending is trimmed; any other count of tab-separated
/// fields than three is rejected with a human-readable reason.
pub fn split_record(line: &str) -> std::result::Result<(&str, &str, &str), String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split('\t');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(q), Some(s), Some(r), None) => Ok((q, s, r)),
        _ => Err(format!(
            "expected 3 tab-separated fields, found {}",
            line.split('\t').count()
        )),
    }
}

// ─── LineIndex ────────────────────────────────────────────────────────────────
/// Byte offsets of every line start in one file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    path:    PathBuf,
    offsets: Vec<u64>,
}

impl LineIndex {
    /// Scan `path` once and remember where each line begins.
    pub fn build(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut offsets = Vec::new();
        let mut pos     = 0u64;
        let mut buf     = Vec::new();

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            offsets.push(pos);
            pos += n as u64;
        }

        tracing::debug!("Indexed {} lines in '{}'", offsets.len(), path.display());
        Ok(Self { path, offsets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Fetch line `line` (1-based) without its line ending.
    pub fn fetch(&self, line: usize) -> Result<String> {
        if line == 0 || line > self.offsets.len() {
            return Err(PipelineError::format(
                self.path.display().to_string(),
                line,
                format!("line index out of range [1, {}]", self.offsets.len()),
            ));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offsets[line - 1]))?;

        let mut text = String::new();
        BufReader::new(file).read_line(&mut text)?;

        let trimmed = text.trim_end_matches(['\r', '\n']).len();
        text.truncate(trimmed);
        Ok(text)
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────
/// Map one raw line through the vocabulary.
pub fn parse_example(source: &str, line: usize, text: &str, vocab: &Vocabulary) -> Result<Example> {
    let (question, _surface, label) = split_record(text)
        .map_err(|reason| PipelineError::format(source, line, reason))?;

    let question = question
        .split_whitespace()
        .map(|w| vocab.word_id(w))
        .collect();
    let relation = vocab.relation_id(label)?;

    Ok(Example {
        line,
        question,
        relation_words: vocab.relation_words(relation).to_vec(),
        relation,
    })
}

/// Read and parse example `line` (1-based) from an indexed file.
pub fn read_example(index: &LineIndex, line: usize, vocab: &Vocabulary) -> Result<Example> {
    let text = index.fetch(line)?;
    parse_example(&index.path().display().to_string(), line, &text, vocab)
}

/// Parse every indexed line once, front to back, and stop at the first
/// bad one. Streams the file instead of seeking per line.
pub fn check_examples(index: &LineIndex, vocab: &Vocabulary) -> Result<()> {
    let source = index.path().display().to_string();
    let reader = BufReader::new(File::open(index.path())?);
    for (i, text) in reader.lines().enumerate() {
        parse_example(&source, i + 1, &text?, vocab)?;
    }
    Ok(())
}
