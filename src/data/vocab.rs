// ============================================================
// Layer 4 — Vocabulary
// ============================================================
// Assigns stable integer ids to everything the model sees:
//
//   stoi  word            → id   (seeded <pad>=0, <unk>=1)
//   rtoi  relation label  → id   (built only from the relation set)
//   etoi  entity          → id   (filled in later by the graph builder)
//
// plus one derived table, relation id → word ids, obtained by
// splitting each relation label on '.' and '_':
//
//   "people.person.place_of_birth"
//        → ["people", "person", "place", "of", "birth"]
//        → [12, 40, 7, 3, 88, 0, 0, ... ]   (always 20 long)
//
// Ids are dense and assigned in first-seen order. Once built the
// Vocabulary is never mutated again: readers, samplers and the
// batcher all take it by reference (or Arc when shared with the
// DataLoader workers).
//
// Reference: Rust Book §8 (Hash Maps)

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::data::reader::split_record;
use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::Persistable;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

/// Every relation's word decomposition is padded / truncated to this
pub const RELATION_WORDS_LEN: usize = 20;

/// Which id mapping an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabKind {
    Word,
    Relation,
    Entity,
}

// ─── Vocabulary ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    stoi: HashMap<String, u32>,
    rtoi: HashMap<String, u32>,
    etoi: HashMap<String, u32>,

    /// Indexed by relation id; each row is RELATION_WORDS_LEN long
    relation_words: Vec<Vec<u32>>,
}

impl Vocabulary {
    /// An empty vocabulary with only the reserved word ids
    pub fn new() -> Self {
        let mut vocab = Self::default();
        vocab.renew(VocabKind::Word, [PAD_TOKEN, UNK_TOKEN]);
        vocab
    }

    fn map(&self, kind: VocabKind) -> &HashMap<String, u32> {
        match kind {
            VocabKind::Word     => &self.stoi,
            VocabKind::Relation => &self.rtoi,
            VocabKind::Entity   => &self.etoi,
        }
    }

    fn map_mut(&mut self, kind: VocabKind) -> &mut HashMap<String, u32> {
        match kind {
            VocabKind::Word     => &mut self.stoi,
            VocabKind::Relation => &mut self.rtoi,
            VocabKind::Entity   => &mut self.etoi,
        }
    }

    /// Add unseen tokens to one mapping, next id = current size.
    pub fn renew<I, S>(&mut self, kind: VocabKind, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let map = self.map_mut(kind);
        for token in tokens {
            let token = token.as_ref();
            if !map.contains_key(token) {
                let id = map.len() as u32;
                map.insert(token.to_string(), id);
            }
        }
    }

    pub fn get(&self, kind: VocabKind, token: &str) -> Option<u32> {
        self.map(kind).get(token).copied()
    }

    pub fn len(&self, kind: VocabKind) -> usize {
        self.map(kind).len()
    }

    /// Word id with the unknown fallback
    pub fn word_id(&self, word: &str) -> u32 {
        self.stoi.get(word).copied().unwrap_or(UNK_ID)
    }

    /// Relation id; absent labels are an error, not an <unk>
    pub fn relation_id(&self, label: &str) -> Result<u32> {
        self.rtoi
            .get(label)
            .copied()
            .ok_or_else(|| PipelineError::UnknownRelation(label.to_string()))
    }

    pub fn num_words(&self) -> usize {
        self.stoi.len()
    }

    pub fn num_relations(&self) -> usize {
        self.rtoi.len()
    }

    pub fn num_entities(&self) -> usize {
        self.etoi.len()
    }

    /// Padded word ids of one relation
    pub fn relation_words(&self, relation: u32) -> &[u32] {
        &self.relation_words[relation as usize]
    }

    /// All relations' word ids, row r = relation r
    pub fn relation_word_matrix(&self) -> &[Vec<u32>] {
        &self.relation_words
    }

    /// Drop the entity table and start again from the reserved ids.
    pub fn reset_entities(&mut self) {
        self.etoi.clear();
        self.renew(VocabKind::Entity, [PAD_TOKEN, UNK_TOKEN]);
    }

    /// Recompute relation → word ids from the current stoi/rtoi.
    /// Must be called whenever either mapping changes.
    pub fn rebuild_relation_words(&mut self) {
        let mut rows = vec![Vec::new(); self.rtoi.len()];
        for (label, &id) in &self.rtoi {
            let mut row: Vec<u32> = split_relation_label(label)
                .map(|w| self.word_id(w))
                .collect();
            row.resize(RELATION_WORDS_LEN, PAD_ID);
            rows[id as usize] = row;
        }
        self.relation_words = rows;
    }
}

/// "film.film.directed_by" → ["film", "film", "directed", "by"]
pub fn split_relation_label(label: &str) -> impl Iterator<Item = &str> {
    label
        .split(|c: char| c == '.' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
}

impl Persistable for Vocabulary {
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut vocab: Vocabulary = serde_json::from_reader(reader)?;
        // Older files or hand edits: keep the derived table in sync
        if vocab.relation_words.len() != vocab.rtoi.len() {
            vocab.rebuild_relation_words();
        }
        Ok(vocab)
    }
}

// ─── RelationSet ──────────────────────────────────────────────────────────────
/// The candidate relation universe, in the order ids will be assigned.
#[derive(Debug, Clone, Default)]
pub struct RelationSet {
    labels: Vec<String>,
}

impl RelationSet {
    /// Keep first occurrences, drop purely numeric labels.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for label in labels {
            let label: String = label.into();
            if label.is_empty() || label.parse::<i64>().is_ok() {
                continue;
            }
            if seen.insert(label.clone()) {
                kept.push(label);
            }
        }
        Self { labels: kept }
    }

    /// One label per line
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut labels = Vec::new();
        for line in reader.lines() {
            labels.push(line?.trim().to_string());
        }
        let set = Self::from_labels(labels);
        tracing::info!("Loaded {} candidate relations from '{}'", set.len(), path.display());
        Ok(set)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ─── VocabularyBuilder ────────────────────────────────────────────────────────
pub struct VocabularyBuilder;

impl VocabularyBuilder {
    /// Build a vocabulary from tab-separated corpus files.
    ///
    /// Words come from the question and relation-surface fields of
    /// every line; relation ids come only from `relations`. Any
    /// malformed line aborts the whole build.
    pub fn build(filepaths: &[PathBuf], relations: &RelationSet) -> Result<Vocabulary> {
        let mut vocab = Vocabulary::new();
        vocab.renew(VocabKind::Relation, relations.labels());

        for path in filepaths {
            let name = path.display().to_string();
            let reader = BufReader::new(File::open(path)?);
            let mut lines = 0usize;

            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                let (question, surface, _) = split_record(&line)
                    .map_err(|reason| PipelineError::format(&name, i + 1, reason))?;
                vocab.renew(VocabKind::Word, question.split_whitespace());
                vocab.renew(VocabKind::Word, surface.split_whitespace());
                lines += 1;
            }

            tracing::debug!("Scanned {} lines from '{}'", lines, name);
        }

        vocab.rebuild_relation_words();

        tracing::info!(
            "Vocabulary built: {} words, {} relations",
            vocab.num_words(),
            vocab.num_relations()
        );
        Ok(vocab)
    }
}
