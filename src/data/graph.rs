// ============================================================
// Layer 4 — Knowledge-Graph Triplets
// ============================================================
// Two stages, run at very different times.
//
// Stage A — offline, once per corpus (`build-graph` subcommand)
//
//   graph file ("head relation tail" per line)
//       │  pass 1: count how often each entity appears
//       ▼
//   valid entities (frequency > 0)
//       │  pass 2: keep triplets with valid endpoints, a known
//       │          relation, and fewer than `relation_cap` kept
//       │          triplets for that relation so far
//       ▼
//   surviving triplets ──► etoi rebuilt from their endpoints only
//       │
//       ▼
//   TripletStore (integer triplets, persisted with bincode)
//
//   The cap is greedy in file order: the first `relation_cap`
//   triplets of a relation win, later ones are dropped.
//
// Stage B — online, once per mini-batch (called by the batcher)
//
//   gold relations of the batch
//       │  look up every stored triplet with that relation
//       ▼
//   deduplicated triplet set (sorted, so builds are reproducible)
//       │  distinct endpoints, sorted → local ids 0..n
//       ▼
//   BatchGraph: local edges + inverse edges + 1/in-degree weights
//
// Reference: Schlichtkrull et al. (2018) R-GCN (inverse edges,
//            1/in-degree normalisation)

use std::{
    collections::{BTreeSet, HashMap},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::data::vocab::{VocabKind, Vocabulary};
use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::Persistable;
use crate::domain::triplet::Triplet;

/// Default per-relation triplet cap used by Stage A
pub const DEFAULT_RELATION_CAP: usize = 300;

const PROGRESS_EVERY: usize = 1000;

// ─── Stage A ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphFilterConfig {
    /// Maximum triplets kept per relation, first-seen order
    pub relation_cap: usize,
}

impl Default for GraphFilterConfig {
    fn default() -> Self {
        Self { relation_cap: DEFAULT_RELATION_CAP }
    }
}

fn split_triplet<'a>(source: &str, line_no: usize, line: &'a str) -> Result<(&'a str, &'a str, &'a str)> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(h), Some(r), Some(t), None) => Ok((h, r, t)),
        _ => Err(PipelineError::format(
            source,
            line_no,
            "expected 'head relation tail'",
        )),
    }
}

/// Run Stage A over a raw triplet file.
///
/// Consumes the vocabulary and returns it with `etoi` rebuilt from
/// the surviving triplets, together with the integer triplets.
pub fn filter_triplets(
    path:   &Path,
    mut vocab: Vocabulary,
    config: &GraphFilterConfig,
) -> Result<(Vocabulary, TripletStore)> {
    if config.relation_cap == 0 {
        return Err(PipelineError::InvalidConfig(
            "relation_cap must be positive".to_string(),
        ));
    }
    let source = path.display().to_string();

    // ── Pass 1: entity frequencies ────────────────────────────────────────────
    let mut entity_freq: HashMap<String, usize> = HashMap::new();
    let mut scanned = 0usize;
    for (i, line) in BufReader::new(File::open(path)?).lines().enumerate() {
        let line = line?;
        let (h, _, t) = split_triplet(&source, i + 1, &line)?;
        *entity_freq.entry(h.to_string()).or_insert(0) += 1;
        *entity_freq.entry(t.to_string()).or_insert(0) += 1;
        scanned += 1;
        if scanned % PROGRESS_EVERY == 0 {
            tracing::debug!("Counted {} triplets", scanned);
        }
    }
    entity_freq.retain(|_, freq| *freq > 0);

    tracing::info!("Total entities:  {}", entity_freq.len());
    tracing::info!("Total relations: {}", vocab.num_relations());

    // ── Pass 2: filter with the per-relation cap ──────────────────────────────
    let mut rcount: HashMap<u32, usize> = HashMap::new();
    let mut kept: Vec<(String, u32, String)> = Vec::new();
    let mut unknown_relations = 0usize;

    for (i, line) in BufReader::new(File::open(path)?).lines().enumerate() {
        let line = line?;
        let (h, r, t) = split_triplet(&source, i + 1, &line)?;

        if !entity_freq.contains_key(h) || !entity_freq.contains_key(t) {
            continue;
        }
        let Some(rel) = vocab.get(VocabKind::Relation, r) else {
            unknown_relations += 1;
            continue;
        };
        let count = rcount.entry(rel).or_insert(0);
        if *count >= config.relation_cap {
            continue;
        }
        *count += 1;
        kept.push((h.to_string(), rel, t.to_string()));

        if kept.len() % PROGRESS_EVERY == 0 {
            tracing::debug!("Kept {} triplets", kept.len());
        }
    }

    if unknown_relations > 0 {
        tracing::warn!(
            "Skipped {} triplets whose relation is not in the vocabulary",
            unknown_relations
        );
    }

    // ── Shrink etoi to the surviving endpoints ────────────────────────────────
    vocab.reset_entities();
    for (h, _, t) in &kept {
        vocab.renew(VocabKind::Entity, [h.as_str(), t.as_str()]);
    }

    let triplets: Vec<Triplet> = kept
        .iter()
        .filter_map(|(h, rel, t)| {
            let head = vocab.get(VocabKind::Entity, h)?;
            let tail = vocab.get(VocabKind::Entity, t)?;
            Some(Triplet::new(head, *rel, tail))
        })
        .collect();

    tracing::info!("Filtered entities: {}", vocab.num_entities());
    tracing::info!("Filtered triplets: {}", triplets.len());

    Ok((vocab, TripletStore::new(triplets)))
}

// ─── TripletStore ─────────────────────────────────────────────────────────────
/// Immutable integer triplets with a relation → positions index.
///
/// Shared read-only across DataLoader workers.
#[derive(Debug, Clone, Default)]
pub struct TripletStore {
    triplets:    Vec<Triplet>,
    by_relation: HashMap<u32, Vec<usize>>,
}

impl TripletStore {
    pub fn new(triplets: Vec<Triplet>) -> Self {
        let mut by_relation: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, t) in triplets.iter().enumerate() {
            by_relation.entry(t.relation).or_default().push(i);
        }
        Self { triplets, by_relation }
    }

    pub fn len(&self) -> usize {
        self.triplets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triplets.is_empty()
    }

    #[cfg(test)]
    pub fn triplets(&self) -> &[Triplet] {
        &self.triplets
    }

    /// Every stored triplet whose relation is `relation`
    pub fn with_relation(&self, relation: u32) -> impl Iterator<Item = &Triplet> {
        self.by_relation
            .get(&relation)
            .into_iter()
            .flatten()
            .map(move |&i| &self.triplets[i])
    }
}

impl Persistable for TripletStore {
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &self.triplets)?;
        tracing::debug!("Saved {} triplets to '{}'", self.triplets.len(), path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let triplets: Vec<Triplet> = bincode::deserialize_from(reader)?;
        tracing::info!("Loaded {} triplets from '{}'", triplets.len(), path.display());
        Ok(Self::new(triplets))
    }
}

// ─── Stage B ──────────────────────────────────────────────────────────────────
/// The relational graph of one mini-batch, in a local node space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGraph {
    /// Local id → global entity id (ascending)
    pub uniq_v:   Vec<u32>,
    /// Edge source, local ids
    pub src:      Vec<u32>,
    /// Edge destination, local ids
    pub dst:      Vec<u32>,
    /// Edge relation id; inverse edges use `r + total_relations`
    pub rel:      Vec<u32>,
    /// Per-edge weight, 1 / in-degree of the destination
    pub norm:     Vec<f32>,
    /// Per-node weight, 1 / in-degree, 1.0 when a node has no in-edges
    pub node_norm: Vec<f32>,
    /// Distinct forward relations present in the batch
    pub num_rels: usize,
}

impl BatchGraph {
    pub fn num_nodes(&self) -> usize {
        self.uniq_v.len()
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uniq_v.is_empty()
    }
}

/// Builds a BatchGraph from the batch's gold relations.
#[derive(Debug, Clone)]
pub struct BatchGraphBuilder {
    /// Size of rtoi; offset for inverse relation ids
    total_relations: usize,
    inverse_edges:   bool,
}

impl BatchGraphBuilder {
    pub fn new(total_relations: usize) -> Self {
        Self { total_relations, inverse_edges: true }
    }

    /// Disable the reversed (tail → head) copy of every edge
    pub fn without_inverse_edges(mut self) -> Self {
        self.inverse_edges = false;
        self
    }

    pub fn build(&self, store: &TripletStore, gold_relations: &[u32]) -> BatchGraph {
        // Union of matching triplets; BTreeSet both dedups and fixes order
        let selected: BTreeSet<Triplet> = gold_relations
            .iter()
            .flat_map(|&r| store.with_relation(r))
            .copied()
            .collect();

        if selected.is_empty() {
            return BatchGraph::default();
        }

        let uniq_v: Vec<u32> = selected
            .iter()
            .flat_map(|t| [t.head, t.tail])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let local = |entity: u32| -> u32 {
            // every endpoint is in uniq_v by construction
            uniq_v.binary_search(&entity).unwrap_or_default() as u32
        };

        let mut edges: Vec<(u32, u32, u32)> = Vec::with_capacity(selected.len() * 2);
        let mut relations = BTreeSet::new();
        for t in &selected {
            let (h, r, tl) = (local(t.head), t.relation, local(t.tail));
            relations.insert(r);
            // stored as (dst, src, rel) so sorting groups by destination
            edges.push((tl, h, r));
            if self.inverse_edges {
                edges.push((h, tl, r + self.total_relations as u32));
            }
        }
        edges.sort_unstable();

        let mut in_degree = vec![0usize; uniq_v.len()];
        for &(dst, _, _) in &edges {
            in_degree[dst as usize] += 1;
        }
        let node_norm: Vec<f32> = in_degree
            .iter()
            .map(|&d| if d == 0 { 1.0 } else { 1.0 / d as f32 })
            .collect();

        let mut graph = BatchGraph {
            uniq_v,
            node_norm,
            num_rels: relations.len(),
            ..BatchGraph::default()
        };
        for (dst, src, rel) in edges {
            graph.src.push(src);
            graph.dst.push(dst);
            graph.rel.push(rel);
            graph.norm.push(graph.node_norm[dst as usize]);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::vocab::RelationSet;
    use std::io::Write;

    fn kb_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        f
    }

    fn vocab_with(relations: &[&str]) -> Vocabulary {
        let mut v = Vocabulary::new();
        v.renew(VocabKind::Relation, RelationSet::from_labels(relations.iter().copied()).labels());
        v.rebuild_relation_words();
        v
    }

    #[test]
    fn test_stage_a_keeps_known_relations_and_dense_entities() {
        let f = kb_file(&[
            "paris capital_of france",
            "berlin capital_of germany",
            "x unknown_rel y",
        ]);
        let vocab = vocab_with(&["capital_of"]);
        let (vocab, store) = filter_triplets(f.path(), vocab, &GraphFilterConfig::default()).unwrap();

        assert_eq!(store.len(), 2);
        // <pad>, <unk>, paris, france, berlin, germany
        assert_eq!(vocab.num_entities(), 6);
        assert_eq!(vocab.get(VocabKind::Entity, "paris"), Some(2));
        assert_eq!(vocab.get(VocabKind::Entity, "x"), None);
        assert_eq!(store.triplets()[0], Triplet::new(2, 0, 3));
    }

    #[test]
    fn test_stage_a_relation_cap_is_first_seen() {
        let f = kb_file(&["a r b", "c r d", "e r f", "g s h"]);
        let vocab = vocab_with(&["r", "s"]);
        let cfg = GraphFilterConfig { relation_cap: 2 };
        let (vocab, store) = filter_triplets(f.path(), vocab, &cfg).unwrap();

        assert_eq!(store.with_relation(0).count(), 2);
        assert_eq!(store.with_relation(1).count(), 1);
        // "e" and "f" were only in the dropped triplet
        assert_eq!(vocab.get(VocabKind::Entity, "e"), None);
        assert!(vocab.get(VocabKind::Entity, "c").is_some());
    }

    #[test]
    fn test_stage_a_malformed_line() {
        let f = kb_file(&["a r b", "broken line"]);
        let err = filter_triplets(f.path(), vocab_with(&["r"]), &GraphFilterConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Format { line: 2, .. }));
    }

    #[test]
    fn test_store_persists() {
        let store = TripletStore::new(vec![Triplet::new(2, 0, 3), Triplet::new(4, 1, 2)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triplets.bin");
        store.save(&path).unwrap();
        let back = TripletStore::load(&path).unwrap();
        assert_eq!(back.triplets(), store.triplets());
        assert_eq!(back.with_relation(1).count(), 1);
    }

    #[test]
    fn test_stage_b_local_ids_and_inverse_edges() {
        let store = TripletStore::new(vec![
            Triplet::new(10, 0, 30),
            Triplet::new(20, 0, 30),
            Triplet::new(40, 1, 50),
        ]);
        let g = BatchGraphBuilder::new(5).build(&store, &[0]);

        assert_eq!(g.uniq_v, vec![10, 20, 30]);
        assert_eq!(g.num_rels, 1);
        assert_eq!(g.num_edges(), 4);

        // node 2 (entity 30) receives both forward edges
        let into_30: Vec<usize> = (0..g.num_edges()).filter(|&e| g.dst[e] == 2).collect();
        assert_eq!(into_30.len(), 2);
        for e in into_30 {
            assert_eq!(g.rel[e], 0);
            assert!((g.norm[e] - 0.5).abs() < 1e-6);
        }
        // inverse edges carry r + total_relations
        assert_eq!(g.rel.iter().filter(|&&r| r == 5).count(), 2);
    }

    #[test]
    fn test_stage_b_dedups_repeated_gold() {
        let store = TripletStore::new(vec![Triplet::new(1, 3, 2)]);
        let builder = BatchGraphBuilder::new(4);
        let once = builder.build(&store, &[3]);
        let twice = builder.build(&store, &[3, 3]);
        assert_eq!(once, twice);
        assert_eq!(once.num_edges(), 2);
    }

    #[test]
    fn test_stage_b_is_deterministic() {
        let store = TripletStore::new(vec![
            Triplet::new(9, 2, 1),
            Triplet::new(4, 0, 9),
            Triplet::new(7, 2, 4),
            Triplet::new(1, 0, 7),
        ]);
        let builder = BatchGraphBuilder::new(3);
        let a = builder.build(&store, &[2, 0]);
        let b = builder.build(&store, &[2, 0]);
        assert_eq!(a, b);
        assert_eq!(a.uniq_v, vec![1, 4, 7, 9]);
    }

    #[test]
    fn test_stage_b_no_matches_is_empty() {
        let store = TripletStore::new(vec![Triplet::new(1, 0, 2)]);
        let g = BatchGraphBuilder::new(2).build(&store, &[1]);
        assert!(g.is_empty());
        assert_eq!(g.num_edges(), 0);
        assert_eq!(g.num_rels, 0);
    }

    #[test]
    fn test_isolated_node_norm_falls_back_to_one() {
        let store = TripletStore::new(vec![Triplet::new(1, 0, 2)]);
        let g = BatchGraphBuilder::new(1).without_inverse_edges().build(&store, &[0]);
        // entity 1 only has an outgoing edge
        assert_eq!(g.node_norm, vec![1.0, 1.0]);
        assert_eq!(g.norm, vec![1.0]);
        assert_eq!((g.src[0], g.dst[0]), (0, 1));
    }
}
