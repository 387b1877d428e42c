//! In-memory reference engine.
//!
//! Interprets typed plans over a vector of JSON documents with the same
//! observable behavior as the managed store: prefix regex, fuzzy compound
//! text relevance, exact cosine k-NN, weighted reciprocal-rank fusion and a
//! fan-out whose branches cannot see metascores. Used by tests and by the
//! CLI's offline fixture mode.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Map, Value};
use tracing::debug;

use catalog_core::product::{fields, RawDocument};
use catalog_core::types::scope_key;
use catalog_plan::stage::{
    Filter, MetaScore, RankFusion, Stage, TextSearch, VectorSearch, COUNT_BRANCH, DOCS_BRANCH, PRODUCT_FIELDS,
    TOTAL_FIELD,
};
use catalog_plan::Plan;

use crate::DocumentStore;

/// Rank constant of reciprocal-rank fusion.
pub const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default)]
struct Meta {
    search: Option<f64>,
    vector: Option<f64>,
    fusion: Option<f64>,
}

#[derive(Debug, Clone)]
struct Row {
    doc: RawDocument,
    meta: Meta,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Vec<RawDocument>,
    ignore_store_filter: bool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(docs: Vec<RawDocument>) -> Self {
        Self { docs, ignore_store_filter: false, calls: AtomicUsize::new(0) }
    }

    /// Load a JSON array of product documents.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))?;
        let Value::Array(items) = value else {
            bail!("fixture {} must be a JSON array of documents", path.display());
        };
        let docs = items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                _ => bail!("fixture {} contains a non-document entry", path.display()),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(docs))
    }

    /// Skip store-scope predicates, so leakage can only be stopped by the shaper.
    pub fn ignoring_store_filter(mut self) -> Self {
        self.ignore_store_filter = true;
        self
    }

    /// Number of `aggregate` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn run(&self, plan: &Plan) -> anyhow::Result<Vec<Value>> {
        let input = self.docs.iter().map(|d| Row { doc: d.clone(), meta: Meta::default() }).collect();
        let rows = self.run_stages(&plan.stages, input)?;
        Ok(rows.into_iter().map(|r| Value::Object(r.doc)).collect())
    }

    fn run_stages(&self, stages: &[Stage], mut rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        for stage in stages {
            rows = self.run_stage(stage, rows)?;
        }
        Ok(rows)
    }

    fn run_stage(&self, stage: &Stage, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        Ok(match stage {
            Stage::Match(filter) => {
                let matcher = Matcher::new(filter, self.ignore_store_filter)?;
                rows.into_iter().filter(|r| matcher.matches(&r.doc)).collect()
            }
            Stage::TextSearch(t) => text_search(t, rows),
            Stage::VectorSearch(v) => self.vector_search(v, rows)?,
            Stage::RankFusion(f) => self.rank_fusion(f, rows)?,
            Stage::SetScore(kind) => rows.into_iter().map(|r| set_score(r, *kind)).collect(),
            Stage::Project(p) => rows
                .into_iter()
                .map(|mut r| {
                    r.doc.retain(|k, _| PRODUCT_FIELDS.contains(&k.as_str()) || (p.include_score && k == fields::SCORE));
                    r
                })
                .collect(),
            Stage::Skip(n) => rows.into_iter().skip(usize::try_from(*n).unwrap_or(usize::MAX)).collect(),
            Stage::Limit(n) => rows.into_iter().take(usize::try_from(*n).unwrap_or(usize::MAX)).collect(),
            Stage::FanOut { docs } => {
                let count = rows.len();
                let stripped = rows.into_iter().map(|r| Row { doc: r.doc, meta: Meta::default() }).collect();
                let page: Vec<Value> = self.run_stages(docs, stripped)?.into_iter().map(|r| Value::Object(r.doc)).collect();
                let counted = if count == 0 { json!([]) } else { json!([{ TOTAL_FIELD: count }]) };
                let mut doc = Map::new();
                doc.insert(DOCS_BRANCH.to_string(), Value::Array(page));
                doc.insert(COUNT_BRANCH.to_string(), counted);
                vec![Row { doc, meta: Meta::default() }]
            }
            Stage::Total => rows.into_iter().map(flatten_total).collect(),
        })
    }

    fn vector_search(&self, v: &VectorSearch, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        let matcher = v.filter.as_ref().map(|f| Matcher::new(f, self.ignore_store_filter)).transpose()?;
        let mut hits: Vec<(f64, Row)> = rows
            .into_iter()
            .filter(|r| matcher.as_ref().map_or(true, |m| m.matches(&r.doc)))
            .filter_map(|r| {
                let stored = embedding(r.doc.get(&v.path)?)?;
                let cos = cosine(&v.query_vector, &stored)?;
                Some(((1.0 + cos) / 2.0, r))
            })
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        hits.truncate(usize::try_from(v.limit).unwrap_or(usize::MAX));
        Ok(hits
            .into_iter()
            .map(|(score, mut r)| {
                r.meta.vector = Some(score);
                r
            })
            .collect())
    }

    /// Each input pipeline sees the full candidate set; documents are ranked
    /// by `sum(w / (RRF_K + rank))` over the pipelines that returned them.
    fn rank_fusion(&self, f: &RankFusion, rows: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        let vector_ranked = self.run_stages(&f.vector, rows.clone())?;
        let text_ranked = self.run_stages(&f.text, rows)?;

        let mut fused: Vec<(f64, Row)> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for (weight, ranked) in [(f.weights.vector, vector_ranked), (f.weights.text, text_ranked)] {
            for (i, row) in ranked.into_iter().enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let contribution = weight / (RRF_K + (i + 1) as f64);
                let key = row.doc.get(fields::ID).and_then(scope_key).unwrap_or_else(|| format!("#{}", fused.len()));
                match by_id.get(&key) {
                    Some(&slot) => fused[slot].0 += contribution,
                    None => {
                        by_id.insert(key, fused.len());
                        fused.push((contribution, row));
                    }
                }
            }
        }
        fused.sort_by(|a, b| b.0.total_cmp(&a.0));
        debug!(candidates = fused.len(), "fused rankings");
        Ok(fused
            .into_iter()
            .map(|(score, mut r)| {
                r.meta = Meta { fusion: Some(score), ..Meta::default() };
                r
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn aggregate(&self, plan: &Plan, _max_time: Duration) -> anyhow::Result<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.run(plan)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

enum Matcher {
    Always,
    Store(String),
    Prefix(regex::Regex),
    InStock(bool),
    All(Vec<Matcher>),
}

impl Matcher {
    fn new(filter: &Filter, ignore_store: bool) -> anyhow::Result<Self> {
        Ok(match filter {
            Filter::Store(_) if ignore_store => Self::Always,
            Filter::Store(scope) => Self::Store(scope.as_str().to_string()),
            Filter::NamePrefix(prefix) => Self::Prefix(
                RegexBuilder::new(&Filter::prefix_pattern(prefix))
                    .case_insensitive(true)
                    .build()
                    .context("invalid prefix pattern")?,
            ),
            Filter::InStock(flag) => Self::InStock(*flag),
            Filter::All(parts) => {
                Self::All(parts.iter().map(|p| Self::new(p, ignore_store)).collect::<anyhow::Result<_>>()?)
            }
        })
    }

    fn matches(&self, doc: &RawDocument) -> bool {
        match self {
            Self::Always => true,
            Self::Store(id) => inventory(doc).any(|e| e.get(fields::STORE_ID).and_then(scope_key).as_deref() == Some(id)),
            Self::Prefix(re) => doc.get(fields::NAME).and_then(Value::as_str).is_some_and(|n| re.is_match(n)),
            Self::InStock(flag) => inventory(doc).any(|e| e.get(fields::IN_STOCK).and_then(Value::as_bool) == Some(*flag)),
            Self::All(parts) => parts.iter().all(|m| m.matches(doc)),
        }
    }
}

fn inventory(doc: &RawDocument) -> impl Iterator<Item = &Map<String, Value>> {
    doc.get(fields::INVENTORY)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Compound `should` relevance: for every clause, boost times the share of
/// query terms found in the field within the clause's edit distance.
fn text_search(t: &TextSearch, rows: Vec<Row>) -> Vec<Row> {
    let terms = tokens(&t.query);
    if terms.is_empty() {
        return Vec::new();
    }
    let mut hits: Vec<(f64, Row)> = rows
        .into_iter()
        .filter_map(|r| {
            let score: f64 = t
                .clauses
                .iter()
                .map(|c| {
                    let field = r.doc.get(c.path).and_then(Value::as_str).map(tokens).unwrap_or_default();
                    let matched = terms.iter().filter(|q| field.iter().any(|w| fuzzy_eq(q, w, c.max_edits))).count();
                    #[allow(clippy::cast_precision_loss)]
                    let share = matched as f64 / terms.len() as f64;
                    c.boost * share
                })
                .sum();
            (score > 0.0).then_some((score, r))
        })
        .collect();
    hits.sort_by(|a, b| b.0.total_cmp(&a.0));
    hits.into_iter()
        .map(|(score, mut r)| {
            r.meta.search = Some(score);
            r
        })
        .collect()
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fuzzy_eq(query: &str, word: &str, max_edits: u8) -> bool {
    query == word || strsim::levenshtein(query, word) <= usize::from(max_edits)
}

fn embedding(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn cosine(a: &[f32], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().map(|x| f64::from(*x)).zip(b.iter().copied()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

fn set_score(mut row: Row, kind: MetaScore) -> Row {
    let value = match kind {
        MetaScore::Search => row.meta.search,
        MetaScore::VectorSearch => row.meta.vector,
        MetaScore::Fusion => row.meta.fusion,
    };
    match value {
        Some(score) => {
            row.doc.insert(fields::SCORE.to_string(), json!(score));
        }
        None => {
            row.doc.remove(fields::SCORE);
        }
    }
    row
}

fn flatten_total(mut row: Row) -> Row {
    let total = row
        .doc
        .remove(COUNT_BRANCH)
        .and_then(|c| c.as_array().and_then(|a| a.first()).and_then(|e| e.get(TOTAL_FIELD)).cloned())
        .unwrap_or(json!(0));
    row.doc.insert(TOTAL_FIELD.to_string(), total);
    row
}
