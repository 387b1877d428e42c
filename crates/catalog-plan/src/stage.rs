//! Typed query-plan model.
//!
//! A [`Plan`] is an ordered list of [`Stage`]s. It carries no store handle;
//! adapters either serialize it (see [`Plan::to_pipeline`]) or interpret it.

use catalog_core::config::TextBoosts;
use catalog_core::product::fields;
use catalog_core::types::{FusionWeights, StoreScope, StrategyKind};

/// Allow-list projected by every strategy. The embedding field is never on it.
pub const PRODUCT_FIELDS: &[&str] = &[
    fields::ID,
    fields::NAME,
    fields::BRAND,
    fields::PRICE,
    fields::QUANTITY,
    fields::CATEGORY,
    fields::SUB_CATEGORY,
    fields::URL,
    fields::DESCRIPTION,
    fields::IMAGE,
    fields::INVENTORY,
];

/// Name of the page branch of the fan-out stage.
pub const DOCS_BRANCH: &str = "docs";
/// Name of the count branch of the fan-out stage.
pub const COUNT_BRANCH: &str = "count";
/// Field holding the full match count in the envelope.
pub const TOTAL_FIELD: &str = "total";

pub const VECTOR_PIPELINE: &str = "vectorPipeline";
pub const TEXT_PIPELINE: &str = "textPipeline";

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Inventory holds an entry for this store.
    Store(StoreScope),
    /// Case-insensitive prefix on the product name, taken literally.
    NamePrefix(String),
    /// Some inventory entry has this stock flag.
    InStock(bool),
    All(Vec<Filter>),
}

impl Filter {
    /// Anchored pattern for a literal prefix; regex metacharacters are escaped.
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("^{}", regex::escape(prefix))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextClause {
    pub path: &'static str,
    pub boost: f64,
    pub max_edits: u8,
}

impl TextClause {
    /// Name first, then brand, category and sub-category with lighter boosts.
    pub fn compound(boosts: &TextBoosts) -> Vec<TextClause> {
        vec![
            TextClause { path: fields::NAME, boost: boosts.name, max_edits: boosts.name_max_edits },
            TextClause { path: fields::BRAND, boost: boosts.brand, max_edits: boosts.other_max_edits },
            TextClause { path: fields::CATEGORY, boost: boosts.category, max_edits: boosts.other_max_edits },
            TextClause { path: fields::SUB_CATEGORY, boost: boosts.sub_category, max_edits: boosts.other_max_edits },
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub index: String,
    pub query: String,
    pub clauses: Vec<TextClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearch {
    pub index: String,
    pub path: String,
    pub query_vector: Vec<f32>,
    pub num_candidates: u32,
    pub limit: u32,
    /// Predicate pushed into the nearest-neighbor stage.
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankFusion {
    pub vector: Vec<Stage>,
    pub text: Vec<Stage>,
    pub weights: FusionWeights,
    pub score_details: bool,
}

/// Engine metascore that can be copied into the plain `score` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaScore {
    Search,
    VectorSearch,
    /// Fused score, read from the rank-fusion score details.
    Fusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub include_score: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    TextSearch(TextSearch),
    VectorSearch(VectorSearch),
    RankFusion(RankFusion),
    SetScore(MetaScore),
    Project(Projection),
    Skip(u64),
    Limit(u64),
    /// Run `docs` and a count over the same input in one pass. Metascores do
    /// not cross into the branches.
    FanOut { docs: Vec<Stage> },
    /// Flatten the fan-out into `{docs, total}` with `total` defaulting to 0.
    Total,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub strategy: StrategyKind,
    pub stages: Vec<Stage>,
}

impl Plan {
    pub fn new(strategy: StrategyKind, stages: Vec<Stage>) -> Self {
        Self { strategy, stages }
    }

    /// Index of the first stage matching `pred`.
    pub fn position(&self, pred: impl Fn(&Stage) -> bool) -> Option<usize> {
        self.stages.iter().position(pred)
    }
}
