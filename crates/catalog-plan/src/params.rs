use catalog_core::config::{MongoSettings, SearchSettings, Settings, TextBoosts};

/// Upper bound the managed store accepts for a nearest-neighbor candidate pool.
pub const MAX_NUM_CANDIDATES: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct TextParams {
    pub index: String,
    pub boosts: TextBoosts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorParams {
    pub index: String,
    /// Field holding the stored product embedding.
    pub path: String,
    pub num_candidates: u32,
    /// Minimum number of neighbors returned by the k-NN stage.
    pub candidate_limit: u32,
    /// Optional stock predicate pushed into the k-NN filter.
    pub in_stock: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HybridParams {
    pub text: TextParams,
    pub vector: VectorParams,
    /// Per-pipeline cap on candidates handed to rank fusion.
    pub candidate_limit: u32,
}

/// Tuning for every builder, resolved once from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanParams {
    pub text: TextParams,
    pub vector: VectorParams,
    pub hybrid: HybridParams,
}

impl PlanParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.mongodb, &settings.search)
    }

    pub fn new(mongo: &MongoSettings, search: &SearchSettings) -> Self {
        let text = TextParams { index: mongo.text_index.clone(), boosts: search.text_boosts };
        let vector = VectorParams {
            index: mongo.vector_index.clone(),
            path: mongo.embedding_field.clone(),
            num_candidates: search.num_candidates,
            candidate_limit: search.candidate_limit,
            in_stock: None,
        };
        let hybrid = HybridParams { text: text.clone(), vector: vector.clone(), candidate_limit: search.candidate_limit };
        Self { text, vector, hybrid }
    }
}

impl Default for PlanParams {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
