//! Request-side domain types: store scope, pagination window, strategy
//! selection, and the result envelope handed back to the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::product::Product;

/// Identifier of the physical store a search is restricted to.
///
/// 24-hex-digit identifiers are normalized to lowercase so that they compare
/// equal to the hex form of a stored ObjectId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreScope(String);

impl StoreScope {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::contract("store scope must not be empty"));
        }
        if is_object_id_hex(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_object_id(&self) -> bool {
        is_object_id_hex(&self.0)
    }

    /// True when a raw store identifier (string, ObjectId, number) names this store.
    pub fn matches(&self, value: &Value) -> bool {
        scope_key(value).as_deref() == Some(self.0.as_str())
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_object_id_hex(s: &str) -> bool {
    s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Canonical string form of a raw store identifier as found in documents.
///
/// Handles plain strings, extended-JSON ObjectIds (`{"$oid": ".."}`) and numbers.
pub fn scope_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_object_id_hex(s) => Some(s.to_ascii_lowercase()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => match map.get("$oid") {
            Some(Value::String(oid)) => Some(oid.to_ascii_lowercase()),
            _ => None,
        },
        _ => None,
    }
}

/// Skip/limit pagination window handed to the plan builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: i64,
    pub limit: i64,
}

impl Window {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }

    /// 1-based page to window. `page = 0` yields a negative skip, which
    /// [`Window::validate`] rejects.
    pub fn from_page(page: u32, page_size: u32) -> Self {
        let size = i64::from(page_size);
        Self { skip: (i64::from(page) - 1) * size, limit: size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.skip < 0 || self.limit <= 0 {
            return Err(Error::contract(format!(
                "'skip' must be >= 0 and 'limit' must be > 0 (skip={}, limit={})",
                self.skip, self.limit
            )));
        }
        Ok(())
    }

    /// Number of ranked candidates needed to serve this window.
    pub fn end(&self) -> i64 {
        self.skip.saturating_add(self.limit)
    }
}

/// Per-pipeline weights for reciprocal rank fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f64,
    pub text: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { vector: 0.5, text: 0.5 }
    }
}

impl FusionWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("vector", self.vector), ("text", self.text)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::contract(format!("{name} weight must be a non-negative number, got {w}")));
            }
        }
        if self.vector == 0.0 && self.text == 0.0 {
            return Err(Error::contract("at least one fusion weight must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Keyword,
    FullText,
    Vector,
    Hybrid,
}

impl StrategyKind {
    pub fn from_selector(selector: u8) -> Result<Self> {
        match selector {
            1 => Ok(Self::Keyword),
            2 => Ok(Self::FullText),
            3 => Ok(Self::Vector),
            4 => Ok(Self::Hybrid),
            other => Err(Error::contract(format!("unknown strategy selector {other}, expected 1-4"))),
        }
    }

    pub fn selector(self) -> u8 {
        match self {
            Self::Keyword => 1,
            Self::FullText => 2,
            Self::Vector => 3,
            Self::Hybrid => 4,
        }
    }

    pub fn needs_embedding(self) -> bool {
        matches!(self, Self::Vector | Self::Hybrid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::FullText => "full_text",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval strategy with exactly the parameters it needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Keyword,
    FullText,
    Vector,
    /// Caller-supplied weights; missing ones resolve to the configured default.
    Hybrid { vector_weight: Option<f64>, text_weight: Option<f64> },
}

impl Strategy {
    /// Map the wire selector (1-4). Weights are only honored for hybrid.
    pub fn from_selector(selector: u8, vector_weight: Option<f64>, text_weight: Option<f64>) -> Result<Self> {
        Ok(match StrategyKind::from_selector(selector)? {
            StrategyKind::Keyword => Self::Keyword,
            StrategyKind::FullText => Self::FullText,
            StrategyKind::Vector => Self::Vector,
            StrategyKind::Hybrid => Self::Hybrid { vector_weight, text_weight },
        })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Keyword => StrategyKind::Keyword,
            Self::FullText => StrategyKind::FullText,
            Self::Vector => StrategyKind::Vector,
            Self::Hybrid { .. } => StrategyKind::Hybrid,
        }
    }
}

/// One inbound search, immutable for the duration of the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub store: String,
    pub strategy: Strategy,
    pub page: u32,
    pub page_size: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, store: impl Into<String>, strategy: Strategy, page: u32, page_size: u32) -> Self {
        Self { query: query.into(), store: store.into(), strategy, page, page_size }
    }

    /// Check the caller contract and derive the store scope and window.
    pub fn validate(&self, max_page_size: u32) -> Result<(StoreScope, Window)> {
        if self.query.trim().is_empty() {
            return Err(Error::contract("query must not be empty"));
        }
        if self.page == 0 {
            return Err(Error::contract("page must be >= 1"));
        }
        if self.page_size == 0 || self.page_size > max_page_size {
            return Err(Error::contract(format!(
                "page_size must be between 1 and {max_page_size}, got {}",
                self.page_size
            )));
        }
        let scope = StoreScope::parse(&self.store)?;
        let window = Window::from_page(self.page, self.page_size);
        window.validate()?;
        Ok((scope, window))
    }
}

/// Page of products plus the size of the full match set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub products: Vec<Product>,
    pub total: u64,
}

impl SearchResult {
    pub fn total_pages(&self, page_size: u32) -> u64 {
        total_pages(self.total, page_size)
    }
}

/// `ceil(total / page_size)`, 0 when there are no results.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if total == 0 || page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size))
}

/// Shape returned to the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub page: u32,
    pub page_size: u32,
    pub total_results: u64,
    pub total_pages: u64,
    pub products: Vec<Product>,
}

impl SearchResponse {
    pub fn from_result(result: SearchResult, page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            total_results: result.total,
            total_pages: result.total_pages(page_size),
            products: result.products,
        }
    }
}
