//! Query plans for the four retrieval strategies.
//!
//! Builders are pure: they take the query (or its embedding), the store
//! scope, a pagination window and tuning parameters, and return a [`Plan`].

pub mod builders;
pub mod native;
pub mod params;
pub mod stage;

pub use builders::{hybrid_plan, keyword_plan, text_plan, vector_plan};
pub use params::{HybridParams, PlanParams, TextParams, VectorParams};
pub use stage::{Filter, MetaScore, Plan, Projection, Stage};
