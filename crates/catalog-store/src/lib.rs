//! Document-store access: the capability trait, the retrieval executor and
//! two adapters (MongoDB and an in-memory plan interpreter).

use std::time::Duration;

use async_trait::async_trait;
use catalog_plan::Plan;
use serde_json::Value;

pub mod executor;
pub mod memory;
pub mod mongo;

pub use executor::{Envelope, Executor};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// A store able to run typed plans natively.
///
/// `aggregate` returns the raw output rows of the plan in extended JSON.
/// Errors stay opaque here; the [`Executor`] classifies them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn aggregate(&self, plan: &Plan, max_time: Duration) -> anyhow::Result<Vec<Value>>;
    async fn ping(&self) -> anyhow::Result<()>;
}
