pub mod config;
pub mod error;
pub mod product;
pub mod retry;
pub mod shape;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use product::{InventoryEntry, Price, Product, RawDocument};
pub use types::{SearchRequest, SearchResponse, SearchResult, StoreScope, Strategy, StrategyKind, Window};
