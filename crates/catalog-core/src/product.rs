//! Catalog entities and the strict raw-document → `Product` mapping.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::scope_key;

/// Field names of the stored product document.
pub mod fields {
    pub const ID: &str = "_id";
    pub const NAME: &str = "productName";
    pub const BRAND: &str = "brand";
    pub const PRICE: &str = "price";
    pub const QUANTITY: &str = "quantity";
    pub const CATEGORY: &str = "category";
    pub const SUB_CATEGORY: &str = "subCategory";
    pub const URL: &str = "absoluteUrl";
    pub const DESCRIPTION: &str = "aboutTheProduct";
    pub const IMAGE: &str = "imageUrlS3";
    pub const INVENTORY: &str = "inventorySummary";
    pub const STORE_ID: &str = "storeObjectId";
    pub const IN_STOCK: &str = "inStock";
    pub const SCORE: &str = "score";
}

pub type RawDocument = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// Stock status of a product in one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    #[serde(rename = "storeObjectId", deserialize_with = "id_string")]
    pub store: String,
    #[serde(rename = "storeId", default, deserialize_with = "opt_id_string")]
    pub store_code: Option<String>,
    #[serde(rename = "sectionId", default, deserialize_with = "opt_id_string")]
    pub section: Option<String>,
    #[serde(rename = "aisleId", default, deserialize_with = "opt_id_string")]
    pub aisle: Option<String>,
    #[serde(rename = "shelfId", default, deserialize_with = "opt_id_string")]
    pub shelf: Option<String>,
    #[serde(rename = "inStock", default)]
    pub in_stock: bool,
    #[serde(rename = "nearToReplenishmentInShelf", default)]
    pub near_replenishment: Option<bool>,
}

/// Read-only projection of a catalog document for one request.
///
/// `score` is only set by strategies that rank; keyword search leaves it `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: Option<String>,
    #[serde(rename = "productName")]
    pub name: Option<String>,
    pub brand: Option<String>,
    pub price: Option<Price>,
    pub quantity: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "subCategory")]
    pub sub_category: Option<String>,
    #[serde(rename = "absoluteUrl")]
    pub url: Option<String>,
    #[serde(rename = "aboutTheProduct")]
    pub description: Option<String>,
    #[serde(rename = "imageUrlS3")]
    pub image_url: String,
    #[serde(rename = "inventorySummary")]
    pub inventory: Vec<InventoryEntry>,
    pub score: Option<f64>,
}

#[derive(Deserialize)]
struct RawProduct {
    #[serde(rename = "_id", default, deserialize_with = "opt_id_string")]
    id: Option<String>,
    #[serde(rename = "productName", default)]
    name: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    price: Option<Price>,
    #[serde(default, deserialize_with = "opt_id_string")]
    quantity: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "subCategory", default)]
    sub_category: Option<String>,
    #[serde(rename = "absoluteUrl", default)]
    url: Option<String>,
    #[serde(rename = "aboutTheProduct", default)]
    description: Option<String>,
    #[serde(rename = "imageUrlS3", default)]
    image_url: Option<String>,
    #[serde(rename = "inventorySummary", default)]
    inventory: Option<Vec<InventoryEntry>>,
    #[serde(default)]
    score: Option<f64>,
}

impl Product {
    /// Map a shaped store document. Fails closed when the image reference is
    /// missing or when a present field has the wrong shape.
    pub fn from_document(doc: &RawDocument) -> Result<Self> {
        let raw: RawProduct = serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| Error::validation(format!("document {} is malformed: {e}", describe(doc))))?;
        let image_url = raw
            .image_url
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::validation(format!("document {} has no {}", describe(doc), fields::IMAGE)))?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            brand: raw.brand,
            price: raw.price,
            quantity: raw.quantity,
            category: raw.category,
            sub_category: raw.sub_category,
            url: raw.url,
            description: raw.description,
            image_url,
            inventory: raw.inventory.unwrap_or_default(),
            score: raw.score,
        })
    }

    /// Plain text used when asking a reranker about this product.
    pub fn rerank_text(&self) -> String {
        [self.name.as_deref(), self.category.as_deref(), self.sub_category.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn describe(doc: &RawDocument) -> String {
    doc.get(fields::ID).and_then(scope_key).unwrap_or_else(|| "<no id>".to_string())
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    scope_key(&v).ok_or_else(|| serde::de::Error::custom(format!("expected an identifier, got {v}")))
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scope_key(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected an identifier, got {v}"))),
    }
}
