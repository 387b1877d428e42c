use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::info;

use catalog_core::config::MongoSettings;
use catalog_core::{Error, Result};
use catalog_plan::Plan;

use crate::DocumentStore;

/// MongoDB Atlas adapter. The client is pooled and shared read-only.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect and ping once so a bad deployment fails at startup.
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .map_err(|e| Error::infrastructure("could not resolve MongoDB connection string", e))?;
        options.max_pool_size = Some(settings.max_pool_size);
        options.min_pool_size = Some(settings.min_pool_size);
        options.server_selection_timeout = Some(Duration::from_millis(settings.server_selection_timeout_ms));
        options.app_name = Some(settings.app_name.clone());

        let client = Client::with_options(options).map_err(|e| Error::infrastructure("invalid MongoDB client options", e))?;
        let database = client.database(&settings.database);
        let store = Self { collection: database.collection(&settings.collection), database };
        store
            .ping()
            .await
            .map_err(|e| Error::infrastructure("MongoDB did not answer the startup ping", e))?;
        info!(database = %settings.database, collection = %settings.collection, "connected to MongoDB");
        Ok(store)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn aggregate(&self, plan: &Plan, max_time: Duration) -> anyhow::Result<Vec<Value>> {
        let pipeline = plan
            .to_pipeline()
            .into_iter()
            .map(to_document)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut cursor = self.collection.aggregate(pipeline).max_time(max_time).await?;
        let mut rows = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            rows.push(Bson::Document(doc).into_relaxed_extjson());
        }
        Ok(rows)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

fn to_document(stage: Value) -> anyhow::Result<Document> {
    match Bson::try_from(stage).context("stage is not valid extended JSON")? {
        Bson::Document(doc) => Ok(doc),
        other => bail!("stage must be a document, got {other}"),
    }
}
