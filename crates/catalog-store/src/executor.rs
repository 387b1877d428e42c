use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::Value;
use tracing::debug;

use catalog_core::config::StrategyTimeouts;
use catalog_core::product::RawDocument;
use catalog_core::retry::{with_retry, RetryPolicy};
use catalog_core::types::StrategyKind;
use catalog_core::{Error, Result};
use catalog_plan::stage::{DOCS_BRANCH, TOTAL_FIELD};
use catalog_plan::Plan;

use crate::DocumentStore;

/// Extra time given to the server-side limit before the client gives up.
const CLIENT_GRACE: Duration = Duration::from_millis(250);

/// Page of raw documents plus the full match count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub docs: Vec<RawDocument>,
    pub total: u64,
}

/// Runs plans against a [`DocumentStore`] with per-strategy time bounds and
/// bounded retry. Store errors never escape as anything but
/// [`Error::Infrastructure`].
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    timeouts: StrategyTimeouts,
}

impl Executor {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy, timeouts: StrategyTimeouts) -> Self {
        Self { store, retry, timeouts }
    }

    pub fn timeout_for(&self, strategy: StrategyKind) -> Duration {
        let ms = match strategy {
            StrategyKind::Keyword => self.timeouts.keyword_ms,
            StrategyKind::FullText => self.timeouts.text_ms,
            StrategyKind::Vector => self.timeouts.vector_ms,
            StrategyKind::Hybrid => self.timeouts.hybrid_ms,
        };
        Duration::from_millis(ms)
    }

    pub async fn execute(&self, plan: &Plan) -> Result<Envelope> {
        let max_time = self.timeout_for(plan.strategy);
        let label = format!("aggregate:{}", plan.strategy);
        let started = Instant::now();

        let rows = with_retry(&self.retry, &label, || async move {
            match tokio::time::timeout(max_time + CLIENT_GRACE, self.store.aggregate(plan, max_time)).await {
                Ok(Ok(rows)) => Ok(rows),
                Ok(Err(e)) => Err(Error::infrastructure(format!("{} query failed", plan.strategy), e)),
                Err(elapsed) => Err(Error::infrastructure(
                    format!("{} query timed out after {} ms", plan.strategy, max_time.as_millis()),
                    elapsed,
                )),
            }
        })
        .await?;

        let envelope = parse_envelope(rows)?;
        debug!(
            strategy = %plan.strategy,
            docs = envelope.docs.len(),
            total = envelope.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "plan executed"
        );
        Ok(envelope)
    }

    pub async fn ping(&self) -> Result<()> {
        with_retry(&self.retry, "ping", || async move {
            self.store.ping().await.map_err(|e| Error::infrastructure("store ping failed", e))
        })
        .await
    }
}

/// Normalize the plan output into an [`Envelope`].
///
/// No row at all means no match. More than one row, or a row of the wrong
/// shape, means the plan and the store disagree.
pub fn parse_envelope(rows: Vec<Value>) -> Result<Envelope> {
    let mut rows = rows.into_iter();
    let Some(row) = rows.next() else {
        return Ok(Envelope::default());
    };
    if rows.next().is_some() {
        return Err(malformed("expected a single envelope row"));
    }
    let Value::Object(mut row) = row else {
        return Err(malformed("envelope row is not a document"));
    };

    let docs = match row.remove(DOCS_BRANCH) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(doc) => Ok(doc),
                _ => Err(malformed("page entry is not a document")),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(malformed("page branch is not an array")),
    };
    let total = match row.remove(TOTAL_FIELD) {
        None | Some(Value::Null) => 0,
        Some(v) => count_value(&v).ok_or_else(|| malformed("total is not a non-negative integer"))?,
    };
    Ok(Envelope { docs, total })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_value(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::Object(m) => ["$numberInt", "$numberLong"]
            .iter()
            .find_map(|k| m.get(*k).and_then(Value::as_str))
            .and_then(|s| s.parse().ok()),
        _ => None,
    }
}

fn malformed(msg: &str) -> Error {
    Error::infrastructure("malformed result envelope", anyhow!(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_cursor_means_zero() {
        assert_eq!(parse_envelope(vec![]).expect("ok"), Envelope::default());
    }

    #[test]
    fn missing_total_defaults_to_zero() {
        let env = parse_envelope(vec![json!({"docs": []})]).expect("ok");
        assert_eq!(env.total, 0);
    }

    #[test]
    fn reads_docs_and_total() {
        let env = parse_envelope(vec![json!({"docs": [{"_id": "a"}, {"_id": "b"}], "total": 7})]).expect("ok");
        assert_eq!(env.docs.len(), 2);
        assert_eq!(env.total, 7);

        let ext = parse_envelope(vec![json!({"docs": [], "total": {"$numberLong": "12"}})]).expect("ok");
        assert_eq!(ext.total, 12);
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(matches!(parse_envelope(vec![json!([1])]), Err(Error::Infrastructure { .. })));
        assert!(matches!(parse_envelope(vec![json!({"docs": 3})]), Err(Error::Infrastructure { .. })));
        assert!(matches!(parse_envelope(vec![json!({"docs": [1]})]), Err(Error::Infrastructure { .. })));
        assert!(matches!(parse_envelope(vec![json!({"total": -1})]), Err(Error::Infrastructure { .. })));
        assert!(matches!(parse_envelope(vec![json!({}), json!({})]), Err(Error::Infrastructure { .. })));
    }
}
