use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use catalog_core::config::{MappingPolicy, Settings};
use catalog_core::traits::{Embedder, RankedIndex, Reranker};
use catalog_core::{Error, RawDocument, Result, SearchRequest, SearchResult, Strategy};
use catalog_search::{build_service, SearchService};
use catalog_store::MemoryStore;

const STORE: &str = "65a1b2c3d4e5f6a7b8c9d0e1";
const OTHER: &str = "ffffffffffffffffffffffff";

struct StubEmbedder(Vec<f32>);

#[async_trait]
impl Embedder for StubEmbedder {
    fn dim(&self) -> usize {
        self.0.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn dim(&self) -> usize {
        2
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::infrastructure("embedding API unreachable", std::io::Error::other("connection refused")))
    }
}

/// Scores documents by their position, last one first.
struct ReverseReranker;

#[async_trait]
impl Reranker for ReverseReranker {
    async fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<RankedIndex>> {
        let n = documents.len();
        #[allow(clippy::cast_precision_loss)]
        let mut out: Vec<RankedIndex> = (0..n).map(|i| RankedIndex { index: i, score: (i + 1) as f64 / n as f64 }).collect();
        out.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(out)
    }
}

fn doc(id: &str, name: &str, stores: &[&str], embedding: Option<[f64; 2]>) -> RawDocument {
    let inventory: Vec<Value> = stores
        .iter()
        .enumerate()
        .map(|(i, s)| json!({"storeObjectId": {"$oid": s}, "storeId": i, "aisleId": "7", "inStock": true}))
        .collect();
    let mut v = json!({
        "_id": id,
        "productName": name,
        "brand": "House",
        "price": {"amount": 2.5, "currency": "EUR"},
        "imageUrlS3": format!("s3://images/{id}.png"),
        "inventorySummary": inventory,
    });
    if let (Some(e), Some(map)) = (embedding, v.as_object_mut()) {
        map.insert("textEmbeddingVector".into(), json!(e));
    }
    v.as_object().cloned().expect("object")
}

fn catalog() -> Vec<RawDocument> {
    vec![
        doc("1", "Apple Juice", &[STORE, OTHER], Some([1.0, 0.0])),
        doc("2", "Red Apple", &[STORE], Some([0.8, 0.2])),
        doc("3", "Apple Pie", &[OTHER], Some([0.9, 0.1])),
        doc("4", "Applesauce", &[STORE, OTHER], Some([0.7, 0.3])),
        doc("5", "Apple Cider", &[STORE], Some([0.6, 0.4])),
        doc("6", "Apple Crumble", &[STORE], Some([0.5, 0.5])),
        doc("7", "Apple Tart", &[STORE], Some([0.4, 0.6])),
        doc("8", "Banana", &[STORE], Some([0.0, 1.0])),
        doc("9", "Zebra Cake", &[STORE], None),
    ]
}

fn settings() -> Settings {
    let mut s = Settings::default();
    s.retry.max_attempts = 1;
    s
}

fn service_over(store: Arc<MemoryStore>, embedder: Option<Arc<dyn Embedder>>) -> SearchService {
    build_service(&settings(), store).with_embedder(embedder)
}

fn embedder() -> Option<Arc<dyn Embedder>> {
    Some(Arc::new(StubEmbedder(vec![1.0, 0.0])))
}

fn ids(result: &SearchResult) -> Vec<String> {
    result.products.iter().filter_map(|p| p.id.clone()).collect()
}

fn request(query: &str, strategy: Strategy, page: u32, page_size: u32) -> SearchRequest {
    SearchRequest::new(query, STORE, strategy, page, page_size)
}

fn all_strategies() -> [Strategy; 4] {
    [
        Strategy::Keyword,
        Strategy::FullText,
        Strategy::Vector,
        Strategy::Hybrid { vector_weight: None, text_weight: None },
    ]
}

#[tokio::test]
async fn no_cross_store_leakage_even_without_store_filter() {
    let store = Arc::new(MemoryStore::new(catalog()).ignoring_store_filter());
    let service = service_over(store, embedder());
    for strategy in all_strategies() {
        let result = service.search(&request("apple", strategy, 1, 50)).await.expect("search");
        assert!(!result.products.is_empty(), "{strategy:?} returned nothing");
        for product in &result.products {
            assert!(
                product.inventory.iter().all(|e| e.store == STORE),
                "{strategy:?} leaked inventory of another store for {:?}",
                product.id
            );
        }
    }
}

#[tokio::test]
async fn total_pages_is_ceiling_of_total() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), None);
    let response = service.respond(&request("app", Strategy::Keyword, 1, 2)).await.expect("search");
    assert_eq!(response.total_results, 5);
    assert_eq!(response.total_pages, 3);
    assert_eq!(response.products.len(), 2);

    let empty = service.respond(&request("kiwi", Strategy::Keyword, 1, 2)).await.expect("search");
    assert_eq!(empty.total_results, 0);
    assert_eq!(empty.total_pages, 0);
    assert!(empty.products.is_empty());
}

#[tokio::test]
async fn consecutive_pages_are_disjoint_and_ordered() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), embedder());
    for strategy in all_strategies() {
        let p1 = service.search(&request("apple", strategy, 1, 2)).await.expect("page 1");
        let p2 = service.search(&request("apple", strategy, 2, 2)).await.expect("page 2");
        let double = service.search(&request("apple", strategy, 1, 4)).await.expect("double page");

        let (a, b) = (ids(&p1), ids(&p2));
        assert!(a.iter().all(|id| !b.contains(id)), "{strategy:?}: pages overlap");
        let joined: Vec<String> = a.into_iter().chain(b).collect();
        assert_eq!(joined, ids(&double), "{strategy:?}");
        assert_eq!(p1.total, double.total);
    }
}

#[tokio::test]
async fn keyword_is_case_insensitive_prefix_only() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), None);
    let result = service.search(&request("app", Strategy::Keyword, 1, 50)).await.expect("search");
    let names: Vec<&str> = result.products.iter().filter_map(|p| p.name.as_deref()).collect();
    assert!(names.contains(&"Apple Juice"));
    assert!(!names.contains(&"Red Apple"));
    assert!(result.products.iter().all(|p| p.score.is_none()), "keyword search is unranked");
}

#[tokio::test]
async fn keyword_treats_regex_metacharacters_literally() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), None);
    let result = service.search(&request("app.*", Strategy::Keyword, 1, 50)).await.expect("search");
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn hybrid_weights_decide_between_vector_and_text_only_hits() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), embedder());

    let vector_only = Strategy::Hybrid { vector_weight: Some(1.0), text_weight: Some(0.0) };
    let result = service.search(&request("zebra", vector_only, 1, 50)).await.expect("search");
    let order = ids(&result);
    let apple = order.iter().position(|id| id == "1").expect("vector hit present");
    let zebra = order.iter().position(|id| id == "9").expect("text hit present");
    assert!(apple < zebra, "vector-only document must outrank text-only one: {order:?}");

    let text_only = Strategy::Hybrid { vector_weight: Some(0.0), text_weight: Some(1.0) };
    let result = service.search(&request("zebra", text_only, 1, 50)).await.expect("search");
    assert_eq!(result.products[0].id.as_deref(), Some("9"));
}

#[tokio::test]
async fn hybrid_missing_weight_uses_default() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), embedder());
    let partial = Strategy::Hybrid { vector_weight: Some(1.0), text_weight: None };
    let result = service.search(&request("zebra", partial, 1, 50)).await.expect("search");
    assert!(result.products.iter().all(|p| p.score.is_some_and(|s| s > 0.0)));
}

#[tokio::test]
async fn hybrid_rejects_negative_weight_before_any_call() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store.clone(), embedder());
    let bad = Strategy::Hybrid { vector_weight: Some(-0.5), text_weight: None };
    let err = service.search(&request("apple", bad, 1, 10)).await.expect_err("must fail");
    assert!(matches!(err, Error::Contract(_)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn ranked_strategies_expose_scores() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), embedder());
    for strategy in [Strategy::FullText, Strategy::Vector] {
        let result = service.search(&request("apple", strategy, 1, 10)).await.expect("search");
        let scores: Vec<f64> = result.products.iter().map(|p| p.score.expect("score")).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{strategy:?} not relevance ordered: {scores:?}");
    }
}

#[tokio::test]
async fn missing_image_fails_the_whole_request() {
    let mut docs = catalog();
    if let Some(map) = docs.get_mut(0) {
        map.remove("imageUrlS3");
    }
    let service = service_over(Arc::new(MemoryStore::new(docs)), None);
    let err = service.search(&request("apple", Strategy::Keyword, 1, 10)).await.expect_err("must fail");
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn skip_invalid_policy_drops_bad_documents_only() {
    let mut docs = catalog();
    if let Some(map) = docs.get_mut(0) {
        map.remove("imageUrlS3");
    }
    let mut s = settings();
    s.search.mapping_policy = MappingPolicy::SkipInvalid;
    let service = build_service(&s, Arc::new(MemoryStore::new(docs)));
    let result = service.search(&request("app", Strategy::Keyword, 1, 10)).await.expect("search");
    assert_eq!(result.total, 5, "store total is kept");
    assert_eq!(result.products.len(), 4);
    assert!(!ids(&result).contains(&"1".to_string()));
}

#[tokio::test]
async fn invalid_pagination_never_reaches_the_store() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store.clone(), embedder());
    for (page, size) in [(0, 10), (1, 0), (1, 51)] {
        for strategy in all_strategies() {
            let err = service.search(&request("apple", strategy, page, size)).await.expect_err("must fail");
            assert!(matches!(err, Error::Contract(_)), "{strategy:?} page={page} size={size}");
            assert_eq!(err.status_class(), 422);
        }
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn vector_strategies_need_an_embedder() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store.clone(), None);
    for strategy in [Strategy::Vector, Strategy::Hybrid { vector_weight: Some(0.5), text_weight: Some(0.5) }] {
        let err = service.search(&request("apple", strategy, 1, 10)).await.expect_err("must fail");
        assert!(matches!(err, Error::Contract(_)), "{strategy:?} gave {err:?}");
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn embedding_failure_is_infrastructure() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store.clone(), Some(Arc::new(DownEmbedder)));
    let err = service.search(&request("apple", Strategy::Vector, 1, 10)).await.expect_err("must fail");
    assert!(matches!(err, Error::Infrastructure { .. }));
    assert_eq!(store.calls(), 0);
}

/// Reports a width the vectors it returns do not have.
struct MisconfiguredEmbedder;

#[async_trait]
impl Embedder for MisconfiguredEmbedder {
    fn dim(&self) -> usize {
        512
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

#[tokio::test]
async fn embedding_width_mismatch_fails_before_the_store() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store.clone(), Some(Arc::new(MisconfiguredEmbedder)));
    for strategy in [Strategy::Vector, Strategy::Hybrid { vector_weight: None, text_weight: None }] {
        let err = service.search(&request("apple", strategy, 1, 10)).await.expect_err("must fail");
        assert!(matches!(err, Error::InvalidConfig(_)), "{strategy:?} gave {err:?}");
        assert!(!err.is_retryable());
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let service = service_over(Arc::new(MemoryStore::new(catalog())), None);
    let err = service.search(&request("   ", Strategy::Keyword, 1, 10)).await.expect_err("must fail");
    assert!(matches!(err, Error::Contract(_)));
}

#[tokio::test]
async fn rerank_reorders_the_page_and_keeps_total() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let service = service_over(store, embedder()).with_reranker(Some(Arc::new(ReverseReranker)));
    let req = request("apple", Strategy::Vector, 1, 3);

    let plain = service.search(&req).await.expect("vector");
    let reranked = service.search_with_rerank(&req).await.expect("rerank");
    let mut expected = ids(&plain);
    expected.reverse();
    assert_eq!(ids(&reranked), expected);
    assert_eq!(reranked.total, plain.total);
    assert!(reranked.products.iter().all(|p| p.score.is_some()));
}

#[tokio::test]
async fn rerank_requires_vector_strategy_and_reranker() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let without = service_over(store.clone(), embedder());
    let err = without.search_with_rerank(&request("apple", Strategy::Vector, 1, 3)).await.expect_err("no reranker");
    assert!(matches!(err, Error::Contract(_)));

    let with = service_over(store.clone(), embedder()).with_reranker(Some(Arc::new(ReverseReranker)));
    let err = with.search_with_rerank(&request("apple", Strategy::FullText, 1, 3)).await.expect_err("wrong strategy");
    assert!(matches!(err, Error::Contract(_)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn health_pings_the_store() {
    let service = service_over(Arc::new(MemoryStore::new(vec![])), None);
    service.health().await.expect("memory store is always up");
}
