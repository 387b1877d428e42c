use catalog_core::config::VoyageSettings;
use catalog_core::retry::RetryPolicy;
use catalog_core::traits::Embedder;
use catalog_embed::{get_default_embedder, get_default_reranker, FakeEmbedder};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(512);
    let v1 = embedder.embed("hello world").await.expect("embed");
    let v2 = embedder.embed("hello world").await.expect("embed");

    assert_eq!(v1.len(), 512, "embedding dim is 512");
    assert_eq!(embedder.dim(), 512);

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[tokio::test]
async fn fake_embedder_is_case_insensitive() {
    let embedder = FakeEmbedder::new(64);
    let a = embedder.embed("Apple Juice").await.expect("embed");
    let b = embedder.embed("apple juice").await.expect("embed");
    assert_eq!(a, b);
}

#[test]
fn factory_without_key_or_fake_mode_has_no_capabilities() {
    std::env::remove_var("APP_USE_FAKE_EMBEDDINGS");
    let settings = VoyageSettings::default();
    let embedder = get_default_embedder(&settings, &RetryPolicy::none()).expect("factory");
    assert!(embedder.is_none());
    let reranker = get_default_reranker(&settings, &RetryPolicy::none()).expect("factory");
    assert!(reranker.is_none());
}

#[test]
fn factory_with_key_builds_remote_client() {
    let settings = VoyageSettings { api_key: Some("test-key".into()), ..VoyageSettings::default() };
    let reranker = get_default_reranker(&settings, &RetryPolicy::none()).expect("factory");
    assert!(reranker.is_some());
}
