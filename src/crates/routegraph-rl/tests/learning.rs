//! Behavioural tests for selection, generalization, updates and snapshots

use async_trait::async_trait;
use proptest::prelude::*;
use routegraph_rl::{
    ActionCatalog, Embedder, HashedBagOfWordsEmbedder, IndexEntry, LearningConfig, LearningContext, LearningError,
    QTable, QValueStore, SnapshotCodec, StateSignature, UpdateMode,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Embedder returning fixed vectors, so similarities are exact
#[derive(Debug)]
struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> routegraph_rl::Result<Vec<f32>> {
        self.0
            .get(text)
            .cloned()
            .ok_or_else(|| LearningError::embedding(format!("no vector for '{}'", text)))
    }

    fn dimensions(&self) -> usize {
        2
    }
}

fn catalog() -> ActionCatalog {
    ActionCatalog::from_names(["search", "calculator", "weather", "calendar", "email"]).unwrap()
}

fn context(exploration_rate: f64, seed: u64) -> LearningContext {
    LearningContext::builder(LearningConfig::default().with_exploration_rate(exploration_rate))
        .with_seed(seed)
        .build()
        .unwrap()
}

#[tokio::test]
async fn deterministic_exploitation_with_fixed_values() {
    let ctx = context(0.0, 3);
    let first = ctx.selector().select("book a meeting tomorrow", &catalog(), 2).await.unwrap();

    ctx.store().update(&first.signature, "calendar", 1.0, None).unwrap();
    ctx.store().update(&first.signature, "email", 0.5, None).unwrap();
    ctx.store().update(&first.signature, "search", -0.5, None).unwrap();

    let expected = vec!["calendar".to_string(), "email".to_string()];
    for _ in 0..50 {
        let selection = ctx.selector().select("book a meeting tomorrow", &catalog(), 2).await.unwrap();
        assert_eq!(selection.actions, expected);
        assert!(!selection.explored);
    }
}

#[tokio::test]
async fn exploration_is_roughly_uniform() {
    let ctx = context(1.0, 42);
    let catalog = catalog();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for _ in 0..1000 {
        let selection = ctx.selector().select("anything at all", &catalog, 1).await.unwrap();
        assert_eq!(selection.actions.len(), 1);
        assert!(selection.explored);
        *counts.entry(selection.actions[0].clone()).or_default() += 1;
    }

    assert_eq!(counts.len(), 5);
    for (action, count) in counts {
        assert!((140..=260).contains(&count), "{} chosen {} times", action, count);
    }
}

#[tokio::test]
async fn no_exploration_always_returns_best_action() {
    let ctx = context(0.0, 9);
    let signature = ctx.selector().select("weather in Oslo", &catalog(), 1).await.unwrap().signature;
    ctx.store().update(&signature, "weather", 0.8, None).unwrap();

    for _ in 0..1000 {
        let selection = ctx.selector().select("weather in Oslo", &catalog(), 1).await.unwrap();
        assert_eq!(selection.actions, vec!["weather"]);
    }
}

#[tokio::test]
async fn similar_queries_share_a_bucket_and_dissimilar_do_not() {
    let embedder = TableEmbedder(HashMap::from([
        ("weather paris", vec![1.0, 0.0]),
        ("forecast for paris", vec![0.95, 0.312_25]),
        ("stock prices", vec![0.6, 0.8]),
    ]));
    let config = LearningConfig::default()
        .with_exploration_rate(0.0)
        .with_similarity_threshold(0.9);
    let ctx = LearningContext::builder(config)
        .with_embedder(Arc::new(embedder))
        .build()
        .unwrap();

    let a = ctx.selector().select("weather paris", &catalog(), 1).await.unwrap();
    let b = ctx.selector().select("forecast for paris", &catalog(), 1).await.unwrap();
    let c = ctx.selector().select("stock prices", &catalog(), 1).await.unwrap();

    assert_eq!(a.signature, b.signature);
    assert_ne!(a.signature, c.signature);

    // An update through the paraphrase is visible through the original
    ctx.store().update(&b.signature, "weather", 1.0, None).unwrap();
    let again = ctx.selector().select("weather paris", &catalog(), 1).await.unwrap();
    assert_eq!(again.actions, vec!["weather"]);

    let unrelated = ctx.selector().select("stock prices", &catalog(), 1).await.unwrap();
    assert_eq!(unrelated.actions, vec!["search"]);
}

#[tokio::test]
async fn embedder_failure_surfaces_as_error() {
    let ctx = LearningContext::builder(LearningConfig::default())
        .with_embedder(Arc::new(TableEmbedder(HashMap::new())))
        .build()
        .unwrap();

    let result = ctx.selector().select("unknown", &catalog(), 1).await;
    assert!(matches!(result, Err(LearningError::Embedding(_))));
}

#[test]
fn concurrent_updates_lose_nothing() {
    let store = QValueStore::new(0.1, 0.9, UpdateMode::SingleStep).unwrap();
    let signature = StateSignature::from_query("shared");

    std::thread::scope(|scope| {
        for t in 0..8 {
            let store = &store;
            let signature = &signature;
            scope.spawn(move || {
                let action = format!("action-{}", t);
                for _ in 0..100 {
                    store.update(signature, &action, 1.0, None).unwrap();
                }
            });
        }
    });

    let values = store.read(&signature);
    assert_eq!(values.len(), 8);
    let expected = 1.0 - 0.9f64.powi(100);
    for value in values.values() {
        assert!((value - expected).abs() < 1e-9);
    }
}

#[test]
fn concurrent_updates_to_one_pair_are_atomic() {
    let store = QValueStore::new(0.1, 0.9, UpdateMode::SingleStep).unwrap();
    let signature = StateSignature::from_query("shared");
    let (threads, updates) = (8, 50);

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let store = &store;
            let signature = &signature;
            scope.spawn(move || {
                for _ in 0..updates {
                    store.update(signature, "search", 1.0, None).unwrap();
                }
            });
        }
    });

    let expected = 1.0 - 0.9f64.powi(threads * updates);
    assert!((store.value(&signature, "search") - expected).abs() < 1e-9);
}

#[tokio::test]
async fn long_templated_queries_do_not_share_a_bucket() {
    let ctx = context(0.0, 9);
    let template = "a".repeat(300);
    let integral = format!("{} compute the integral of x squared from zero to one", template);
    let flight = format!("{} book a flight to tokyo for next tuesday morning", template);

    let first = ctx.selector().select(&integral, &catalog(), 1).await.unwrap();
    let second = ctx.selector().select(&flight, &catalog(), 1).await.unwrap();

    assert!(second.matched_similarity.is_none());
    assert_ne!(first.signature, second.signature);

    ctx.store().update(&first.signature, "calculator", 1.0, None).unwrap();
    assert_eq!(ctx.store().value(&second.signature, "calculator"), 0.0);
}

#[tokio::test]
async fn snapshot_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(0.0, 1);

    for query in ["convert 10 usd to eur", "weather in rome", "send the report to anna"] {
        let selection = ctx.selector().select(query, &catalog(), 2).await.unwrap();
        ctx.store()
            .update_batch(&selection.signature, &selection.actions, 0.7, None)
            .unwrap();
    }

    for name in ["learning.bin", "learning.json"] {
        let path = dir.path().join(name);
        ctx.flush(&path).unwrap();

        let restored = LearningContext::open(LearningContext::builder(LearningConfig::default()), &path).unwrap();
        assert_eq!(restored.snapshot(), ctx.snapshot(), "file {}", name);
        assert_eq!(restored.stats().total_states, 3);
    }
}

fn sig_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}( [a-z]{1,8}){0,3}"
}

fn table_strategy() -> impl Strategy<Value = QTable> {
    prop::collection::btree_map(
        sig_strategy(),
        prop::collection::btree_map("[a-z_]{1,10}", -10.0f64..10.0, 0..6),
        0..12,
    )
}

fn four_dim_context() -> LearningContext {
    LearningContext::builder(LearningConfig::default())
        .with_embedder(Arc::new(HashedBagOfWordsEmbedder::new(4)))
        .build()
        .unwrap()
}

fn entries_strategy() -> impl Strategy<Value = Vec<IndexEntry>> {
    prop::collection::btree_map(sig_strategy(), prop::collection::vec(-1.0f32..1.0, 4), 0..12).prop_map(|m| {
        m.into_iter()
            .map(|(signature, embedding)| IndexEntry {
                signature: StateSignature::from_raw(signature),
                embedding,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn single_step_moves_monotonically_toward_reward(
        reward in -1.0f64..1.0,
        alpha in 0.05f64..1.0,
        steps in 1usize..60,
    ) {
        let store = QValueStore::new(alpha, 0.9, UpdateMode::SingleStep).unwrap();
        let sig = StateSignature::from_raw("s");
        let mut distance = reward.abs();

        for _ in 0..steps {
            let value = store.update(&sig, "a", reward, None).unwrap();
            let next = (value - reward).abs();
            prop_assert!(next <= distance + 1e-12);
            distance = next;
        }
    }

    #[test]
    fn temporal_difference_approaches_fixed_point(
        reward in -1.0f64..1.0,
        alpha in 0.2f64..1.0,
        gamma in 0.0f64..0.8,
    ) {
        let store = QValueStore::new(alpha, gamma, UpdateMode::TemporalDifference).unwrap();
        let sig = StateSignature::from_raw("s");
        let fixed_point = reward / (1.0 - gamma);
        let mut distance = fixed_point.abs();

        for _ in 0..400 {
            let value = store.update(&sig, "only", reward, None).unwrap();
            let next = (value - fixed_point).abs();
            prop_assert!(next <= distance + 1e-9);
            distance = next;
        }
        prop_assert!(distance < 1e-3);
    }

    #[test]
    fn snapshot_round_trip_is_exact(table in table_strategy(), entries in entries_strategy()) {
        let source = four_dim_context();
        source.store().import(table).unwrap();
        source.index().replace(entries).unwrap();

        let bytes = source.export_snapshot(SnapshotCodec::Bincode).unwrap();
        let target = four_dim_context();
        target.import_snapshot(&bytes, SnapshotCodec::Bincode).unwrap();

        prop_assert_eq!(target.store().export(), source.store().export());
        prop_assert_eq!(target.index().entries(), source.index().entries());
    }
}

#[test]
fn bucket_values_survive_unrelated_imports() {
    let mut table = QTable::new();
    table.insert("kept".into(), BTreeMap::from([("a".to_string(), 0.25)]));

    let ctx = LearningContext::new(LearningConfig::default()).unwrap();
    ctx.store().import(table.clone()).unwrap();
    let bytes = ctx.export_snapshot(SnapshotCodec::Json).unwrap();

    let other = LearningContext::new(LearningConfig::default()).unwrap();
    other.import_snapshot(&bytes, SnapshotCodec::Json).unwrap();
    assert_eq!(other.store().export(), table);
}

#[tokio::test]
async fn snapshot_from_a_different_embedder_is_rejected() {
    let small = LearningContext::builder(LearningConfig::default().with_exploration_rate(0.0))
        .with_embedder(Arc::new(HashedBagOfWordsEmbedder::new(8)))
        .build()
        .unwrap();
    let selection = small.selector().select("weather in rome", &catalog(), 1).await.unwrap();
    small.store().update(&selection.signature, "weather", 1.0, None).unwrap();
    let bytes = small.export_snapshot(SnapshotCodec::Json).unwrap();

    let default = LearningContext::new(LearningConfig::default()).unwrap();
    let err = default.import_snapshot(&bytes, SnapshotCodec::Json).unwrap_err();
    assert!(matches!(err, LearningError::SnapshotFormat(_)));
    assert!(default.store().is_empty());
    assert!(default.index().is_empty());

    // Without embeddings there is nothing to mismatch
    let plain = LearningContext::new(LearningConfig::default().with_embeddings(false)).unwrap();
    plain.import_snapshot(&bytes, SnapshotCodec::Json).unwrap();
    assert_eq!(plain.store().export(), small.store().export());
}
