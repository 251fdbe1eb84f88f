use arbor_core::config::{Config, ProviderKind};
use arbor_core::{Pipeline, bootstrap};
use arbor_index::{HashedEncoder, QueryLevel};
use arbor_llm::MockProvider;
use arbor_tree::{Fact, Level};
use serial_test::serial;

fn facts(n: usize) -> Vec<Fact> {
    (0..n)
        .map(|i| {
            Fact::new(
                ["Ahmed Karimi", "Lena Ortiz", "Viktor Hale"][i % 3],
                format!("transferred shipment {i}"),
                format!("2024-03-{:02}", i + 1),
                ["Port Said", "Varna"][i % 2],
            )
            .with_confidence(0.9)
        })
        .collect()
}

fn memory_config() -> Config {
    let mut config = Config::default();
    config.llm.provider = ProviderKind::Mock;
    config.index.sqlite_path = ":memory:".into();
    config
}

async fn pipeline(provider: MockProvider) -> Pipeline<MockProvider, HashedEncoder> {
    let config = memory_config();
    let store = bootstrap::open_store(&config).await.unwrap();
    Pipeline::open(provider, HashedEncoder::default(), store, &config)
        .await
        .unwrap()
}

#[tokio::test]
async fn twenty_five_facts_end_to_end() {
    let p = pipeline(MockProvider::echoing()).await;
    let outcome = p.build(facts(25)).await.unwrap();

    let tree = &outcome.tree;
    assert_eq!(tree.leaves.len(), 3);
    assert_eq!(tree.branches.len(), 1);
    assert_eq!(tree.root.text, tree.branches[0].text);
    tree.validate().unwrap();

    // leaf parents are branch texts, fact parents are leaf texts
    let store = p.index().store();
    for leaf in 0..3 {
        let parent = store.parent_of(Level::Leaf, leaf).await.unwrap().unwrap();
        assert_eq!(parent.text, tree.branches[0].text);
    }
    for (leaf, members) in &tree.leaf_fact_mapping {
        for &fact in members {
            let parent = store.parent_of(Level::Fact, fact).await.unwrap().unwrap();
            assert_eq!(parent.text, tree.leaves[*leaf].text);
        }
    }

    for (label, allowed) in [
        ("SPECIFIC", ["leaf", "fact"]),
        ("PATTERN", ["branch", "leaf"]),
        ("STRATEGIC", ["root", "branch"]),
    ] {
        let classified = pipeline(MockProvider::replying(label)).await;
        classified.build(facts(25)).await.unwrap();
        let texts = classified.index().retrieve("Lena Ortiz shipment", 5).await;
        assert!(!texts.is_empty() && texts.len() <= 5, "{label}: {texts:?}");

        let hits = classified.index().retrieve_hits("Lena Ortiz shipment", 5).await;
        assert!(
            hits.iter().all(|h| allowed.contains(&h.level)),
            "{label}: {hits:?}"
        );
    }
}

#[tokio::test]
async fn retrieval_falls_back_when_store_is_unreachable() {
    let p = pipeline(MockProvider::replying("SPECIFIC")).await;
    let tree = p.build(facts(25)).await.unwrap().tree;
    p.index().store().pool().close().await;

    let texts = p.index().retrieve("Viktor Hale", 5).await;
    assert_eq!(texts.len(), 5);
    // storage order starts at the root
    assert_eq!(texts[0], tree.root.text);
    assert!(texts.iter().all(|t| !t.starts_with("CONTEXT:")));
}

#[tokio::test]
async fn one_or_two_facts_make_a_single_leaf_root() {
    for n in [1, 2] {
        let p = pipeline(MockProvider::echoing()).await;
        let tree = p.build(facts(n)).await.unwrap().tree;
        assert_eq!(tree.leaves.len(), 1);
        assert!(tree.branches.is_empty());
        assert_eq!(tree.root.text, tree.leaves[0].text);
    }
}

#[tokio::test]
async fn repeated_pairs_share_one_co_occurrence_edge() {
    let p = pipeline(MockProvider::echoing()).await;
    let pair = || Fact::new("Ahmed Karimi", "met courier", "Monday", "Varna");
    p.build(vec![pair(), pair()]).await.unwrap();

    let store = p.index().store();
    assert_eq!(store.co_occurrence_edges().await.unwrap(), 1);
    assert_eq!(
        store
            .co_occurrence("location_varna", "person_ahmed_karimi")
            .await
            .unwrap(),
        Some(2)
    );
}

#[tokio::test]
async fn classification_is_not_cached() {
    let classifier = MockProvider::with_responses(vec!["PATTERN".into(), "gibberish".into()]);
    let p = pipeline(classifier.clone()).await;

    assert_eq!(p.classify("same question").await.unwrap(), QueryLevel::Pattern);
    assert_eq!(p.classify("same question").await.unwrap(), QueryLevel::Mixed);
    assert_eq!(classifier.calls().len(), 2);
}

#[tokio::test]
async fn empty_vector_index_returns_nothing() {
    let p = pipeline(MockProvider::replying("MIXED")).await;
    assert!(p.query("anything", Some(5)).await.hits.is_empty());
    assert_eq!(p.prepare().await.unwrap(), 0);
    assert!(p.query("anything", Some(5)).await.hits.is_empty());
}

#[tokio::test]
#[serial]
async fn mock_provider_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("arbor.toml");
    let db_path = dir.path().join("arbor.db");
    std::fs::write(
        &config_path,
        format!(
            "[llm]\nprovider = \"mock\"\n\n[index]\nsqlite_path = \"{}\"\ndefault_k = 4\n",
            db_path.display()
        ),
    )
    .unwrap();
    let facts_path = dir.path().join("facts.jsonl");
    let lines: Vec<String> = facts(12)
        .iter()
        .map(|f| serde_json::to_string(f).unwrap())
        .collect();
    std::fs::write(&facts_path, lines.join("\n")).unwrap();

    let config = Config::load(&config_path).unwrap();
    let built = Pipeline::from_config(&config).await.unwrap();
    let outcome = built.build_from_jsonl(&facts_path).await.unwrap();
    assert_eq!(outcome.report.documents, 16);
    built.index().store().pool().close().await;

    let reopened = Pipeline::from_config(&config).await.unwrap();
    assert_eq!(reopened.prepare().await.unwrap(), 16);
    let routed = reopened.query("Varna", None).await;
    assert_eq!(routed.level, Some(QueryLevel::Mixed));
    assert_eq!(routed.hits.len(), 4);
}
