use kg_memory::graph::Document;
use kg_memory::{EntityInput, KnowledgeGraph, MemoryBackend, Relation, SearchParams, SortBy};

async fn graph() -> KnowledgeGraph<MemoryBackend> {
    let graph = KnowledgeGraph::new(MemoryBackend::new());
    assert!(graph.initialize().await.unwrap(), "index should be created");
    graph
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let graph = graph().await;
    assert!(!graph.initialize().await.unwrap());
}

#[tokio::test]
async fn test_saving_twice_keeps_one_document() {
    let graph = graph().await;
    let input = EntityInput::new("alice", "person").with_observations(["likes tea"]);

    graph.save_entity(&input).await.unwrap();
    graph.save_entity(&input).await.unwrap();

    assert_eq!(graph.backend().len().await, 1);
}

#[tokio::test]
async fn test_latest_entity_type_wins() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("alice", "person")).await.unwrap();
    graph.save_entity(&EntityInput::new("alice", "engineer")).await.unwrap();

    let alice = graph.peek_entity("alice").await.unwrap().unwrap();
    assert_eq!(alice.entity_type, "engineer");
    assert_eq!(graph.backend().len().await, 1);
}

#[tokio::test]
async fn test_duplicate_relation_is_one_edge() {
    let graph = graph().await;
    let knows = Relation::new("A", "B", "knows");

    graph.save_relation(&knows).await.unwrap();
    graph.save_relation(&knows).await.unwrap();

    let relations = graph
        .get_relations_for_entities(&["A".to_string(), "B".to_string()])
        .await
        .unwrap();
    assert_eq!(relations, vec![knows]);
}

#[tokio::test]
async fn test_relations_are_found_from_both_ends() {
    let graph = graph().await;
    graph.save_relation(&Relation::new("A", "B", "knows")).await.unwrap();
    graph.save_relation(&Relation::new("C", "A", "likes")).await.unwrap();
    graph.save_relation(&Relation::new("C", "D", "owns")).await.unwrap();

    let relations = graph
        .get_relations_for_entities(&["A".to_string()])
        .await
        .unwrap();

    assert_eq!(relations.len(), 2);
    assert!(relations.iter().all(|r| r.from == "A" || r.to == "A"));
}

#[tokio::test]
async fn test_reads_are_counted() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("x", "thing")).await.unwrap();

    let mut last_read = graph.peek_entity("x").await.unwrap().unwrap().last_read;
    for expected in 1..=3 {
        let entity = graph.get_entity("x").await.unwrap().unwrap();
        assert_eq!(entity.read_count, expected);
        assert!(entity.last_read >= last_read);
        last_read = entity.last_read;
    }

    let stored = graph.peek_entity("x").await.unwrap().unwrap();
    assert_eq!(stored.read_count, 3);
}

#[tokio::test]
async fn test_missing_entity_is_none() {
    let graph = graph().await;
    assert!(graph.get_entity("ghost").await.unwrap().is_none());
    assert!(!graph.delete_entity("ghost").await.unwrap());
    assert!(!graph.delete_relation("a", "b", "knows").await.unwrap());
}

#[tokio::test]
async fn test_traversal_terminates_on_cycles() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("A", "node")).await.unwrap();
    graph.save_entity(&EntityInput::new("B", "node")).await.unwrap();
    graph.save_relation(&Relation::new("A", "B", "next")).await.unwrap();
    graph.save_relation(&Relation::new("B", "A", "next")).await.unwrap();

    let related = graph.get_related_entities("A", 5).await.unwrap();

    let mut names: Vec<&str> = related.entities.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(related.relations.len(), 2);
}

#[tokio::test]
async fn test_traversal_respects_depth_and_skips_read_accounting() {
    let graph = graph().await;
    for name in ["a", "b", "c", "d"] {
        graph.save_entity(&EntityInput::new(name, "node")).await.unwrap();
    }
    graph.save_relation(&Relation::new("a", "b", "links")).await.unwrap();
    graph.save_relation(&Relation::new("c", "b", "links")).await.unwrap();
    graph.save_relation(&Relation::new("c", "d", "links")).await.unwrap();

    let related = graph.get_related_entities("a", 2).await.unwrap();
    let names: Vec<&str> = related.entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    for entity in &related.entities {
        assert_eq!(entity.read_count, 0);
    }
}

#[tokio::test]
async fn test_traversal_includes_dangling_names_only_when_stored() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("a", "node")).await.unwrap();
    graph.save_relation(&Relation::new("a", "nowhere", "links")).await.unwrap();

    let related = graph.get_related_entities("a", 1).await.unwrap();

    assert_eq!(related.entities.len(), 1);
    assert_eq!(related.relations.len(), 1);
}

#[tokio::test]
async fn test_importance_ranks_flag_before_reads() {
    let graph = graph().await;
    graph
        .save_entity(&EntityInput::new("alpha", "thing").important(true))
        .await
        .unwrap();
    graph.save_entity(&EntityInput::new("beta", "thing")).await.unwrap();

    graph.get_entity("alpha").await.unwrap();
    for _ in 0..100 {
        graph.get_entity("beta").await.unwrap();
    }

    let results = graph
        .search(&SearchParams::new("").sort_by(SortBy::Importance))
        .await
        .unwrap();
    assert_eq!(results.names(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_relevance_and_recency_ordering() {
    let graph = graph().await;
    graph
        .save_entity(&EntityInput::new("tea", "drink").with_observations(["green tea", "tea leaves"]))
        .await
        .unwrap();
    graph
        .save_entity(&EntityInput::new("coffee", "drink").with_observations(["not tea"]))
        .await
        .unwrap();
    graph.save_entity(&EntityInput::new("paris", "city")).await.unwrap();

    let results = graph.search(&SearchParams::new("tea")).await.unwrap();
    assert_eq!(results.total, 2);
    assert_eq!(results.names(), vec!["tea", "coffee"]);

    graph.get_entity("coffee").await.unwrap();
    let results = graph
        .search(&SearchParams::new("").sort_by(SortBy::Recency).limit(1))
        .await
        .unwrap();
    assert_eq!(results.total, 3);
    assert_eq!(results.names(), vec!["coffee"]);

    let results = graph
        .search(&SearchParams::new("").entity_types(["city"]))
        .await
        .unwrap();
    assert_eq!(results.names(), vec!["paris"]);
}

#[tokio::test]
async fn test_empty_query_orders_by_name() {
    let graph = graph().await;
    for name in ["zeta", "alpha", "mid"] {
        graph.save_entity(&EntityInput::new(name, "thing")).await.unwrap();
    }

    let results = graph.search(&SearchParams::new("")).await.unwrap();

    assert_eq!(results.total, 3);
    assert_eq!(results.names(), vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn test_equal_scores_break_ties_by_name() {
    let graph = graph().await;
    for name in ["walnut", "almond", "cashew"] {
        graph
            .save_entity(&EntityInput::new(name, "nut").with_observations(["roasted snack"]))
            .await
            .unwrap();
    }
    graph
        .save_entity(&EntityInput::new("pretzel", "snack").with_observations(["roasted snack", "snack"]))
        .await
        .unwrap();

    let results = graph.search(&SearchParams::new("roasted")).await.unwrap();

    assert_eq!(results.names(), vec!["almond", "cashew", "pretzel", "walnut"]);
    let scores: Vec<_> = results.hits.iter().map(|h| h.score).collect();
    assert!(scores.windows(2).all(|w| w[0] == w[1]));

    let results = graph.search(&SearchParams::new("snack")).await.unwrap();
    assert_eq!(results.names(), vec!["pretzel", "almond", "cashew", "walnut"]);
}

#[tokio::test]
async fn test_search_hits_are_not_counted_as_reads() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("tea", "drink")).await.unwrap();

    graph.search(&SearchParams::new("tea")).await.unwrap();

    let tea = graph.peek_entity("tea").await.unwrap().unwrap();
    assert_eq!(tea.read_count, 0);
}

#[tokio::test]
async fn test_search_highlights() {
    let graph = graph().await;
    graph
        .save_entity(&EntityInput::new("tea", "drink").with_observations(["Green tea is nice"]))
        .await
        .unwrap();

    let results = graph
        .search(&SearchParams::new("green").highlight(true))
        .await
        .unwrap();

    assert_eq!(
        results.hits[0].highlights["observations"],
        vec!["<em>Green</em> tea is nice"]
    );
}

#[tokio::test]
async fn test_deleting_entity_keeps_its_relations() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("A", "node")).await.unwrap();
    graph.save_entity(&EntityInput::new("B", "node")).await.unwrap();
    graph.save_relation(&Relation::new("A", "B", "knows")).await.unwrap();

    assert!(graph.delete_entity("A").await.unwrap());

    assert!(graph.get_entity("A").await.unwrap().is_none());
    let relations = graph
        .get_relations_for_entities(&["A".to_string()])
        .await
        .unwrap();
    assert_eq!(relations.len(), 1);
}

#[tokio::test]
async fn test_export_is_not_capped_by_limit() {
    let graph = graph().await;
    for i in 0..25 {
        graph
            .save_entity(&EntityInput::new(&format!("e{}", i), "thing"))
            .await
            .unwrap();
    }
    graph.save_relation(&Relation::new("e0", "e1", "next")).await.unwrap();

    let exported = graph.export_data().await.unwrap();

    let entities = exported
        .iter()
        .filter(|d| matches!(d, Document::Entity(_)))
        .count();
    assert_eq!(entities, 25);
    assert_eq!(exported.len(), 26);
}

#[tokio::test]
async fn test_reset_empties_the_graph() {
    let graph = graph().await;
    graph.save_entity(&EntityInput::new("a", "node")).await.unwrap();

    graph.reset().await.unwrap();

    assert!(graph.backend().is_empty().await);
    assert!(!graph.initialize().await.unwrap());
}
