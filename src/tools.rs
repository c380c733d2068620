//! Agent-facing memory tools.
//!
//! Each tool takes a JSON argument object, validates it into a typed request
//! and calls into [`KnowledgeGraph`]. Batch tools report a result per item
//! instead of failing as a whole.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::external::DocumentBackend;
use crate::graph::{
    Entity, EntityInput, GraphError, ItemOutcome, KnowledgeGraph, Relation, SearchParams,
    SearchResults, SortBy,
};

pub const TOOL_NAMES: [&str; 10] = [
    "create_entities",
    "update_entities",
    "delete_entities",
    "create_relations",
    "delete_relations",
    "search_nodes",
    "open_nodes",
    "add_observations",
    "mark_important",
    "get_recent",
];

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Entity \"{0}\" not found")]
    EntityNotFound(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NewEntity {
    name: String,
    entity_type: String,
    #[serde(default)]
    observations: Option<Vec<String>>,
    #[serde(default)]
    is_important: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateEntitiesArgs {
    entities: Vec<NewEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateEntitiesArgs {
    entities: Vec<EntityInput>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamesArgs {
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RelationArgs {
    from: String,
    to: String,
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateRelationsArgs {
    relations: Vec<RelationArgs>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RelationRef {
    from: String,
    to: String,
    #[serde(rename = "type")]
    relation_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteRelationsArgs {
    relations: Vec<RelationRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SearchNodesArgs {
    query: String,
    #[serde(default)]
    entity_types: Option<Vec<String>>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    sort_by: Option<SortBy>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddObservationsArgs {
    name: String,
    observations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkImportantArgs {
    name: String,
    important: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetRecentArgs {
    #[serde(default)]
    limit: Option<usize>,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    // Tools without required arguments may be called with no arguments at all
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn entity_view(entity: &Entity) -> Value {
    json!({
        "name": entity.name,
        "entityType": entity.entity_type,
        "observations": entity.observations,
    })
}

fn relation_view(relation: &Relation) -> Value {
    json!({
        "from": relation.from,
        "to": relation.to,
        "type": relation.relation_type,
    })
}

/// Split batch outcomes into rendered successes and per-item errors
fn partition<T>(
    outcomes: Vec<ItemOutcome<T>>,
    render: impl Fn(&T) -> Value,
) -> (Vec<Value>, Vec<Value>) {
    let mut done = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(item) => done.push(render(&item)),
            Err(e) => failed.push(json!({ "target": outcome.target, "error": e.to_string() })),
        }
    }
    (done, failed)
}

fn with_errors(mut response: Value, errors: Vec<Value>) -> Value {
    if !errors.is_empty() {
        response["errors"] = Value::Array(errors);
    }
    response
}

/// Run a tool by name
pub async fn dispatch<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    tool: &str,
    args: Value,
) -> Result<Value, ToolError> {
    debug!(tool, %args, "tool call");
    match tool {
        "create_entities" => create_entities(graph, parse_args(tool, args)?).await,
        "update_entities" => update_entities(graph, parse_args(tool, args)?).await,
        "delete_entities" => delete_entities(graph, parse_args(tool, args)?).await,
        "create_relations" => create_relations(graph, parse_args(tool, args)?).await,
        "delete_relations" => delete_relations(graph, parse_args(tool, args)?).await,
        "search_nodes" => search_nodes(graph, parse_args(tool, args)?).await,
        "open_nodes" => open_nodes(graph, parse_args(tool, args)?).await,
        "add_observations" => add_observations(graph, parse_args(tool, args)?).await,
        "mark_important" => mark_important(graph, parse_args(tool, args)?).await,
        "get_recent" => get_recent(graph, parse_args(tool, args)?).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

async fn create_entities<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: CreateEntitiesArgs,
) -> Result<Value, ToolError> {
    let inputs: Vec<EntityInput> = args
        .entities
        .into_iter()
        .map(|e| EntityInput {
            name: e.name,
            entity_type: Some(e.entity_type),
            observations: e.observations,
            is_important: e.is_important,
        })
        .collect();

    let (entities, errors) = partition(graph.save_entities(&inputs).await, entity_view);
    Ok(with_errors(json!({ "entities": entities }), errors))
}

async fn update_entities<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: UpdateEntitiesArgs,
) -> Result<Value, ToolError> {
    let mut entities = Vec::new();
    let mut errors = Vec::new();

    for input in args.entities {
        let result = match graph.peek_entity(&input.name).await {
            Ok(Some(_)) => graph.save_entity(&input).await.map_err(ToolError::from),
            Ok(None) => Err(ToolError::EntityNotFound(input.name.clone())),
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(entity) => entities.push(entity_view(&entity)),
            Err(e) => errors.push(json!({ "target": input.name, "error": e.to_string() })),
        }
    }

    Ok(with_errors(json!({ "entities": entities }), errors))
}

async fn delete_entities<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: NamesArgs,
) -> Result<Value, ToolError> {
    let outcomes = graph.delete_entities(&args.names).await;
    let success = outcomes.iter().all(|o| o.result.is_ok());
    let results: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| match outcome.result {
            Ok(deleted) => json!({ "name": outcome.target, "deleted": deleted }),
            Err(e) => json!({ "name": outcome.target, "deleted": false, "error": e.to_string() }),
        })
        .collect();

    Ok(json!({ "success": success, "results": results }))
}

async fn create_relations<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: CreateRelationsArgs,
) -> Result<Value, ToolError> {
    let relations: Vec<Relation> = args
        .relations
        .into_iter()
        .map(|r| Relation {
            from: r.from,
            to: r.to,
            relation_type: r.relation_type,
            metadata: r.metadata,
        })
        .collect();

    let (saved, errors) = partition(graph.save_relations(&relations).await, relation_view);
    Ok(with_errors(json!({ "relations": saved }), errors))
}

async fn delete_relations<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: DeleteRelationsArgs,
) -> Result<Value, ToolError> {
    let mut success = true;
    let mut results = Vec::with_capacity(args.relations.len());

    for relation in args.relations {
        let mut result = json!({
            "from": relation.from,
            "to": relation.to,
            "type": relation.relation_type,
        });
        match graph
            .delete_relation(&relation.from, &relation.to, &relation.relation_type)
            .await
        {
            Ok(deleted) => result["deleted"] = json!(deleted),
            Err(e) => {
                success = false;
                result["deleted"] = json!(false);
                result["error"] = json!(e.to_string());
            }
        }
        results.push(result);
    }

    Ok(json!({ "success": success, "results": results }))
}

/// Render entities together with every relation touching them
async fn with_relations<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    entities: Vec<&Entity>,
) -> Result<Value, ToolError> {
    let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
    let relations = graph.get_relations_for_entities(&names).await?;

    Ok(json!({
        "entities": entities.into_iter().map(entity_view).collect::<Vec<_>>(),
        "relations": relations.iter().map(relation_view).collect::<Vec<_>>(),
    }))
}

async fn ranked<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    params: SearchParams,
) -> Result<Value, ToolError> {
    let results: SearchResults = graph.search(&params).await?;
    with_relations(graph, results.entities().collect()).await
}

async fn search_nodes<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: SearchNodesArgs,
) -> Result<Value, ToolError> {
    let mut params = SearchParams::new(&args.query).sort_by(args.sort_by.unwrap_or_default());
    if let Some(limit) = args.limit {
        params = params.limit(limit);
    }
    if let Some(types) = args.entity_types {
        params = params.entity_types(types);
    }
    ranked(graph, params).await
}

async fn open_nodes<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: NamesArgs,
) -> Result<Value, ToolError> {
    let mut entities = Vec::new();
    for name in &args.names {
        if let Some(entity) = graph.get_entity(name).await? {
            entities.push(entity);
        }
    }
    with_relations(graph, entities.iter().collect()).await
}

async fn add_observations<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: AddObservationsArgs,
) -> Result<Value, ToolError> {
    match graph.add_observations(&args.name, &args.observations).await? {
        Some(entity) => Ok(json!({ "entity": entity_view(&entity) })),
        None => Err(ToolError::EntityNotFound(args.name)),
    }
}

async fn mark_important<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: MarkImportantArgs,
) -> Result<Value, ToolError> {
    match graph.mark_important(&args.name, args.important).await? {
        Some(entity) => Ok(json!({ "entity": entity_view(&entity) })),
        None => Err(ToolError::EntityNotFound(args.name)),
    }
}

async fn get_recent<B: DocumentBackend>(
    graph: &KnowledgeGraph<B>,
    args: GetRecentArgs,
) -> Result<Value, ToolError> {
    let mut params = SearchParams::new("").sort_by(SortBy::Recency);
    if let Some(limit) = args.limit {
        params = params.limit(limit);
    }
    ranked(graph, params).await
}
