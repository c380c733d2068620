use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::external::{DocumentBackend, Filter};
use crate::graph::{
    document::{entity_id, index_mappings, relation_id, Document, DocumentKind, TYPE_FIELD},
    entity::{Entity, EntityInput},
    error::{GraphError, GraphResult},
    relation::{Relation, RelationKey},
    search::{SearchHit, SearchParams, SearchResults},
};

/// Outcome of one item of a batch operation
#[derive(Debug)]
pub struct ItemOutcome<T> {
    /// Name or relation triple the item refers to
    pub target: String,
    pub result: GraphResult<T>,
}

/// Entities reached by a traversal and the edges followed to reach them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelatedEntities {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub entity_types: BTreeMap<String, usize>,
    pub relation_types: BTreeMap<String, usize>,
}

/// Knowledge graph persisted in a search-indexed document backend.
///
/// Every operation issues its own backend requests; nothing is cached or
/// locked in process, so concurrent writers resolve as last write wins.
pub struct KnowledgeGraph<B> {
    backend: B,
}

fn parse_entity(operation: &'static str, target: &str, value: Value) -> GraphResult<Entity> {
    match serde_json::from_value(value) {
        Ok(Document::Entity(entity)) => Ok(entity),
        Ok(other) => Err(GraphError::corrupt(
            operation,
            target,
            format!("expected an entity, found a {}", other.kind().as_str()),
        )),
        Err(e) => Err(GraphError::corrupt(operation, target, e)),
    }
}

fn parse_relation(operation: &'static str, target: &str, value: Value) -> GraphResult<Relation> {
    match serde_json::from_value(value) {
        Ok(Document::Relation(relation)) => Ok(relation),
        Ok(other) => Err(GraphError::corrupt(
            operation,
            target,
            format!("expected a relation, found a {}", other.kind().as_str()),
        )),
        Err(e) => Err(GraphError::corrupt(operation, target, e)),
    }
}

fn to_value(operation: &'static str, target: &str, document: &Document) -> GraphResult<Value> {
    serde_json::to_value(document).map_err(|e| GraphError::corrupt(operation, target, e))
}

impl<B: DocumentBackend> KnowledgeGraph<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Ensure the collection exists. Returns whether it was created by this call.
    pub async fn initialize(&self) -> GraphResult<bool> {
        let created = self
            .backend
            .ensure_index(&index_mappings())
            .await
            .map_err(|e| GraphError::backend("initialize", "index", e))?;
        if created {
            info!("knowledge graph index created");
        } else {
            debug!("knowledge graph index already present");
        }
        Ok(created)
    }

    /// Drop every entity and relation and recreate an empty collection
    pub async fn reset(&self) -> GraphResult<()> {
        self.backend
            .drop_index()
            .await
            .map_err(|e| GraphError::backend("reset", "index", e))?;
        self.initialize().await?;
        Ok(())
    }

    /// Create or update an entity.
    ///
    /// Fields omitted from `input` keep their stored values. An entity that
    /// does not exist yet requires an `entityType`. Reading statistics of an
    /// existing entity are left untouched.
    pub async fn save_entity(&self, input: &EntityInput) -> GraphResult<Entity> {
        const OP: &str = "save_entity";
        input
            .validate()
            .map_err(|message| GraphError::validation(OP, &input.name, message))?;

        let now = Utc::now();
        let id = entity_id(&input.name);

        // Without a type the write can only update an existing entity
        let upsert = input
            .create(now)
            .map(|entity| to_value(OP, &input.name, &Document::Entity(entity)))
            .transpose()?;

        let mut partial = Map::new();
        partial.insert(TYPE_FIELD.to_string(), json!(DocumentKind::Entity.as_str()));
        partial.insert("name".to_string(), json!(input.name));
        if let Some(entity_type) = &input.entity_type {
            partial.insert("entityType".to_string(), json!(entity_type));
        }
        if let Some(observations) = &input.observations {
            partial.insert("observations".to_string(), json!(observations));
        }
        if let Some(is_important) = input.is_important {
            partial.insert("isImportant".to_string(), json!(is_important));
        }
        partial.insert("lastWrite".to_string(), json!(now));

        let stored = self
            .backend
            .merge_document(&id, &Value::Object(partial), upsert)
            .await
            .map_err(|e| GraphError::backend(OP, &input.name, e))?
            .ok_or_else(|| {
                GraphError::validation(
                    OP,
                    &input.name,
                    "entity does not exist and no entityType was given to create it",
                )
            })?;
        debug!(entity = %input.name, "saved entity");

        parse_entity(OP, &input.name, stored)
    }

    /// Look up an entity by name and account for the read.
    ///
    /// Returns the entity as stored after the read, so `readCount` already
    /// includes this lookup.
    pub async fn get_entity(&self, name: &str) -> GraphResult<Option<Entity>> {
        const OP: &str = "get_entity";
        let touched = self
            .backend
            .touch_document(&entity_id(name), "readCount", "lastRead", Utc::now())
            .await
            .map_err(|e| GraphError::backend(OP, name, e))?;

        touched.map(|value| parse_entity(OP, name, value)).transpose()
    }

    /// Look up an entity by name without counting it as a read
    pub async fn peek_entity(&self, name: &str) -> GraphResult<Option<Entity>> {
        const OP: &str = "peek_entity";
        let found = self
            .backend
            .get_document(&entity_id(name))
            .await
            .map_err(|e| GraphError::backend(OP, name, e))?;

        found.map(|value| parse_entity(OP, name, value)).transpose()
    }

    /// Remove an entity. Relations naming it are kept.
    pub async fn delete_entity(&self, name: &str) -> GraphResult<bool> {
        let deleted = self
            .backend
            .delete_document(&entity_id(name))
            .await
            .map_err(|e| GraphError::backend("delete_entity", name, e))?;
        debug!(entity = %name, deleted, "delete entity");
        Ok(deleted)
    }

    /// Append observations to an existing entity
    pub async fn add_observations(
        &self,
        name: &str,
        observations: &[String],
    ) -> GraphResult<Option<Entity>> {
        let Some(entity) = self.peek_entity(name).await? else {
            return Ok(None);
        };

        let mut merged = entity.observations;
        merged.extend(observations.iter().cloned());
        let input = EntityInput::named(name).with_observations(merged);
        self.save_entity(&input).await.map(Some)
    }

    /// Set or clear the importance flag of an existing entity
    pub async fn mark_important(&self, name: &str, important: bool) -> GraphResult<Option<Entity>> {
        if self.peek_entity(name).await?.is_none() {
            return Ok(None);
        }
        let input = EntityInput::named(name).important(important);
        self.save_entity(&input).await.map(Some)
    }

    /// Create or replace the relation identified by its triple
    pub async fn save_relation(&self, relation: &Relation) -> GraphResult<Relation> {
        const OP: &str = "save_relation";
        let target = relation.key().to_string();
        relation
            .validate()
            .map_err(|message| GraphError::validation(OP, &target, message))?;

        let document = Document::Relation(relation.clone());
        self.backend
            .put_document(&document.id(), &to_value(OP, &target, &document)?)
            .await
            .map_err(|e| GraphError::backend(OP, &target, e))?;
        debug!(relation = %target, "saved relation");

        Ok(relation.clone())
    }

    pub async fn delete_relation(
        &self,
        from: &str,
        to: &str,
        relation_type: &str,
    ) -> GraphResult<bool> {
        self.backend
            .delete_document(&relation_id(from, relation_type, to))
            .await
            .map_err(|e| {
                GraphError::backend(
                    "delete_relation",
                    Relation::new(from, to, relation_type).key().to_string(),
                    e,
                )
            })
    }

    /// Every relation with either endpoint in `names`, ordered by triple
    pub async fn get_relations_for_entities(&self, names: &[String]) -> GraphResult<Vec<Relation>> {
        let found = self
            .relations_touching(names, "get_relations_for_entities")
            .await?;
        Ok(found.into_values().collect())
    }

    async fn relations_touching(
        &self,
        names: &[String],
        operation: &'static str,
    ) -> GraphResult<BTreeMap<RelationKey, Relation>> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }

        let target = names.join(", ");
        let filters = [
            Filter::term(TYPE_FIELD, DocumentKind::Relation.as_str()),
            Filter::Any(vec![
                Filter::terms("from", names.iter().cloned()),
                Filter::terms("to", names.iter().cloned()),
            ]),
        ];
        let documents = self
            .backend
            .scan(&filters)
            .await
            .map_err(|e| GraphError::backend(operation, &target, e))?;

        documents
            .into_iter()
            .map(|value| -> GraphResult<(RelationKey, Relation)> {
                let relation = parse_relation(operation, &target, value)?;
                Ok((relation.key(), relation))
            })
            .collect()
    }

    /// Breadth-first walk over relations in both directions.
    ///
    /// The origin is part of the result when it exists as an entity. Each
    /// level costs one relation lookup; the walk ends after `depth` levels or
    /// as soon as no unvisited name is left.
    pub async fn get_related_entities(&self, name: &str, depth: usize) -> GraphResult<RelatedEntities> {
        const OP: &str = "get_related_entities";
        if name.trim().is_empty() {
            return Err(GraphError::validation(OP, name, "entity name cannot be empty"));
        }

        let mut visited: HashSet<String> = HashSet::from([name.to_string()]);
        let mut reached = vec![name.to_string()];
        let mut frontier = vec![name.to_string()];
        let mut relations = BTreeMap::new();

        for level in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let found = self.relations_touching(&frontier, OP).await?;
            let mut next = Vec::new();
            for (key, relation) in found {
                for end in [&relation.from, &relation.to] {
                    if visited.insert(end.clone()) {
                        reached.push(end.clone());
                        next.push(end.clone());
                    }
                }
                relations.insert(key, relation);
            }
            debug!(origin = %name, level, discovered = next.len(), "traversal level");
            frontier = next;
        }

        let ids: Vec<String> = reached.iter().map(|n| entity_id(n)).collect();
        let entities = self
            .backend
            .get_documents(&ids)
            .await
            .map_err(|e| GraphError::backend(OP, name, e))?
            .into_iter()
            .map(|value| parse_entity(OP, name, value))
            .collect::<GraphResult<Vec<_>>>()?;

        Ok(RelatedEntities {
            entities,
            relations: relations.into_values().collect(),
        })
    }

    /// Ranked search over entities. Hits are not counted as reads.
    pub async fn search(&self, params: &SearchParams) -> GraphResult<SearchResults> {
        const OP: &str = "search";
        params
            .validate()
            .map_err(|message| GraphError::validation(OP, &params.query, message))?;

        let result = self
            .backend
            .query(&params.to_query())
            .await
            .map_err(|e| GraphError::backend(OP, &params.query, e))?;

        let hits = result
            .hits
            .into_iter()
            .map(|hit| -> GraphResult<SearchHit> {
                Ok(SearchHit {
                    entity: parse_entity(OP, &hit.id, hit.source)?,
                    score: hit.score,
                    highlights: hit.highlights,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;

        Ok(SearchResults {
            total: result.total,
            hits,
        })
    }

    /// Every stored entity and relation, unranked and uncapped
    pub async fn export_data(&self) -> GraphResult<Vec<Document>> {
        const OP: &str = "export_data";
        let documents = self
            .backend
            .scan(&[])
            .await
            .map_err(|e| GraphError::backend(OP, "*", e))?;

        documents
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(|e| GraphError::corrupt(OP, "*", e)))
            .collect()
    }

    /// Store a record exactly as given, including its reading statistics
    pub async fn restore_document(&self, document: &Document) -> GraphResult<()> {
        const OP: &str = "restore_document";
        let target = document.label();
        let valid = match document {
            Document::Entity(entity) => EntityInput::new(&entity.name, &entity.entity_type).validate(),
            Document::Relation(relation) => relation.validate(),
        };
        valid.map_err(|message| GraphError::validation(OP, &target, message))?;

        self.backend
            .put_document(&document.id(), &to_value(OP, &target, document)?)
            .await
            .map_err(|e| GraphError::backend(OP, &target, e))
    }

    pub async fn stats(&self) -> GraphResult<GraphStats> {
        let mut stats = GraphStats::default();
        for document in self.export_data().await? {
            match document {
                Document::Entity(entity) => {
                    stats.entity_count += 1;
                    *stats.entity_types.entry(entity.entity_type).or_default() += 1;
                }
                Document::Relation(relation) => {
                    stats.relation_count += 1;
                    *stats.relation_types.entry(relation.relation_type).or_default() += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Save each entity independently; a failing item does not stop the rest
    pub async fn save_entities(&self, inputs: &[EntityInput]) -> Vec<ItemOutcome<Entity>> {
        let mut outcomes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = self.save_entity(input).await;
            if let Err(e) = &result {
                warn!("failed to save entity: {}", e);
            }
            outcomes.push(ItemOutcome {
                target: input.name.clone(),
                result,
            });
        }
        outcomes
    }

    pub async fn delete_entities(&self, names: &[String]) -> Vec<ItemOutcome<bool>> {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let result = self.delete_entity(name).await;
            if let Err(e) = &result {
                warn!("failed to delete entity: {}", e);
            }
            outcomes.push(ItemOutcome {
                target: name.clone(),
                result,
            });
        }
        outcomes
    }

    pub async fn save_relations(&self, relations: &[Relation]) -> Vec<ItemOutcome<Relation>> {
        let mut outcomes = Vec::with_capacity(relations.len());
        for relation in relations {
            let result = self.save_relation(relation).await;
            if let Err(e) = &result {
                warn!("failed to save relation: {}", e);
            }
            outcomes.push(ItemOutcome {
                target: relation.key().to_string(),
                result,
            });
        }
        outcomes
    }
}
