use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::external::backend::{
    DocumentBackend, DocumentQuery, Filter, QueryHit, QueryResult, SortKey,
};
use crate::external::error::{BackendError, BackendResult};

const SCROLL_KEEP_ALIVE: &str = "1m";
const SCROLL_PAGE_SIZE: usize = 500;

const INCREMENT_SCRIPT: &str = "if (ctx._source[params.counter] == null) { \
     ctx._source[params.counter] = 1; \
     } else { ctx._source[params.counter] += 1; } \
     ctx._source[params.timestamp] = params.at;";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    pub node: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
}

impl ElasticConfig {
    /// Get the validated URL of the Elasticsearch node
    pub fn get_url(&self) -> BackendResult<Url> {
        let node = if self.node.starts_with("http://") || self.node.starts_with("https://") {
            self.node.clone()
        } else {
            format!("http://{}", self.node)
        };

        let url = Url::parse(&node)
            .map_err(|e| BackendError::ConfigError(format!("Invalid URL: {}", e)))?;
        if url.cannot_be_a_base() {
            return Err(BackendError::ConfigError(format!("Invalid URL: {}", node)));
        }

        Ok(url)
    }

    /// Credentials are only sent when both parts are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            node: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            index: "knowledge-graph".to_string(),
        }
    }
}

/// Elasticsearch REST client holding the whole graph in one index
pub struct ElasticBackend {
    client: Client,
    base: Url,
    config: ElasticConfig,
}

impl ElasticBackend {
    /// Create a new client with the given configuration. No request is made.
    pub fn new(config: ElasticConfig) -> BackendResult<Self> {
        let base = config.get_url()?;
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    pub fn index(&self) -> &str {
        &self.config.index
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::ConfigError(format!("Invalid base URL: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, action: &str, id: &str, params: &[(&str, &str)]) -> BackendResult<Url> {
        let mut url = self.endpoint(&[&self.config.index, action, id])?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> BackendResult<(StatusCode, Value)> {
        debug!(%method, %url, "elasticsearch request");

        let mut request = self.client.request(method, url);
        if let Some((user, pass)) = self.config.credentials() {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::ConnectionError(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::ConnectionError(e.to_string()))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(_) if !status.is_success() => Value::String(text),
                Err(e) => return Err(BackendError::DecodeError(e.to_string())),
            }
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(error_reason(&body, status)));
        }

        Ok((status, body))
    }
}

fn error_type(body: &Value) -> Option<&str> {
    body.pointer("/error/type").and_then(Value::as_str)
}

fn error_reason(body: &Value, status: StatusCode) -> String {
    body.pointer("/error/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| body.as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string())
}

fn request_error(status: StatusCode, body: &Value) -> BackendError {
    BackendError::RequestError {
        status: status.as_u16(),
        reason: error_reason(body, status),
    }
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn render_filter(filter: &Filter) -> Value {
    match filter {
        Filter::Term { field, value } => json!({ "term": keyed(field, value.clone()) }),
        Filter::Terms { field, values } => {
            json!({ "terms": keyed(field, Value::Array(values.clone())) })
        }
        Filter::Any(filters) => json!({
            "bool": {
                "should": filters.iter().map(render_filter).collect::<Vec<_>>(),
                "minimum_should_match": 1
            }
        }),
    }
}

fn render_sort(key: &SortKey) -> Value {
    match key {
        SortKey::Score => json!({ "_score": { "order": "desc" } }),
        SortKey::Field { field, order } => {
            keyed(field, json!({ "order": order.as_str(), "missing": "_last" }))
        }
    }
}

fn filter_query(filters: &[Filter]) -> Value {
    if filters.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "filter": filters.iter().map(render_filter).collect::<Vec<_>>() } })
    }
}

/// Translate a query into the Elasticsearch search DSL
pub(crate) fn render_query(query: &DocumentQuery) -> Value {
    let must = match query.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => json!({
            "simple_query_string": {
                "query": text,
                "fields": query
                    .text_fields
                    .iter()
                    .map(|(field, boost)| format!("{}^{}", field, boost))
                    .collect::<Vec<_>>(),
                "default_operator": "or"
            }
        }),
        _ => json!({ "match_all": {} }),
    };

    let mut body = json!({
        "query": {
            "bool": {
                "must": [must],
                "filter": query.filters.iter().map(render_filter).collect::<Vec<_>>()
            }
        },
        "size": query.size,
        "track_total_hits": true,
        "track_scores": true
    });

    if !query.sort.is_empty() {
        body["sort"] = Value::Array(query.sort.iter().map(render_sort).collect());
    }

    if query.highlight {
        let fields: Map<String, Value> = query
            .text_fields
            .iter()
            .map(|(field, _)| (field.clone(), json!({})))
            .collect();
        body["highlight"] = json!({
            "pre_tags": ["<em>"],
            "post_tags": ["</em>"],
            "fields": fields
        });
    }

    body
}

fn parse_query_result(body: &Value) -> BackendResult<QueryResult> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::DecodeError("search response without hits".to_string()))?;

    let total = body
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .or_else(|| body.pointer("/hits/total").and_then(Value::as_u64))
        .unwrap_or(hits.len() as u64);

    let hits = hits
        .iter()
        .map(|hit| QueryHit {
            id: hit
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: hit.get("_score").and_then(Value::as_f64),
            source: hit.get("_source").cloned().unwrap_or(Value::Null),
            highlights: hit
                .get("highlight")
                .and_then(|h| serde_json::from_value(h.clone()).ok())
                .unwrap_or_default(),
        })
        .collect();

    Ok(QueryResult { total, hits })
}

fn take_hit_sources(page: &mut Value) -> Vec<Value> {
    match page.pointer_mut("/hits/hits").map(Value::take) {
        Some(Value::Array(hits)) => hits
            .into_iter()
            .filter_map(|mut hit| hit.get_mut("_source").map(Value::take))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl DocumentBackend for ElasticBackend {
    async fn ensure_index(&self, mappings: &Value) -> BackendResult<bool> {
        let url = self.endpoint(&[&self.config.index])?;
        let (status, body) = self.send(Method::HEAD, url.clone(), None).await?;
        if status.is_success() {
            return Ok(false);
        }
        if status != StatusCode::NOT_FOUND {
            return Err(request_error(status, &body));
        }

        let (status, body) = self
            .send(Method::PUT, url, Some(&json!({ "mappings": mappings })))
            .await?;
        if status.is_success() {
            info!(index = %self.config.index, "created index");
            return Ok(true);
        }
        // Another process created it between the two requests
        if error_type(&body) == Some("resource_already_exists_exception") {
            return Ok(false);
        }
        Err(request_error(status, &body))
    }

    async fn drop_index(&self) -> BackendResult<bool> {
        let url = self.endpoint(&[&self.config.index])?;
        let (status, body) = self.send(Method::DELETE, url, None).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(request_error(status, &body)),
        }
    }

    async fn put_document(&self, id: &str, document: &Value) -> BackendResult<()> {
        let url = self.document_url("_doc", id, &[("refresh", "true")])?;
        let (status, body) = self.send(Method::PUT, url, Some(document)).await?;
        if !status.is_success() {
            return Err(request_error(status, &body));
        }
        Ok(())
    }

    async fn merge_document(
        &self,
        id: &str,
        partial: &Value,
        upsert: Option<Value>,
    ) -> BackendResult<Option<Value>> {
        let url = self.document_url("_update", id, &[("refresh", "true"), ("_source", "true")])?;
        let mut request = json!({ "doc": partial });
        if let Some(upsert) = upsert {
            request["upsert"] = upsert;
        }
        let (status, mut body) = self.send(Method::POST, url, Some(&request)).await?;
        if status.is_success() {
            return body
                .pointer_mut("/get/_source")
                .map(|source| Some(source.take()))
                .ok_or_else(|| {
                    BackendError::DecodeError("update response without _source".to_string())
                });
        }
        if status == StatusCode::NOT_FOUND
            && error_type(&body) == Some("document_missing_exception")
        {
            return Ok(None);
        }
        Err(request_error(status, &body))
    }

    async fn get_document(&self, id: &str) -> BackendResult<Option<Value>> {
        let url = self.document_url("_doc", id, &[])?;
        let (status, mut body) = self.send(Method::GET, url, None).await?;
        if status.is_success() {
            return Ok(body.get_mut("_source").map(Value::take));
        }
        // A missing document answers 404 without an error object; a missing index does not
        if status == StatusCode::NOT_FOUND && error_type(&body).is_none() {
            return Ok(None);
        }
        Err(request_error(status, &body))
    }

    async fn get_documents(&self, ids: &[String]) -> BackendResult<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(&[&self.config.index, "_mget"])?;
        let (status, mut body) = self
            .send(Method::POST, url, Some(&json!({ "ids": ids })))
            .await?;
        if !status.is_success() {
            return Err(request_error(status, &body));
        }

        match body.get_mut("docs").map(Value::take) {
            Some(Value::Array(docs)) => Ok(docs
                .into_iter()
                .filter(|doc| doc.get("found").and_then(Value::as_bool) == Some(true))
                .filter_map(|mut doc| doc.get_mut("_source").map(Value::take))
                .collect()),
            _ => Err(BackendError::DecodeError("mget response without docs".to_string())),
        }
    }

    async fn touch_document(
        &self,
        id: &str,
        counter: &str,
        timestamp: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>> {
        let url = self.document_url("_update", id, &[("refresh", "true"), ("_source", "true")])?;
        let request = json!({
            "script": {
                "source": INCREMENT_SCRIPT,
                "lang": "painless",
                "params": { "counter": counter, "timestamp": timestamp, "at": at }
            }
        });
        let (status, mut body) = self.send(Method::POST, url, Some(&request)).await?;
        if status.is_success() {
            return body
                .pointer_mut("/get/_source")
                .map(|source| Some(source.take()))
                .ok_or_else(|| {
                    BackendError::DecodeError("update response without _source".to_string())
                });
        }
        if status == StatusCode::NOT_FOUND
            && error_type(&body) == Some("document_missing_exception")
        {
            return Ok(None);
        }
        Err(request_error(status, &body))
    }

    async fn delete_document(&self, id: &str) -> BackendResult<bool> {
        let url = self.document_url("_doc", id, &[("refresh", "true")])?;
        let (status, body) = self.send(Method::DELETE, url, None).await?;
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND && error_type(&body).is_none() {
            return Ok(false);
        }
        Err(request_error(status, &body))
    }

    async fn query(&self, query: &DocumentQuery) -> BackendResult<QueryResult> {
        let url = self.endpoint(&[&self.config.index, "_search"])?;
        let (status, body) = self
            .send(Method::POST, url, Some(&render_query(query)))
            .await?;
        if !status.is_success() {
            return Err(request_error(status, &body));
        }
        parse_query_result(&body)
    }

    async fn scan(&self, filters: &[Filter]) -> BackendResult<Vec<Value>> {
        let mut url = self.endpoint(&[&self.config.index, "_search"])?;
        url.query_pairs_mut().append_pair("scroll", SCROLL_KEEP_ALIVE);
        let request = json!({
            "query": filter_query(filters),
            "size": SCROLL_PAGE_SIZE,
            "sort": ["_doc"]
        });

        let (status, mut page) = self.send(Method::POST, url, Some(&request)).await?;
        if !status.is_success() {
            return Err(request_error(status, &page));
        }

        let scroll_url = self.endpoint(&["_search", "scroll"])?;
        let mut scroll_id = page
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut documents = Vec::new();

        let outcome = loop {
            let sources = take_hit_sources(&mut page);
            if sources.is_empty() {
                break Ok(());
            }
            documents.extend(sources);

            let Some(id) = scroll_id.clone() else {
                break Ok(());
            };
            let request = json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": id });
            let (status, next) = match self
                .send(Method::POST, scroll_url.clone(), Some(&request))
                .await
            {
                Ok(response) => response,
                Err(e) => break Err(e),
            };
            if !status.is_success() {
                break Err(request_error(status, &next));
            }
            if let Some(id) = next.get("_scroll_id").and_then(Value::as_str) {
                scroll_id = Some(id.to_string());
            }
            page = next;
        };

        if let Some(id) = scroll_id {
            let request = json!({ "scroll_id": [id] });
            if let Err(e) = self.send(Method::DELETE, scroll_url, Some(&request)).await {
                debug!("failed to clear scroll context: {}", e);
            }
        }

        outcome.map(|_| documents)
    }
}
