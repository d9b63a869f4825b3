//! HTTP client for the search index RPC endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use tracing::{debug, error, info};

use curric_core::{
    defaults, CurriculumConfig, Error, IndexDocument, IndexPage, IndexQuery, Result, SearchIndex,
    TagId, TagName,
};

/// One kind of index call: its endpoint and the code reported on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Create,
    Query,
    Search,
    Update,
    AddParents,
    RemoveParents,
    HideParents,
}

impl IndexOp {
    pub fn path(&self) -> &'static str {
        match self {
            IndexOp::Create => "/rpc/add_curriculum_tag",
            IndexOp::Query => "/rpc/get_tags",
            IndexOp::Search => "/rpc/search_tags",
            IndexOp::Update => "/rpc/update_curriculum_tag",
            IndexOp::AddParents | IndexOp::RemoveParents | IndexOp::HideParents => {
                "/rpc/manage_parent_tags"
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            IndexOp::Create => "createTagIndexError",
            IndexOp::Query | IndexOp::Search => "getTagsIndexError",
            IndexOp::Update => "updateTagIndexError",
            IndexOp::AddParents => "addParentTagsIndexError",
            IndexOp::RemoveParents => "removeParentTagsIndexError",
            IndexOp::HideParents => "hideParentTagsIndexError",
        }
    }

    /// Body field carrying the parent list for `manage_parent_tags`.
    fn parents_field(&self) -> Option<&'static str> {
        match self {
            IndexOp::AddParents => Some("add"),
            IndexOp::RemoveParents => Some("remove"),
            IndexOp::HideParents => Some("hide"),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            IndexOp::Create => "create",
            IndexOp::Query => "query",
            IndexOp::Search => "search",
            IndexOp::Update => "update",
            IndexOp::AddParents => "add_parents",
            IndexOp::RemoveParents => "remove_parents",
            IndexOp::HideParents => "hide_parents",
        }
    }
}

#[derive(Debug, Serialize)]
struct UpdateTagBody<'a> {
    id: TagId,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
    #[serde(rename = "name", skip_serializing_if = "<[TagName]>::is_empty")]
    names: &'a [TagName],
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<Vec<Option<Number>>>,
    #[serde(default)]
    total: Option<Number>,
}

/// Search index reached over HTTP.
#[derive(Clone)]
pub struct HttpSearchIndex {
    client: Client,
    base_url: String,
}

impl HttpSearchIndex {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create index HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        info!(
            subsystem = "index",
            component = "http",
            base_url = %base_url,
            timeout_secs = timeout.as_secs(),
            "Initializing search index client"
        );
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &CurriculumConfig) -> Result<Self> {
        Self::new(
            config.index_url.clone(),
            Duration::from_secs(config.index_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(&self, op: IndexOp, body: &B) -> Result<Vec<u8>> {
        let start = Instant::now();
        let url = format!("{}{}", self.base_url, op.path());

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(
                    subsystem = "index",
                    component = "http",
                    op = op.name(),
                    error = %e,
                    "Index request failed"
                );
                Error::Index(op.error_code().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                subsystem = "index",
                component = "http",
                op = op.name(),
                status = status.as_u16(),
                body = %body,
                "Index returned an error status"
            );
            return Err(Error::Index(op.error_code().to_string()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|_| Error::Index(op.error_code().to_string()))?;

        debug!(
            subsystem = "index",
            component = "http",
            op = op.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Index request complete"
        );
        Ok(bytes.to_vec())
    }

    async fn manage_parents(&self, op: IndexOp, id: TagId, parents: &[String]) -> Result<()> {
        let Some(field) = op.parents_field() else {
            return Err(Error::internal(op.error_code()));
        };
        if parents.is_empty() {
            debug!(
                subsystem = "index",
                component = "http",
                op = op.name(),
                tag_id = id,
                "No parents to send"
            );
            return Ok(());
        }
        self.post(op, &manage_parents_body(field, id, parents))
            .await
            .map(|_| ())
    }
}

fn manage_parents_body(field: &str, id: TagId, parents: &[String]) -> Value {
    let mut body = Map::new();
    body.insert("id".to_string(), json!(id));
    body.insert(field.to_string(), json!(parents));
    Value::Object(body)
}

fn number_to_id(n: &Number) -> Option<TagId> {
    n.as_i64().or_else(|| n.as_f64().map(|f| f as TagId))
}

/// Decode a `{data: [ids], total}` response.
fn parse_page(op: IndexOp, bytes: &[u8]) -> Result<IndexPage> {
    let response: QueryResponse = serde_json::from_slice(bytes)
        .map_err(|_| Error::Index(format!("{}Response", op.error_code())))?;

    let mut ids = Vec::new();
    for value in response.data.unwrap_or_default().into_iter().flatten() {
        let id = number_to_id(&value)
            .ok_or_else(|| Error::Index(format!("{}Response", op.error_code())))?;
        ids.push(id);
    }
    let total = response.total.as_ref().and_then(number_to_id).unwrap_or(0);
    Ok(IndexPage { ids, total })
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn upsert_tag(&self, doc: &IndexDocument) -> Result<()> {
        info!(
            subsystem = "index",
            component = "http",
            op = "create",
            tag_id = doc.id,
            parent_count = doc.parents.len(),
            "Upserting index document"
        );
        self.post(IndexOp::Create, doc).await.map(|_| ())
    }

    async fn query_tags(&self, query: &IndexQuery) -> Result<IndexPage> {
        let mut query = query.clone();
        if query.limit == 0 {
            query.limit = defaults::DEFAULT_QUERY_LIMIT;
        }
        let op = if query.text.is_some() {
            IndexOp::Search
        } else {
            IndexOp::Query
        };
        let bytes = self.post(op, &query).await?;
        parse_page(op, &bytes)
    }

    async fn update_tag(&self, id: TagId, deleted: Option<bool>, names: &[TagName]) -> Result<()> {
        if deleted.is_none() && names.is_empty() {
            return Ok(());
        }
        let body = UpdateTagBody { id, deleted, names };
        self.post(IndexOp::Update, &body).await.map(|_| ())
    }

    async fn add_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        self.manage_parents(IndexOp::AddParents, id, parents).await
    }

    async fn remove_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        self.manage_parents(IndexOp::RemoveParents, id, parents).await
    }

    async fn hide_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        self.manage_parents(IndexOp::HideParents, id, parents).await
    }
}
