use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::Row;
use crate::health::HealthProbe;

/// Reply from the non-streaming `POST /chat` fallback.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Row>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply from direct SQL execution.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct SqlReply {
    pub data: Vec<Row>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// One column of a table description.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
    #[serde(default)]
    pub column_default: Option<String>,
}

/// Reply from `GET /tables/{name}`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct TableDetail {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

/// Reply from `GET /sample/{name}`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct SampleReply {
    pub table: String,
    pub data: Vec<Row>,
}

#[derive(serde::Deserialize)]
struct SchemaReply {
    schema: String,
}

#[derive(serde::Deserialize)]
struct TablesReply {
    tables: Vec<String>,
}

#[derive(serde::Deserialize)]
struct HealthReply {
    message: String,
}

#[derive(serde::Deserialize)]
struct DetailReply {
    detail: String,
}

/// REST surface of the backend: everything except the event stream.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// One-shot question: `POST /chat`.
    pub async fn chat(&self, message: &str) -> Result<ChatReply, ClientError> {
        self.post_json("/chat", &serde_json::json!({ "message": message }))
            .await
    }

    /// Direct SQL execution: `POST /api/sql`.
    pub async fn run_sql(&self, sql: &str) -> Result<SqlReply, ClientError> {
        self.post_json("/api/sql", &serde_json::json!({ "sql": sql }))
            .await
    }

    /// Full schema dump: `GET /schema`.
    pub async fn schema(&self) -> Result<String, ClientError> {
        let reply: SchemaReply = self.get_json("/schema").await?;
        Ok(reply.schema)
    }

    /// Table names: `GET /tables`.
    pub async fn tables(&self) -> Result<Vec<String>, ClientError> {
        let reply: TablesReply = self.get_json("/tables").await?;
        Ok(reply.tables)
    }

    /// Column-level description of one table: `GET /tables/{name}`.
    pub async fn describe_table(&self, table: &str) -> Result<TableDetail, ClientError> {
        self.get_json(&format!("/tables/{table}")).await
    }

    /// Sample rows from one table: `GET /sample/{name}?limit=N`.
    pub async fn sample(&self, table: &str, limit: Option<u32>) -> Result<SampleReply, ClientError> {
        let mut path = format!("/sample/{table}");
        if let Some(limit) = limit {
            path.push_str(&format!("?limit={limit}"));
        }
        self.get_json(&path).await
    }

    /// Reachability check: `GET /`; returns the backend's status message.
    pub async fn health(&self) -> Result<String, ClientError> {
        let reply: HealthReply = self.get_json("/").await?;
        Ok(reply.message)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.config.route(path))
            .send()
            .await
            .map_err(|e| ClientError::request(None, e.to_string()))?;
        read_reply(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        debug!(path, "POST");
        let response = self
            .http
            .post(self.config.route(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::request(None, e.to_string()))?;
        read_reply(response).await
    }
}

async fn read_reply<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::request(
            Some(status.as_u16()),
            error_message_from_body(&body),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::protocol_msg(format!("unexpected response shape: {e}")))
}

/// Failure bodies carry `{"detail": …}`; fall back to the raw text.
fn error_message_from_body(body: &str) -> String {
    match serde_json::from_str::<DetailReply>(body) {
        Ok(reply) => reply.detail,
        Err(_) if body.trim().is_empty() => "<empty body>".to_string(),
        Err(_) => body.to_string(),
    }
}

#[async_trait::async_trait]
impl HealthProbe for Client {
    async fn probe(&self) -> Result<String, ClientError> {
        self.health().await
    }
}
