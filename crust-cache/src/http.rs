//! REST transport over `reqwest`.
//!
//! Every model is served under its source path:
//!
//! | operation     | request                                    |
//! |---------------|--------------------------------------------|
//! | `get_one`     | `GET  {source}/Get/{id}`                   |
//! | `get_all`     | `GET  {source}/All`                        |
//! | `get_all_ids` | `GET  {source}/AllIds`                     |
//! | `list_by_ids` | `POST {source}/List` with an id array      |
//! | `save`        | `POST {source}/Save` with one record       |
//! | `save_all`    | `POST {source}/SaveAll` with a record array|
//! | `delete`      | `POST {source}/Delete/{id}`                |
//! | `get_index`   | `GET  {source}/Index/{kind}/{prop}/{spec}` |

use async_trait::async_trait;
use crust_model::ModelSchema;
use crust_types::RecordId;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{TransportError, TransportResult};
use crate::indexer::IndexKind;
use crate::transport::Transport;

/// HTTP client for the remote data service.
pub struct HttpTransport {
    config: HttpConfig,
    client: Client,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Builds a transport with its own connection pool.
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::unavailable(format!("failed to build client: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    /// Builds a transport around an existing client.
    pub fn with_client(config: HttpConfig, client: Client) -> Self {
        Self {
            config,
            client,
            token: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Sets or clears the bearer token sent with every request.
    pub async fn set_bearer_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// `{base_url}/{source}/{route..}`, each route segment percent-encoded.
    fn url(&self, model: &ModelSchema, route: &[&str]) -> TransportResult<Url> {
        let base = &self.config.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| TransportError::unavailable(format!("invalid base url {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::unavailable(format!("base url {base} cannot carry a path")))?
            .pop_if_empty()
            .extend(model.source().split('/').filter(|s| !s.is_empty()))
            .extend(route);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> TransportResult<reqwest::Response> {
        let request = match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::decode(e.to_string()))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TransportError::status(status.as_u16(), e.to_string()),
            None if e.is_decode() => TransportError::decode(e.to_string()),
            None => TransportError::network(e.to_string()),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_one(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<Value> {
        let url = self.url(model, &["Get", &id.to_string()])?;
        debug!("GET {}", url);
        self.fetch(self.client.get(url)).await
    }

    async fn get_all_ids(&self, model: &ModelSchema) -> TransportResult<Vec<Value>> {
        self.fetch(self.client.get(self.url(model, &["AllIds"])?)).await
    }

    async fn get_all(&self, model: &ModelSchema) -> TransportResult<Vec<Value>> {
        self.fetch(self.client.get(self.url(model, &["All"])?)).await
    }

    async fn list_by_ids(
        &self,
        model: &ModelSchema,
        ids: &[RecordId],
    ) -> TransportResult<Vec<Value>> {
        debug!("POST {} List ({} ids)", model.source(), ids.len());
        self.fetch(self.client.post(self.url(model, &["List"])?).json(ids))
            .await
    }

    async fn save(&self, model: &ModelSchema, record: Value) -> TransportResult<Value> {
        self.fetch(self.client.post(self.url(model, &["Save"])?).json(&record))
            .await
    }

    async fn save_all(
        &self,
        model: &ModelSchema,
        records: Vec<Value>,
    ) -> TransportResult<Vec<Value>> {
        self.fetch(self.client.post(self.url(model, &["SaveAll"])?).json(&records))
            .await
    }

    async fn delete(&self, model: &ModelSchema, id: &RecordId) -> TransportResult<()> {
        let url = self.url(model, &["Delete", &id.to_string()])?;
        self.send(self.client.post(url))
            .await
            .map(drop)
    }

    async fn get_index(
        &self,
        model: &ModelSchema,
        kind: IndexKind,
        property: &str,
        spec: &str,
    ) -> TransportResult<Vec<Value>> {
        let url = self.url(model, &["Index", kind.as_str(), property, spec])?;
        debug!("GET {}", url);
        self.fetch(self.client.get(url)).await
    }
}
