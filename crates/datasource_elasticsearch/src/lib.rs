//! Elasticsearch backend.
//!
//! Index mappings become tables, `_search` executes translated SELECTs.
pub mod errors;
pub mod mapping;
pub mod search;
pub mod translate;

use async_trait::async_trait;
use errors::{ElasticsearchError, Result};
use gateway_core::backend::{Backend, BackendRequest, BackendResponse, NativeField};
use gateway_core::classify::SelectStatement;
use gateway_core::errors::Result as GatewayResult;
use gateway_core::schema::Table;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

/// Backend-type tag used in schema configuration.
pub const BACKEND_TYPE: &str = "elasticsearch";

#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    client: reqwest::Client,
    /// Size used for searches without a LIMIT.
    max_rows: u64,
}

impl ElasticsearchBackend {
    pub fn try_new(max_rows: u64) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(ElasticsearchBackend { client, max_rows })
    }

    /// Build `{address}/{segments...}`.
    fn endpoint(address: &str, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(address)?;
        url.path_segments_mut()
            .map_err(|_| ElasticsearchError::InvalidAddress(address.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        trace!(%url, "GET");
        let res = self.client.get(url.clone()).send().await?;
        Self::json_response(url, res).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value> {
        trace!(%url, %body, "POST");
        let res = self.client.post(url.clone()).json(body).send().await?;
        Self::json_response(url, res).await
    }

    async fn json_response(url: Url, res: reqwest::Response) -> Result<Value> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await?;
            return Err(ElasticsearchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl Backend for ElasticsearchBackend {
    fn backend_type(&self) -> &str {
        BACKEND_TYPE
    }

    async fn list_tables(&self, address: &str) -> GatewayResult<Vec<String>> {
        let url = Self::endpoint(address, &["_aliases"])?;
        let body = self.get_json(url).await?;
        let tables = mapping::parse_aliases(&body)?;
        debug!(%address, num_tables = tables.len(), "listed indices");
        Ok(tables)
    }

    async fn table_metadata(&self, address: &str, table: &str) -> GatewayResult<Vec<NativeField>> {
        let url = Self::endpoint(address, &[table, "_mapping"])?;
        let body = self.get_json(url).await?;
        Ok(mapping::parse_mapping(table, &body)?)
    }

    fn translate(&self, table: &Table, select: &SelectStatement) -> GatewayResult<BackendRequest> {
        let body = translate::translate_select(table, select, self.max_rows)?;
        Ok(BackendRequest {
            table: table.name.clone(),
            body,
        })
    }

    async fn execute(
        &self,
        address: &str,
        request: &BackendRequest,
    ) -> GatewayResult<BackendResponse> {
        let url = Self::endpoint(address, &[request.table.as_str(), "_search"])?;
        let body = self.post_json(url, &request.body).await?;
        Ok(search::parse_search_response(&request.table, &body)?)
    }
}
