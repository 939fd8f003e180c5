//! Hosted backend gateway over the PostgREST API (`/rest/v1`).

use crate::{summarize_response_body, Filter, Gateway, GatewayError, GatewayResult, Query, Record};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

/// PostgREST client for the insights tables and procedures.
#[derive(Clone)]
pub struct SupabaseGateway {
    http_client: reqwest::Client,
    api_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseGateway {
    /// Create a new gateway.
    ///
    /// # Arguments
    /// * `api_url` - The project URL (e.g., `https://xyz.supabase.co`)
    /// * `anon_key` - The anonymous API key
    pub fn new(api_url: Url, anon_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, anon_key)
    }

    /// Create a gateway sharing an existing HTTP client.
    pub fn with_client(http_client: reqwest::Client, api_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_url: with_trailing_slash(api_url),
            anon_key: anon_key.into(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Build the REST URL for a table or `rpc/<name>`.
    fn rest_url(&self, path: &str) -> GatewayResult<Url> {
        Ok(self.api_url.join(&format!("rest/v1/{path}"))?)
    }

    fn query_url(&self, collection: &str, params: &[(String, String)]) -> GatewayResult<Url> {
        let mut url = self.rest_url(collection)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// Bearer credential: the user's access token, else the anonymous key.
    fn bearer(&self) -> String {
        self.access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    /// Check HTTP response for errors.
    async fn check_response(
        &self,
        response: reqwest::Response,
        collection: &str,
    ) -> GatewayResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let err = GatewayError::from_response(status, &body, collection);
        if err.is_not_provisioned() || err.is_not_found() {
            debug!(status, collection, kind = %err.kind(), "Backend request missed");
        } else {
            error!(
                status,
                collection,
                body = %summarize_response_body(&body),
                "Backend request failed"
            );
        }
        Err(err)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl Gateway for SupabaseGateway {
    async fn read(&self, collection: &str, query: &Query) -> GatewayResult<Vec<Record>> {
        let url = self.query_url(collection, &query.to_params())?;
        debug!(collection, "Reading records");
        let response = self.request(Method::GET, url).send().await?;
        let response = self.check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    async fn read_one(&self, collection: &str, filter: &Filter) -> GatewayResult<Record> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter.to_params());
        let url = self.query_url(collection, &params)?;
        debug!(collection, "Reading single record");
        let response = self
            .request(Method::GET, url)
            .header("Accept", SINGLE_OBJECT)
            .send()
            .await?;
        let response = self.check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    async fn write(&self, collection: &str, record: Record) -> GatewayResult<Record> {
        let url = self.rest_url(collection)?;
        debug!(collection, "Inserting record");
        let response = self
            .request(Method::POST, url)
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&record)
            .send()
            .await?;
        let response = self.check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: Record,
    ) -> GatewayResult<Vec<Record>> {
        let url = self.query_url(collection, &filter.to_params())?;
        debug!(collection, "Updating records");
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&patch)
            .send()
            .await?;
        let response = self.check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> GatewayResult<Vec<Record>> {
        let url = self.query_url(collection, &filter.to_params())?;
        debug!(collection, "Deleting records");
        let response = self
            .request(Method::DELETE, url)
            .header("Prefer", RETURN_REPRESENTATION)
            .send()
            .await?;
        let response = self.check_response(response, collection).await?;
        Ok(response.json().await?)
    }

    async fn call(&self, procedure: &str, args: Value) -> GatewayResult<Value> {
        let path = format!("rpc/{procedure}");
        let url = self.rest_url(&path)?;
        debug!(procedure, "Calling remote procedure");
        let response = self.request(Method::POST, url).json(&args).send().await?;
        let response = self.check_response(response, &path).await?;
        // Void functions answer 204 with no body.
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn set_access_token(&self, access_token: Option<String>) {
        *self.access_token.write() = access_token;
    }
}

impl std::fmt::Debug for SupabaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseGateway")
            .field("api_url", &self.api_url.as_str())
            .field("signed_in", &self.access_token.read().is_some())
            .finish_non_exhaustive()
    }
}
