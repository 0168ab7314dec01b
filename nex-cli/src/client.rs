use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::Config;
use crate::types::*;

/// Sent on every request; the registry counts manifest fetches from this agent as downloads.
pub const USER_AGENT: &str = concat!("nex/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the registry REST API
pub struct RegistryClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base: config.registry_base().to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or("Not logged in. Run 'nex login <token>' first.")?;
        Ok(req.header("x-auth-token", token))
    }

    async fn read<T: DeserializeOwned>(resp: Response) -> Result<ApiResponse<T>> {
        let status = resp.status();
        let body: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| format!("Unexpected response from registry ({}): {}", status, e))?;
        if !status.is_success() || !body.success {
            let reason = body
                .error
                .unwrap_or_else(|| format!("Registry returned {}", status));
            return Err(reason.into());
        }
        Ok(body)
    }

    async fn read_data<T: DeserializeOwned>(resp: Response) -> Result<T> {
        Self::read::<T>(resp)
            .await?
            .data
            .ok_or_else(|| "Registry response had no data".into())
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<PackageSummary>> {
        let resp = self
            .http
            .get(self.url("/api/packages"))
            .query(&[("search", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        Self::read_data(resp).await
    }

    pub async fn info(&self, id: &str) -> Result<PackageInfo> {
        let resp = self
            .http
            .get(self.url(&format!("/api/packages/{}/info", id)))
            .send()
            .await?;
        Self::read_data(resp).await
    }

    /// Fetch the manifest document. Counts as a download on the registry.
    pub async fn manifest(&self, id: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(&format!("/api/packages/{}", id)))
            .send()
            .await?;
        Self::read_data(resp).await
    }

    pub async fn versions(&self, id: &str) -> Result<Vec<VersionSummary>> {
        let resp = self
            .http
            .get(self.url(&format!("/api/packages/{}/versions", id)))
            .send()
            .await?;
        Self::read_data(resp).await
    }

    pub async fn version_manifest(&self, id: &str, version: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(&format!("/api/packages/{}/versions/{}", id, version)))
            .send()
            .await?;
        let found: Value = Self::read_data(resp).await?;
        Ok(found.get("manifest").cloned().unwrap_or(Value::Null))
    }

    /// Count a download without fetching the current manifest. A pinned
    /// `version` is credited instead of the latest one.
    pub async fn track_download(&self, id: &str, version: Option<&str>) -> Result<u64> {
        let mut req = self
            .http
            .post(self.url(&format!("/api/packages/{}/download", id)));
        if let Some(version) = version {
            req = req.query(&[("version", version)]);
        }
        let resp = req
            .send()
            .await?;
        let count: Value = Self::read_data(resp).await?;
        Ok(count.get("downloads").and_then(Value::as_u64).unwrap_or(0))
    }

    pub async fn publish(&self, manifest: &Value) -> Result<PublishResult> {
        let req = self.authed(self.http.post(self.url("/api/packages")))?;
        let resp = req.json(manifest).send().await?;
        Self::read_data(resp).await
    }

    pub async fn submit_review(
        &self,
        id: &str,
        rating: u8,
        title: Option<&str>,
        comment: Option<&str>,
    ) -> Result<String> {
        let req = self.authed(
            self.http
                .post(self.url(&format!("/api/packages/{}/reviews", id))),
        )?;
        let body = json!({ "rating": rating, "title": title, "comment": comment });
        let resp = req.json(&body).send().await?;
        let read = Self::read::<Value>(resp).await?;
        Ok(read.message.unwrap_or_else(|| "Review saved".to_string()))
    }

    pub async fn delete_review(&self, id: &str) -> Result<String> {
        let req = self.authed(
            self.http
                .delete(self.url(&format!("/api/packages/{}/reviews", id))),
        )?;
        let read = Self::read::<Value>(req.send().await?).await?;
        Ok(read.message.unwrap_or_else(|| "Review deleted".to_string()))
    }
}
