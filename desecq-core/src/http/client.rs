//! Thin REST façade over the service, generalised from the teacher's
//! single-resource `Client`/`ZoneClient` split into one client that owns
//! every resource family named in §4.1/§6.

use std::time::Duration;

use reqwest::header;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ResponseError};
use crate::model::{
    AccountInfo, ApiRequest, CreatedToken, Method, RRset, Token, TokenPolicy, Zone,
};

use super::rate_limit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://desec.io/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: u64 = 30;

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    limiter: RateLimiter,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: &str, rate: f64) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|e| ApiError::Network(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("desecq/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(ApiClient {
            base_url: base_url.into(),
            http,
            limiter: RateLimiter::new(rate),
        })
    }

    pub fn set_rate(&self, rate: f64) {
        self.limiter.set_rate(rate);
    }

    pub fn adapt_rate_limit(&self, retry_after: u64) {
        self.limiter.adapt_rate_limit(retry_after);
    }

    /// Issue `req` after waiting for the rate limiter's turn, and classify
    /// the response per §4.1. This is the only place that talks to the
    /// network; every typed helper below goes through it.
    pub async fn dispatch(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        self.limiter.wait_turn().await;

        let url = format!("{}{}", self.base_url, req.path);
        debug!(method = req.method.as_str(), %url, "dispatching request");

        let mut builder = match req.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Patch => self.http.patch(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            if status.as_u16() == 204 {
                return Ok(Value::Null);
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::Storage(crate::error::StorageError::Serde(e)));
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.bytes().await.ok();
            let parsed: Option<ResponseError> = body
                .as_ref()
                .and_then(|b| serde_json::from_slice(b).ok());
            let retry_after = retry_after
                .or_else(|| {
                    body.as_ref()
                        .and_then(|b| serde_json::from_slice::<Value>(b).ok())
                        .and_then(|v| v.get("retry_after").and_then(Value::as_u64))
                })
                .unwrap_or(DEFAULT_RETRY_AFTER);
            let message = parsed
                .as_ref()
                .map(|p| p.message(""))
                .unwrap_or_else(|| "rate limited".to_string());
            warn!(retry_after, "rate limited by service");
            return Err(ApiError::RateLimited {
                retry_after,
                message,
                body: body
                    .as_ref()
                    .and_then(|b| serde_json::from_slice(b).ok()),
            });
        }

        let body = response.bytes().await.unwrap_or_default();
        let body_text = String::from_utf8_lossy(&body).to_string();
        let parsed: ResponseError = serde_json::from_slice(&body).unwrap_or_default();
        let message = parsed.message(&body_text);

        match status.as_u16() {
            401 => Err(ApiError::Unauthenticated),
            403 => Err(ApiError::Forbidden(message)),
            400..=499 => Err(ApiError::Conflict {
                status: status.as_u16(),
                message,
            }),
            _ => Err(ApiError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }

    // -- Zones ------------------------------------------------------

    pub async fn list_zones(&self) -> Result<Vec<Zone>, ApiError> {
        let value = self.dispatch(&ApiRequest::new(Method::Get, "/domains/")).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn get_zone(&self, name: &str) -> Result<Zone, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Get, format!("/domains/{name}/")))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn create_zone(&self, name: &str) -> Result<Zone, ApiError> {
        let body = serde_json::json!({ "name": name });
        let value = self
            .dispatch(&ApiRequest::new(Method::Post, "/domains/").with_body(body))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn delete_zone(&self, name: &str) -> Result<(), ApiError> {
        self.dispatch(&ApiRequest::new(Method::Delete, format!("/domains/{name}/")))
            .await?;
        Ok(())
    }

    // -- RRsets -------------------------------------------------------

    pub async fn list_rrsets(&self, zone: &str) -> Result<Vec<RRset>, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Get, format!("/domains/{zone}/rrsets/")))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn create_rrset(
        &self,
        zone: &str,
        subname: &str,
        record_type: &str,
        ttl: u32,
        records: &[String],
    ) -> Result<RRset, ApiError> {
        let body = serde_json::json!({
            "subname": subname,
            "type": record_type,
            "ttl": ttl,
            "records": records,
        });
        let value = self
            .dispatch(&ApiRequest::new(Method::Post, format!("/domains/{zone}/rrsets/")).with_body(body))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn update_rrset(
        &self,
        zone: &str,
        subname: &str,
        record_type: &str,
        patch: Value,
    ) -> Result<RRset, ApiError> {
        let path = rrset_path(zone, subname, record_type);
        let value = self
            .dispatch(&ApiRequest::new(Method::Patch, path).with_body(patch))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn delete_rrset(&self, zone: &str, subname: &str, record_type: &str) -> Result<(), ApiError> {
        let path = rrset_path(zone, subname, record_type);
        self.dispatch(&ApiRequest::new(Method::Delete, path)).await?;
        Ok(())
    }

    pub async fn bulk_put_rrsets(&self, zone: &str, rrsets: &[RRset]) -> Result<Vec<RRset>, ApiError> {
        let body = serde_json::to_value(rrsets).map_err(|e| ApiError::Storage(e.into()))?;
        let value = self
            .dispatch(&ApiRequest::new(Method::Put, format!("/domains/{zone}/rrsets/")).with_body(body))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    // -- Account --------------------------------------------------------

    pub async fn get_account(&self) -> Result<AccountInfo, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Get, "/auth/account/"))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    // -- Tokens -----------------------------------------------------------

    pub async fn list_tokens(&self) -> Result<Vec<Token>, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Get, "/auth/tokens/"))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn create_token(&self, attrs: Value) -> Result<CreatedToken, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Post, "/auth/tokens/").with_body(attrs))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn get_token(&self, id: &str) -> Result<Token, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Get, format!("/auth/tokens/{id}/")))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn update_token(&self, id: &str, patch: Value) -> Result<Token, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(Method::Patch, format!("/auth/tokens/{id}/")).with_body(patch))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn delete_token(&self, id: &str) -> Result<(), ApiError> {
        self.dispatch(&ApiRequest::new(Method::Delete, format!("/auth/tokens/{id}/")))
            .await?;
        Ok(())
    }

    // -- Token policies -------------------------------------------------

    pub async fn list_policies(&self, token: &str) -> Result<Vec<TokenPolicy>, ApiError> {
        let value = self
            .dispatch(&ApiRequest::new(
                Method::Get,
                format!("/auth/tokens/{token}/policies/rrsets/"),
            ))
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn create_policy(&self, token: &str, attrs: Value) -> Result<TokenPolicy, ApiError> {
        let value = self
            .dispatch(
                &ApiRequest::new(Method::Post, format!("/auth/tokens/{token}/policies/rrsets/"))
                    .with_body(attrs),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn update_policy(&self, token: &str, id: &str, patch: Value) -> Result<TokenPolicy, ApiError> {
        let value = self
            .dispatch(
                &ApiRequest::new(
                    Method::Patch,
                    format!("/auth/tokens/{token}/policies/rrsets/{id}/"),
                )
                .with_body(patch),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Storage(e.into()))
    }

    pub async fn delete_policy(&self, token: &str, id: &str) -> Result<(), ApiError> {
        self.dispatch(&ApiRequest::new(
            Method::Delete,
            format!("/auth/tokens/{token}/policies/rrsets/{id}/"),
        ))
        .await?;
        Ok(())
    }
}

fn rrset_path(zone: &str, subname: &str, record_type: &str) -> String {
    format!("/domains/{zone}/rrsets/{subname}/{record_type}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client() {
        let client = ApiClient::new(DEFAULT_BASE_URL, "secret", 5.0);
        assert!(client.is_ok());
    }
}
