//! Client for the consent server's extension endpoints.

use crate::error::ApiError;
use reqwest::{Client, Response, StatusCode, header};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// Used when a server url cannot be parsed.
pub const FALLBACK_APP_DOMAIN: &str = "openpims.de";

const REQUESTED_WITH: &str = "OpenPIMS-Extension";

/// Account details handed out by the setup endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupResponse {
    pub user_id: String,
    pub token: String,
    pub domain: String,
    pub email: Option<String>,
}

pub fn build_api_client() -> Client {
    build_api_client_with_timeout(30)
}

pub fn build_api_client_with_timeout(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Clone)]
pub struct SetupClient {
    http: Client,
    session_cookie: Option<String>,
}

impl Default for SetupClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupClient {
    pub fn new() -> Self {
        Self::with_client(build_api_client())
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            session_cookie: None,
        }
    }

    /// Send `cookie` verbatim as the `Cookie` header, standing in for the
    /// browser session the setup endpoint authenticates against.
    #[must_use]
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into()).filter(|c| !c.is_empty());
        self
    }

    fn endpoint(server_url: &str, path: &str) -> Result<Url, ApiError> {
        Url::parse(server_url)
            .and_then(|base| base.join(path))
            .map_err(|e| ApiError::InvalidUrl(format!("{server_url}: {e}")))
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .header("X-Requested-With", REQUESTED_WITH);
        match &self.session_cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    /// Fetch the logged-in account's credentials from the server.
    pub async fn auto_setup(&self, server_url: &str) -> Result<SetupResponse, ApiError> {
        let url = Self::endpoint(server_url, "/api/extension/setup")?;
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        let response = check_setup_status(response)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let parsed = parse_setup_response(&body);
        if let Err(e) = &parsed {
            tracing::warn!("Setup response from {server_url} rejected: {e}");
        }
        parsed
    }

    /// Ask the server whether `subdomain` is a valid identity host for `domain`.
    /// Any failure reads as "not valid".
    pub async fn verify_subdomain(&self, server_url: &str, subdomain: &str, domain: &str) -> bool {
        let Ok(url) = Self::endpoint(server_url, "/api/extension/verify") else {
            return false;
        };
        let mut request = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .header("X-Requested-With", REQUESTED_WITH)
            .json(&json!({ "subdomain": subdomain, "domain": domain }));
        if let Some(cookie) = &self.session_cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("Subdomain verification returned {}", response.status());
                return false;
            }
            Err(e) => {
                tracing::warn!("Error verifying subdomain: {e}");
                return false;
            }
        };
        match response.json::<Value>().await {
            Ok(body) => body.get("valid") == Some(&Value::Bool(true)),
            Err(e) => {
                tracing::warn!("Error verifying subdomain: {e}");
                false
            }
        }
    }

    /// Consent decisions the user made for `domain`, as the server returns them.
    pub async fn consent_status(
        &self,
        server_url: &str,
        user_id: &str,
        domain: &str,
    ) -> Option<Value> {
        let url = Self::endpoint(server_url, &format!("/api/extension/consent/{user_id}")).ok()?;
        let response = match self.get(url).query(&[("domain", domain)]).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!("Failed to get consent status: {}", response.status());
                return None;
            }
            Err(e) => {
                tracing::warn!("Error getting consent status: {e}");
                return None;
            }
        };
        response
            .json()
            .await
            .inspect_err(|e| tracing::warn!("Error getting consent status: {e}"))
            .ok()
    }
}

fn check_setup_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::NotLoggedIn,
        StatusCode::NOT_FOUND => ApiError::EndpointNotFound,
        s if s.is_server_error() => ApiError::Server(s.as_u16()),
        s => ApiError::Status(s.as_u16()),
    })
}

fn parse_setup_response(body: &Value) -> Result<SetupResponse, ApiError> {
    let user_id = match body.get("userId") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        _ => return Err(ApiError::InvalidResponse("missing userId".into())),
    };
    let required = |field: &str| {
        body.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| ApiError::InvalidResponse(format!("missing {field}")))
    };
    Ok(SetupResponse {
        user_id,
        token: required("token")?,
        domain: required("domain")?,
        email: body
            .get("email")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

/// Only absolute http(s) urls are accepted as server urls.
pub fn validate_server_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Hostname of a server url, [`FALLBACK_APP_DOMAIN`] when it cannot be parsed.
pub fn extract_domain(server_url: &str) -> String {
    Url::parse(server_url)
        .ok()
        .and_then(|url| url.host_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| FALLBACK_APP_DOMAIN.to_string())
}
