//! GitHub API client.

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::{AuditConfig, DEFAULT_API_URL};
use crate::error::{AuditError, Result};

/// Client for the GitHub REST and GraphQL APIs.
///
/// The token is attached to every request as a bearer credential. Pagination
/// links are only followed when they stay on the API origin (see
/// [`GitHubClient::is_api_url`]).
#[derive(Clone)]
pub struct GitHubClient {
    pub(crate) base_url: String,
    pub(crate) graphql_url: String,
    pub(crate) client: Client,
}

impl GitHubClient {
    /// Create a client for the public GitHub API.
    pub fn new(token: &str) -> Result<Self> {
        let graphql_url = format!("{}/graphql", DEFAULT_API_URL);
        Self::with_endpoints(token, DEFAULT_API_URL, &graphql_url)
    }

    /// Create a client from a resolved run configuration.
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        Self::with_endpoints(&config.token, &config.api_url, &config.graphql_url)
    }

    /// Create a client for custom REST and GraphQL endpoints.
    pub fn with_endpoints(token: &str, base_url: &str, graphql_url: &str) -> Result<Self> {
        let client = Client::builder()
            .default_headers(Self::headers(token)?)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            graphql_url: graphql_url.to_string(),
            client,
        })
    }

    /// Default headers for API requests.
    fn headers(token: &str) -> Result<HeaderMap> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuditError::InvalidConfig("token contains invalid characters".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-audit"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Absolute URL for an API endpoint path such as `/orgs/acme/repos`.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Whether `url` has the same scheme, host and port as the REST API root.
    pub(crate) fn is_api_url(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(target)) => base.origin() == target.origin(),
            _ => false,
        }
    }

    /// Send a GET request and hand back the raw response, whatever its status.
    pub(crate) fn send_get(&self, url: &str, query: &[(&str, String)]) -> Result<Response> {
        Ok(self.client.get(url).query(query).send()?)
    }

    /// Status code of a GET request, used by presence probes.
    pub(crate) fn status(&self, endpoint: &str) -> Result<StatusCode> {
        Ok(self.send_get(&self.url(endpoint), &[])?.status())
    }

    /// Make a GET request to the REST API, failing on a non-success status.
    pub(crate) fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(endpoint);
        let response = self.send_get(&url, &[])?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AuditError::GitHub {
                message: format!("API request to {} failed ({}): {}", url, status, body),
            });
        }

        response.json().map_err(|e| AuditError::UnexpectedPayload {
            url,
            message: e.to_string(),
        })
    }

    /// Execute a GraphQL query with structured variables and return its `data`.
    ///
    /// A payload without a `data` member is an error; any `errors` reported by
    /// the server are carried in its message.
    pub(crate) fn graphql<V: Serialize>(&self, query: &str, variables: &V) -> Result<Value> {
        #[derive(Serialize)]
        struct Request<'a, V> {
            query: &'a str,
            variables: &'a V,
        }

        let response = self
            .client
            .post(&self.graphql_url)
            .json(&Request { query, variables })
            .send()?;

        let status = response.status();
        let mut payload: Value = response.json().map_err(|e| AuditError::GraphQl {
            message: format!("unreadable response ({}): {}", status, e),
        })?;

        let data = payload.get_mut("data").map(Value::take);
        match data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(AuditError::GraphQl {
                message: format!(
                    "response ({}) has no data: {}",
                    status,
                    payload.get("errors").unwrap_or(&payload)
                ),
            }),
        }
    }

    /// Get the REST API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the GraphQL endpoint.
    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }
}
