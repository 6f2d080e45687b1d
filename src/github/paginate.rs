//! Link-header pagination over REST list endpoints.
//!
//! [`Pages`] is a lazy iterator: the first page is requested on the first call
//! to `next`, and each following page only once the previous one is drained.
//! A listing can only be restarted by building a new iterator.
//!
//! Failure handling depends on the page:
//!
//! - any status other than `200 OK` on the **first** page ends the sequence
//!   silently, so an empty listing (including a `204 No Content` answer) and an
//!   inaccessible one look the same;
//! - a non-success status on any **later** page yields an `Err` and ends the
//!   sequence.
//!
//! Transport and decoding errors are always yielded as `Err`. A `rel="next"`
//! link pointing outside the client's API origin is refused with an `Err`
//! rather than followed, so the token never leaves the API host.

use reqwest::StatusCode;
use reqwest::blocking::Response;
use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::{AuditError, Result};
use crate::github::GitHubClient;

/// Default page size requested from list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Pulls the item array out of a response body that nests it under a key.
pub type Extract = fn(Value) -> Option<Value>;

enum Cursor {
    First(String),
    Next(String),
    Done,
}

/// Lazy sequence of items from a paginated list endpoint.
pub struct Pages<'a, T> {
    client: &'a GitHubClient,
    cursor: Cursor,
    per_page: u32,
    extract: Option<Extract>,
    buffer: VecDeque<T>,
}

impl<'a, T: DeserializeOwned> Pages<'a, T> {
    /// Start a listing at an absolute URL.
    pub fn new(client: &'a GitHubClient, url: impl Into<String>) -> Self {
        Self {
            client,
            cursor: Cursor::First(url.into()),
            per_page: DEFAULT_PAGE_SIZE,
            extract: None,
            buffer: VecDeque::new(),
        }
    }

    /// Set the page size sent with the first request.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Read items from a nested member of each response body.
    pub fn extract(mut self, extract: Extract) -> Self {
        self.extract = Some(extract);
        self
    }

    fn fetch_first(&mut self, url: &str) -> Result<()> {
        let query = [("per_page", self.per_page.to_string()), ("page", "1".into())];
        let response = self.client.send_get(url, &query)?;

        if response.status() != StatusCode::OK {
            debug!(url, status = %response.status(), "listing unavailable, treating as empty");
            return Ok(());
        }

        self.load(url, response)
    }

    fn fetch_next(&mut self, url: &str) -> Result<()> {
        if !self.client.is_api_url(url) {
            return Err(AuditError::UnexpectedPayload {
                url: url.to_string(),
                message: format!("next page link leaves {}", self.client.base_url()),
            });
        }

        let response = self.client.send_get(url, &[])?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AuditError::GitHub {
                message: format!("page request to {} failed ({}): {}", url, status, body),
            });
        }

        self.load(url, response)
    }

    fn load(&mut self, url: &str, response: Response) -> Result<()> {
        let next = next_link(response.headers());
        let body: Value = response.json().map_err(|e| AuditError::UnexpectedPayload {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let items = match self.extract {
            Some(extract) => extract(body).ok_or_else(|| AuditError::UnexpectedPayload {
                url: url.to_string(),
                message: "item list not found in response".into(),
            })?,
            None => body,
        };

        let items: Vec<T> =
            serde_json::from_value(items).map_err(|e| AuditError::UnexpectedPayload {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        self.buffer.extend(items);
        if let Some(next) = next {
            self.cursor = Cursor::Next(next);
        }
        Ok(())
    }
}

impl<T: DeserializeOwned> Iterator for Pages<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            // Taking the cursor leaves the iterator finished unless the page
            // just loaded carried a next link.
            let fetched = match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Done => return None,
                Cursor::First(url) => self.fetch_first(&url),
                Cursor::Next(url) => self.fetch_next(&url),
            };

            if let Err(e) = fetched {
                self.buffer.clear();
                return Some(Err(e));
            }
        }
    }
}

impl GitHubClient {
    /// Iterate a list endpoint given as a path below the API root.
    pub fn paginate<T: DeserializeOwned>(&self, endpoint: &str) -> Pages<'_, T> {
        Pages::new(self, self.url(endpoint))
    }
}

/// Find the `rel="next"` target in `Link` response headers.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts
                .next()?
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')?;

            let is_next = parts.any(|param| match param.split_once('=') {
                Some((key, value)) => {
                    key.trim().eq_ignore_ascii_case("rel")
                        && value
                            .trim()
                            .trim_matches('"')
                            .split_whitespace()
                            .any(|rel| rel == "next")
                }
                None => false,
            });

            is_next.then(|| target.to_string())
        })
}
