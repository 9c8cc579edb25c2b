//! Upstream tile fetching.

use crate::cache::types::CacheError;
use crate::cache::validate::is_valid_tile;
use crate::log::Logger;
use crate::{log_debug, log_error, log_warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// User-Agent for upstream requests. Some tile servers reject requests
/// without one.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Issues a single upstream GET per miss and validates the response.
///
/// The fetcher substitutes `{s}`, `{x}`, `{y}`, `{z}` and `{apiKey}` in
/// the configured URL template (first occurrence each), merges the full
/// inbound query onto the outbound URL and, when configured, forwards
/// the inbound headers. Anything other than `200 OK`, and any body that
/// fails the PNG signature check, is a failure. There are no retries.
pub struct OriginFetcher {
    url_scheme: String,
    api_key: String,
    forward_headers: bool,
    client: reqwest::Client,
    logger: Arc<dyn Logger>,
    log_prefix: String,
}

impl OriginFetcher {
    /// Create a fetcher with the given template and request deadline.
    pub fn new(
        url_scheme: String,
        api_key: String,
        forward_headers: bool,
        timeout: Duration,
        logger: Arc<dyn Logger>,
        log_prefix: String,
    ) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| CacheError::InvalidConfig(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            url_scheme,
            api_key,
            forward_headers,
            client,
            logger,
            log_prefix,
        })
    }

    /// Build the outbound URL by substituting the template placeholders.
    ///
    /// Substitutes the first occurrence of each placeholder. When the
    /// template carries `{apiKey}` but no key is configured a warning is
    /// logged and the empty string is substituted anyway.
    pub fn build_url(&self, x: &str, y: &str, z: &str, s: &str) -> String {
        if self.url_scheme.contains("{apiKey}") && self.api_key.trim().is_empty() {
            log_warn!(
                self.logger,
                "{}: Trying to replace {{apiKey}}, but no API key is configured!",
                self.log_prefix
            );
        }

        self.url_scheme
            .replacen("{s}", s, 1)
            .replacen("{x}", x, 1)
            .replacen("{y}", y, 1)
            .replacen("{z}", z, 1)
            .replacen("{apiKey}", &self.api_key, 1)
    }

    /// Fetch one tile from the origin.
    ///
    /// `req_prefix` is the request-id prefix used to correlate log lines.
    pub async fn fetch(
        &self,
        req_prefix: &str,
        x: &str,
        y: &str,
        z: &str,
        s: &str,
        query: &HashMap<String, String>,
        inbound_headers: &[(String, String)],
    ) -> Result<Vec<u8>, CacheError> {
        let url = self.build_url(x, y, z, s);

        let mut request = self.client.get(&url);

        if self.forward_headers {
            for (name, value) in inbound_headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        if !query.is_empty() {
            let pairs: Vec<(&str, &str)> = query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            request = request.query(&pairs);
        }

        log_debug!(
            self.logger,
            "{}: {req_prefix}Requesting tile from {url}",
            self.log_prefix
        );

        let response = request.send().await.map_err(|e| {
            log_error!(
                self.logger,
                "{}: Could not request tile, reason: {e}",
                self.log_prefix
            );
            CacheError::OriginRequest(e.to_string())
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            log_error!(
                self.logger,
                "{}: Could not request tile, bad status code: {}",
                self.log_prefix,
                status.as_u16()
            );
            return Err(CacheError::OriginStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| {
                log_error!(
                    self.logger,
                    "{}: Could not read response body, reason: {e}",
                    self.log_prefix
                );
                CacheError::OriginRequest(e.to_string())
            })?
            .to_vec();

        log_debug!(
            self.logger,
            "{}: {req_prefix}Received {} Bytes from {url}",
            self.log_prefix,
            body.len()
        );

        if !is_valid_tile(&body) {
            let shown = body.len().min(20);
            log_debug!(
                self.logger,
                "{}: {req_prefix}Invalid response body received. First {shown} bytes: {:?}",
                self.log_prefix,
                &body[..shown]
            );
            return Err(CacheError::InvalidTile);
        }

        Ok(body)
    }
}
