//! Sources of StopMonitoring feed documents.
//!
//! [`UpstreamClient`] talks to the transit API directly and holds the secret
//! key. [`ProxyFeedSource`] goes through this crate's own `/api/transit`
//! endpoint, which is how a client without the key gets feeds.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Method, Request, Url};
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::fetch::auth::UrlParam;
use crate::fetch::{HttpClient, fetch_bytes};

/// Anything that can produce the raw feed body for a stop.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, stop_code: u32, agency: &str) -> Result<Bytes>;
}

/// Direct client of the upstream StopMonitoring API.
pub struct UpstreamClient<C> {
    client: UrlParam<C>,
    base_url: String,
}

impl<C: HttpClient> UpstreamClient<C> {
    pub fn new(inner: C, base_url: &str, api_key: String) -> Self {
        Self {
            client: UrlParam::api_key(inner, api_key),
            base_url: base_url.to_string(),
        }
    }

    /// Fetches the StopMonitoring document for `stop_code` at `agency` and
    /// returns the body untouched.
    ///
    /// # Errors
    ///
    /// [`ProxyError::Upstream`] carrying the upstream status when it is not
    /// 2xx, [`ProxyError::Transport`] when the request itself fails.
    #[tracing::instrument(skip(self))]
    pub async fn stop_monitoring(&self, stop_code: &str, agency: &str) -> Result<Bytes, ProxyError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ProxyError::Transport(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("stopCode", stop_code)
            .append_pair("agency", agency);

        let mut req = Request::new(Method::GET, url);
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/xml"));

        let resp = self.client.execute(req).await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Upstream request failed");
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: format!("Request failed with status code {}", status.as_u16()),
            });
        }

        let body = resp.bytes().await?;
        debug!(bytes = body.len(), "Upstream feed received");
        Ok(body)
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for UpstreamClient<C> {
    async fn fetch_feed(&self, stop_code: u32, agency: &str) -> Result<Bytes> {
        Ok(self.stop_monitoring(&stop_code.to_string(), agency).await?)
    }
}

/// Fetches feeds through a running proxy at `base_url`.
pub struct ProxyFeedSource<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> ProxyFeedSource<C> {
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn transit_url(&self, stop_code: u32, agency: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/api/transit", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("stopCode", &stop_code.to_string())
            .append_pair("agency", agency);
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for ProxyFeedSource<C> {
    async fn fetch_feed(&self, stop_code: u32, agency: &str) -> Result<Bytes> {
        let url = self.transit_url(stop_code, agency)?;
        Ok(Bytes::from(fetch_bytes(&self.client, url.as_str()).await?))
    }
}
