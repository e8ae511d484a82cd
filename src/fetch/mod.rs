//! HTTP plumbing shared by the proxy and the arrival board.
//!
//! [`HttpClient`] is the seam: production code runs on [`BasicClient`],
//! wrappers such as [`auth::UrlParam`] decorate requests, and tests swap in
//! canned responses.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, bail};
use reqwest::header::{ACCEPT, HeaderValue};

/// Issues a GET for `url` and returns the body of a successful response.
///
/// # Errors
///
/// Fails on transport errors and on any non-2xx status, formatted as
/// `API Error: <code> <reason>`.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let mut req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);
    req.headers_mut()
        .insert(ACCEPT, HeaderValue::from_static("application/xml"));

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        bail!(
            "API Error: {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
    }
    Ok(resp.bytes().await?.to_vec())
}
