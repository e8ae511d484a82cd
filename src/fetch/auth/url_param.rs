use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that appends a secret as a URL query parameter.
///
/// The upstream StopMonitoring API takes its key as `api_key=<key>`; the
/// wrapped request never carries it before this layer, so callers and logs
/// upstream of the wrapper never see the secret.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    /// Wraps `inner` so every request carries `api_key=<key>`.
    pub fn api_key(inner: C, key: String) -> Self {
        Self {
            inner,
            param_name: "api_key".to_string(),
            key,
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.0.lock().unwrap().push(req.url().to_string());
            Ok(reqwest::Response::from(
                axum::http::Response::builder().status(200).body("").unwrap(),
            ))
        }
    }

    #[tokio::test]
    async fn test_appends_api_key() {
        let client = UrlParam::api_key(Recorder::default(), "s3cret".to_string());
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://api.511.org/transit/StopMonitoring?stopCode=14366&agency=SF"
                .parse()
                .unwrap(),
        );
        client.execute(req).await.unwrap();

        let urls = client.inner.0.lock().unwrap();
        assert_eq!(
            urls[0],
            "https://api.511.org/transit/StopMonitoring?stopCode=14366&agency=SF&api_key=s3cret"
        );
    }
}
