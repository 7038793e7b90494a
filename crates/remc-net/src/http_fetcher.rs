//! Real network access over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};
use url::Url;

use crate::{Fetcher, NetError, Request, Response, ResponseType};

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub user_agent: String,
    pub accept_language: String,
    /// Per-request timeout enforced by the client.
    pub default_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("remc-sw/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// [`Fetcher`] backed by a `reqwest` client.
///
/// Responses whose final URL shares `origin` are tagged `basic`, all
/// others `cors`.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: Url, config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(origin = %origin, "HttpFetcher initialized");

        Ok(Self {
            client,
            config,
            origin,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn map_send_error(&self, err: reqwest::Error) -> NetError {
        if err.is_timeout() {
            NetError::Timeout(self.config.default_timeout)
        } else if err.is_connect() {
            NetError::Offline(err.to_string())
        } else {
            NetError::HttpError(err)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching from network");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        builder = builder.header("Accept-Language", &self.config.accept_language);

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        let mut requested = request.url.clone();
        requested.set_fragment(None);
        let redirected = url != requested;
        let response_type = ResponseType::classify(&self.origin, &url);

        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;

        trace!(
            url = %url,
            status = %status,
            response_type = %response_type,
            redirected,
            body_len = body.len(),
            "Response received"
        );

        let mut out = Response::new(url, status)
            .with_body(body)
            .with_type(response_type)
            .with_redirected(redirected);
        out.headers = headers;
        Ok(out)
    }
}
