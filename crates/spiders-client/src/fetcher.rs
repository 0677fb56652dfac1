use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use spiders_core::error::AppError;
use spiders_core::traits::{FetchRequest, Fetcher};
use url::Url;

const USER_AGENT: &str = "spiders/0.1";

/// HTTP fetcher using reqwest.
///
/// Every fetch builds its own client with idle pooling disabled, so no
/// connection outlives the request that opened it. Proxied requests dial
/// through the URL in [`FetchRequest::proxy`] (SOCKS5 via reqwest's
/// `socks` feature).
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher;

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self
    }

    fn client_for(request: &FetchRequest) -> Result<Client, AppError> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request.timeout)
            .connect_timeout(request.timeout)
            .pool_max_idle_per_host(0);

        if let Some(proxy_url) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy_url.as_str())
                .map_err(|e| AppError::ConfigError(format!("invalid proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, AppError> {
        validate_url(&request.url)?;
        let headers = header_map(request)?;
        let client = Self::client_for(request)?;
        let timeout_secs = request.timeout.as_secs();

        tracing::debug!(url = %request.url, proxy = ?request.proxy, "GET");

        let response = client
            .get(&request.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(timeout_secs)
            } else {
                AppError::HttpError(format!("Failed to read response body: {e}"))
            }
        })
    }
}

/// Only absolute `http`/`https` URLs are fetched.
fn validate_url(url: &str) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::InvalidUrl(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}

fn header_map(request: &FetchRequest) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::ConfigError(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| AppError::ConfigError(format!("invalid value for header {name}: {e}")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
