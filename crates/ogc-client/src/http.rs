//! HTTP access to OGC services.
//!
//! Requests go through the [`Fetch`] trait so the protocol code can be driven
//! by canned responses in tests. [`HttpClient`] is the reqwest implementation.

use crate::config::ClientConfig;
use crate::xml::{parse_document, root_name};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use tile_common::{CacheError, CacheResult};
use tracing::{debug, instrument};

/// Something that can GET a URL and return the body.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url`, failing on transport errors and non-success statuses.
    async fn fetch(&self, url: &str) -> CacheResult<Bytes>;
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client with the configured timeouts and user agent.
    pub fn new(config: &ClientConfig) -> CacheResult<Self> {
        config.validate().map_err(CacheError::Validation)?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| CacheError::validation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            // Servers often put an exception report in the error body.
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(status = %status, error = %e, "Failed to read error body");
                    Bytes::new()
                }
            };
            if let Some(message) = service_exception_message(&body) {
                return Err(CacheError::ServiceException(message));
            }
            return Err(CacheError::http(url, format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| request_error(url, e))?;
        debug!(bytes = body.len(), "Fetched");
        Ok(body)
    }
}

fn request_error(url: &str, err: reqwest::Error) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout(url.to_string())
    } else {
        CacheError::http(url, err.to_string())
    }
}

/// Fail with [`CacheError::ServiceException`] if `body` is an OGC exception
/// report.
///
/// WMS servers answer a bad GetMap with status 200 and an XML report, so
/// every response body passes through here before it is used.
pub fn check_service_exception(body: &[u8]) -> CacheResult<()> {
    match service_exception_message(body) {
        Some(message) => Err(CacheError::ServiceException(message)),
        None => Ok(()),
    }
}

/// Message of a `ServiceExceptionReport` or OWS `ExceptionReport` body.
pub fn service_exception_message(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.trim_start().starts_with('<') {
        return None;
    }

    let root = root_name(text)?;
    if root != "ServiceExceptionReport" && root != "ExceptionReport" {
        return None;
    }

    let Ok(document) = parse_document(text) else {
        return Some(format!("service returned {}", root));
    };

    let mut messages = Vec::new();
    for exception in document.find_all("ServiceException") {
        messages.push(with_code(exception.attr("code"), exception.text()));
    }
    for exception in document.find_all("Exception") {
        let text = exception
            .find_all("ExceptionText")
            .iter()
            .map(|t| t.text())
            .collect::<Vec<_>>()
            .join(" ");
        messages.push(with_code(exception.attr("exceptionCode"), &text));
    }

    messages.retain(|m| !m.is_empty());
    if messages.is_empty() {
        Some(format!("service returned {}", root))
    } else {
        Some(messages.join("; "))
    }
}

fn with_code(code: Option<&str>, text: &str) -> String {
    match (code, text.is_empty()) {
        (Some(code), false) => format!("{}: {}", code, text),
        (Some(code), true) => code.to_string(),
        (None, _) => text.to_string(),
    }
}

/// Append query parameters to a service address.
///
/// Parameters already present on `base` whose names match one of `params`
/// (case-insensitively, as OGC keys are) are replaced; others such as
/// `map=world` are kept in front.
pub fn build_url(base: &str, params: &[(&str, String)]) -> CacheResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| CacheError::invalid_parameter("url", format!("'{}': {}", base, e)))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(name, _)| name.eq_ignore_ascii_case(key)))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::capabilities;

    fn query(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_build_url_keeps_vendor_params() {
        let url = build_url(
            "https://maps.example.com/wms?map=world&service=WFS",
            &[("SERVICE", "WMS".to_string()), ("BBOX", "1,2,3,4".to_string())],
        )
        .unwrap();
        assert_eq!(
            query(&url),
            vec![
                ("map".to_string(), "world".to_string()),
                ("SERVICE".to_string(), "WMS".to_string()),
                ("BBOX".to_string(), "1,2,3,4".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_url_trailing_question_mark() {
        let url = build_url("https://tiles.example.com/wmts?", &[("A", "1".to_string())]).unwrap();
        assert_eq!(url, "https://tiles.example.com/wmts?A=1");
    }

    #[test]
    fn test_build_url_rejects_relative() {
        assert!(matches!(
            build_url("/wms", &[]),
            Err(CacheError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_service_exception_detection() {
        let message =
            service_exception_message(capabilities::SERVICE_EXCEPTION.as_bytes()).unwrap();
        assert_eq!(message, "LayerNotDefined: Unknown layer: nosuchlayer");

        let message = service_exception_message(capabilities::OWS_EXCEPTION.as_bytes()).unwrap();
        assert_eq!(message, "NoSuchCoverage: No such coverage: missing");

        assert!(service_exception_message(capabilities::WMS_130.as_bytes()).is_none());
        assert!(service_exception_message(&[0x89, b'P', b'N', b'G']).is_none());
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/wms", address)
    }

    #[tokio::test]
    async fn test_error_status_with_exception_body() {
        let body = capabilities::SERVICE_EXCEPTION;
        let response = format!(
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let url = serve_once(response.into_bytes()).await;

        let client = HttpClient::new(&ClientConfig::default()).unwrap();
        let err = client.fetch(&url).await.unwrap_err();
        assert!(matches!(err, CacheError::ServiceException(_)));
    }

    #[tokio::test]
    async fn test_error_status_with_truncated_body() {
        let response = b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial".to_vec();
        let url = serve_once(response).await;

        let client = HttpClient::new(&ClientConfig::default()).unwrap();
        match client.fetch(&url).await.unwrap_err() {
            CacheError::Http { message, .. } => assert!(message.contains("500")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_check_service_exception() {
        assert!(matches!(
            check_service_exception(capabilities::SERVICE_EXCEPTION.as_bytes()),
            Err(CacheError::ServiceException(_))
        ));
        assert!(check_service_exception(b"plain body").is_ok());
    }
}
