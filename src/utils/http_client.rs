use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{AppError, AppResult, SourceError};
use crate::utils::url::UrlUtils;
use crate::utils::{CompressionFormat, DecompressionService};

/// HTTP client trait that transparently decompresses downloaded content
#[async_trait]
pub trait DecompressingHttpClient: Send + Sync {
    /// Fetch URL and return raw decompressed bytes
    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>>;

    /// Fetch URL and return decompressed text content
    async fn fetch_text(&self, url: &str) -> AppResult<String> {
        let bytes = self.fetch_bytes(url).await?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::source_error(format!("Failed to decode content as UTF-8: {e}")))
    }
}

/// Default implementation of DecompressingHttpClient using reqwest
#[derive(Clone)]
pub struct StandardHttpClient {
    client: Client,
}

impl StandardHttpClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration, user_agent: &str) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Send a JSON request and decode a JSON response
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&B>,
    ) -> AppResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!("{} {}", method, UrlUtils::obfuscate_credentials(url));

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| Self::transport_error(e, url))?;
        let bytes = Self::checked_body(response, url).await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Source(SourceError::parse(
                "http_client",
                format!("Failed to parse JSON from {}: {e}", UrlUtils::obfuscate_credentials(url)),
            ))
        })
    }

    fn transport_error(e: reqwest::Error, url: &str) -> AppError {
        if e.is_timeout() {
            return AppError::Source(SourceError::Timeout {
                url: UrlUtils::obfuscate_credentials(url),
            });
        }
        AppError::ExternalService {
            service: "http_client".to_string(),
            message: UrlUtils::obfuscate_credentials(&e.to_string()),
        }
    }

    async fn checked_body(response: Response, url: &str) -> AppResult<bytes::Bytes> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Source(SourceError::Http {
                status: status.as_u16(),
                message: if body.is_empty() {
                    format!(
                        "{} - URL: {}",
                        status.canonical_reason().unwrap_or("Unknown"),
                        UrlUtils::obfuscate_credentials(url)
                    )
                } else {
                    body
                },
            }));
        }

        response
            .bytes()
            .await
            .map_err(|e| AppError::source_error(format!("Failed to read response: {e}")))
    }
}

#[async_trait]
impl DecompressingHttpClient for StandardHttpClient {
    async fn fetch_bytes(&self, url: &str) -> AppResult<Vec<u8>> {
        debug!("Fetching content from: {}", UrlUtils::obfuscate_credentials(url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(e, url))?;
        let bytes = Self::checked_body(response, url).await?;

        let compression_format = DecompressionService::detect_compression_format(&bytes);
        let decompressed = match compression_format {
            CompressionFormat::Uncompressed => bytes.to_vec(),
            _ => DecompressionService::decompress(bytes)
                .map_err(|e| AppError::source_error(format!("Failed to decompress content: {e}")))?,
        };

        debug!(
            "Fetched {} bytes of content (compression: {:?})",
            decompressed.len(),
            compression_format
        );
        Ok(decompressed)
    }
}
