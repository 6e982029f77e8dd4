//! Parser service client.

use reqwest::StatusCode;
use serde::Deserialize;

use super::{DocumentParser, ParseOutcome, ParseRequest};
use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Posts parse requests to a remote parser endpoint
#[derive(Clone)]
pub struct HttpDocumentParser {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpDocumentParser {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpDocumentParser")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpDocumentParser {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        Ok(Self {
            endpoint: normalize_endpoint(endpoint.into())?,
            token: normalize_text_option(token),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Build a client from config; `None` when no endpoint is configured
    pub fn from_config(config: &ParserConfig) -> Result<Option<Self>> {
        config
            .endpoint
            .clone()
            .map(|endpoint| Self::new(endpoint, config.access_token.clone()))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DocumentParser for HttpDocumentParser {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseOutcome> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Parser(parse_api_error(status, &body)));
        }

        let outcome = response.json::<ParseOutcome>().await?;
        if let Some(error) = &outcome.error {
            tracing::debug!(file_id = %request.file_id, "Parser reported: {error}");
        }
        Ok(outcome)
    }
}

#[derive(Debug, Deserialize)]
struct ParserErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ParserErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("parser endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "parser endpoint must include http:// or https://".to_string(),
        ))
    }
}
