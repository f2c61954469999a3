use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Deserialize;

/// Relay to the external fax-sending backend. The backend owns RingCentral
/// authentication and the plan-to-fax-number mapping; we only hand it the
/// stored PDF's URL and report back what it said.
pub struct FaxClient {
    http: reqwest::Client,
    api_url: Option<String>,
}

#[derive(Debug)]
pub enum RelayOutcome {
    Sent {
        message: String,
    },
    Failed {
        status: u16,
        error: String,
        details: Option<serde_json::Value>,
    },
}

#[derive(Debug, Deserialize)]
struct BackendResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    error: Option<String>,
    details: Option<serde_json::Value>,
}

impl FaxClient {
    pub fn new(api_url: Option<String>) -> anyhow::Result<Self> {
        let api_url = api_url.or_else(|| std::env::var("FAX_API_URL").ok());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build fax http client")?;
        Ok(Self { http, api_url })
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some()
    }

    pub async fn relay(&self, pdf_url: &str) -> anyhow::Result<RelayOutcome> {
        let api_url = self.api_url.as_deref().ok_or_else(|| {
            anyhow!("Fax backend not configured (set --fax-api-url or FAX_API_URL)")
        })?;

        tracing::info!("Relaying fax request for {} -> {}", pdf_url, api_url);

        let resp = self
            .http
            .post(api_url)
            .json(&serde_json::json!({ "pdfUrl": pdf_url }))
            .send()
            .await
            .with_context(|| format!("POST {api_url}"))?;

        let status = resp.status();
        let body: BackendResponse = resp
            .json()
            .await
            .unwrap_or(BackendResponse {
                success: false,
                message: None,
                error: Some("Unparseable fax backend response".to_string()),
                details: None,
            });

        if status.is_success() && body.success {
            return Ok(RelayOutcome::Sent {
                message: body
                    .message
                    .unwrap_or_else(|| "Fax sent successfully".to_string()),
            });
        }

        let upstream = if status.is_success() {
            // 200 with success=false still counts as a backend failure.
            500
        } else {
            status.as_u16()
        };
        Ok(RelayOutcome::Failed {
            status: upstream,
            error: body
                .error
                .unwrap_or_else(|| "Backend error occurred".to_string()),
            details: body.details,
        })
    }
}
