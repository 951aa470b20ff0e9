//! Remote conversion service adapter.
//!
//! Posts the document to a hosted conversion endpoint as multipart form
//! data and decodes the JSON envelope it answers with. This is the second
//! candidate in the PDF fallback plan: it only runs when the local pdfium
//! path has already failed, and it is the path of last resort, so its
//! errors are the ones users actually see for broken PDF setups.

use crate::adapters::{resize_svg, Adapter, Converted, ProgressFn};
use crate::error::ConvertError;
use crate::format::Format;
use crate::options::ConversionOptions;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Service response envelope.
#[derive(Debug, Deserialize)]
struct RemoteResponse {
    success: bool,
    data: Option<RemotePayload>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemotePayload {
    /// Base64-encoded converted document.
    data: String,
    #[allow(dead_code)]
    size: Option<u64>,
}

/// Client for a hosted PDF conversion endpoint.
pub struct RemoteAdapter {
    endpoint: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl RemoteAdapter {
    pub fn new(endpoint: String, timeout_secs: u64) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConvertError::AdapterUnavailable {
                adapter: "remote",
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint,
            client,
            timeout_secs,
        })
    }
}

fn request_error(e: reqwest::Error, timeout_secs: u64) -> ConvertError {
    if e.is_timeout() {
        ConvertError::Timeout { secs: timeout_secs }
    } else {
        ConvertError::Network {
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl Adapter for RemoteAdapter {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn convert(
        &self,
        input: &[u8],
        options: &ConversionOptions,
        progress: &ProgressFn,
    ) -> Result<Converted, ConvertError> {
        progress(0.1);

        let file = reqwest::multipart::Part::bytes(input.to_vec())
            .file_name("document.pdf")
            .mime_str(Format::Pdf.mime_type())
            .map_err(|e| ConvertError::Internal(format!("multipart part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("page", options.page.to_string())
            .text("scale", options.scale.to_string())
            .text("outputFormat", Format::Svg.as_str());
        progress(0.2);

        debug!(endpoint = %self.endpoint, "posting document to conversion service");
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConvertError::Network {
                reason: format!("conversion service returned HTTP {status}"),
            });
        }
        progress(0.7);

        let envelope: RemoteResponse = response
            .json()
            .await
            .map_err(|e| request_error(e, self.timeout_secs))?;
        let payload = match envelope {
            RemoteResponse {
                success: true,
                data: Some(payload),
                ..
            } => payload,
            RemoteResponse { error, .. } => {
                return Err(ConvertError::ConversionFailed {
                    message: error.unwrap_or_else(|| "Remote conversion failed".into()),
                });
            }
        };

        let mut data = BASE64
            .decode(payload.data.as_bytes())
            .map_err(|e| ConvertError::ConversionFailed {
                message: format!("Conversion service returned undecodable payload: {e}"),
            })?;
        progress(0.9);

        if let Ok(text) = std::str::from_utf8(&data) {
            data = resize_svg(text, options).into_bytes();
        }
        progress(1.0);
        Ok(Converted {
            data,
            mime_type: Format::Svg.mime_type(),
        })
    }
}
