use std::time::Duration;

use tracing::debug;

use crate::errors::{FallbackError, ReportError};
use crate::fallback::ReportFetcher;
use crate::model::{ReportPayload, ReportRequest, SessionId};

/// Blocking report request over HTTP: `POST {base}/api/query`.
pub struct HttpReportFetcher {
    client: reqwest::Client,
    url: String,
    session_header: String,
}

impl HttpReportFetcher {
    pub fn new(
        url: impl Into<String>,
        session_header: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            session_header: session_header.into(),
        })
    }
}

#[async_trait::async_trait]
impl ReportFetcher for HttpReportFetcher {
    async fn fetch(
        &self,
        session_id: &SessionId,
        request: &ReportRequest,
    ) -> Result<ReportPayload, FallbackError> {
        debug!(session_id = %session_id, url = %self.url, "sending blocking report request");
        let response = self
            .client
            .post(&self.url)
            .header(self.session_header.as_str(), session_id.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| FallbackError::Transport(format!("report request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(FallbackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FallbackError::Transport(format!("failed to read report body: {e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| FallbackError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let fetcher = HttpReportFetcher::new(
            "http://127.0.0.1:9/api/query",
            "X-Session-Id",
            Duration::from_secs(2),
        )
        .expect("fetcher");
        let err = fetcher
            .fetch(&SessionId::from("s"), &ReportRequest::new("q"))
            .await
            .expect_err("no server");
        assert!(matches!(err, FallbackError::Transport(_)));
    }
}
