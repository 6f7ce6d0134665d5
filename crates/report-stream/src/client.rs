use std::sync::Arc;

use tracing::debug;

use crate::channel::ChannelTransport;
use crate::config::PipelineConfig;
use crate::errors::ReportError;
use crate::fallback::{FallbackController, ReportFetcher};
use crate::model::{ReportRequest, SessionId};
use crate::pipeline::{ReportPipeline, SessionHandle, SessionParts, spawn_session};
use crate::screen::Screen;
use crate::session::StreamSession;
use crate::transports::{HttpReportFetcher, WebSocketTransport};

pub(crate) struct ClientInner {
    config: PipelineConfig,
    transport: Arc<dyn ChannelTransport>,
    fetcher: Arc<dyn ReportFetcher>,
}

/// Entry point for starting report sessions against one backend.
#[derive(Clone)]
pub struct ReportClient {
    inner: Arc<ClientInner>,
}

impl ReportClient {
    pub fn builder() -> ReportClientBuilder {
        ReportClientBuilder::default()
    }

    /// Client for the backend described by `REPORT_STREAM_*` variables.
    pub fn from_env() -> Result<Self, ReportError> {
        Self::builder().config(PipelineConfig::from_env()?).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// A pipeline bound to one screen.
    pub fn pipeline(&self, screen: Arc<dyn Screen>) -> ReportPipeline {
        ReportPipeline::new(self.clone(), screen)
    }

    /// Starts a session for `request` under a fresh session id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_session(
        &self,
        request: ReportRequest,
        screen: Arc<dyn Screen>,
    ) -> Result<SessionHandle, ReportError> {
        request.validate()?;
        let request_json = request.to_json()?;
        let config = &self.inner.config;
        let id = SessionId::generate();
        debug!(session_id = %id, screen = screen.name(), "starting report session");

        let session = StreamSession::new(
            id,
            config.pacing.clone(),
            config.segment_max_chars,
            screen,
        );
        let fallback = FallbackController::new(
            self.inner.fetcher.clone(),
            request,
            config.fallback_notice,
        );
        Ok(spawn_session(SessionParts {
            session,
            transport: self.inner.transport.clone(),
            fallback,
            request_json,
            connect_timeout: config.connect_timeout,
            idle_timeout: config.idle_timeout,
        }))
    }
}

/// Builder for a `ReportClient`. Transports not set explicitly are derived
/// from the config.
#[derive(Default)]
pub struct ReportClientBuilder {
    config: Option<PipelineConfig>,
    transport: Option<Arc<dyn ChannelTransport>>,
    fetcher: Option<Arc<dyn ReportFetcher>>,
}

impl ReportClientBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the streaming channel (defaults to WebSocket).
    pub fn channel_transport(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the blocking fallback (defaults to HTTP).
    pub fn report_fetcher(mut self, fetcher: Arc<dyn ReportFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Result<ReportClient, ReportError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WebSocketTransport::new(
                config.ws_url.clone(),
                &config.session_header,
            )?),
        };
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpReportFetcher::new(
                config.query_url(),
                config.session_header.clone(),
                config.fallback_timeout,
            )?),
        };
        Ok(ReportClient {
            inner: Arc::new(ClientInner {
                config,
                transport,
                fetcher,
            }),
        })
    }
}
