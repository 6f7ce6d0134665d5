use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::{ChannelError, FallbackError, ReportError};
use crate::model::{ReportPayload, ReportRequest, SessionId};
use crate::session::StreamSession;

/// Issues the one-shot blocking report request.
#[async_trait::async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch(
        &self,
        session_id: &SessionId,
        request: &ReportRequest,
    ) -> Result<ReportPayload, FallbackError>;
}

/// The in-flight blocking call, polled by the session task alongside playback.
pub type FallbackCall =
    Pin<Box<dyn Future<Output = Result<ReportPayload, FallbackError>> + Send + 'static>>;

pub const FALLBACK_NOTICE: &str = "Live updates unavailable, switching to standard mode";

/// Recovers a session whose channel failed before a terminal event by
/// issuing exactly one blocking request with the same payload.
pub struct FallbackController {
    fetcher: Arc<dyn ReportFetcher>,
    request: ReportRequest,
    notice: bool,
}

impl FallbackController {
    pub fn new(fetcher: Arc<dyn ReportFetcher>, request: ReportRequest, notice: bool) -> Self {
        Self {
            fetcher,
            request,
            notice,
        }
    }

    /// Starts the fallback unless the session is already decided or another
    /// caller got here first. Returns the call to await.
    pub fn maybe_fallback(
        &self,
        session: &mut StreamSession,
        reason: Option<&ChannelError>,
    ) -> Option<FallbackCall> {
        if !session.trigger_fallback() {
            return None;
        }
        let reason = reason.map(|r| r.message().to_string()).unwrap_or_default();
        warn!(session_id = %session.id(), reason = %reason, "channel failed, falling back to blocking request");
        if self.notice {
            session.enqueue_notice(FALLBACK_NOTICE);
        }

        let fetcher = self.fetcher.clone();
        let request = self.request.clone();
        let session_id = session.id().clone();
        Some(Box::pin(async move {
            fetcher.fetch(&session_id, &request).await
        }))
    }

    /// Applies the blocking call's outcome.
    pub fn complete(
        &self,
        session: &mut StreamSession,
        result: Result<ReportPayload, FallbackError>,
    ) {
        match result {
            Ok(payload) => {
                if !session.accept_final(payload) {
                    info!(session_id = %session.id(), "fallback result arrived after the session was decided");
                }
            }
            Err(err) => {
                if !session.is_decided() {
                    session.fail(ReportError::Fallback(err));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Fetcher returning a fixed outcome after an optional delay.
    pub(crate) struct FakeFetcher {
        pub calls: Arc<AtomicUsize>,
        pub result: Result<ReportPayload, FallbackError>,
        pub delay: Duration,
    }

    impl FakeFetcher {
        pub(crate) fn ok(report: &str) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                result: Ok(ReportPayload::new(report)),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing(err: FallbackError) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                result: Err(err),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait::async_trait]
    impl ReportFetcher for FakeFetcher {
        async fn fetch(
            &self,
            _session_id: &SessionId,
            _request: &ReportRequest,
        ) -> Result<ReportPayload, FallbackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::testing::FakeFetcher;
    use super::*;
    use crate::display::DisplayKind;
    use crate::playback::PacingConfig;
    use crate::screen::AssistantScreen;
    use crate::session::SessionState;
    use crate::stream::ChannelEvent;

    fn session() -> StreamSession {
        let mut session = StreamSession::new(
            SessionId::from("s"),
            PacingConfig::default(),
            540,
            Arc::new(AssistantScreen),
        );
        session.begin_connecting();
        session
    }

    fn controller(fetcher: FakeFetcher, notice: bool) -> FallbackController {
        FallbackController::new(Arc::new(fetcher), ReportRequest::new("q"), notice)
    }

    #[tokio::test]
    async fn first_caller_wins() {
        let fetcher = FakeFetcher::ok("blocking report");
        let calls = fetcher.calls.clone();
        let controller = controller(fetcher, true);
        let mut session = session();

        let call = controller
            .maybe_fallback(&mut session, Some(&ChannelError::transport("reset")))
            .expect("first call starts");
        assert!(controller.maybe_fallback(&mut session, None).is_none());

        let result = call.await;
        controller.complete(&mut session, result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.fallback_triggered());
        assert!(session.final_received());
        assert_eq!(session.state(), SessionState::Finalizing);
    }

    #[tokio::test]
    async fn notice_precedes_the_result() {
        let controller = controller(FakeFetcher::ok("r"), true);
        let mut session = session();
        let call = controller
            .maybe_fallback(&mut session, None)
            .expect("call");
        controller.complete(&mut session, call.await);
        assert_eq!(session.queue().len(), 2);

        let t0 = tokio::time::Instant::now();
        session.tick(t0);
        session.tick(t0 + Duration::from_secs(5));
        let kinds: Vec<DisplayKind> = session
            .transcript()
            .iter()
            .map(|s| s.event.kind)
            .collect();
        assert_eq!(kinds, vec![DisplayKind::Notice, DisplayKind::Final]);
    }

    #[test]
    fn skipped_when_channel_already_delivered_final() {
        let controller = controller(FakeFetcher::ok("r"), true);
        let mut session = session();
        session.apply_channel_event(ChannelEvent::Final {
            payload: ReportPayload::new("streamed"),
        });
        assert!(controller.maybe_fallback(&mut session, None).is_none());
        assert!(!session.fallback_triggered());
    }

    #[tokio::test]
    async fn failure_surfaces_error_and_stops_playback() {
        let controller = controller(
            FakeFetcher::failing(FallbackError::Status {
                status: 500,
                body: "boom".into(),
            }),
            false,
        );
        let mut session = session();
        let call = controller
            .maybe_fallback(&mut session, None)
            .expect("call");
        controller.complete(&mut session, call.await);
        assert_eq!(session.state(), SessionState::Errored);
        assert!(matches!(
            session.failure(),
            Some(ReportError::Fallback(FallbackError::Status { status: 500, .. }))
        ));
        assert!(session.queue().is_empty());
        assert!(!session.final_received());
    }
}
