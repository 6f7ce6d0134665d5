use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::display::{DisplayEvent, DisplayKind, RevealedEvent};
use crate::errors::ReportError;
use crate::model::{ReportPayload, SessionId};
use crate::playback::{PacingConfig, PlaybackScheduler, PlaybackState};
use crate::queue::DisplayQueue;
use crate::screen::Screen;
use crate::stream::ChannelEvent;

/// Lifecycle of one report attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    /// A result was accepted; playback is draining towards it.
    Finalizing,
    Closed,
    Errored,
}

impl SessionState {
    /// `Closed` and `Errored` are final; nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    /// Revealed events in display order.
    pub events: Vec<RevealedEvent>,
    /// Whether the session is still producing output.
    pub producing: bool,
    /// Set when the session ended in `Errored`.
    pub error: Option<String>,
    /// Typed cause behind `error`.
    #[serde(skip)]
    pub failure: Option<ReportError>,
    /// The accepted result, whichever path produced it.
    pub report: Option<ReportPayload>,
    pub final_received: bool,
    pub fallback_triggered: bool,
}

/// What happened to one inbound channel event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Applied {
    /// Number of display events queued.
    Enqueued(usize),
    Ignored,
    Finalized,
    Failed,
}

/// All mutable state of one session, owned by the session task.
///
/// `final_received` and `fallback_triggered` are set at most once and never
/// reset; whichever decides the session first wins, and every later result
/// from the other path is ignored.
pub struct StreamSession {
    id: SessionId,
    state: SessionState,
    final_received: bool,
    fallback_triggered: bool,
    failure: Option<ReportError>,
    report: Option<ReportPayload>,
    /// Bumped on every change visible in a snapshot.
    revision: u64,
    queue: DisplayQueue,
    scheduler: PlaybackScheduler,
    transcript: Vec<RevealedEvent>,
    segment_max_chars: usize,
    screen: Arc<dyn Screen>,
}

impl StreamSession {
    pub fn new(
        id: SessionId,
        pacing: PacingConfig,
        segment_max_chars: usize,
        screen: Arc<dyn Screen>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            final_received: false,
            fallback_triggered: false,
            failure: None,
            report: None,
            revision: 0,
            queue: DisplayQueue::new(),
            scheduler: PlaybackScheduler::new(pacing),
            transcript: Vec::new(),
            segment_max_chars,
            screen,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn final_received(&self) -> bool {
        self.final_received
    }

    pub fn fallback_triggered(&self) -> bool {
        self.fallback_triggered
    }

    /// Why the session ended in `Errored`, if it did.
    pub fn failure(&self) -> Option<&ReportError> {
        self.failure.as_ref()
    }

    /// Events accepted but not yet revealed.
    pub fn queue(&self) -> &DisplayQueue {
        &self.queue
    }

    /// Events revealed so far, in display order.
    pub fn transcript(&self) -> &[RevealedEvent] {
        &self.transcript
    }

    /// Reveal cycle of the underlying scheduler.
    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    /// Changes whenever [`StreamSession::snapshot`] would return something
    /// different, so owners can skip rebuilding identical snapshots.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Whether output may still change: connecting, open or draining.
    pub fn producing(&self) -> bool {
        !matches!(
            self.state,
            SessionState::Idle | SessionState::Closed | SessionState::Errored
        )
    }

    /// True once nothing can change any more.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the session already has its result (or failed).
    pub fn is_decided(&self) -> bool {
        self.final_received || self.state.is_terminal()
    }

    /// Leaves `Idle` and arms playback.
    pub fn begin_connecting(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Connecting;
            self.scheduler.start();
            self.touch();
            info!(session_id = %self.id, "report session connecting");
        }
    }

    pub fn mark_open(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Open;
            self.touch();
            debug!(session_id = %self.id, "report channel open");
        }
    }

    /// Applies one classified channel event.
    ///
    /// Nothing from the channel is applied once the session is decided or the
    /// fallback took over.
    pub fn apply_channel_event(&mut self, event: ChannelEvent) -> Applied {
        if self.is_decided() || self.fallback_triggered {
            debug!(session_id = %self.id, kind = event.kind_name(), "ignoring channel event after completion");
            return Applied::Ignored;
        }
        debug!(session_id = %self.id, kind = event.kind_name(), "channel event");
        match event {
            ChannelEvent::Status { message } => {
                self.queue
                    .enqueue(DisplayEvent::label(DisplayKind::Status, message));
                Applied::Enqueued(1)
            }
            ChannelEvent::Phase { title, content } => {
                let count = self.queue.enqueue_content(
                    DisplayKind::Phase,
                    &title,
                    content.as_deref(),
                    self.segment_max_chars,
                );
                Applied::Enqueued(count)
            }
            ChannelEvent::Final { payload } => {
                if self.accept_final(payload) {
                    Applied::Finalized
                } else {
                    Applied::Ignored
                }
            }
            ChannelEvent::Error { message } => {
                self.fail(ReportError::Remote(message));
                Applied::Failed
            }
        }
    }

    /// Marks the fallback as triggered. Returns `false` when the session is
    /// already decided or the fallback already ran.
    pub fn trigger_fallback(&mut self) -> bool {
        if self.fallback_triggered || self.is_decided() {
            return false;
        }
        self.fallback_triggered = true;
        self.touch();
        true
    }

    pub(crate) fn enqueue_notice(&mut self, title: impl Into<String>) {
        if !self.is_decided() {
            self.queue
                .enqueue(DisplayEvent::label(DisplayKind::Notice, title));
        }
    }

    /// Accepts a result from either path, at most once.
    pub fn accept_final(&mut self, payload: ReportPayload) -> bool {
        if self.is_decided() {
            return false;
        }
        self.final_received = true;
        let view = self.screen.project(&payload);
        self.queue.enqueue(DisplayEvent::new(
            DisplayKind::Final,
            view.title,
            Some(view.body),
        ));
        self.report = Some(payload);
        self.state = SessionState::Finalizing;
        self.touch();
        info!(session_id = %self.id, fallback = self.fallback_triggered, "report result accepted");
        true
    }

    /// Surfaces a hard failure: stops playback and drops pending events.
    pub fn fail(&mut self, cause: ReportError) {
        if self.state.is_terminal() {
            return;
        }
        warn!(session_id = %self.id, error = %cause, "report session failed");
        self.scheduler.stop();
        self.queue.clear();
        self.failure = Some(cause);
        self.state = SessionState::Errored;
        self.touch();
    }

    /// Runs due playback transitions and returns the next wake-up time.
    pub fn tick(&mut self, now: Instant) -> Option<Instant> {
        // Playback only appends events or reveals more of the last one.
        let before = self.reveal_mark();
        let next = self
            .scheduler
            .advance(now, &mut self.queue, &mut self.transcript);
        if self.reveal_mark() != before {
            self.touch();
        }
        if self.state == SessionState::Finalizing && self.scheduler.is_finished() {
            self.state = SessionState::Closed;
            self.touch();
            info!(session_id = %self.id, "report session complete");
        }
        next
    }

    fn reveal_mark(&self) -> (usize, usize) {
        let last = self.transcript.last().map_or(0, |shown| shown.revealed_chars);
        (self.transcript.len(), last)
    }

    /// Teardown: cancels playback, drops queued events and closes the
    /// session. The channel itself is closed by the owning task.
    pub fn dispose(&mut self) {
        self.scheduler.stop();
        self.queue.clear();
        if self.state != SessionState::Errored {
            self.state = SessionState::Closed;
        }
        self.touch();
        debug!(session_id = %self.id, "report session disposed");
    }

    /// Builds the presentation view of the current state.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            events: self.transcript.clone(),
            producing: self.producing(),
            error: self.failure.as_ref().map(ReportError::user_message),
            failure: self.failure.clone(),
            report: self.report.clone(),
            final_received: self.final_received,
            fallback_triggered: self.fallback_triggered,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::screen::AssistantScreen;

    fn session() -> StreamSession {
        let mut session = StreamSession::new(
            SessionId::from("s-1"),
            PacingConfig {
                char_interval: Duration::from_millis(1),
                label_flash: Duration::from_millis(5),
                inter_event_pause: Duration::from_millis(5),
            },
            540,
            Arc::new(AssistantScreen),
        );
        session.begin_connecting();
        session.mark_open();
        session
    }

    fn final_event(report: &str) -> ChannelEvent {
        ChannelEvent::Final {
            payload: ReportPayload::new(report),
        }
    }

    #[test]
    fn final_after_fallback_triggered_changes_nothing() {
        let mut session = session();
        assert!(session.trigger_fallback());
        let before = session.snapshot();
        let queued = session.queue().len();

        assert_eq!(session.apply_channel_event(final_event("late")), Applied::Ignored);

        assert_eq!(session.snapshot(), before);
        assert_eq!(session.queue().len(), queued);
        assert!(!session.final_received());
    }

    #[test]
    fn fallback_is_refused_once_the_channel_won() {
        let mut session = session();
        assert_eq!(session.apply_channel_event(final_event("r")), Applied::Finalized);
        assert!(!session.trigger_fallback());
        assert!(!session.fallback_triggered());
    }

    #[test]
    fn second_final_is_ignored() {
        let mut session = session();
        assert!(session.accept_final(ReportPayload::new("first")));
        assert!(!session.accept_final(ReportPayload::new("second")));
        assert_eq!(session.queue().len(), 1);
        assert_eq!(
            session.snapshot().report.map(|r| r.report),
            Some("first".into())
        );
    }

    #[test]
    fn non_terminal_events_after_final_are_dropped() {
        let mut session = session();
        session.apply_channel_event(final_event("r"));
        let applied = session.apply_channel_event(ChannelEvent::Status {
            message: "straggler".into(),
        });
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(session.queue().len(), 1);
    }

    #[test]
    fn error_event_stops_playback_and_clears_queue() {
        let mut session = session();
        session.apply_channel_event(ChannelEvent::Phase {
            title: "data".into(),
            content: Some("rows".into()),
        });
        assert_eq!(
            session.apply_channel_event(ChannelEvent::Error {
                message: "llm quota".into()
            }),
            Applied::Failed
        );
        assert_eq!(session.state(), SessionState::Errored);
        assert_eq!(
            session.failure(),
            Some(&ReportError::Remote("llm quota".into()))
        );
        assert_eq!(session.snapshot().error.as_deref(), Some("llm quota"));
        assert!(session.queue().is_empty());
        assert_eq!(session.tick(Instant::now()), None);
        assert!(session.transcript().is_empty());
        assert!(!session.producing());
    }

    #[test]
    fn session_closes_when_the_final_event_is_shown() {
        let mut session = session();
        session.apply_channel_event(ChannelEvent::Status {
            message: "preparing".into(),
        });
        session.apply_channel_event(final_event("done"));
        assert_eq!(session.state(), SessionState::Finalizing);
        assert!(session.producing());

        let t0 = Instant::now();
        session.tick(t0);
        session.tick(t0 + Duration::from_millis(10));
        assert_eq!(session.state(), SessionState::Closed);
        let snapshot = session.snapshot();
        assert!(!snapshot.producing);
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[1].visible_text(), "done");
    }

    #[test]
    fn dispose_mid_reveal_freezes_the_transcript() {
        let mut session = session();
        session.apply_channel_event(ChannelEvent::Phase {
            title: "data".into(),
            content: Some("abcdefghij".into()),
        });
        session.apply_channel_event(ChannelEvent::Status {
            message: "next".into(),
        });
        let t0 = Instant::now();
        session.tick(t0);
        session.tick(t0 + Duration::from_millis(3));
        let shown = session.transcript()[0].visible_text().to_string();

        session.dispose();
        assert_eq!(session.tick(t0 + Duration::from_secs(60)), None);

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.queue().is_empty());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].visible_text(), shown);
        assert_eq!(
            session.apply_channel_event(final_event("late")),
            Applied::Ignored
        );
    }

    #[test]
    fn revision_moves_only_with_visible_changes() {
        let mut session = session();
        let t0 = Instant::now();
        let opened = session.revision();

        session.apply_channel_event(ChannelEvent::Phase {
            title: "data".into(),
            content: Some("abc".into()),
        });
        assert_eq!(session.revision(), opened);

        session.tick(t0);
        let begun = session.revision();
        assert_ne!(begun, opened);
        session.tick(t0 + Duration::from_micros(500));
        assert_eq!(session.revision(), begun);
        session.tick(t0 + Duration::from_millis(1));
        assert_ne!(session.revision(), begun);
        assert_eq!(session.transcript()[0].visible_text(), "a");
    }
}
