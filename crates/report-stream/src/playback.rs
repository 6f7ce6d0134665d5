//! Paced playback of queued display events.
//!
//! The scheduler is a plain state machine. The owner calls [`PlaybackScheduler::advance`]
//! with the current time and sleeps until the returned deadline; there are no
//! self-rearming callbacks, so stopping is a single flag flip.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::display::{DisplayEvent, DisplayKind, RevealedEvent};
use crate::queue::DisplayQueue;

/// Fixed delays used while revealing events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacingConfig {
    /// Delay between two revealed characters.
    pub char_interval: Duration,
    /// How long a label-only event is shown before pausing.
    pub label_flash: Duration,
    /// Gap between the end of one event and the start of the next.
    pub inter_event_pause: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            char_interval: Duration::from_millis(15),
            label_flash: Duration::from_millis(250),
            inter_event_pause: Duration::from_millis(400),
        }
    }
}

impl PacingConfig {
    /// Time from beginning an event to revealing all of its content.
    pub fn reveal_duration(&self, chars: usize) -> Duration {
        if chars == 0 {
            return self.label_flash;
        }
        let chars = u32::try_from(chars).unwrap_or(u32::MAX);
        self.char_interval.saturating_mul(chars)
    }
}

/// Where the scheduler is in its reveal cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackState {
    /// Ready to take the next queued event.
    Idle,
    /// Revealing the current event one character at a time.
    Typing,
    /// Gap after a completed event.
    Pausing,
    /// Queue drained, or the final event was shown.
    Done,
}

/// Position of the event currently being revealed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlaybackCursor {
    /// Index into the transcript of revealed events.
    pub active_event_index: usize,
    pub revealed_char_count: usize,
}

/// Reveals queued events one at a time at the configured pace.
pub struct PlaybackScheduler {
    pacing: PacingConfig,
    state: PlaybackState,
    cursor: Option<PlaybackCursor>,
    deadline: Option<Instant>,
    running: bool,
    /// Set once a final event was shown; playback never resumes after it.
    finished: bool,
}

impl PlaybackScheduler {
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            pacing,
            state: PlaybackState::Idle,
            cursor: None,
            deadline: None,
            running: false,
            finished: false,
        }
    }

    /// Arms playback. Has no effect once the final event was shown.
    pub fn start(&mut self) {
        if !self.finished {
            self.running = true;
        }
    }

    /// Cancels the pending deadline. Later calls to `advance` are no-ops.
    pub fn stop(&mut self) {
        self.running = false;
        self.deadline = None;
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The event being revealed, if any.
    pub fn cursor(&self) -> Option<PlaybackCursor> {
        self.cursor
    }

    /// When the next transition is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True once the final event has been shown.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Runs every transition due at `now` and returns the next deadline, or
    /// `None` when nothing is pending (stopped, finished, or queue drained).
    ///
    /// Transitions are anchored on the deadlines themselves rather than on
    /// `now`, so the reveal timeline of an event depends only on its length.
    pub fn advance(
        &mut self,
        now: Instant,
        queue: &mut DisplayQueue,
        transcript: &mut Vec<RevealedEvent>,
    ) -> Option<Instant> {
        if !self.running {
            return None;
        }
        let mut at = now;
        loop {
            match self.state {
                PlaybackState::Idle | PlaybackState::Done => {
                    if self.finished {
                        self.deadline = None;
                        return None;
                    }
                    let Some(event) = queue.dequeue_next() else {
                        self.state = PlaybackState::Done;
                        self.deadline = None;
                        return None;
                    };
                    self.begin(event, at, transcript);
                    if self.finished {
                        return None;
                    }
                }
                PlaybackState::Typing | PlaybackState::Pausing => {
                    let deadline = self.deadline?;
                    if deadline > now {
                        return Some(deadline);
                    }
                    at = deadline;
                    if self.state == PlaybackState::Typing {
                        self.reveal_next(at, transcript);
                    } else {
                        trace!("pause elapsed");
                        self.cursor = None;
                        self.deadline = None;
                        self.state = PlaybackState::Idle;
                    }
                }
            }
        }
    }

    fn begin(&mut self, event: DisplayEvent, at: Instant, transcript: &mut Vec<RevealedEvent>) {
        let index = transcript.len();
        if event.kind == DisplayKind::Final {
            let mut shown = RevealedEvent::begin(event);
            shown.reveal_all();
            transcript.push(shown);
            self.cursor = None;
            self.deadline = None;
            self.state = PlaybackState::Done;
            self.finished = true;
            self.running = false;
            return;
        }

        let wait = if event.is_label() {
            self.pacing.label_flash
        } else {
            self.pacing.char_interval
        };
        trace!(title = %event.title, chars = event.content_chars(), "begin display event");
        transcript.push(RevealedEvent::begin(event));
        self.cursor = Some(PlaybackCursor {
            active_event_index: index,
            revealed_char_count: 0,
        });
        self.state = PlaybackState::Typing;
        self.deadline = Some(at + wait);
    }

    fn reveal_next(&mut self, at: Instant, transcript: &mut [RevealedEvent]) {
        let Some(cursor) = self.cursor.as_mut() else {
            self.state = PlaybackState::Idle;
            self.deadline = None;
            return;
        };
        let complete = match transcript.get_mut(cursor.active_event_index) {
            Some(shown) if !shown.is_complete() => {
                shown.revealed_chars += 1;
                cursor.revealed_char_count = shown.revealed_chars;
                shown.is_complete()
            }
            _ => true,
        };
        if complete {
            self.state = PlaybackState::Pausing;
            self.deadline = Some(at + self.pacing.inter_event_pause);
        } else {
            self.deadline = Some(at + self.pacing.char_interval);
        }
    }
}
