use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::ChannelError;
use crate::model::SessionId;
use crate::stream::{ChannelEvent, decode_frame};

/// Opens persistent channels to the report backend.
#[async_trait::async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Opens one channel. The session id travels out-of-band (e.g. a header).
    async fn open(&self, session_id: &SessionId) -> Result<Box<dyn Channel>, ChannelError>;
}

/// One open bidirectional channel carrying text frames.
#[async_trait::async_trait]
pub trait Channel: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ChannelError>;

    /// Next inbound text frame; `None` once the peer closed the channel.
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>>;

    async fn close(&mut self);
}

/// One streaming attempt: an open channel that already carried the request,
/// plus the events decoded from frames but not yet handed out.
pub struct ChannelSession {
    session_id: SessionId,
    channel: Box<dyn Channel>,
    pending: VecDeque<ChannelEvent>,
    idle_timeout: Option<Duration>,
    close_timeout: Duration,
    last_activity: Instant,
    closed: bool,
}

impl ChannelSession {
    /// Opens the channel within `connect_timeout` and sends the request
    /// payload exactly once. The same bound later applies to closing it.
    pub async fn open(
        transport: Arc<dyn ChannelTransport>,
        session_id: SessionId,
        request_json: String,
        connect_timeout: Duration,
        idle_timeout: Option<Duration>,
    ) -> Result<Self, ChannelError> {
        let mut channel = tokio::time::timeout(connect_timeout, transport.open(&session_id))
            .await
            .map_err(|_| {
                ChannelError::transport(format!(
                    "channel did not open within {}ms",
                    connect_timeout.as_millis()
                ))
            })??;
        debug!(session_id = %session_id, bytes = request_json.len(), "sending report request");
        if let Err(err) = channel.send_text(request_json).await {
            if tokio::time::timeout(connect_timeout, channel.close()).await.is_err() {
                warn!(session_id = %session_id, "channel close timed out after a failed send");
            }
            return Err(err);
        }
        Ok(Self {
            session_id,
            channel,
            pending: VecDeque::new(),
            idle_timeout,
            close_timeout: connect_timeout,
            last_activity: Instant::now(),
            closed: false,
        })
    }

    /// Returns the next classified event.
    ///
    /// A peer close, a read failure or an idle timeout is a transport error:
    /// the caller only keeps reading until it sees a terminal event.
    /// Cancel-safe: decoded events are buffered before anything is awaited,
    /// and the idle deadline is measured from the last frame, not from the
    /// call.
    pub async fn next_event(&mut self) -> Result<ChannelEvent, ChannelError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            if self.closed {
                return Err(ChannelError::transport("channel already closed"));
            }
            let frame = match self.idle_timeout {
                Some(limit) => {
                    let idle_deadline = self.last_activity + limit;
                    tokio::time::timeout_at(idle_deadline, self.channel.next_text())
                        .await
                        .map_err(|_| {
                            ChannelError::transport(format!(
                                "channel idle for {}ms",
                                limit.as_millis()
                            ))
                        })?
                }
                None => self.channel.next_text().await,
            };
            match frame {
                Some(Ok(text)) => {
                    self.last_activity = Instant::now();
                    let events = decode_frame(&text);
                    debug!(session_id = %self.session_id, events = events.len(), "channel frame");
                    self.pending.extend(events);
                }
                Some(Err(err)) => return Err(err),
                None => {
                    self.closed = true;
                    return Err(ChannelError::transport(
                        "channel closed before a terminal event",
                    ));
                }
            }
        }
    }

    /// Closes the underlying channel and drops undelivered events. A peer
    /// that never completes the close is abandoned once the bound elapses.
    pub async fn close(&mut self) {
        self.pending.clear();
        if self.closed {
            return;
        }
        self.closed = true;
        match tokio::time::timeout(self.close_timeout, self.channel.close()).await {
            Ok(()) => debug!(session_id = %self.session_id, "channel closed"),
            Err(_) => warn!(
                session_id = %self.session_id,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "channel close timed out, abandoning it"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// What a scripted channel does once its frames run out.
    #[derive(Clone, Copy, Debug)]
    pub(crate) enum AfterScript {
        Close,
        Fail,
        Hang,
    }

    #[derive(Default)]
    pub(crate) struct ChannelLog {
        pub opens: usize,
        pub sent: Vec<String>,
        pub closes: usize,
    }

    /// Channel transport replaying scripted frames with optional delays.
    pub(crate) struct ScriptedTransport {
        pub frames: Vec<(Duration, String)>,
        pub after: AfterScript,
        pub refuse: bool,
        /// `close()` never completes, like a peer ignoring the close frame.
        pub hang_on_close: bool,
        pub log: Arc<Mutex<ChannelLog>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(frames: Vec<(Duration, String)>, after: AfterScript) -> Self {
            Self {
                frames,
                after,
                refuse: false,
                hang_on_close: false,
                log: Arc::new(Mutex::new(ChannelLog::default())),
            }
        }

        pub(crate) fn refusing() -> Self {
            let mut transport = Self::new(Vec::new(), AfterScript::Fail);
            transport.refuse = true;
            transport
        }
    }

    struct ScriptedChannel {
        frames: VecDeque<(Duration, String)>,
        ready_at: Option<Instant>,
        after: AfterScript,
        hang_on_close: bool,
        log: Arc<Mutex<ChannelLog>>,
    }

    #[async_trait::async_trait]
    impl ChannelTransport for ScriptedTransport {
        async fn open(&self, _session_id: &SessionId) -> Result<Box<dyn Channel>, ChannelError> {
            self.log.lock().expect("log").opens += 1;
            if self.refuse {
                return Err(ChannelError::transport("connection refused"));
            }
            Ok(Box::new(ScriptedChannel {
                frames: self.frames.clone().into(),
                ready_at: None,
                after: self.after,
                hang_on_close: self.hang_on_close,
                log: self.log.clone(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl Channel for ScriptedChannel {
        async fn send_text(&mut self, text: String) -> Result<(), ChannelError> {
            self.log.lock().expect("log").sent.push(text);
            Ok(())
        }

        async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
            // The frame stays queued until its delay elapsed, so a dropped
            // read loses nothing.
            if let Some((delay, _)) = self.frames.front() {
                let delay = *delay;
                let ready_at = *self.ready_at.get_or_insert_with(|| Instant::now() + delay);
                tokio::time::sleep_until(ready_at).await;
                self.ready_at = None;
            }
            match self.frames.pop_front() {
                Some((_, text)) => Some(Ok(text)),
                None => match self.after {
                    AfterScript::Close => None,
                    AfterScript::Fail => Some(Err(ChannelError::transport("connection reset"))),
                    AfterScript::Hang => std::future::pending().await,
                },
            }
        }

        async fn close(&mut self) {
            self.log.lock().expect("log").closes += 1;
            if self.hang_on_close {
                std::future::pending::<()>().await;
            }
        }
    }
}
