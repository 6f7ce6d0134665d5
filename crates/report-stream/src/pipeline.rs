use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::channel::{ChannelSession, ChannelTransport};
use crate::client::ReportClient;
use crate::errors::{ChannelError, ReportError};
use crate::fallback::{FallbackCall, FallbackController};
use crate::model::{ReportPayload, SessionId};
use crate::screen::{Screen, ScreenInput};
use crate::session::{PlaybackSnapshot, StreamSession};
use crate::stream::ChannelEvent;

type ConnectCall = Pin<Box<dyn Future<Output = Result<ChannelSession, ChannelError>> + Send>>;

/// Handle to one running report session.
///
/// Dropping the handle aborts the session task; [`SessionHandle::dispose`]
/// tears it down gracefully and returns the final snapshot.
pub struct SessionHandle {
    id: SessionId,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    dispose_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Receiver notified whenever the visible state changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits until the session stops producing output.
    pub async fn wait(&mut self) -> PlaybackSnapshot {
        let mut rx = self.snapshots.clone();
        let done = match rx.wait_for(|snapshot| !snapshot.producing).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        done.unwrap_or_else(|| rx.borrow().clone())
    }

    /// Waits for the session and returns the accepted report.
    ///
    /// A terminal `error` event yields [`ReportError::Remote`], a failed
    /// blocking request yields [`ReportError::Fallback`].
    pub async fn finish(mut self) -> Result<ReportPayload, ReportError> {
        let snapshot = self.wait().await;
        match (snapshot.report, snapshot.failure) {
            (Some(report), _) => Ok(report),
            (None, Some(failure)) => Err(failure),
            (None, None) => Err(ReportError::Cancelled),
        }
    }

    /// Cancels playback, closes the channel and waits for the task to exit.
    /// Nothing is revealed after this returns.
    pub async fn dispose(mut self) -> PlaybackSnapshot {
        let _ = self.dispose_tx.send(true);
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(session_id = %self.id, error = %err, "session task did not exit cleanly");
        }
        self.snapshots.borrow().clone()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Everything a session task needs besides its control channels.
pub(crate) struct SessionParts {
    pub session: StreamSession,
    pub transport: Arc<dyn ChannelTransport>,
    pub fallback: FallbackController,
    pub request_json: String,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

/// Spawns the task that owns the session and returns its handle.
pub(crate) fn spawn_session(mut parts: SessionParts) -> SessionHandle {
    parts.session.begin_connecting();
    let id = parts.session.id().clone();
    let publisher = Publisher::new(&parts.session);
    let snapshot_rx = publisher.tx.subscribe();
    let (dispose_tx, dispose_rx) = watch::channel(false);

    let span = info_span!("report_session", session_id = %id);
    let task = tokio::spawn(session_task(parts, publisher, dispose_rx).instrument(span));

    SessionHandle {
        id,
        snapshots: snapshot_rx,
        dispose_tx,
        task: Some(task),
    }
}

async fn session_task(
    parts: SessionParts,
    mut publisher: Publisher,
    mut dispose_rx: watch::Receiver<bool>,
) {
    let SessionParts {
        mut session,
        transport,
        fallback,
        request_json,
        connect_timeout,
        idle_timeout,
    } = parts;
    let mut connect: Option<ConnectCall> = Some(Box::pin(ChannelSession::open(
        transport,
        session.id().clone(),
        request_json,
        connect_timeout,
        idle_timeout,
    )));
    let mut channel: Option<ChannelSession> = None;
    let mut fallback_call: Option<FallbackCall> = None;
    let mut wake = session.tick(Instant::now());
    let mut disposed = false;

    while !session.is_settled() {
        tokio::select! {
            changed = dispose_rx.changed() => {
                match changed {
                    Ok(()) if !*dispose_rx.borrow() => continue,
                    _ => {
                        disposed = true;
                        break;
                    }
                }
            }
            opened = poll_opt(&mut connect) => {
                connect = None;
                match opened {
                    Ok(opened) => {
                        session.mark_open();
                        channel = Some(opened);
                    }
                    Err(err) => {
                        if let Some(call) = fallback.maybe_fallback(&mut session, Some(&err)) {
                            fallback_call = Some(call);
                        }
                    }
                }
            }
            event = next_event_opt(&mut channel) => {
                match event {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        session.apply_channel_event(event);
                        if terminal {
                            retire_channel(&mut channel);
                        }
                    }
                    Err(err) => {
                        if let Some(call) = fallback.maybe_fallback(&mut session, Some(&err)) {
                            fallback_call = Some(call);
                        }
                        retire_channel(&mut channel);
                    }
                }
            }
            result = poll_opt(&mut fallback_call) => {
                fallback_call = None;
                fallback.complete(&mut session, result);
            }
            _ = sleep_until_opt(wake) => {}
        }
        wake = session.tick(Instant::now());
        publisher.publish(&session);
    }

    if let Some(mut open) = channel.take() {
        open.close().await;
    }
    if disposed {
        session.dispose();
        publisher.publish(&session);
        info!("report session disposed");
    }
    debug!(state = ?session.state(), "session task exiting");
}

/// Publishes snapshots, rebuilding one only when the session changed.
struct Publisher {
    tx: watch::Sender<PlaybackSnapshot>,
    revision: u64,
}

impl Publisher {
    fn new(session: &StreamSession) -> Self {
        let (tx, _) = watch::channel(session.snapshot());
        Self {
            tx,
            revision: session.revision(),
        }
    }

    fn publish(&mut self, session: &StreamSession) {
        if session.revision() == self.revision {
            return;
        }
        self.revision = session.revision();
        self.tx.send_replace(session.snapshot());
    }
}

/// Closes a channel that is no longer read on its own task, so an
/// unresponsive peer never holds up playback or the fallback.
fn retire_channel(channel: &mut Option<ChannelSession>) {
    if let Some(mut open) = channel.take() {
        tokio::spawn(async move { open.close().await }.in_current_span());
    }
}

async fn poll_opt<F>(fut: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match fut.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_event_opt(
    channel: &mut Option<ChannelSession>,
) -> Result<ChannelEvent, ChannelError> {
    match channel.as_mut() {
        Some(open) => open.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One screen's view of the shared pipeline: at most one live session at a
/// time, with every new start tearing down the previous one first.
pub struct ReportPipeline {
    client: ReportClient,
    screen: Arc<dyn Screen>,
    current: Option<SessionHandle>,
}

impl ReportPipeline {
    pub(crate) fn new(client: ReportClient, screen: Arc<dyn Screen>) -> Self {
        Self {
            client,
            screen,
            current: None,
        }
    }

    /// The screen every session of this pipeline is built for.
    pub fn screen(&self) -> &Arc<dyn Screen> {
        &self.screen
    }

    /// Disposes any running session, then starts a new one for `input`.
    pub async fn start(&mut self, input: &ScreenInput) -> Result<&mut SessionHandle, ReportError> {
        self.dispose().await;
        let request = self.screen.build_request(input);
        let handle = self.client.start_session(request, self.screen.clone())?;
        Ok(self.current.insert(handle))
    }

    /// The live session, if one was started and not disposed.
    pub fn current(&self) -> Option<&SessionHandle> {
        self.current.as_ref()
    }

    /// Mutable access to the live session, e.g. to [`SessionHandle::wait`] on it.
    pub fn current_mut(&mut self) -> Option<&mut SessionHandle> {
        self.current.as_mut()
    }

    /// Tears down the current session, if any, and returns its last snapshot.
    pub async fn dispose(&mut self) -> Option<PlaybackSnapshot> {
        let handle = self.current.take()?;
        Some(handle.dispose().await)
    }
}
