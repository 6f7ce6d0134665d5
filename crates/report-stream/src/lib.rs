//! Incremental report delivery with paced playback.
//!
//! A session opens a streaming channel, sends one report request and turns
//! the progress events it receives into display events that are revealed one
//! character at a time. If the channel fails before a terminal event, the
//! same request is sent once over a blocking call instead. Whichever path
//! delivers the report first wins.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use report_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ReportError> {
//! let client = ReportClient::from_env()?;
//! let mut pipeline = client.pipeline(Arc::new(ResearchLabScreen));
//! let handle = pipeline
//!     .start(&ScreenInput::new("Compare the two largest banks"))
//!     .await?;
//!
//! let mut updates = handle.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow_and_update().clone();
//!     if !snapshot.producing {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Streaming channel seam and the per-attempt channel session.
pub mod channel;
/// Client entry point and builder.
pub mod client;
/// Pipeline configuration and environment loading.
pub mod config;
/// Display events and their reveal progress.
pub mod display;
/// Public error types.
pub mod errors;
/// One-shot blocking fallback.
pub mod fallback;
/// Request and report payload types.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Session task, session handle and per-screen pipeline.
pub mod pipeline;
/// Paced reveal scheduler.
pub mod playback;
/// Common imports for typical usage.
pub mod prelude;
/// FIFO of pending display events.
pub mod queue;
/// Screen parameterization.
pub mod screen;
/// Content segmentation.
pub mod segmenter;
/// Session state and snapshots.
pub mod session;
/// Channel event wire format.
pub mod stream;
/// WebSocket channel and HTTP fallback.
pub mod transports;

pub use channel::{Channel, ChannelSession, ChannelTransport};
pub use client::{ReportClient, ReportClientBuilder};
pub use config::PipelineConfig;
pub use display::{DisplayEvent, DisplayKind, EventId, RevealedEvent};
pub use errors::{ChannelError, FallbackError, ReportError};
pub use fallback::{FALLBACK_NOTICE, FallbackController, ReportFetcher};
pub use model::{ReportPayload, ReportRequest, ScenarioHint, SessionId};
pub use observability::{LogSettings, init_observability, init_observability_with};
pub use pipeline::{ReportPipeline, SessionHandle};
pub use playback::{PacingConfig, PlaybackCursor, PlaybackScheduler, PlaybackState};
pub use queue::DisplayQueue;
pub use screen::{
    AssistantScreen, FnScreen, LearningWorkshopScreen, ReportView, ResearchLabScreen, Screen,
    ScreenInput, builtin_screen,
};
pub use segmenter::{QueuedSegment, segment};
pub use session::{PlaybackSnapshot, SessionState, StreamSession};
pub use stream::ChannelEvent;
pub use transports::{HttpReportFetcher, WebSocketTransport};
