//! Common imports for typical pipeline usage.
pub use crate::{
    AssistantScreen, DisplayKind, LearningWorkshopScreen, PipelineConfig, PlaybackSnapshot,
    ReportClient, ReportError, ReportPayload, ReportPipeline, ResearchLabScreen, RevealedEvent,
    Screen, ScreenInput, SessionHandle, SessionId, SessionState, builtin_screen,
    init_observability,
};
