//! Per-screen parameterization of the shared pipeline.
//!
//! A screen only decides how to build the request and how to turn the final
//! payload into display text; queueing, pacing and fallback are shared.

use crate::model::{ReportPayload, ReportRequest, ScenarioHint};

/// User input collected by a screen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScreenInput {
    pub query: String,
    /// Scenario/template parameters, forwarded as request context.
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ScreenInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: serde_json::Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Display form of a final payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportView {
    pub title: String,
    pub body: String,
}

pub trait Screen: Send + Sync {
    fn name(&self) -> &str;

    fn build_request(&self, input: &ScreenInput) -> ReportRequest;

    fn project(&self, payload: &ReportPayload) -> ReportView;
}

fn request_with_params(input: &ScreenInput, hint: ScenarioHint) -> ReportRequest {
    let mut request = ReportRequest::new(input.query.trim()).scenario_hint(hint);
    for (key, value) in &input.params {
        request = request.context_value(key.clone(), value.clone());
    }
    request
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Free-form question answering.
pub struct AssistantScreen;

impl Screen for AssistantScreen {
    fn name(&self) -> &str {
        "assistant"
    }

    fn build_request(&self, input: &ScreenInput) -> ReportRequest {
        request_with_params(input, ScenarioHint::Assistant)
    }

    fn project(&self, payload: &ReportPayload) -> ReportView {
        let body = payload
            .segment_text("assistant_answer")
            .and_then(|text| non_blank(&text))
            .or_else(|| non_blank(&payload.report))
            .unwrap_or_default();
        ReportView {
            title: "Answer".into(),
            body,
        }
    }
}

/// Template-driven research report.
pub struct ResearchLabScreen;

impl Screen for ResearchLabScreen {
    fn name(&self) -> &str {
        "research_lab"
    }

    fn build_request(&self, input: &ScreenInput) -> ReportRequest {
        request_with_params(input, ScenarioHint::ResearchLab)
    }

    fn project(&self, payload: &ReportPayload) -> ReportView {
        let body = non_blank(&payload.report).unwrap_or_else(|| {
            ["data_analysis", "strategy"]
                .iter()
                .filter_map(|key| payload.segment_text(key))
                .collect::<Vec<_>>()
                .join("\n\n")
        });
        let title = if payload.tickers.is_empty() {
            "Research report".to_string()
        } else {
            format!("Research report: {}", payload.tickers.join(", "))
        };
        ReportView { title, body }
    }
}

/// Guided learning session on a topic.
pub struct LearningWorkshopScreen;

impl Screen for LearningWorkshopScreen {
    fn name(&self) -> &str {
        "learning_workshop"
    }

    fn build_request(&self, input: &ScreenInput) -> ReportRequest {
        request_with_params(input, ScenarioHint::LearningWorkshop)
    }

    fn project(&self, payload: &ReportPayload) -> ReportView {
        let body = payload
            .segment_text("learning_workshop")
            .and_then(|text| non_blank(&text))
            .or_else(|| non_blank(&payload.report))
            .unwrap_or_default();
        ReportView {
            title: "Learning workshop".into(),
            body,
        }
    }
}

type BuildFn = dyn Fn(&ScreenInput) -> ReportRequest + Send + Sync;
type ProjectFn = dyn Fn(&ReportPayload) -> ReportView + Send + Sync;

/// Screen assembled from two callbacks.
pub struct FnScreen {
    name: String,
    build: Box<BuildFn>,
    project: Box<ProjectFn>,
}

impl FnScreen {
    pub fn new(
        name: impl Into<String>,
        build: impl Fn(&ScreenInput) -> ReportRequest + Send + Sync + 'static,
        project: impl Fn(&ReportPayload) -> ReportView + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            build: Box::new(build),
            project: Box::new(project),
        }
    }
}

impl Screen for FnScreen {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_request(&self, input: &ScreenInput) -> ReportRequest {
        (self.build)(input)
    }

    fn project(&self, payload: &ReportPayload) -> ReportView {
        (self.project)(payload)
    }
}

/// Looks up a built-in screen by scenario name.
pub fn builtin_screen(name: &str) -> Option<std::sync::Arc<dyn Screen>> {
    let screen: std::sync::Arc<dyn Screen> = match name.trim() {
        "assistant" => std::sync::Arc::new(AssistantScreen),
        "research_lab" => std::sync::Arc::new(ResearchLabScreen),
        "learning_workshop" => std::sync::Arc::new(LearningWorkshopScreen),
        _ => return None,
    };
    Some(screen)
}
