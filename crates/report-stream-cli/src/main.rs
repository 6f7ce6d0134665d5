//! Streams one report from the backend and types it out in the terminal.

use std::io::Write;

use clap::Parser;
use report_stream::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "report-stream", about = "Stream a report and reveal it as it arrives")]
struct Cli {
    /// Question or topic to report on.
    query: String,

    /// Screen that shapes the request: assistant, research_lab or learning_workshop.
    #[arg(long, default_value = "assistant")]
    screen: String,

    /// Request context entry as `key=value`. Values are parsed as JSON when
    /// possible, otherwise sent as strings.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, serde_json::Value)>,

    /// Overrides `REPORT_STREAM_WS_URL`.
    #[arg(long)]
    ws_url: Option<String>,

    /// Overrides `REPORT_STREAM_HTTP_URL`.
    #[arg(long)]
    http_url: Option<String>,

    /// Print the final snapshot as JSON instead of typing the report out.
    #[arg(long)]
    json: bool,
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("parameter key must not be empty".into());
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Writes only what became visible since the previous snapshot.
#[derive(Default)]
struct Renderer {
    events: usize,
    chars: usize,
}

impl Renderer {
    fn render(&mut self, snapshot: &PlaybackSnapshot, out: &mut impl Write) -> std::io::Result<()> {
        let start = self.events.saturating_sub(1);
        for (index, shown) in snapshot.events.iter().enumerate().skip(start) {
            if index >= self.events {
                if index > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "{}", header(shown))?;
                self.events = index + 1;
                self.chars = 0;
            }
            let text = shown.visible_text();
            let total = text.chars().count();
            if total > self.chars {
                let fresh: String = text.chars().skip(self.chars).collect();
                write!(out, "{fresh}")?;
                self.chars = total;
            }
        }
        out.flush()
    }
}

fn header(shown: &RevealedEvent) -> String {
    let title = &shown.event.title;
    match shown.event.kind {
        DisplayKind::Status => format!("> {title}"),
        DisplayKind::Phase => format!("## {title}"),
        DisplayKind::Notice => format!("! {title}"),
        DisplayKind::Final => format!("# {title}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_observability();
    let cli = Cli::parse();

    let screen = builtin_screen(&cli.screen).ok_or_else(|| format!("unknown screen: {}", cli.screen))?;
    let mut config = PipelineConfig::from_env()?;
    if let Some(url) = cli.ws_url {
        config = config.ws_url(url);
    }
    if let Some(url) = cli.http_url {
        config = config.http_base_url(url);
    }
    let client = ReportClient::builder().config(config).build()?;
    let mut pipeline = client.pipeline(screen);

    let mut input = ScreenInput::new(cli.query);
    for (key, value) in cli.params {
        input = input.param(key, value);
    }
    let handle = pipeline.start(&input).await?;
    info!(session_id = %handle.id(), "report session started");
    let mut updates = handle.subscribe();

    let mut renderer = Renderer::default();
    let mut stdout = std::io::stdout();
    let last = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, disposing report session");
                break pipeline.dispose().await;
            }
            changed = updates.changed() => {
                let snapshot = updates.borrow_and_update().clone();
                if !cli.json {
                    renderer.render(&snapshot, &mut stdout)?;
                }
                if changed.is_err() || !snapshot.producing {
                    break Some(snapshot);
                }
            }
        }
    };

    let Some(last) = last else {
        return Ok(());
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&last)?);
    } else {
        println!();
    }
    if let Some(error) = last.error {
        return Err(error.into());
    }
    Ok(())
}
