//! Generate command - Run one generation session in this process.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tracing::{debug, info};

use yeevu_core::{
    EventSink, GenerationSteps, ProfileKind, ProgressEvent, SessionRunner, SessionStatus,
    StepStatus, YeevuConfig,
};

#[derive(Args)]
pub struct GenerateArgs {
    /// What the website should be about
    pub prompt: String,

    /// Generation profile (minimal, tailwind)
    #[arg(short, long)]
    pub profile: Option<ProfileKind>,

    /// Maximum model turns
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Print raw events as JSON lines
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: GenerateArgs, mut config: YeevuConfig) -> Result<()> {
    if let Some(profile) = args.profile {
        config.generation.profile = profile;
    }
    if let Some(max_turns) = args.max_turns {
        config.generation.max_turns = Some(max_turns);
    }
    config.require_credentials()?;

    let runner = SessionRunner::new(
        config.build_provider()?,
        config.build_llm()?,
        config.session_settings(),
    );
    info!("Generating website for: {}", args.prompt);

    let (sink, mut events) = EventSink::channel(256);
    let prompt = args.prompt.clone();
    let session = tokio::spawn(async move { runner.run(&prompt, &sink).await });

    let mut steps = GenerationSteps::new();
    while let Some(event) = events.recv().await {
        steps.apply(&event, Utc::now());
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event);
        }
    }
    let session = session.await.context("Session task failed")?;

    if !args.json {
        println!();
        render_steps(&steps);
    }

    if session.status != SessionStatus::Complete {
        anyhow::bail!(
            "Generation failed: {}",
            session.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    if !args.json {
        if let (Some(url), Some(id)) = (&session.preview_url, &session.sandbox_id) {
            println!();
            println!("🌐 Preview: {}", url);
            println!("   Download: yeevu download {}", id);
            println!("   Remove:   yeevu remove {}", id);
        }
    }
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Progress { message } => println!("⏳ {}", message),
        ProgressEvent::ModelMessage { content } => println!("💬 {}", content.trim()),
        ProgressEvent::ToolUse { name, input } => {
            let target = input
                .get("file_path")
                .or_else(|| input.get("command"))
                .or_else(|| input.get("pattern"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            println!("🔧 {} {}", name, target);
        }
        ProgressEvent::ToolResult { result, .. } => debug!("Tool result: {}", result),
        // already mirrored to the log by the sink
        ProgressEvent::BackendLog { .. } => {}
        ProgressEvent::Error { message } => println!("❌ {}", message),
        ProgressEvent::Complete {
            files_created,
            failsafe_files,
            ..
        } => println!(
            "✅ Done: {} files written by the model, {} from fallbacks",
            files_created, failsafe_files
        ),
    }
}

fn render_steps(steps: &GenerationSteps) {
    println!("📋 Progress");
    for step in &steps.steps {
        let icon = match step.status {
            StepStatus::Completed => "✅",
            StepStatus::Active => "🔄",
            StepStatus::Error => "❌",
            StepStatus::Pending => "⬜",
        };
        match step.completed_at {
            Some(at) => println!("   {} {} ({})", icon, step.title, at.format("%H:%M:%S")),
            None => println!("   {} {}", icon, step.title),
        }
    }
    if !steps.files_created.is_empty() {
        println!("   Files: {}", steps.files_created.join(", "));
    }
}
