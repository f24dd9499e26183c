//! `quizpilot solve`: Run one quiz chain in the foreground.

use std::path::Path;
use std::sync::Arc;

use quizpilot_core::event::{DomainEvent, EventBus};
use quizpilot_gateway::RunContext;
use quizpilot_tools::ChromiumRenderer;

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    url: &str,
    max_steps: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(max) = max_steps {
        config.agent.max_steps = max;
    }
    config.validate_for_serving()?;

    quizpilot_core::quiz::parse_http_url(url)?;

    let router = quizpilot_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("provider '{}' is not configured", config.provider))?;

    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  {}", describe(&event));
        }
    });

    let config = Arc::new(config);
    let context = RunContext {
        config: config.clone(),
        provider,
        renderer: Arc::new(ChromiumRenderer::new(config.browser.clone())),
        event_bus: event_bus.clone(),
    };
    let (agent, run_dir) = context.prepare("solve").await?;

    println!("Solving {url}");
    println!("   Model:   {} ({})", config.model_for(&config.provider), config.provider);
    println!("   Scratch: {}", run_dir.display());
    println!();

    let report = agent.run(url).await;

    // Closing the bus ends the printer once it has drained.
    drop(context);
    drop(agent);
    drop(event_bus);
    let _ = printer.await;

    println!();
    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    match report.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn describe(event: &DomainEvent) -> String {
    match event {
        DomainEvent::RunStarted { url, .. } => format!("start    {url}"),
        DomainEvent::OracleInvoked {
            step,
            tool_calls,
            tokens_used,
            ..
        } => format!("step {step:<3} {tool_calls} tool call(s), {tokens_used} tokens"),
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => format!(
            "tool     {tool_name} {} in {duration_ms}ms",
            if *success { "ok" } else { "failed" }
        ),
        DomainEvent::SubmissionEvaluated { correct, next_url, .. } => format!(
            "submit   {} {}",
            if *correct { "correct" } else { "incorrect" },
            next_url.as_deref().map_or(String::new(), |u| format!("→ {u}"))
        ),
        DomainEvent::RunFinished { status, steps, .. } => format!("finish   {status} after {steps} step(s)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_submission() {
        let line = describe(&DomainEvent::SubmissionEvaluated {
            run_id: "r".into(),
            correct: true,
            next_url: Some("https://q.example/2".into()),
            timestamp: chrono::Utc::now(),
        });
        assert!(line.contains("correct"));
        assert!(line.contains("https://q.example/2"));
    }
}
