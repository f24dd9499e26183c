//! Background dispatch of accepted quiz runs.

use std::path::PathBuf;
use std::sync::Arc;

use quizpilot_agent::{QuizAgent, RunReport};
use quizpilot_config::AppConfig;
use quizpilot_core::event::EventBus;
use quizpilot_core::message::RunId;
use quizpilot_core::provider::Provider;
use quizpilot_core::quiz::QuizRequest;
use quizpilot_tools::PageRenderer;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::history::{EntryStatus, RunHistory};

/// Hands an accepted request to whatever executes it.
///
/// `launch` must return immediately; the HTTP response does not wait for the run.
pub trait RunLauncher: Send + Sync {
    fn launch(&self, task_id: u64, request: QuizRequest);
}

/// Everything a run shares with the rest of the process.
#[derive(Clone)]
pub struct RunContext {
    pub config: Arc<AppConfig>,
    pub provider: Arc<dyn Provider>,
    pub renderer: Arc<dyn PageRenderer>,
    pub event_bus: Arc<EventBus>,
}

impl RunContext {
    /// Create the run's scratch directory and an agent whose tools are bound to it.
    pub async fn prepare(&self, label: &str) -> std::io::Result<(QuizAgent, PathBuf)> {
        let run_dir = self
            .config
            .scratch_dir
            .join(format!("run-{label}-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&run_dir).await?;

        let tools = quizpilot_tools::quiz_registry(&self.config, &run_dir, self.renderer.clone());
        let agent = QuizAgent::from_config(
            &self.config,
            self.provider.clone(),
            Arc::new(tools),
            self.event_bus.clone(),
        );
        Ok((agent, run_dir))
    }
}

/// Runs each request as its own tokio task and records the outcome in history.
pub struct AgentLauncher {
    context: RunContext,
    history: Arc<RunHistory>,
}

impl AgentLauncher {
    pub fn new(context: RunContext, history: Arc<RunHistory>) -> Self {
        Self { context, history }
    }
}

impl RunLauncher for AgentLauncher {
    fn launch(&self, task_id: u64, request: QuizRequest) {
        let context = self.context.clone();
        let history = self.history.clone();

        tokio::spawn(async move {
            history.mark_running(task_id).await;

            let (agent, run_dir) = match context.prepare(&task_id.to_string()).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(task_id, error = %e, "Cannot create run directory");
                    history
                        .finish(
                            task_id,
                            EntryStatus::Failed,
                            serde_json::json!({"error": format!("cannot create run directory: {e}")}),
                        )
                        .await;
                    return;
                }
            };

            info!(task_id, url = %request.url, run_dir = %run_dir.display(), "Run dispatched");
            let run_id = RunId(format!("task-{task_id}"));
            let run = tokio::spawn(async move { agent.run_with_id(run_id, &request.url).await });

            match run.await {
                Ok(report) => {
                    history.finish(task_id, entry_status(&report), report.summary()).await;
                }
                Err(e) => {
                    let reason = panic_message(e);
                    error!(task_id, error = %reason, "Run aborted");
                    history
                        .finish(task_id, EntryStatus::Failed, serde_json::json!({ "error": reason }))
                        .await;
                }
            }
        });
    }
}

fn entry_status(report: &RunReport) -> EntryStatus {
    if report.status.is_success() {
        EntryStatus::Completed
    } else {
        EntryStatus::Failed
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("run cancelled: {err}");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("run panicked: {message}")
}
