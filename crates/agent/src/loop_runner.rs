//! The agent state machine.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use quizpilot_config::AppConfig;
use quizpilot_core::action::{self, Decision, STOP, SUBMIT_ANSWER, ToolAction};
use quizpilot_core::error::{RunError, ToolError};
use quizpilot_core::event::{DomainEvent, EventBus};
use quizpilot_core::message::{Conversation, Message, MessageToolCall, RunId};
use quizpilot_core::provider::{Provider, ProviderRequest, ToolDefinition};
use quizpilot_core::quiz::{SubmissionOutcome, Verdict};
use quizpilot_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};

use crate::prompt::system_prompt;
use crate::report::{RunReport, RunStatus};

/// Where a run currently is.
#[derive(Debug, Clone)]
pub enum LoopState {
    /// Waiting on the oracle's next decision.
    Deciding,
    /// Executing the calls the oracle just asked for.
    InvokingTool(Vec<MessageToolCall>),
    /// Applying the grader's verdict.
    EvaluatingSubmission(SubmissionOutcome),
    Done(RunStatus),
    Failed(RunError),
}

/// Mutable bookkeeping of one run.
#[derive(Debug)]
struct Progress {
    run_id: RunId,
    steps: u32,
    tool_invocations: u32,
    submissions: u32,
    current_url: String,
    /// Submissions for the current question
    attempts: u32,
}

/// Drives one quiz chain from its first URL to a terminal state.
pub struct QuizAgent {
    /// The oracle
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    temperature: f32,

    /// Max tokens per oracle reply
    max_tokens: Option<u32>,

    /// Tools bound to this run's scratch directory
    tools: Arc<ToolRegistry>,

    system_prompt: String,

    /// Oracle invocations allowed per run
    max_steps: u32,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl QuizAgent {
    /// Create a new agent with a 200-step ceiling and an anonymous prompt.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt: system_prompt(""),
            max_steps: 200,
            event_bus,
        }
    }

    /// Create an agent with the model, limits and prompt from `config`.
    ///
    /// The model comes from the active provider's section when it sets one.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let model = config.model_for(&config.provider).to_string();
        Self::new(provider, model, config.temperature, tools, event_bus)
            .with_max_steps(config.agent.max_steps)
            .with_max_tokens(config.max_tokens)
            .with_system_prompt(system_prompt(&config.email))
    }

    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Solve the chain starting at `url` under a fresh run id.
    pub async fn run(&self, url: &str) -> RunReport {
        self.run_with_id(RunId::new(), url).await
    }

    /// Solve the chain starting at `url`.
    ///
    /// Never returns an error: failures end up in [`RunReport::error`].
    pub async fn run_with_id(&self, run_id: RunId, url: &str) -> RunReport {
        info!(run_id = %run_id, url, max_steps = self.max_steps, "Run started");
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run_id.to_string(),
            url: url.to_string(),
            timestamp: Utc::now(),
        });

        let mut conversation = Conversation::for_run(run_id.clone());
        conversation.push(Message::system(&self.system_prompt));
        conversation.push(Message::user(url));

        let mut progress = Progress {
            run_id,
            steps: 0,
            tool_invocations: 0,
            submissions: 0,
            current_url: url.to_string(),
            attempts: 0,
        };

        let definitions = self.catalogue();
        let mut state = LoopState::Deciding;
        let (status, error) = loop {
            state = match state {
                LoopState::Deciding => self.decide(&mut conversation, &definitions, &mut progress).await,
                LoopState::InvokingTool(calls) => self.invoke(calls, &mut conversation, &mut progress).await,
                LoopState::EvaluatingSubmission(outcome) => {
                    Self::evaluate(outcome, &mut conversation, &mut progress)
                }
                LoopState::Done(status) => break (status, None),
                LoopState::Failed(e) => break (RunStatus::Failed, Some(e)),
            };
        };

        match &error {
            Some(RunError::LoopLimit { .. }) => warn!(
                run_id = %progress.run_id,
                steps = progress.steps,
                url = %progress.current_url,
                "Step ceiling reached"
            ),
            Some(e) => warn!(run_id = %progress.run_id, error = %e, "Run failed"),
            None => info!(
                run_id = %progress.run_id,
                status = %status,
                steps = progress.steps,
                submissions = progress.submissions,
                "Run finished"
            ),
        }

        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: progress.run_id.to_string(),
            status: status.to_string(),
            steps: progress.steps,
            timestamp: Utc::now(),
        });

        RunReport {
            run_id: progress.run_id,
            status,
            steps: progress.steps,
            tool_invocations: progress.tool_invocations,
            submissions: progress.submissions,
            last_url: progress.current_url,
            error,
            conversation,
        }
    }

    /// Tool definitions sent with every oracle call: the registry plus `stop`.
    fn catalogue(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();
        definitions.push(ToolDefinition {
            name: STOP.into(),
            description: "End the run when the quiz chain is finished or cannot be continued.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        });
        definitions
    }

    async fn decide(
        &self,
        conversation: &mut Conversation,
        definitions: &[ToolDefinition],
        progress: &mut Progress,
    ) -> LoopState {
        if progress.steps >= self.max_steps {
            return LoopState::Failed(RunError::LoopLimit {
                max_steps: self.max_steps,
            });
        }
        progress.steps += 1;

        debug!(
            run_id = %progress.run_id,
            step = progress.steps,
            messages = conversation.len(),
            "Invoking oracle"
        );

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: definitions.to_vec(),
        };

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => return LoopState::Failed(RunError::Oracle(e)),
        };

        self.event_bus.publish(DomainEvent::OracleInvoked {
            run_id: progress.run_id.to_string(),
            step: progress.steps,
            tool_calls: response.message.tool_calls.len(),
            tokens_used: response.usage.as_ref().map_or(0, |u| u.total_tokens),
            timestamp: Utc::now(),
        });

        let decision = Decision::from_message(&response.message);
        conversation.push(response.message);

        match decision {
            Decision::Act(calls) => LoopState::InvokingTool(calls),
            Decision::Stop => LoopState::Done(RunStatus::Stopped),
            Decision::Think(text) => {
                debug!(run_id = %progress.run_id, chars = text.len(), "Oracle replied with text");
                LoopState::Deciding
            }
        }
    }

    async fn invoke(
        &self,
        calls: Vec<MessageToolCall>,
        conversation: &mut Conversation,
        progress: &mut Progress,
    ) -> LoopState {
        let mut outcome = None;
        let mut stop = false;

        for call in &calls {
            // Every call gets a tool message, so the transcript stays valid
            // for the next oracle request.
            let text = match self.execute(call, progress).await {
                Ok(Dispatch::Stop) => {
                    stop = true;
                    "Stopping.".to_string()
                }
                Ok(Dispatch::Ran(result)) => {
                    if let Some(graded) = graded_submission(&result) {
                        progress.submissions += 1;
                        progress.attempts += 1;
                        self.event_bus.publish(DomainEvent::SubmissionEvaluated {
                            run_id: progress.run_id.to_string(),
                            correct: graded.correct,
                            next_url: graded.next_url.clone(),
                            timestamp: Utc::now(),
                        });
                        outcome = Some(graded);
                    }
                    result.output
                }
                Err(e) => {
                    warn!(run_id = %progress.run_id, tool = %call.name, error = %e, "Tool call failed");
                    format!("Error: {e}")
                }
            };
            conversation.push(Message::tool_result(&call.id, text));
        }

        match outcome {
            Some(outcome) => LoopState::EvaluatingSubmission(outcome),
            None if stop => LoopState::Done(RunStatus::Stopped),
            None => LoopState::Deciding,
        }
    }

    /// Decode and run one call.
    async fn execute(&self, call: &MessageToolCall, progress: &mut Progress) -> Result<Dispatch, ToolError> {
        let arguments = action::parse_raw_arguments(&call.name, &call.arguments)?;
        let decoded = ToolAction::decode(&call.name, &arguments)?;
        if matches!(decoded, ToolAction::Stop) {
            return Ok(Dispatch::Stop);
        }
        if let ToolAction::Render(args) = &decoded {
            debug!(run_id = %progress.run_id, url = %args.url, "Rendering");
        }

        progress.tool_invocations += 1;
        let start = Instant::now();
        let result = self
            .tools
            .execute(&ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments,
            })
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.as_ref().is_ok_and(|r| r.success),
            duration_ms,
            timestamp: Utc::now(),
        });
        debug!(
            run_id = %progress.run_id,
            tool = %call.name,
            duration_ms,
            ok = result.is_ok(),
            "Tool executed"
        );

        result.map(Dispatch::Ran)
    }

    fn evaluate(outcome: SubmissionOutcome, conversation: &mut Conversation, progress: &mut Progress) -> LoopState {
        match outcome.verdict() {
            Verdict::Advance(next_url) => {
                info!(
                    run_id = %progress.run_id,
                    correct = outcome.correct,
                    attempts = progress.attempts,
                    url = %next_url,
                    "Advancing to next quiz"
                );
                conversation.push(Message::user(&next_url));
                progress.current_url = next_url;
                progress.attempts = 0;
                LoopState::Deciding
            }
            Verdict::Finished => LoopState::Done(RunStatus::Completed),
            Verdict::Retry => {
                debug!(run_id = %progress.run_id, attempts = progress.attempts, "Retry allowed");
                LoopState::Deciding
            }
            Verdict::Rejected(reason) => LoopState::Failed(RunError::SubmissionRejected {
                url: progress.current_url.clone(),
                reason,
            }),
        }
    }
}

enum Dispatch {
    Stop,
    Ran(ToolResult),
}

/// The grader's verdict carried by a successful `submit_answer` result.
fn graded_submission(result: &ToolResult) -> Option<SubmissionOutcome> {
    if !result.success || result.tool != SUBMIT_ANSWER {
        return None;
    }
    serde_json::from_value(result.data.clone()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quizpilot_core::error::ProviderError;
    use quizpilot_core::message::Role;
    use quizpilot_core::provider::{ProviderResponse, Usage};
    use quizpilot_core::tool::Tool;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned assistant messages, then repeats the last one.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Message>>,
        fallback: Message,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Message>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: Message::assistant("thinking..."),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let message = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Ok(ProviderResponse {
                message,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "scripted-model".into(),
                metadata: serde_json::Map::new(),
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::AuthenticationFailed("bad key".into()))
        }
    }

    /// Stand-in for `render_page`.
    struct EchoPage;

    #[async_trait]
    impl Tool for EchoPage {
        fn name(&self) -> &str {
            "render_page"
        }
        fn description(&self) -> &str {
            "render"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(format!("<html>{}</html>", arguments["url"].as_str().unwrap_or(""))))
        }
    }

    /// Stand-in for `submit_answer` that returns a fixed grader body.
    struct Grader(serde_json::Value);

    #[async_trait]
    impl Tool for Grader {
        fn name(&self) -> &str {
            "submit_answer"
        }
        fn description(&self) -> &str {
            "submit"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let outcome = SubmissionOutcome::from_response(self.0.clone()).unwrap();
            Ok(ToolResult::ok("graded").with_data(serde_json::to_value(outcome).unwrap()))
        }
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> Message {
        let mut msg = Message::assistant("");
        msg.tool_calls.push(MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        });
        msg
    }

    fn agent(provider: Arc<dyn Provider>, grader: serde_json::Value) -> QuizAgent {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoPage));
        tools.register(Box::new(Grader(grader)));
        QuizAgent::new(provider, "scripted-model", 0.0, Arc::new(tools), Arc::new(EventBus::default()))
    }

    fn tool_messages(report: &RunReport) -> Vec<&str> {
        report
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect()
    }

    #[tokio::test]
    async fn end_reply_stops_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("END")]));
        let report = agent(provider, serde_json::json!({"correct": true})).run("https://q.example/1").await;

        assert_eq!(report.status, RunStatus::Stopped);
        assert_eq!(report.steps, 1);
        assert_eq!(report.tool_invocations, 0);
        // system, seed url, reply
        assert_eq!(report.conversation.len(), 3);
        assert_eq!(report.conversation.messages()[1].content, "https://q.example/1");
    }

    #[tokio::test]
    async fn render_then_correct_submit_completes() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("c1", "render_page", serde_json::json!({"url": "https://q.example/1"})),
            call(
                "c2",
                "submit_answer",
                serde_json::json!({"url": "https://q.example/submit", "payload": {"answer": 1}}),
            ),
        ]));
        let report = agent(provider.clone(), serde_json::json!({"correct": true}))
            .run("https://q.example/1")
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.tool_invocations, 2);
        assert_eq!(report.submissions, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn text_replies_loop_back_until_the_ceiling() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let report = agent(provider.clone(), serde_json::json!({"correct": true}))
            .with_max_steps(7)
            .run("https://q.example/1")
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.steps, 7);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 7);
        assert!(matches!(report.error, Some(RunError::LoopLimit { max_steps: 7 })));
    }

    #[tokio::test]
    async fn tool_errors_become_messages() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("c1", "shell", serde_json::json!({"cmd": "ls"})),
            call("c2", "render_page", serde_json::json!({"href": "missing url"})),
            Message::assistant("END"),
        ]));
        let report = agent(provider, serde_json::json!({"correct": true})).run("https://q.example/1").await;

        assert_eq!(report.status, RunStatus::Stopped);
        let tools = tool_messages(&report);
        assert_eq!(tools.len(), 2);
        assert!(tools[0].starts_with("Error: Tool not found: shell"));
        assert!(tools[1].starts_with("Error: Invalid tool arguments"));
    }

    #[tokio::test]
    async fn next_url_seeds_a_new_user_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call(
                "c1",
                "submit_answer",
                serde_json::json!({"url": "https://q.example/submit", "payload": {}}),
            ),
            Message::assistant("END"),
        ]));
        let report = agent(
            provider,
            serde_json::json!({"correct": false, "url": "https://q.example/2"}),
        )
        .run("https://q.example/1")
        .await;

        assert_eq!(report.status, RunStatus::Stopped);
        assert_eq!(report.last_url, "https://q.example/2");
        let last_user = report
            .conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .unwrap();
        assert_eq!(last_user.content, "https://q.example/2");
    }

    #[tokio::test]
    async fn rejected_submission_fails_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![call(
            "c1",
            "submit_answer",
            serde_json::json!({"url": "https://q.example/submit", "payload": {}}),
        )]));
        let report = agent(provider, serde_json::json!({"correct": false, "reason": "Wrong sum"}))
            .run("https://q.example/1")
            .await;

        assert_eq!(report.status, RunStatus::Failed);
        match report.error {
            Some(RunError::SubmissionRejected { url, reason }) => {
                assert_eq!(url, "https://q.example/1");
                assert_eq!(reason, "Wrong sum");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_returns_to_the_oracle() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            call(
                "c1",
                "submit_answer",
                serde_json::json!({"url": "https://q.example/submit", "payload": {}}),
            ),
            Message::assistant("END"),
        ]));
        let report = agent(provider.clone(), serde_json::json!({"correct": false, "retry": true}))
            .run("https://q.example/1")
            .await;

        assert_eq!(report.status, RunStatus::Stopped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_call_ends_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![call("c1", "stop", serde_json::json!({}))]));
        let report = agent(provider, serde_json::json!({"correct": true})).run("https://q.example/1").await;

        assert_eq!(report.status, RunStatus::Stopped);
        assert_eq!(report.tool_invocations, 0);
        assert_eq!(tool_messages(&report), vec!["Stopping."]);
    }

    #[tokio::test]
    async fn oracle_failure_fails_the_run() {
        let report = agent(Arc::new(FailingProvider), serde_json::json!({"correct": true}))
            .run("https://q.example/1")
            .await;
        assert_eq!(report.status, RunStatus::Failed);
        assert!(matches!(
            report.error,
            Some(RunError::Oracle(ProviderError::AuthenticationFailed(_)))
        ));
    }

    #[tokio::test]
    async fn publishes_lifecycle_events() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::new(vec![
            call("c1", "render_page", serde_json::json!({"url": "https://q.example/1"})),
            Message::assistant("END"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoPage));
        let report = QuizAgent::new(provider, "m", 0.0, Arc::new(tools), bus)
            .run("https://q.example/1")
            .await;
        assert_eq!(report.status, RunStatus::Stopped);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::RunStarted { .. } => "started",
                DomainEvent::OracleInvoked { .. } => "oracle",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::SubmissionEvaluated { .. } => "submission",
                DomainEvent::RunFinished { .. } => "finished",
            });
        }
        assert_eq!(kinds, vec!["started", "oracle", "tool", "oracle", "finished"]);
    }

    #[test]
    fn catalogue_includes_stop() {
        let agent = agent(Arc::new(FailingProvider), serde_json::json!({"correct": true}));
        let names: Vec<String> = agent.catalogue().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["render_page", "submit_answer", "stop"]);
    }
}
