use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, UnknownToolPolicy};
use crate::error::{Result, StepwiseError};
use crate::hooks::AgentHook;
use crate::llm::{LanguageModel, ResponseFormat};
use crate::memory::ConversationHistory;
use crate::message::{Message, Role};
use crate::prompt::{build_system_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::step::StepRecord;
use crate::tool::ToolRegistry;

/// Result of a run that ended with an `output` step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub answer: String,
    pub history: ConversationHistory,
    /// Number of model calls made.
    pub steps: usize,
    /// Number of tools actually invoked.
    pub tool_calls: usize,
}

/// Drives the think/action/observe/output loop for one query at a time.
///
/// Each iteration makes exactly one model call and handles exactly one step.
/// The run ends with `Ok` only on an `output` step; every other exit is an
/// error, so callers can always tell an answer from an abort.
pub struct Agent<M: LanguageModel + ?Sized> {
    system_prompt: String,
    model: Arc<M>,
    tools: ToolRegistry,
    max_steps: usize,
    timeout: Option<Duration>,
    response_role: Role,
    unknown_tool: UnknownToolPolicy,
    hooks: Vec<Arc<dyn AgentHook>>,
    cancellation: Option<CancellationToken>,
}

impl<M: LanguageModel + ?Sized> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model,
            tools: ToolRegistry::new(),
            max_steps: defaults.max_steps,
            timeout: defaults.timeout(),
            response_role: defaults.response_role,
            unknown_tool: defaults.unknown_tool,
            hooks: Vec::new(),
            cancellation: None,
        }
    }

    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self = self
            .with_max_steps(config.max_steps)
            .with_response_role(config.response_role)
            .with_unknown_tool_policy(config.unknown_tool);
        self.timeout = config.timeout();
        if let Some(prompt) = &config.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Role under which the model's own responses are replayed. `Role::User`
    /// reproduces the labelling some prompts were tuned against; `System` is
    /// not accepted and falls back to `Assistant`.
    pub fn with_response_role(mut self, role: Role) -> Self {
        self.response_role = match role {
            Role::System => Role::Assistant,
            other => other,
        };
        self
    }

    pub fn with_unknown_tool_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.unknown_tool = policy;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The token is checked before every model call and raced against any
    /// in-flight model or tool call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Run a query and return only the final answer.
    pub async fn respond(&self, query: impl Into<String>) -> Result<String> {
        self.run(query).await.map(|transcript| transcript.answer)
    }

    /// Run a query with a fresh history, bounded by the step limit and the
    /// optional timeout.
    pub async fn run(&self, query: impl Into<String>) -> Result<Transcript> {
        let query = query.into();
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive(query))
                .await
                .map_err(|_| StepwiseError::Timeout(limit))?,
            None => self.drive(query).await,
        }
    }

    async fn drive(&self, query: String) -> Result<Transcript> {
        let mut history = ConversationHistory::new();
        history.push(Message::system(self.system_message()));
        history.push(Message::user(query));
        let mut tool_calls = 0;

        for step in 1..=self.max_steps {
            if self.is_cancelled() {
                return Err(StepwiseError::Cancelled);
            }
            debug!(step, history_len = history.len(), "requesting next step");

            for hook in &self.hooks {
                hook.before_model(history.messages()).await?;
            }
            let raw = self
                .cancellable(
                    self.model
                        .complete_chat(history.messages(), ResponseFormat::JsonObject),
                )
                .await?;
            for hook in &self.hooks {
                hook.after_model(&raw).await?;
            }

            history.push(Message::new(self.response_role, raw.as_str()));

            match StepRecord::parse(&raw)? {
                StepRecord::Think { content } => {
                    info!(step, "think: {content}");
                    for hook in &self.hooks {
                        hook.on_think(&content).await?;
                    }
                }
                StepRecord::Output { content } => {
                    info!(step, tool_calls, "output: {content}");
                    for hook in &self.hooks {
                        hook.on_output(&content).await?;
                    }
                    return Ok(Transcript {
                        answer: content,
                        history,
                        steps: step,
                        tool_calls,
                    });
                }
                StepRecord::Action { tool, input } => {
                    let (observation, invoked) = self.act(&tool, &input).await?;
                    if invoked {
                        tool_calls += 1;
                    }
                    history.push(Message::assistant(
                        StepRecord::observe(observation.as_str()).to_json()?,
                    ));
                    for hook in &self.hooks {
                        hook.on_observe(&tool, &input, &observation).await?;
                    }
                }
                StepRecord::Observe { .. } => {
                    return Err(StepwiseError::Protocol(
                        "model emitted an `observe` step; observations only follow actions"
                            .into(),
                    ));
                }
            }
        }

        Err(StepwiseError::StepLimit(self.max_steps))
    }

    /// Resolve an action into the text of its observation. The flag reports
    /// whether a tool was actually invoked.
    async fn act(&self, tool: &str, input: &str) -> Result<(String, bool)> {
        if !self.tools.contains(tool) {
            return match self.unknown_tool {
                UnknownToolPolicy::Fail => Err(StepwiseError::ToolNotFound(tool.to_string())),
                UnknownToolPolicy::Observe => {
                    warn!(tool, "model requested an unknown tool");
                    Ok((
                        format!(
                            "error: tool `{tool}` is not available; choose one of: {}",
                            self.tools.names().join(", ")
                        ),
                        false,
                    ))
                }
            };
        }

        info!(tool, input, "action");
        for hook in &self.hooks {
            hook.on_action(tool, input).await?;
        }

        match self.cancellable(self.tools.invoke(tool, input)).await {
            Ok(output) => Ok((output, true)),
            Err(err @ StepwiseError::ToolInvocation { .. }) => {
                warn!(tool, error = %err, "tool failed; reporting to the model");
                Ok((format!("error: {err}"), true))
            }
            Err(err) => Err(err),
        }
    }

    fn system_message(&self) -> String {
        build_system_prompt(&self.system_prompt, &self.tools.describe())
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match &self.cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(StepwiseError::Cancelled),
                res = fut => res,
            },
            None => fut.await,
        }
    }
}
