//! # Execution Loop
//!
//! The `Agent` drives one task to completion without asking the user for confirmation:
//! it asks the provider for the next action, dispatches every requested tool call through
//! the `ToolCollection` and feeds the outcomes back, until the model gives a final answer
//! or a hard stop is hit. Every step is recorded in the session history, which survives
//! whichever way the run ends.

use crate::error::ProviderError;
use crate::fuzzy_edit::FuzzyEditor;
use crate::provider::{GenerateRequest, ModelAction, Provider, ToolCallRequest};
use crate::session::{Session, Task, Turn};
use crate::tool_collection::ToolCollection;
use crate::tools::{ToolContext, VerifySettings};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Model requests allowed per task before the run is aborted.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub max_iterations: usize,
    /// The system prompt sent with every request.
    pub instructions: String,
    pub debug: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            instructions: String::new(),
            debug: false,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the model's answer to request number `iteration` (1-based).
    AwaitingModel { iteration: usize },
    /// Executing tool calls; `remaining` includes the one about to run.
    Dispatching { remaining: usize },
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AbortReason {
    #[error("no final answer after {0} model requests")]
    MaxIterations(usize),
    #[error("{0}")]
    Provider(ProviderError),
    #[error("cancelled by the user")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { answer: String },
    Aborted { reason: AbortReason },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Receives progress notifications while a run is in flight.
pub trait TurnObserver: Send + Sync {
    fn on_state(&self, _state: LoopState) {}

    /// Called right after `turn` was appended to the history.
    fn on_turn(&self, _turn: &Turn) {}
}

/// An observer that ignores everything.
pub struct SilentObserver;

impl TurnObserver for SilentObserver {}

pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolCollection>,
    settings: LoopSettings,
    editor: FuzzyEditor,
    verify: VerifySettings,
    observer: Arc<dyn TurnObserver>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolCollection>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            settings,
            editor: FuzzyEditor::default(),
            verify: VerifySettings::default(),
            observer: Arc::new(SilentObserver),
        }
    }

    /// Sets how tools edit files and run verification commands.
    pub fn with_tool_settings(mut self, editor: FuzzyEditor, verify: VerifySettings) -> Self {
        self.editor = editor;
        self.verify = verify;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Runs `task` against `session` until the model answers or a hard stop is reached.
    ///
    /// Tool failures never end the run: they are recorded as error results for the model
    /// to react to. The run ends with `Aborted` when the iteration limit is reached, the
    /// provider fails for good, or `cancel` fires. Cancellation is honoured before every
    /// model request and while waiting for the model; a tool that already started always
    /// finishes.
    pub async fn run(
        &self,
        session: &mut Session,
        task: Task,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let ctx = ToolContext {
            workspace: session.workspace().cloned(),
            editor: self.editor,
            verify: self.verify.clone(),
        };
        let specs = self.tools.specs();

        tracing::info!(provider = self.provider.name(), "starting task");
        self.record(
            session,
            Turn::UserMessage {
                text: task.as_str().to_string(),
            },
        );

        for iteration in 1..=self.settings.max_iterations {
            if cancel.is_cancelled() {
                return self.abort(AbortReason::Cancelled);
            }
            self.observer
                .on_state(LoopState::AwaitingModel { iteration });
            tracing::debug!(
                iteration,
                max_iterations = self.settings.max_iterations,
                turns = session.history().len(),
                "requesting next action"
            );

            let request = GenerateRequest {
                instructions: &self.settings.instructions,
                history: session.history(),
                tools: &specs,
                debug: self.settings.debug,
            };
            let action = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(AbortReason::Cancelled),
                action = self.provider.generate(&request) => action,
            };

            let (text, calls) = match action {
                Ok(ModelAction::FinalAnswer(answer)) => {
                    self.record(
                        session,
                        Turn::FinalAnswer {
                            text: answer.clone(),
                        },
                    );
                    self.observer.on_state(LoopState::Done);
                    tracing::info!(iterations = iteration, "task completed");
                    return RunOutcome::Completed { answer };
                }
                Ok(ModelAction::ToolCalls { text, calls }) => (text, calls),
                Err(e) => return self.abort(AbortReason::Provider(e)),
            };

            if let Some(text) = text {
                self.record(session, Turn::AssistantMessage { text });
            }
            self.dispatch_all(session, calls, &ctx).await;
        }

        self.abort(AbortReason::MaxIterations(self.settings.max_iterations))
    }

    /// Runs the calls of one model response strictly in order.
    async fn dispatch_all(
        &self,
        session: &mut Session,
        calls: Vec<ToolCallRequest>,
        ctx: &ToolContext,
    ) {
        let total = calls.len();
        for (i, call) in calls.into_iter().enumerate() {
            self.observer.on_state(LoopState::Dispatching {
                remaining: total - i,
            });
            tracing::debug!(tool = %call.name, call_id = %call.call_id, "dispatching tool call");
            self.record(
                session,
                Turn::ToolCall {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            );

            let outcome = self.tools.dispatch(&call.name, &call.arguments, ctx).await;
            self.record(
                session,
                Turn::ToolResult {
                    call_id: call.call_id,
                    name: call.name,
                    outcome,
                },
            );
        }
    }

    fn record(&self, session: &mut Session, turn: Turn) {
        session.push(turn);
        if let Some(turn) = session.history().last() {
            self.observer.on_turn(turn);
        }
    }

    fn abort(&self, reason: AbortReason) -> RunOutcome {
        tracing::warn!("task incomplete: {reason}");
        self.observer.on_state(LoopState::Aborted);
        RunOutcome::Aborted { reason }
    }
}
