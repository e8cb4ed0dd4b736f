//! The resumable agent loop.
//!
//! A turn starts from a prompt or from resolving a pending call and runs
//! model calls until the completion tool fires, the iteration budget runs out,
//! a request needs approval, or the turn is cancelled. The conversation is
//! saved after every iteration that changed it, so a paused or interrupted
//! turn can be picked up from the store later.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use agent_provider::{
    CancelSignal, CompletionRequest, ModelProvider, ModelResponse, ProviderError, ProviderProfile,
    RunMessage, ToolCallRequest, ToolResult,
};
use conversation_store::{Conversation, ConversationStore, PendingFunctionCall};

use crate::approval::{ApprovalGate, GateDecision, PermissionRule};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::notify::{lock_unpoisoned, NotificationSink, NullSink};
use crate::tools::ToolRegistry;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { final_message: String },
    /// Paused; these calls wait on [`Agent::resolve_pending_call`].
    PermissionRequested { call_ids: Vec<String> },
    MaxIterations,
    Cancelled,
}

enum BatchStep {
    Continue,
    Completed(String),
    Paused(Vec<PendingFunctionCall>),
    Cancelled,
}

pub struct Agent {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn ConversationStore>,
    tools: ToolRegistry,
    gate: RwLock<ApprovalGate>,
    sink: Arc<dyn NotificationSink>,
    config: AgentConfig,
    active_turns: Mutex<HashMap<String, CancelSignal>>,
}

impl Agent {
    /// Agent whose gate falls back to tool categories only and whose events go nowhere.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ConversationStore>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Self {
        let gate = ApprovalGate::category_defaults(config.shell_dialect);
        Self {
            provider,
            store,
            tools,
            gate: RwLock::new(gate),
            sink: Arc::new(NullSink),
            config,
            active_turns: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_gate(self, gate: ApprovalGate) -> Self {
        Self {
            gate: RwLock::new(gate),
            ..self
        }
    }

    #[must_use]
    pub fn with_sink(self, sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink, ..self }
    }

    /// Provider and model this agent talks to.
    #[must_use]
    pub fn provider_profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Adds an allow rule for the rest of this agent's life.
    pub fn add_allow_rule(&self, rule: PermissionRule) -> bool {
        self.gate_mut().add_allow_rule(rule)
    }

    #[must_use]
    pub fn is_turn_active(&self, conversation_id: &str) -> bool {
        lock_unpoisoned(&self.active_turns).contains_key(conversation_id)
    }

    /// Raises the cancel flag of the running turn. Returns false when nothing is running.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match lock_unpoisoned(&self.active_turns).get(conversation_id) {
            Some(cancel) => {
                cancel.store(true, Ordering::SeqCst);
                tracing::info!(conversation_id, "turn cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Appends a user message and runs the loop. Creates the conversation on first use.
    #[tracing::instrument(
        skip(self, text),
        fields(conversation_id = %conversation_id, model = %self.provider.profile().model_id)
    )]
    pub async fn submit_prompt(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let turn = self.begin_turn(conversation_id)?;
        let mut conversation = self.store.load_or_create(conversation_id).await?;
        if conversation.is_paused() {
            return Err(AgentError::ConversationPaused {
                conversation_id: conversation_id.to_string(),
                call_ids: pending_ids(&conversation.pending_calls),
            });
        }

        conversation.messages.push(RunMessage::UserText {
            text: text.to_string(),
        });
        self.run_loop(&mut conversation, &turn.cancel).await
    }

    /// Approves or declines one pending call. The loop resumes once none remain.
    #[tracing::instrument(
        skip(self),
        fields(conversation_id = %conversation_id, model = %self.provider.profile().model_id)
    )]
    pub async fn resolve_pending_call(
        &self,
        conversation_id: &str,
        call_id: &str,
        approved: bool,
    ) -> Result<TurnOutcome, AgentError> {
        let turn = self.begin_turn(conversation_id)?;
        let mut conversation = self.store.load(conversation_id).await?;
        let pending = conversation.take_pending_call(call_id).ok_or_else(|| {
            AgentError::PendingCallNotFound {
                conversation_id: conversation_id.to_string(),
                call_id: call_id.to_string(),
            }
        })?;
        let request = pending.to_request();

        let mut completion = None;
        if approved {
            tracing::debug!(call_id, tool = %request.tool_name, "pending call approved");
            let Some(result) = self.invoke_tool(&conversation.id, &request, &turn.cancel).await else {
                return Ok(self.cancelled(&conversation.id));
            };
            if !result.is_error && self.tools.is_completion(&result.tool_name) {
                completion = Some(result.content.clone());
            }
            conversation.messages.push(result.into_message());
        } else {
            tracing::debug!(call_id, tool = %request.tool_name, "pending call declined");
            conversation
                .messages
                .push(denied_by_user(&request).into_message());
        }

        if conversation.is_paused() {
            self.store.save(&mut conversation).await?;
            return Ok(TurnOutcome::PermissionRequested {
                call_ids: pending_ids(&conversation.pending_calls),
            });
        }

        let queued: Vec<_> = std::mem::take(&mut conversation.queued_calls)
            .into_iter()
            .map(|call| (call, GateDecision::Allow))
            .collect();
        match self.execute_batch(&mut conversation, queued, &turn.cancel).await {
            BatchStep::Cancelled => return Ok(self.cancelled(&conversation.id)),
            BatchStep::Completed(message) => completion = completion.or(Some(message)),
            BatchStep::Continue | BatchStep::Paused(_) => {}
        }
        self.store.save(&mut conversation).await?;

        if let Some(final_message) = completion {
            return Ok(self.completed(&conversation.id, final_message));
        }
        self.run_loop(&mut conversation, &turn.cancel).await
    }

    async fn run_loop(
        &self,
        conversation: &mut Conversation,
        cancel: &CancelSignal,
    ) -> Result<TurnOutcome, AgentError> {
        for iteration in 1..=self.config.max_iterations {
            tracing::debug!(conversation_id = %conversation.id, iteration, "model call");
            let request = self.completion_request(conversation);
            let Some(response) = await_or_cancel(self.call_model(request), cancel).await else {
                return Ok(self.cancelled(&conversation.id));
            };
            let response = response?;

            let before = conversation.messages.len();
            if let Some(text) = response.visible_text() {
                self.sink.on_text(&conversation.id, text);
                conversation.messages.push(RunMessage::AssistantText {
                    text: response.text.clone(),
                });
            }

            let step = if response.is_plain_text() {
                BatchStep::Continue
            } else {
                for call in &response.tool_calls {
                    conversation.messages.push(call.to_message());
                }
                self.process_tool_calls(conversation, response.tool_calls, cancel)
                    .await
            };

            match step {
                BatchStep::Cancelled => return Ok(self.cancelled(&conversation.id)),
                BatchStep::Continue => {
                    if conversation.messages.len() > before {
                        self.store.save(conversation).await?;
                    }
                }
                BatchStep::Completed(final_message) => {
                    self.store.save(conversation).await?;
                    return Ok(self.completed(&conversation.id, final_message));
                }
                BatchStep::Paused(pending) => {
                    self.store.save(conversation).await?;
                    for call in &pending {
                        self.sink.on_permission_requested(&conversation.id, call);
                    }
                    tracing::info!(
                        conversation_id = %conversation.id,
                        pending = pending.len(),
                        "turn paused for approval"
                    );
                    return Ok(TurnOutcome::PermissionRequested {
                        call_ids: pending_ids(&pending),
                    });
                }
            }
        }

        tracing::info!(
            conversation_id = %conversation.id,
            max_iterations = self.config.max_iterations,
            "iteration budget exhausted"
        );
        self.sink.on_max_iterations_reached(&conversation.id);
        Ok(TurnOutcome::MaxIterations)
    }

    /// If any request needs approval, nothing in the batch runs now: asked calls
    /// become pending, cleared calls are queued, denied calls get their result.
    async fn process_tool_calls(
        &self,
        conversation: &mut Conversation,
        calls: Vec<ToolCallRequest>,
        cancel: &CancelSignal,
    ) -> BatchStep {
        let decided: Vec<(ToolCallRequest, GateDecision)> = {
            let gate = self.gate();
            calls
                .into_iter()
                .map(|call| {
                    let decision = match self.tools.category_of(&call.tool_name) {
                        Some(category) => gate.evaluate(category, &call),
                        None => GateDecision::Allow,
                    };
                    (call, decision)
                })
                .collect()
        };

        if !decided
            .iter()
            .any(|(_, decision)| *decision == GateDecision::Ask)
        {
            return self.execute_batch(conversation, decided, cancel).await;
        }

        let mut created = Vec::new();
        for (call, decision) in decided {
            match decision {
                GateDecision::Ask => {
                    let pending = PendingFunctionCall::from_request(&call);
                    conversation.pending_calls.push(pending.clone());
                    created.push(pending);
                }
                GateDecision::Allow => conversation.queued_calls.push(call),
                GateDecision::Deny => conversation
                    .messages
                    .push(denied_by_settings(&call).into_message()),
            }
        }
        BatchStep::Paused(created)
    }

    /// Runs cleared calls in order. Every call runs even after the completion tool.
    async fn execute_batch(
        &self,
        conversation: &mut Conversation,
        calls: Vec<(ToolCallRequest, GateDecision)>,
        cancel: &CancelSignal,
    ) -> BatchStep {
        let mut completion = None;
        for (call, decision) in calls {
            let result = match decision {
                GateDecision::Deny => denied_by_settings(&call),
                GateDecision::Allow | GateDecision::Ask => {
                    match self.invoke_tool(&conversation.id, &call, cancel).await {
                        Some(result) => result,
                        None => return BatchStep::Cancelled,
                    }
                }
            };
            if !result.is_error && self.tools.is_completion(&result.tool_name) {
                completion = Some(result.content.clone());
            }
            conversation.messages.push(result.into_message());
        }

        match completion {
            Some(final_message) => BatchStep::Completed(final_message),
            None => BatchStep::Continue,
        }
    }

    async fn invoke_tool(
        &self,
        conversation_id: &str,
        call: &ToolCallRequest,
        cancel: &CancelSignal,
    ) -> Option<ToolResult> {
        tracing::debug!(conversation_id, call_id = %call.call_id, tool = %call.tool_name, "invoking tool");
        self.sink
            .on_tool_invoked(conversation_id, &call.tool_name, &call.arguments);
        let result = await_or_cancel(self.tools.invoke(call), cancel).await?;
        self.sink.on_tool_result(conversation_id, &result);
        Some(result)
    }

    async fn call_model(&self, request: CompletionRequest) -> Result<ModelResponse, ProviderError> {
        self.config
            .retry
            .execute(|attempt| {
                let provider = Arc::clone(&self.provider);
                let request = request.clone();
                async move {
                    if attempt > 0 {
                        tracing::debug!(attempt = attempt + 1, "retrying model call");
                    }
                    let stream = provider.complete(request).await?;
                    ModelResponse::collect(stream).await
                }
            })
            .await
    }

    /// History with the system prompt prepended. Stored system messages are dropped.
    fn completion_request(&self, conversation: &Conversation) -> CompletionRequest {
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        messages.push(RunMessage::System {
            text: self.config.system_prompt.clone(),
        });
        messages.extend(
            conversation
                .messages
                .iter()
                .filter(|message| !message.is_system())
                .cloned(),
        );
        CompletionRequest {
            messages,
            tools: self.tools.definitions(),
        }
    }

    fn completed(&self, conversation_id: &str, final_message: String) -> TurnOutcome {
        tracing::info!(conversation_id, "turn completed");
        self.sink.on_completed(conversation_id, &final_message);
        TurnOutcome::Completed { final_message }
    }

    fn cancelled(&self, conversation_id: &str) -> TurnOutcome {
        tracing::info!(conversation_id, "turn cancelled");
        self.sink.on_cancelled(conversation_id);
        TurnOutcome::Cancelled
    }

    fn begin_turn(&self, conversation_id: &str) -> Result<TurnGuard<'_>, AgentError> {
        let mut turns = lock_unpoisoned(&self.active_turns);
        if turns.contains_key(conversation_id) {
            return Err(AgentError::TurnInProgress(conversation_id.to_string()));
        }
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        turns.insert(conversation_id.to_string(), Arc::clone(&cancel));
        Ok(TurnGuard {
            turns: &self.active_turns,
            conversation_id: conversation_id.to_string(),
            cancel,
        })
    }

    fn gate(&self) -> RwLockReadGuard<'_, ApprovalGate> {
        match self.gate.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn gate_mut(&self) -> RwLockWriteGuard<'_, ApprovalGate> {
        match self.gate.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Removes the active-turn entry when the turn ends, however it ends.
struct TurnGuard<'a> {
    turns: &'a Mutex<HashMap<String, CancelSignal>>,
    conversation_id: String,
    cancel: CancelSignal,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        lock_unpoisoned(self.turns).remove(&self.conversation_id);
    }
}

/// Polls `future` until it finishes or `cancel` is raised. Dropping the future aborts it.
async fn await_or_cancel<F: Future>(future: F, cancel: &AtomicBool) -> Option<F::Output> {
    let mut future = Box::pin(future);
    loop {
        if cancel.load(Ordering::SeqCst) {
            return None;
        }
        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            return Some(output);
        }
    }
}

fn pending_ids(pending: &[PendingFunctionCall]) -> Vec<String> {
    pending.iter().map(|call| call.call_id.clone()).collect()
}

fn denied_by_user(call: &ToolCallRequest) -> ToolResult {
    ToolResult::error(
        &call.call_id,
        &call.tool_name,
        format!(
            "Permission denied by user for {}. The tool was not executed.",
            call.tool_name
        ),
    )
}

fn denied_by_settings(call: &ToolCallRequest) -> ToolResult {
    ToolResult::error(
        &call.call_id,
        &call.tool_name,
        format!(
            "Permission denied by settings for {}. The tool was not executed.",
            call.tool_name
        ),
    )
}
