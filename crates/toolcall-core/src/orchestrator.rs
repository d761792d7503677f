//! Turn Orchestrator
//!
//! Drives one user turn through the model, executes the calls found in its
//! output, and (in agentic mode) feeds the results back until the model
//! stops calling tools or the iteration cap is reached.
//!
//! ```text
//!   AwaitingOutput ──► Segmenting ──► ExecutingCalls ──┬──► AwaitingOutput
//!                                                      └──► Done
//! ```
//!
//! Calls run one at a time, in the order they were detected. Anything that
//! goes wrong with a single call is written back into the conversation so
//! the model can react to it; only provider errors abort the turn.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{CombineMode, OrchestratorConfig};
use crate::error::{AgentError, Result};
use crate::extract::{Extractor, Segment, TextExtractor};
use crate::message::{Conversation, Message};
use crate::provider::LlmProvider;
use crate::tool::{Tool, ToolCall, ToolOutcome, ToolRegistry, ToolResult};

/// Where the orchestrator is within the current turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// No turn has run yet
    Idle,
    AwaitingOutput,
    Segmenting,
    ExecutingCalls,
    Done,
}

/// Why a turn stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The last round made no tool calls
    Completed,
    /// Agentic mode is off; one round only
    SingleRound,
    /// `max_iterations` rounds ran and the model was still calling tools
    IterationLimit,
}

/// What a finished turn hands back to the caller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Content produced in the final round
    pub content: String,

    pub reason: StopReason,

    /// Model invocations made during the turn
    pub iterations: usize,

    /// Every executed call, in execution order
    pub results: Vec<ToolResult>,
}

/// Live events for a UI following the turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TurnEvent {
    Content(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// Per-round bookkeeping while streaming
#[derive(Default)]
struct StreamRound {
    /// Content not yet written to history
    pending: String,
    /// All content of the round
    content: String,
    calls: usize,
}

/// The main orchestrator
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    extractor: Arc<dyn Extractor>,
    tools: Arc<ToolRegistry>,
    config: OrchestratorConfig,
    conversation: Conversation,
    seen_ids: HashSet<String>,
    recent: VecDeque<ToolResult>,
    phase: TurnPhase,
    iteration: usize,
    events: Option<mpsc::UnboundedSender<TurnEvent>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        extractor: Arc<dyn Extractor>,
        tools: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let conversation = match &config.system_prompt {
            Some(prompt) => Conversation::with_system_prompt(prompt.clone()),
            None => Conversation::new(),
        };

        Self {
            provider,
            extractor,
            tools,
            config,
            conversation,
            seen_ids: HashSet::new(),
            recent: VecDeque::new(),
            phase: TurnPhase::Idle,
            iteration: 0,
            events: None,
        }
    }

    /// Create with default configuration and the text extractor
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        let config = OrchestratorConfig::default();
        let extractor = Arc::new(TextExtractor::new(config.dialect, config.format));
        Self::new(provider, extractor, tools, config)
    }

    /// Receive live events from now on. Replaces any earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Run one user turn with complete (non-streaming) completions.
    pub async fn run(&mut self, input: &str) -> Result<TurnOutcome> {
        let episode = self.begin_episode(input);
        let mut results = Vec::new();

        loop {
            self.iteration += 1;
            self.phase = TurnPhase::AwaitingOutput;
            tracing::debug!(%episode, iteration = self.iteration, "Requesting completion");

            let completion = self
                .provider
                .complete(self.conversation.messages(), &self.config.generation)
                .await
                .inspect_err(log_provider_error)?;

            self.phase = TurnPhase::Segmenting;
            let segments = self.extractor.normalize(&completion)?;
            let content = Segment::join_content(&segments);
            self.record_content(&segments);

            let calls: Vec<Segment> = segments.into_iter().filter(Segment::is_call).collect();

            self.phase = TurnPhase::ExecutingCalls;
            for call in &calls {
                if let Some(result) = self.execute_segment(call).await {
                    results.push(result);
                }
            }

            if let Some(reason) = self.stop_reason(calls.len()) {
                return Ok(self.finish(episode, content, reason, results));
            }
        }
    }

    /// Run one user turn over streamed completions, executing each call as
    /// soon as it closes.
    pub async fn run_stream(&mut self, input: &str) -> Result<TurnOutcome> {
        let episode = self.begin_episode(input);
        let mut results = Vec::new();

        loop {
            self.iteration += 1;
            self.phase = TurnPhase::AwaitingOutput;
            tracing::debug!(%episode, iteration = self.iteration, "Requesting completion stream");

            let mut stream = self
                .provider
                .complete_stream(self.conversation.messages(), &self.config.generation)
                .await
                .inspect_err(log_provider_error)?;

            let mut extractor = self.extractor.stream();
            let mut round = StreamRound::default();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                let segments = extractor.push_token(&chunk.delta);
                self.apply_stream_segments(segments, &mut round, &mut results).await;
                if chunk.done {
                    break;
                }
            }

            // A call closing on the very last token only shows up here
            let segments = extractor.finalize();
            self.apply_stream_segments(segments, &mut round, &mut results).await;
            self.flush_pending(&mut round.pending);

            if let Some(reason) = self.stop_reason(round.calls) {
                return Ok(self.finish(episode, round.content, reason, results));
            }
        }
    }

    fn begin_episode(&mut self, input: &str) -> Uuid {
        let episode = Uuid::new_v4();
        tracing::debug!(%episode, "Starting episode");

        self.seen_ids.clear();
        self.iteration = 0;
        self.phase = TurnPhase::AwaitingOutput;
        self.conversation.push(Message::user(input));
        episode
    }

    fn finish(
        &mut self,
        episode: Uuid,
        content: String,
        reason: StopReason,
        results: Vec<ToolResult>,
    ) -> TurnOutcome {
        self.phase = TurnPhase::Done;
        tracing::debug!(%episode, iterations = self.iteration, ?reason, "Episode finished");

        TurnOutcome {
            content,
            reason,
            iterations: self.iteration,
            results,
        }
    }

    fn stop_reason(&self, calls: usize) -> Option<StopReason> {
        if calls == 0 {
            Some(StopReason::Completed)
        } else if !self.config.agentic {
            Some(StopReason::SingleRound)
        } else if self.iteration >= self.config.max_iterations {
            tracing::warn!(max = self.config.max_iterations, "Iteration limit reached");
            Some(StopReason::IterationLimit)
        } else {
            None
        }
    }

    /// Write a round's content to history before any of its calls run
    fn record_content(&mut self, segments: &[Segment]) {
        match self.config.combine {
            CombineMode::Join => self.push_content(Segment::join_content(segments)),
            CombineMode::Separate => {
                for segment in segments {
                    if let Segment::Content(text) = segment {
                        self.push_content(text.clone());
                    }
                }
            }
        }
    }

    fn push_content(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        self.emit(TurnEvent::Content(text.clone()));
        self.conversation.push(Message::assistant(text));
    }

    async fn apply_stream_segments(
        &mut self,
        segments: Vec<Segment>,
        round: &mut StreamRound,
        results: &mut Vec<ToolResult>,
    ) {
        for segment in segments {
            if let Segment::Content(text) = &segment {
                self.phase = TurnPhase::Segmenting;
                self.emit(TurnEvent::Content(text.clone()));
                round.pending.push_str(text);
                round.content.push_str(text);
                continue;
            }

            self.flush_pending(&mut round.pending);
            round.calls += 1;
            self.phase = TurnPhase::ExecutingCalls;
            if let Some(result) = self.execute_segment(&segment).await {
                results.push(result);
            }
        }
    }

    /// Content events were already sent token by token; only history is updated
    fn flush_pending(&mut self, pending: &mut String) {
        let text = std::mem::take(pending);
        if !text.trim().is_empty() {
            self.conversation.push(Message::assistant(text));
        }
    }

    async fn execute_segment(&mut self, segment: &Segment) -> Option<ToolResult> {
        match segment {
            Segment::ToolCall(call) => self.execute_call(call).await,
            Segment::Malformed(malformed) => {
                let result = ToolResult::undecodable(format!(
                    "could not decode tool call: {}",
                    malformed.reason
                ));
                self.record_result(&result);
                Some(result)
            }
            Segment::Content(_) => None,
        }
    }

    /// Execute a tool call. Returns `None` when the call was a duplicate.
    async fn execute_call(&mut self, call: &ToolCall) -> Option<ToolResult> {
        match &call.id {
            Some(id) if !self.seen_ids.insert(id.clone()) => {
                tracing::debug!(tool = %call.name, %id, "Skipping duplicate tool call");
                return None;
            }
            Some(_) => {}
            None => {
                tracing::warn!(tool = %call.name, "Tool call has no id; executing without deduplication");
            }
        }

        self.emit(TurnEvent::ToolCall(call.clone()));

        let started = Instant::now();
        let result = match self.invoke(call).await {
            Ok(value) => ToolResult::success(call, value),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::failure(call, e.to_string())
            }
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = result.with_elapsed_ms(elapsed_ms);

        self.record_result(&result);
        Some(result)
    }

    /// Resolve, validate, and run the handler under the timeout
    async fn invoke(&self, call: &ToolCall) -> Result<Value> {
        if call.name.trim().is_empty() {
            return Err(AgentError::MissingToolName);
        }

        let (tool, prepared) = self.tools.prepare(call)?;
        tracing::debug!(tool = %call.name, "Executing tool");

        run_with_timeout(tool.as_ref(), &prepared, &self.config).await
    }

    fn record_result(&mut self, result: &ToolResult) {
        let message = match &result.outcome {
            ToolOutcome::Success(_) => Message::tool(
                result.name.clone(),
                result.output_text(),
                result.arguments.clone(),
                result.id.clone(),
            ),
            ToolOutcome::Failure(reason) if result.name.is_empty() => {
                Message::assistant(format!("Tool call failed: {}", reason))
            }
            ToolOutcome::Failure(reason) => {
                Message::assistant(format!("Tool '{}' failed: {}", result.name, reason))
            }
        };
        self.conversation.push(message);

        if self.config.recent_results_capacity > 0 {
            while self.recent.len() >= self.config.recent_results_capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(result.clone());
        }

        self.emit(TurnEvent::ToolResult(result.clone()));
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Full conversation history
    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Most recent results, oldest first
    pub fn recent_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.recent.iter()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Model invocations made in the current (or last) turn
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

fn log_provider_error(e: &AgentError) {
    tracing::warn!(error = %e, retryable = e.is_retryable(), "Model call failed");
}

/// Race the handler against the configured bound. On timeout the handler
/// future is dropped; work it spawned elsewhere is not undone.
async fn run_with_timeout(
    tool: &dyn Tool,
    call: &ToolCall,
    config: &OrchestratorConfig,
) -> Result<Value> {
    match tokio::time::timeout(config.tool_timeout(), tool.execute(call)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e @ AgentError::ToolExecution(_))) => Err(e),
        Ok(Err(e)) => Err(AgentError::ToolExecution(e.to_string())),
        Err(_) => Err(AgentError::Timeout),
    }
}

/// Builder for Orchestrator configuration
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    extractor: Option<Arc<dyn Extractor>>,
    tools: ToolRegistry,
    shared_tools: Option<Arc<ToolRegistry>>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            extractor: None,
            tools: ToolRegistry::new(),
            shared_tools: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Use a registry shared with other orchestrators
    pub fn shared_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.shared_tools = Some(tools);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn agentic(mut self, agentic: bool) -> Self {
        self.config.agentic = agentic;
        self
    }

    pub fn tool_timeout_ms(mut self, ms: u64) -> Self {
        self.config.tool_timeout_ms = ms;
        self
    }

    pub fn combine(mut self, combine: CombineMode) -> Self {
        self.config.combine = combine;
        self
    }

    pub fn dialect(mut self, dialect: crate::dialect::DialectMode) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn format(mut self, format: crate::decode::PayloadFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        self.config.validate()?;

        let extractor = self.extractor.unwrap_or_else(|| {
            Arc::new(TextExtractor::new(self.config.dialect, self.config.format))
        });

        let tools = self.shared_tools.unwrap_or_else(|| Arc::new(self.tools));

        Ok(Orchestrator::new(provider, extractor, tools, self.config))
    }
}
