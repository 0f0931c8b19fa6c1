//! Agent execution loop for the scaffold system.
//!
//! One agent run is a conversation with the LLM:
//! 1. Ask the model for the next action (consumes one turn of the shared budget)
//! 2. Parse a tool call from the response text
//! 3. Execute the tool and feed the observation back
//! 4. Stop on a response without a tool call (the final answer), on the
//!    agent's own step cap, or when the shared turn budget is exhausted

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::prompts::{build_system_prompt, TURN_LIMIT_MESSAGE};
use super::tools::{truncate, ExecutionContext, ToolError, ToolRegistry, ToolResult};
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Maximum length of a tool observation fed back into the conversation.
const MAX_OBSERVATION_LENGTH: usize = 50_000;

/// Errors that can occur during agent execution.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM provider error.
    #[error("LLM error: {0}")]
    LlmError(#[from] crate::error::LlmError),

    /// Failed to parse LLM response.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Context or configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Turn budget shared by every agent working on one task.
///
/// Each LLM completion takes one turn, whichever agent asks for it.
#[derive(Debug)]
pub struct TurnBudget {
    limit: usize,
    used: AtomicUsize,
}

impl TurnBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Take one turn. Returns `false` once the budget is spent.
    pub fn try_take(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of steps this agent can take in one run.
    pub max_steps: usize,
    /// Model to use for LLM requests.
    pub model: String,
    /// Temperature for LLM sampling.
    pub temperature: f64,
    /// Maximum tokens for LLM response.
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            model: String::new(), // Use LLM provider's default
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

impl AgentConfig {
    /// Create a new agent configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of steps.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tokens for responses.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of a single agent step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step number (0-indexed).
    pub step: usize,
    /// The LLM's response text.
    pub llm_response: String,
    /// Tool call if one was made.
    pub tool_call: Option<ToolCall>,
    /// Result of tool execution if a tool was called.
    pub tool_result: Option<ToolResult>,
    /// Whether the agent has finished.
    pub is_terminal: bool,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Value,
}

/// Why an agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without calling a tool.
    FinalAnswer,
    /// The shared turn budget ran out.
    TurnBudgetExhausted,
    /// This agent hit its own `max_steps`.
    StepLimit,
}

/// Result of agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Name of the agent that produced this result.
    pub agent: String,
    /// Whether the agent reached a final answer.
    pub success: bool,
    /// Final answer, or the last response when the run was cut short.
    pub summary: String,
    /// Number of steps taken.
    pub steps_taken: usize,
    /// All step results.
    pub steps: Vec<StepResult>,
    pub stop_reason: StopReason,
}

/// Trait for parsing tool calls from LLM responses.
pub trait ToolCallParser: Send + Sync {
    /// Extract the tool call from an LLM response, if it contains one.
    fn parse(&self, response: &str) -> Option<ToolCall>;
}

/// Default tool call parser that looks for JSON function calls.
///
/// `known_tools` enables the `tool_name({...})` form and the
/// `{"name": ..., "parameters": ...}` form; `{"tool": ...}` is accepted for any
/// name so the model learns about typos from the "not available" reply.
#[derive(Debug, Clone, Default)]
pub struct JsonToolCallParser {
    known_tools: Vec<String>,
}

impl JsonToolCallParser {
    pub fn new<I, S>(known_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_tools: known_tools.into_iter().map(Into::into).collect(),
        }
    }

    fn is_known(&self, name: &str) -> bool {
        self.known_tools.iter().any(|t| t == name)
    }

    fn empty_args() -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Interpret a JSON value as a tool call, if it has the right shape.
    fn call_from_value(&self, value: &Value) -> Option<ToolCall> {
        if let Some(tool_name) = value.get("tool").and_then(|v| v.as_str()) {
            let arguments = value
                .get("arguments")
                .cloned()
                .unwrap_or_else(Self::empty_args);
            return Some(ToolCall {
                name: tool_name.to_string(),
                arguments,
            });
        }
        let tool_name = value.get("name").and_then(|v| v.as_str())?;
        if !self.is_known(tool_name) {
            return None;
        }
        let arguments = value
            .get("parameters")
            .or_else(|| value.get("arguments"))
            .or_else(|| value.get("args"))
            .cloned()
            .unwrap_or_else(Self::empty_args);
        Some(ToolCall {
            name: tool_name.to_string(),
            arguments,
        })
    }

    /// Parse the first top-level JSON object that looks like a tool call.
    ///
    /// Braces inside string literals are skipped so file contents passed to
    /// `write_file` do not confuse the scan.
    fn parse_json_format(&self, response: &str) -> Option<ToolCall> {
        let mut depth = 0usize;
        let mut start = None;
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in response.char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' if depth > 0 => in_string = true,
                '{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            if let Ok(value) = serde_json::from_str::<Value>(&response[s..=i]) {
                                if let Some(call) = self.call_from_value(&value) {
                                    return Some(call);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        None
    }

    /// Parse function call format like read_file({"path": "a.py"}).
    fn parse_function_format(&self, response: &str) -> Option<ToolCall> {
        for tool_name in &self.known_tools {
            let pattern = format!("{}(", tool_name);
            let Some(start) = response.find(&pattern) else {
                continue;
            };
            let remaining = &response[start + pattern.len()..];

            let mut depth = 1;
            let mut end = None;
            for (i, c) in remaining.char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }

            if let Some(e) = end {
                if let Ok(arguments) = serde_json::from_str(&remaining[..e]) {
                    return Some(ToolCall {
                        name: tool_name.clone(),
                        arguments,
                    });
                }
            }
        }

        None
    }

    /// Parse tool calls from ```json code blocks.
    fn parse_code_block_format(&self, response: &str) -> Option<ToolCall> {
        let json_block_start = "```json";
        let start = response.find(json_block_start)?;
        let remaining = &response[start + json_block_start.len()..];
        let end = remaining.find("```")?;
        let value = serde_json::from_str::<Value>(remaining[..end].trim()).ok()?;
        self.call_from_value(&value)
    }
}

impl ToolCallParser for JsonToolCallParser {
    fn parse(&self, response: &str) -> Option<ToolCall> {
        self.parse_json_format(response)
            .or_else(|| self.parse_function_format(response))
            .or_else(|| self.parse_code_block_format(response))
    }
}

/// Main agent execution loop.
pub struct AgentLoop {
    /// Display name used in logs and results.
    name: String,
    /// Role instructions placed at the top of the system prompt.
    instructions: String,
    /// LLM provider for generating responses.
    llm_client: Arc<dyn LlmProvider>,
    /// Tool registry with available tools.
    tool_registry: ToolRegistry,
    /// Tool call parser.
    parser: Box<dyn ToolCallParser>,
    /// Agent configuration.
    config: AgentConfig,
}

impl AgentLoop {
    /// Create an agent loop with the given tools.
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        llm_client: Arc<dyn LlmProvider>,
        config: AgentConfig,
        tool_registry: ToolRegistry,
    ) -> Self {
        let parser = JsonToolCallParser::new(tool_registry.list_tools());
        Self {
            name: name.into(),
            instructions: instructions.into(),
            llm_client,
            tool_registry,
            parser: Box::new(parser),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the agent on `task` until it answers, hits its step cap, or the
    /// shared `budget` runs out.
    ///
    /// Budget exhaustion is not an error: the partial result is returned and
    /// any edits already made stay on disk.
    pub async fn run(
        &self,
        task: &str,
        ctx: &ExecutionContext,
        budget: &TurnBudget,
    ) -> Result<AgentResult, AgentError> {
        let system_prompt = build_system_prompt(
            &self.instructions,
            &ctx.working_dir,
            &self.tool_registry.to_json_schema(),
        );
        let mut conversation = vec![Message::system(system_prompt), Message::user(task)];
        let mut steps: Vec<StepResult> = Vec::new();

        info!(agent = %self.name, remaining_turns = budget.remaining(), "Agent started");

        let stop_reason = loop {
            if steps.len() >= self.config.max_steps {
                break StopReason::StepLimit;
            }
            if !budget.try_take() {
                break StopReason::TurnBudgetExhausted;
            }

            let request = GenerationRequest::new(self.config.model.clone(), conversation.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);

            let response = self.llm_client.generate(request).await?;
            let llm_text = response
                .first_content()
                .ok_or_else(|| AgentError::ParseError("Empty LLM response".to_string()))?
                .to_string();
            conversation.push(Message::assistant(&llm_text));

            let step = steps.len();
            let Some(call) = self.parser.parse(&llm_text) else {
                debug!(agent = %self.name, step, "Final answer");
                steps.push(StepResult {
                    step,
                    llm_response: llm_text,
                    tool_call: None,
                    tool_result: None,
                    is_terminal: true,
                });
                break StopReason::FinalAnswer;
            };

            debug!(agent = %self.name, step, tool = %call.name, "Tool call");
            let result = self
                .execute_tool(&call, ctx)
                .await
                .unwrap_or_else(|e| ToolResult::failure(e.to_string()));
            conversation.push(Message::user(observation(&call.name, &result)));

            steps.push(StepResult {
                step,
                llm_response: llm_text,
                tool_call: Some(call),
                tool_result: Some(result),
                is_terminal: false,
            });
        };

        let summary = match stop_reason {
            StopReason::FinalAnswer => steps
                .last()
                .map(|s| s.llm_response.clone())
                .unwrap_or_default(),
            StopReason::TurnBudgetExhausted | StopReason::StepLimit => {
                warn!(agent = %self.name, ?stop_reason, steps = steps.len(), "Agent stopped early");
                TURN_LIMIT_MESSAGE.to_string()
            }
        };

        Ok(AgentResult {
            agent: self.name.clone(),
            success: stop_reason == StopReason::FinalAnswer,
            summary,
            steps_taken: steps.len(),
            steps,
            stop_reason,
        })
    }

    /// Execute a tool call.
    async fn execute_tool(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.tool_registry.get(&call.name).ok_or_else(|| {
            ToolError::NotAvailable(format!(
                "'{}' (available: {})",
                call.name,
                self.tool_registry.list_tools().join(", ")
            ))
        })?;

        tool.execute(call.arguments.clone(), ctx).await
    }
}

/// Format a tool result as the next user message.
fn observation(tool: &str, result: &ToolResult) -> String {
    let body = truncate(result.message(), MAX_OBSERVATION_LENGTH);
    if result.success {
        format!("Tool '{}' succeeded:\n{}", tool, body)
    } else {
        match (&result.error, result.output.is_empty()) {
            (Some(err), false) => format!("Tool '{}' failed ({}):\n{}", tool, err, body),
            _ => format!("Tool '{}' failed:\n{}", tool, body),
        }
    }
}
