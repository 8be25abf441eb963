//! Respond Step (§4.7): produces the final user-facing text and appends it
//! to the conversation. Four branches, backed by four distinct prompt
//! templates (§11.5) rather than one parameterized template.
//!
//! Grounded on `RespondNode::run`'s single-synthesis-call-writing-the-final-message
//! shape, generalized to the branching §4.7 requires: a failure fallback, a
//! tool-results synthesis, a failures-only acknowledgment, and a
//! knowledge-only answer, plus optional JSON-schema conformance.

use serde_json::Value;

use crate::engine::EngineConfig;
use crate::llm::{LlmClient, Message};
use crate::state::{Conversation, Execution, Role, Workspace};
use crate::tools::format_calls_readable;
use crate::tools::scheduler::BatchResult;

const FAILURE_FALLBACK_TEMPLATE: &str = "Something went wrong while working on this and I wasn't able \
     to finish. Here's what happened: {issue}. Let me know if you'd like to try again, or rephrase \
     what you need.";

const TOOL_RESULTS_SYSTEM: &str = "Write the final answer to the user's request, incorporating the \
     results of the actions you just took. Be direct and specific about what was found or done. Do \
     not mention internal tool names or JSON.";

const FAILURES_ONLY_SYSTEM: &str = "Every action you just attempted failed. Acknowledge this plainly, \
     without inventing a result, and suggest one or two concrete alternatives the user could try.";

const KNOWLEDGE_ONLY_SYSTEM: &str = "Answer the user's request directly from your own knowledge and the \
     workspace context below. No tools were called for this turn.";

const JSON_SCHEMA_INSTRUCTION: &str = "\n\nRespond with a single JSON value conforming to this schema \
     and nothing else — no prose, no markdown fences:\n";

const ANTI_JSON_INSTRUCTION: &str = "\n\nRespond in plain prose; do not wrap the answer in JSON.";

/// Produces the final response for the task and appends it to `conversation`
/// (§4.7 "every branch appends the response to the conversation and
/// returns").
pub async fn respond(
    workspace: &mut Workspace,
    execution: &mut Execution,
    conversation: &mut Conversation,
    llm: &dyn LlmClient,
    config: &EngineConfig,
) -> String {
    let _ = config;
    let schema = execution.output_schema.clone();

    let response = if let Some(message) = &execution.user_error_message {
        FAILURE_FALLBACK_TEMPLATE.replace("{issue}", message)
    } else if let Some(direct) = execution.response.take() {
        // Reason already produced the final text (direct answer, or the
        // pure-synthesis forced-completion summary) — Respond does not call
        // the LLM a second time (§4.8 "the engine purely synthesizes ...
        // never issues an additional LLM call on the forced-completion
        // path").
        direct
    } else if let Some(batch) = execution.last_batch.clone() {
        if batch.successful_count > 0 {
            synthesize_tool_results(workspace, &batch, llm, schema.as_ref()).await
        } else {
            acknowledge_failures(workspace, &batch, llm, schema.as_ref()).await
        }
    } else {
        answer_from_own_knowledge(workspace, llm, schema.as_ref()).await
    };

    conversation.append(Role::Assistant, &response, chrono::Utc::now());
    execution.response = Some(response.clone());
    response
}

/// Appends the schema-conformance instruction, or the default anti-JSON
/// instruction when no schema is configured for this task (§4.7).
fn apply_schema(mut system: String, schema: Option<&Value>) -> String {
    match schema {
        Some(schema) => {
            system.push_str(JSON_SCHEMA_INSTRUCTION);
            system.push_str(&schema.to_string());
        }
        None => system.push_str(ANTI_JSON_INSTRUCTION),
    }
    system
}

async fn synthesize_tool_results(
    workspace: &Workspace,
    batch: &BatchResult,
    llm: &dyn LlmClient,
    schema: Option<&Value>,
) -> String {
    let calls: Vec<(String, Value)> = batch.successful.iter().map(|c| (c.name.clone(), c.args.clone())).collect();
    let system = apply_schema(
        format!(
            "{}\n\nObjective: {}\nActions taken: {}\nResults:\n{}",
            TOOL_RESULTS_SYSTEM,
            workspace.objective,
            format_calls_readable(&calls),
            batch
                .successful
                .iter()
                .map(|c| format!("- {}: {}", c.name, c.result.clone().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        schema,
    );
    call_or_fallback(llm, system, workspace).await
}

async fn acknowledge_failures(
    workspace: &Workspace,
    batch: &BatchResult,
    llm: &dyn LlmClient,
    schema: Option<&Value>,
) -> String {
    let calls: Vec<(String, Value)> = batch.failures.iter().map(|c| (c.name.clone(), c.args.clone())).collect();
    let system = apply_schema(
        format!(
            "{}\n\nObjective: {}\nFailed actions: {}\nErrors:\n{}",
            FAILURES_ONLY_SYSTEM,
            workspace.objective,
            format_calls_readable(&calls),
            batch
                .failures
                .iter()
                .map(|c| format!("- {}: {}", c.name, c.error.clone().unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        schema,
    );
    call_or_fallback(llm, system, workspace).await
}

async fn answer_from_own_knowledge(workspace: &Workspace, llm: &dyn LlmClient, schema: Option<&Value>) -> String {
    let system = apply_schema(
        format!(
            "{}\n\nObjective: {}\nApproach so far: {}",
            KNOWLEDGE_ONLY_SYSTEM,
            workspace.objective,
            workspace.approach.clone().unwrap_or_else(|| "none".to_string()),
        ),
        schema,
    );
    call_or_fallback(llm, system, workspace).await
}

async fn call_or_fallback(llm: &dyn LlmClient, system: String, workspace: &Workspace) -> String {
    let messages = vec![Message::system(system), Message::user(&workspace.objective)];
    match llm.generate(&messages).await {
        Ok(text) => text,
        Err(_) => "I wasn't able to put together a response just now. Please try again shortly.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlm;
    use crate::state::{Execution, Workspace};
    use crate::tools::scheduler::ExecutionMode;
    use crate::tools::{CallOutcome, ToolCall};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn make_call(name: &str, outcome: CallOutcome, result: Option<&str>, error: Option<&str>) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            args: json!({}),
            outcome,
            result: result.map(|s| s.to_string()),
            error: error.map(|s| s.to_string()),
            duration: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn stop_reason_with_user_message_produces_fallback() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        let mut ex = Execution::new(10);
        ex.user_error_message = Some("the model is unreachable".to_string());
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert!(response.contains("the model is unreachable"));
        assert_eq!(convo.messages.len(), 1);
        assert_eq!(convo.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn forced_completion_text_passes_through_without_another_llm_call() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        let mut ex = Execution::new(10);
        ex.response = Some("Task completed after 2 iterations.".to_string());
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert_eq!(response, "Task completed after 2 iterations.");
    }

    #[tokio::test]
    async fn successful_batch_synthesizes_from_tool_results() {
        use crate::llm::mock::Script;

        let mut ws = Workspace::new("t1", "u1", "List files in ./");
        let mut ex = Execution::new(10);
        ex.last_batch = Some(BatchResult {
            successful: vec![make_call("shell", CallOutcome::Success, Some("a.txt\nb.txt"), None)],
            failures: vec![],
            summary: "1 of 1 calls succeeded".to_string(),
            successful_count: 1,
            failed_count: 0,
            total_executed: 1,
            execution_mode: ExecutionMode::Parallel,
        });
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![Script::Text("Files: a.txt, b.txt".to_string())]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert_eq!(response, "Files: a.txt, b.txt");
    }

    #[tokio::test]
    async fn all_failures_triggers_acknowledgment_branch() {
        use crate::llm::mock::Script;

        let mut ws = Workspace::new("t1", "u1", "run the deploy");
        let mut ex = Execution::new(10);
        ex.last_batch = Some(BatchResult {
            successful: vec![],
            failures: vec![make_call("shell", CallOutcome::Failure, None, Some("permission denied"))],
            summary: "0 of 1 calls succeeded".to_string(),
            successful_count: 0,
            failed_count: 1,
            total_executed: 1,
            execution_mode: ExecutionMode::Parallel,
        });
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![Script::Text(
            "That didn't work because of a permissions issue. Want to try a different path?".to_string(),
        )]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert!(response.contains("permissions"));
    }

    #[tokio::test]
    async fn no_batch_falls_back_to_own_knowledge_answer() {
        use crate::llm::mock::Script;

        let mut ws = Workspace::new("t1", "u1", "What is the capital of France?");
        let mut ex = Execution::new(10);
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![Script::Text("Paris.".to_string())]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert_eq!(response, "Paris.");
    }

    #[tokio::test]
    async fn json_schema_forces_the_schema_instruction_into_the_prompt() {
        use crate::llm::mock::Script;

        let mut ws = Workspace::new("t1", "u1", "What is the capital of France?");
        let mut ex = Execution::new(10);
        ex.output_schema = Some(json!({"type": "object", "properties": {"city": {"type": "string"}}}));
        let mut convo = Conversation::new("c1", "u1");
        let llm = Arc::new(MockLlm::new(vec![Script::Text("{\"city\": \"Paris\"}".to_string())]));
        let config = EngineConfig::default();

        let response = respond(&mut ws, &mut ex, &mut convo, llm.as_ref(), &config).await;
        assert_eq!(response, "{\"city\": \"Paris\"}");
    }
}
