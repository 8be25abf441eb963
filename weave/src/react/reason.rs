//! Reason Step (§4.5): one reasoning turn — build prompt, call the LLM, parse
//! the decision, write it back onto Workspace/Execution.
//!
//! Grounded on `ThinkNode::run`'s single-LLM-call-then-write-state shape,
//! generalized to: a mode-specific prompt, a typed decision extracted through
//! the Protocol Parser (§4.1) instead of a native tool-call payload, a
//! bounded retry for parser/JSON and LLM-transport failures, and the
//! mode-switch/forced-completion behavior §4.5 adds on top.

use futures_util::StreamExt;
use serde_json::Value;

use crate::engine::EngineConfig;
use crate::events::EventSink;
use crate::llm::{LlmClient, Message};
use crate::parser::{parse_tokens, ParseEvent};
use crate::state::{ActionOutcome, Conversation, Mode, Profile, StopReason, Thought, Workspace};
use crate::store::Store;
use crate::tools::registry::ToolRegistry;
use crate::tools::{format_calls_readable, ToolCall};

const CORRECTION_PROMPT: &str = "Your last call section was not valid JSON. Re-emit it as a single §call: section containing a JSON array of {\"name\": ..., \"args\": {...}} objects, then §execute.";

/// The typed decision a Reason turn resolves to (§9 "Dynamic decision format
/// -> typed events").
#[derive(Debug, Clone)]
enum Decision {
    Direct(String),
    Actions(Vec<(String, Value)>),
    ParseError(String),
}

struct TurnRecord {
    think: String,
    decision: Decision,
}

/// Drives one LLM call through the Protocol Parser until `execute`, `end`,
/// or natural exhaustion (§4.5.3).
async fn llm_turn(llm: &dyn LlmClient, messages: &[Message], sink: &EventSink, iteration: u64) -> Result<TurnRecord, String> {
    let tokens = llm.stream(messages).await.map_err(|e| e.to_string())?;
    let mut events = parse_tokens(tokens);

    let mut think = String::new();
    let mut respond = String::new();
    let mut call_text: Option<String> = None;
    let mut parse_error: Option<String> = None;
    let mut saw_execute = false;

    while let Some(item) = events.next().await {
        match item {
            Ok(ParseEvent::Think(chunk)) => {
                sink.think(iteration, &chunk).await;
                think.push_str(&chunk);
            }
            Ok(ParseEvent::Respond(chunk)) => respond.push_str(&chunk),
            Ok(ParseEvent::Call(json)) => call_text = Some(json),
            Ok(ParseEvent::Error(msg)) => parse_error = Some(msg),
            Ok(ParseEvent::Execute) => {
                saw_execute = true;
                break;
            }
            Ok(ParseEvent::End) => break,
            Err(e) => return Err(e.to_string()),
        }
    }

    let decision = if let Some(reason) = parse_error {
        Decision::ParseError(reason)
    } else if saw_execute {
        match call_text {
            Some(raw) => match serde_json::from_str::<Vec<serde_json::Map<String, Value>>>(&raw) {
                Ok(entries) => {
                    let calls = entries
                        .into_iter()
                        .filter_map(|mut obj| {
                            let name = obj.remove("name")?.as_str()?.to_string();
                            let args = obj.remove("args").unwrap_or(Value::Object(Default::default()));
                            Some((name, args))
                        })
                        .collect();
                    Decision::Actions(calls)
                }
                Err(e) => Decision::ParseError(format!("Invalid JSON in call section: {e}")),
            },
            None => Decision::Direct(respond),
        }
    } else {
        Decision::Direct(respond)
    };

    Ok(TurnRecord { think, decision })
}

/// One reasoning turn (§4.5).
#[allow(clippy::too_many_arguments)]
pub async fn reason(
    workspace: &mut Workspace,
    execution: &mut crate::state::Execution,
    conversation: &Conversation,
    profile: &Profile,
    llm: &dyn LlmClient,
    tools: &ToolRegistry,
    store: &dyn Store,
    config: &EngineConfig,
    sink: &EventSink,
) {
    if execution.iteration >= execution.max_iterations {
        synthesize_forced_completion(execution);
        return;
    }

    let mut messages = build_messages(workspace, conversation, profile, tools, store, config).await;
    let iteration = execution.iteration as u64;

    let mut llm_retried = false;
    let mut parse_retried = false;

    loop {
        let turn = match llm_turn(llm, &messages, sink, iteration).await {
            Ok(t) => t,
            Err(e) => {
                sink.error(iteration, &e).await;
                if llm_retried {
                    execution.stop_reason = Some(StopReason::LlmError);
                    execution.user_error_message =
                        Some("I'm having trouble reaching the model right now. Please try again in a moment.".to_string());
                    execution.pending_calls.clear();
                    return;
                }
                llm_retried = true;
                continue;
            }
        };

        match turn.decision {
            Decision::ParseError(reason) => {
                sink.error(iteration, &reason).await;
                record_thought(workspace, execution, &turn.think, None, config);

                if parse_retried {
                    execution.stop_reason = Some(StopReason::ParseErrorExceeded);
                    execution.user_error_message =
                        Some("I couldn't put together a valid plan for that request. Could you rephrase it?".to_string());
                    execution.pending_calls.clear();
                    return;
                }
                parse_retried = true;
                messages.push(Message::user(CORRECTION_PROMPT));
                continue;
            }
            Decision::Direct(text) => {
                record_thought(workspace, execution, &turn.think, None, config);
                execution.response = Some(text);
                execution.pending_calls.clear();
                return;
            }
            Decision::Actions(calls) => {
                for (name, args) in &calls {
                    sink.call_planned(iteration, name, args.clone()).await;
                }
                record_thought(workspace, execution, &turn.think, Some(calls.clone()), config);
                execution.pending_calls = calls;
                return;
            }
        }
    }
}

/// §4.5.1 "Budget check": synthesizes a completion summary from the last 3
/// `completed_calls`, or acknowledges the budget if none exist, without
/// calling the LLM. Neither `iteration` nor `thoughts` advance here — this is
/// a resume-when-already-exhausted guard, not a counted turn.
fn synthesize_forced_completion(execution: &mut crate::state::Execution) {
    let recent: Vec<ToolCall> = execution.completed_calls.iter().rev().take(3).cloned().collect();
    let summary = if recent.is_empty() {
        format!("Task completed after {} iterations. I've reached my step budget for this task.", execution.iteration)
    } else {
        let pairs: Vec<(String, Value)> = recent.iter().map(|c| (c.name.clone(), c.args.clone())).collect();
        format!(
            "Task completed after {} iterations. Recent actions: {}.",
            execution.iteration,
            format_calls_readable(&pairs)
        )
    };
    execution.response = Some(summary);
    execution.pending_calls.clear();
    execution.stop_reason = Some(StopReason::MaxIterations);
}

/// Appends the turn's thought, applies any accepted mode switch (§4.5.5,
/// §11.2), and advances `iteration` (§4.5.6 "State writes").
fn record_thought(
    workspace: &mut Workspace,
    execution: &mut crate::state::Execution,
    think_text: &str,
    calls: Option<Vec<(String, Value)>>,
    config: &EngineConfig,
) {
    let iteration = execution.iteration;

    if let Some((mode, switch_reason)) = extract_mode_switch(think_text) {
        if !switch_reason.trim().is_empty() && workspace.can_switch_mode(iteration, config.mode_switch_cooldown_iters) {
            workspace.switch_mode(mode, switch_reason, iteration);
        }
    }

    let (thinking, reflection, planning) = if workspace.mode == Mode::Deep {
        split_deep_sections(think_text)
    } else {
        (think_text.to_string(), None, None)
    };

    workspace.push_thought(Thought {
        iteration,
        thinking,
        planning,
        reflection,
        approach: workspace.approach.clone(),
        tool_calls: calls.unwrap_or_default(),
        action_outcome: None,
    });

    execution.iteration += 1;
}

/// Looks for an explicit `switch_to: <mode> | <reason>` directive in a think
/// section (§4.5.5). The canonical delimiter set (§4.1, §9) has no dedicated
/// section for this, so the directive rides inside `think` content using a
/// line-oriented convention the system prompt teaches the model.
fn extract_mode_switch(think_text: &str) -> Option<(Mode, String)> {
    for line in think_text.lines() {
        let lower = line.to_lowercase();
        if let Some(rest_idx) = lower.find("switch_to:") {
            let rest = &line[rest_idx + "switch_to:".len()..];
            let mut parts = rest.splitn(2, '|');
            let mode_str = parts.next()?.trim().to_lowercase();
            let reason = parts.next().unwrap_or("").trim().to_string();
            let mode = match mode_str.as_str() {
                "fast" => Mode::Fast,
                "deep" => Mode::Deep,
                _ => continue,
            };
            return Some((mode, reason));
        }
    }
    None
}

/// Splits a deep-mode think section into `(thinking, reflection, planning)`
/// using the `REFLECTION:`/`PLAN:` labels the deep prompt template asks for
/// (§4.5.2 "deep mode ... requests explicit thinking, reflect, plan
/// sections").
fn split_deep_sections(think_text: &str) -> (String, Option<String>, Option<String>) {
    const REFLECTION_LABEL: &str = "REFLECTION:";
    const PLAN_LABEL: &str = "PLAN:";

    let reflection_idx = think_text.find(REFLECTION_LABEL);
    let plan_idx = think_text.find(PLAN_LABEL);

    let thinking_end = [reflection_idx, plan_idx].into_iter().flatten().min().unwrap_or(think_text.len());
    let thinking = think_text[..thinking_end].trim().to_string();

    let reflection = reflection_idx.map(|start| {
        let body_start = start + REFLECTION_LABEL.len();
        let end = plan_idx.filter(|&p| p > start).unwrap_or(think_text.len());
        think_text[body_start..end].trim().to_string()
    });

    let planning = plan_idx.map(|start| {
        let body_start = start + PLAN_LABEL.len();
        think_text[body_start..].trim().to_string()
    });

    (thinking, reflection.filter(|s| !s.is_empty()), planning.filter(|s| !s.is_empty()))
}

/// True for simple greetings and small-arithmetic queries (§4.5.2 "only for
/// non-trivial queries"), which skip automatic knowledge retrieval.
fn is_trivial_query(query: &str) -> bool {
    let normalized = query.trim().trim_end_matches(['!', '?', '.']).to_lowercase();
    const GREETINGS: &[&str] =
        &["hi", "hello", "hey", "yo", "thanks", "thank you", "good morning", "good evening", "good night"];
    if GREETINGS.contains(&normalized.as_str()) {
        return true;
    }
    let has_digit = query.chars().any(|c| c.is_ascii_digit());
    let has_operator = query.chars().any(|c| "+-*/".contains(c));
    has_digit && has_operator && query.len() <= 24
}

fn render_tools(tools: &ToolRegistry) -> String {
    tools
        .list()
        .iter()
        .map(|spec| {
            format!(
                "- {name}: {description}\n  schema: {schema}\n  examples: {examples}\n  rules: {rules}",
                name = spec.name,
                description = spec.description,
                schema = spec.schema,
                examples = spec.examples.join("; "),
                rules = spec.rules.join("; "),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_workspace(workspace: &Workspace, window: usize) -> String {
    let facts = workspace
        .facts
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insights = workspace.insights.iter().cloned().collect::<Vec<_>>().join(", ");
    let recent_thoughts = workspace
        .thoughts
        .iter()
        .rev()
        .take(window)
        .rev()
        .map(|t| {
            let calls = format_calls_readable(&t.tool_calls);
            format!("[{}] {} (calls: {})", t.iteration, t.thinking, if calls.is_empty() { "none".to_string() } else { calls })
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "goal: {}\napproach: {}\nfacts: {}\ninsights: {}\nlast_tool_quality: {:?}\nrecent thoughts:\n{}",
        workspace.objective,
        workspace.approach.clone().unwrap_or_else(|| "none yet".to_string()),
        facts,
        insights,
        workspace.last_tool_quality,
        recent_thoughts,
    )
}

fn mode_template(mode: Mode) -> &'static str {
    match mode {
        Mode::Fast => {
            "You are in fast mode: reason briefly. Emit a §think: section with your reasoning, \
             then either a §respond: section with your final answer followed by §end, or one or \
             more §call: sections each containing a JSON array of {\"name\":...,\"args\":{...}} \
             objects followed by §execute. Use no other §-prefixed tokens."
        }
        Mode::Deep => {
            "You are in deep mode: think thoroughly. Your §think: section should contain three \
             labeled parts: your reasoning, then a line starting with REFLECTION: assessing your \
             approach so far, then a line starting with PLAN: describing your next step. Then \
             either a §respond: section followed by §end, or §call: section(s) followed by \
             §execute. Use no other §-prefixed tokens. To change mode, include a line \
             `switch_to: fast | <reason>` or `switch_to: deep | <reason>` inside your think \
             section."
        }
    }
}

async fn build_messages(
    workspace: &Workspace,
    conversation: &Conversation,
    profile: &Profile,
    tools: &ToolRegistry,
    store: &dyn Store,
    config: &EngineConfig,
) -> Vec<Message> {
    let window = if workspace.mode == Mode::Fast { 3 } else { 10 };

    let mut system = String::new();
    system.push_str(mode_template(workspace.mode));
    system.push_str("\n\nAvailable tools:\n");
    system.push_str(&render_tools(tools));
    system.push_str("\n\nWorkspace:\n");
    system.push_str(&render_workspace(workspace, window));
    if !profile.who.is_empty() {
        system.push_str(&format!("\n\nUser profile: {} (style: {})", profile.who, profile.communication_style));
    }

    if !is_trivial_query(&workspace.objective) {
        if let Ok(hits) = store
            .search_knowledge(&workspace.objective, &workspace.user_id, config.automatic_retrieval_topk, config.knowledge_retrieval_threshold)
            .await
        {
            if !hits.is_empty() {
                system.push_str("\n\nRelevant knowledge:\n");
                for hit in hits {
                    system.push_str(&format!("- {}: {}\n", hit.artifact.topic, hit.artifact.content));
                }
            }
        }
    }

    let mut messages = vec![Message::system(system)];
    for msg in conversation.messages.iter().rev().take(window * 2).rev() {
        messages.push(Message { role: msg.role, content: msg.content.clone() });
    }
    messages.push(Message::user(&workspace.objective));
    messages
}

/// Records an Act batch's aggregate outcome on the last thought (§4.6 "record
/// an action outcome on the last workspace thought"). Lives here rather than
/// `act.rs` because `Thought` mutation is Reason's own state-write contract
/// (§4.5.6); Act only supplies the outcome classification.
pub(crate) fn record_action_outcome(workspace: &mut Workspace, outcome: ActionOutcome) {
    if let Some(last) = workspace.thoughts.last_mut() {
        last.action_outcome = Some(outcome);
    }
}
