//! Prompt construction and parsing of untrusted oracle answers.

use tutorlink_core::schema::{ParameterSpec, ToolSchema};
use crate::context::ConversationContext;

pub const CLASSIFIER_SYSTEM: &str = "You are the intent classifier of an AI tutoring assistant. \
Score how well each available tool matches what the student wants right now. The current \
message matters most; earlier turns only add context. Respond with one JSON object of the form \
{\"scores\": {\"<tool_id>\": <number between 0 and 1>}} and nothing else.";

pub const FIELD_SYSTEM: &str = "You extract tool parameters from a tutoring conversation. Report \
a value only if the student stated it or clearly implied it; never guess. Respond with one JSON \
object of the form {\"found\": true|false, \"value\": <value or null>, \"confidence\": <number \
between 0 and 1>} and nothing else.";

pub const BATCH_SYSTEM: &str = "You extract tool parameters from a tutoring conversation. Report \
a value only if the student stated it or clearly implied it; never guess. Respond with one JSON \
object of the form {\"fields\": {\"<parameter>\": {\"found\": true|false, \"value\": <value or \
null>, \"confidence\": <number between 0 and 1>}}} and nothing else.";

/// Render recent turns and the current message, most recent last.
pub fn render_conversation(ctx: &ConversationContext, window: usize) -> String {
    let mut out = String::new();
    let recent = ctx.recent(window);
    if !recent.is_empty() {
        out.push_str("Recent conversation (oldest first):\n");
        for turn in recent {
            out.push_str(turn.role.as_str());
            out.push_str(": ");
            out.push_str(turn.truncated_content());
            out.push('\n');
        }
        out.push('\n');
    }
    out.push_str("Current message (most important):\n");
    out.push_str(&truncate(&ctx.current_message));
    out.push('\n');
    out
}

pub fn classification_prompt(ctx: &ConversationContext, candidates: &[&ToolSchema], window: usize) -> String {
    let mut out = String::from("Available tools:\n");
    for schema in candidates {
        out.push_str(&format!("- {}: {}\n", schema.id, schema.description));
    }
    out.push('\n');
    out.push_str(&render_conversation(ctx, window));
    out
}

fn describe_parameter(spec: &ParameterSpec) -> String {
    let mut line = format!("Parameter: \"{}\"\nType: {}\n", spec.name, spec.param_type.describe());
    if !spec.description.is_empty() {
        line.push_str(&format!("Meaning: {}\n", spec.description));
    }
    line
}

pub fn field_prompt(schema: &ToolSchema, spec: &ParameterSpec, ctx: &ConversationContext, window: usize) -> String {
    format!(
        "Tool: {} ({})\n{}\n{}",
        schema.id,
        schema.description,
        describe_parameter(spec),
        render_conversation(ctx, window)
    )
}

pub fn batch_prompt(schema: &ToolSchema, ctx: &ConversationContext, window: usize) -> String {
    let mut out = format!("Tool: {} ({})\nParameters:\n", schema.id, schema.description);
    for spec in &schema.parameters {
        out.push_str(&format!(
            "- \"{}\": {}{}\n",
            spec.name,
            spec.param_type.describe(),
            if spec.description.is_empty() {
                String::new()
            } else {
                format!(". {}", spec.description)
            }
        ));
    }
    out.push('\n');
    out.push_str(&render_conversation(ctx, window));
    out
}

fn truncate(text: &str) -> String {
    text.chars().take(tutorlink_core::MAX_TURN_CHARS).collect()
}

/// Strip markdown code fences around a JSON answer.
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```json")
        && let Some(end) = rest.rfind("```")
    {
        return rest[..end].trim();
    }

    if let Some(stripped) = trimmed.strip_prefix("```")
        && let Some(end) = stripped.find("```")
    {
        return stripped[..end].trim();
    }

    trimmed
}

/// Parse the first JSON object in an oracle answer. Tolerates code fences
/// and prose around the object.
pub fn parse_json_object(response: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let candidate = extract_json_from_response(response);
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(candidate) {
        return Some(map);
    }
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&candidate[start..=end]) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A number, or a string holding one.
pub fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}
