//! Reasoning-trace parser
//!
//! Extracts tool-call templates and a final answer from free-text model
//! output. Strict line-prefix parsing with structured fallback: a broken
//! Tool/ToolInput pair is recorded and skipped, never fatal.
//!
//! Recognized prefixes (case-insensitive, flexible whitespace):
//! `Thought:`, `Tool:`, `ToolInput:`, `Answer:`.

use crate::error::CoevoError;
use crate::tools::PlanStep;

#[derive(Debug, Clone, PartialEq)]
enum Marker {
    Thought,
    Tool,
    ToolInput,
    Answer,
}

/// Result of parsing one trace. `errors` holds the fragments that could
/// not be assembled into calls.
#[derive(Debug, Default)]
pub struct ParsedTrace {
    pub tool_calls: Vec<PlanStep>,
    pub answer: String,
    pub errors: Vec<CoevoError>,
}

/// Split a line into a recognized marker and its value.
fn split_marker(line: &str) -> Option<(Marker, &str)> {
    let (head, value) = line.split_once(':')?;
    let marker = match head.trim().to_ascii_lowercase().as_str() {
        "thought" => Marker::Thought,
        "tool" => Marker::Tool,
        "toolinput" => Marker::ToolInput,
        "answer" => Marker::Answer,
        _ => return None,
    };
    Some((marker, value.trim()))
}

/// Parse a reasoning trace. Pure: re-parsing the same text yields the same
/// calls and answer.
pub fn parse_trace(output: &str) -> ParsedTrace {
    let lines: Vec<&str> = output.lines().collect();

    // Everything after the last `Answer:` marker belongs to the answer.
    let last_answer = lines
        .iter()
        .rposition(|line| matches!(split_marker(line), Some((Marker::Answer, _))));

    let mut parsed = ParsedTrace::default();
    let mut pending_tool: Option<(usize, String)> = None;
    let scan_until = last_answer.unwrap_or(lines.len());

    for (index, line) in lines.iter().enumerate().take(scan_until) {
        match split_marker(line) {
            Some((Marker::Tool, value)) => {
                if let Some((at, tool)) = pending_tool.replace((index, value.to_string())) {
                    parsed.errors.push(CoevoError::Parse {
                        line: at + 1,
                        reason: format!("Tool `{tool}` has no ToolInput"),
                    });
                }
            }
            Some((Marker::ToolInput, value)) => match pending_tool.take() {
                Some((_, tool)) => {
                    let step_id = format!("step_{}", parsed.tool_calls.len() + 1);
                    parsed.tool_calls.push(PlanStep::new(step_id, tool, value));
                }
                None => {
                    parsed.errors.push(CoevoError::Parse {
                        line: index + 1,
                        reason: "ToolInput without a preceding Tool".to_string(),
                    });
                }
            },
            Some((Marker::Thought, _)) | Some((Marker::Answer, _)) | None => {}
        }
    }
    if let Some((at, tool)) = pending_tool {
        parsed.errors.push(CoevoError::Parse {
            line: at + 1,
            reason: format!("Tool `{tool}` has no ToolInput"),
        });
    }

    if let Some(marker_index) = last_answer {
        let mut pieces = Vec::new();
        if let Some((Marker::Answer, value)) = split_marker(lines[marker_index]) {
            if !value.is_empty() {
                pieces.push(value.to_string());
            }
        }
        pieces.extend(lines[marker_index + 1..].iter().map(|l| l.to_string()));
        parsed.answer = pieces.join("\n").trim().to_string();
    }

    parsed
}
