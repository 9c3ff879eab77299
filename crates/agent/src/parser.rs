//! Parsing of textual actions in model replies.
//!
//! The grammar is `Action: <name>[<input>]` where the name is
//! `[A-Za-z_-]+`, optionally followed by `@` and a word (a remote tool such as
//! `vm@ping`). The bracketed input may itself contain balanced brackets.

use agentloom_core::tool::NAMESPACE_SEP;

const ACTION_MARKER: &str = "Action:";
const FINISH: &str = "finish";

/// One `Action: name[input]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub name: String,
    pub input: String,
}

impl ParsedAction {
    pub fn is_finish(&self) -> bool {
        self.name.eq_ignore_ascii_case(FINISH)
    }
}

/// Content between the first `[` and its matching `]`.
///
/// Returns `None` when there is no opening bracket, when a `]` appears before
/// it, or when the brackets never balance.
pub fn extract_bracketed(text: &str) -> Option<&str> {
    let open = text.find('[')?;
    if text[..open].contains(']') {
        return None;
    }
    let mut depth = 0usize;
    for (idx, ch) in text[open..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..open + idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every action in `text`, in order of appearance. Finish actions included.
pub fn parse_actions(text: &str) -> Vec<ParsedAction> {
    let mut actions = Vec::new();
    let mut rest = text;

    while let Some(pos) = rest.find(ACTION_MARKER) {
        rest = &rest[pos + ACTION_MARKER.len()..];
        let after_ws = rest.trim_start_matches([' ', '\t']);

        let base_len = after_ws
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '_' || c == '-'))
            .unwrap_or(after_ws.len());
        if base_len == 0 {
            continue;
        }
        let mut name_len = base_len;
        if after_ws[base_len..].starts_with(NAMESPACE_SEP) {
            let tail = &after_ws[base_len + NAMESPACE_SEP.len_utf8()..];
            let word_len = tail
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(tail.len());
            name_len = base_len + NAMESPACE_SEP.len_utf8() + word_len;
        }
        let name = &after_ws[..name_len];
        let remainder = &after_ws[name_len..];

        let input = bracketed_input(remainder).unwrap_or_default();
        actions.push(ParsedAction {
            name: name.to_string(),
            input,
        });
        rest = remainder;
    }
    actions
}

/// Input following an action name: the balanced bracket contents, or the rest
/// of the line when the brackets never close.
fn bracketed_input(remainder: &str) -> Option<String> {
    let trimmed = remainder.trim_start_matches([' ', '\t']);
    if !trimmed.starts_with('[') {
        return None;
    }
    match extract_bracketed(trimmed) {
        Some(inner) => Some(inner.to_string()),
        None => {
            let line = trimmed[1..].lines().next().unwrap_or_default();
            Some(line.trim().to_string())
        }
    }
}

/// The argument of the first `Action: Finish[...]`, if the reply has one.
pub fn finish_answer(text: &str) -> Option<String> {
    parse_actions(text)
        .into_iter()
        .find(ParsedAction::is_finish)
        .map(|a| a.input)
}

/// True for replies that end the ReAct loop.
pub fn signals_finish(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("action: finish") || lower.contains("final answer") || finish_answer(text).is_some()
}

pub fn has_final_answer(text: &str) -> bool {
    text.to_lowercase().contains("final answer")
}

/// Drop a leading `Final answer:` label, leaving the answer itself.
pub fn strip_final_answer(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.get(..13) {
        Some(head) if head.eq_ignore_ascii_case("final answer:") => trimmed[13..].trim(),
        _ => text,
    }
}
