//! Current time tool.

use agentloom_core::error::ToolError;
use agentloom_core::tool::{Tool, ToolContext};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::{field_or_text, parse_input};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Return the current date and time in RFC 3339. Optional input: a UTC offset such as +02:00."
    }

    async fn execute(&self, _ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        let args = parse_input(input);
        let offset = field_or_text(&args, "offset").unwrap_or_default();
        format_now(Utc::now(), offset.trim())
    }
}

fn format_now(now: DateTime<Utc>, offset: &str) -> Result<String, ToolError> {
    if offset.is_empty() || offset.eq_ignore_ascii_case("utc") || offset == "Z" {
        return Ok(now.to_rfc3339());
    }
    let parsed = parse_offset(offset)
        .ok_or_else(|| ToolError::InvalidInput(format!("invalid UTC offset: {offset}")))?;
    Ok(now.with_timezone(&parsed).to_rfc3339())
}

/// Parse `+HH:MM` / `-HH:MM` / `+HH`.
fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let (sign, rest) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
