// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable,
//! plus the JSON envelopes printed in `--format json` mode.

use colored::Colorize;
use serde::Serialize;
use serde_json::json;

use crate::errors::CodevecError;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize file path (cyan)
pub fn colorize_path(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize line range (yellow)
pub fn colorize_lines(start: Option<u32>, end: Option<u32>, use_color: bool) -> String {
    let text = match (start, end) {
        (Some(start), Some(end)) if start != end => format!("{}-{}", start, end),
        (Some(start), _) => start.to_string(),
        _ => return String::new(),
    };
    if use_color {
        text.yellow().to_string()
    } else {
        text
    }
}

/// Colorize unit type (green)
pub fn colorize_kind(text: &str, use_color: bool) -> String {
    if use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize symbol name (bold)
pub fn colorize_name(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a score in [0, 1]: green when strong, yellow otherwise
pub fn colorize_score(score: f32, use_color: bool) -> String {
    let text = format!("{:.3}", score);
    if !use_color {
        text
    } else if score >= 0.85 {
        text.green().to_string()
    } else {
        text.yellow().to_string()
    }
}

/// Dimmed preview text
pub fn colorize_context(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// First `max_lines` lines of `content`, each indented.
pub fn preview(content: &str, max_lines: usize) -> String {
    let mut lines: Vec<String> = content
        .lines()
        .take(max_lines)
        .map(|line| format!("    {}", line))
        .collect();
    if content.lines().count() > max_lines {
        lines.push("    ...".to_string());
    }
    lines.join("\n")
}

/// `{"success": true, "data": ...}` on stdout.
pub fn print_json<T: Serialize>(data: &T, compact: bool) -> serde_json::Result<()> {
    let envelope = json!({ "success": true, "data": data });
    let rendered = if compact {
        serde_json::to_string(&envelope)?
    } else {
        serde_json::to_string_pretty(&envelope)?
    };
    println!("{}", rendered);
    Ok(())
}

/// `{"success": false, "error": {"message", "code", "retryAfter"?}}`
pub fn error_json(err: &CodevecError) -> serde_json::Value {
    let mut error = json!({
        "message": err.to_string(),
        "code": err.kind().code(),
    });
    if let Some(retry_after) = err.retry_after_secs() {
        error["retryAfter"] = json!(retry_after);
    }
    json!({ "success": false, "error": error })
}

/// Envelope for failures that did not originate in the library.
pub fn internal_error_json(message: &str) -> serde_json::Value {
    json!({
        "success": false,
        "error": { "message": message, "code": "INTERNAL_ERROR" }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_includes_retry_after() {
        let value = error_json(&CodevecError::RateLimited {
            retry_after_secs: 42,
        });
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(value["error"]["retryAfter"], 42);

        let value = error_json(&CodevecError::ReferenceNotFound("r1:x.go".into()));
        assert!(value["error"].get("retryAfter").is_none());
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("a\nb\nc", 2), "    a\n    b\n    ...");
        assert_eq!(colorize_lines(Some(3), Some(9), false), "3-9");
        assert_eq!(colorize_lines(None, None, false), "");
    }
}
