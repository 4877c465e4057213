//! Command sanitization and escaping utilities
//!
//! Validation applied to every command before dispatch, and the single
//! quote-escaping helper shared by every call site that builds shell text
//! (argument rendering and privilege escalation alike).

use crate::error::{CoreError, Result};

/// Sanitize a command before execution
///
/// This function:
/// - Validates that the command is not empty
/// - Trims whitespace
/// - Checks length against max_chars limit
///
/// # Arguments
/// * `command` - The raw command string
/// * `max_chars` - Optional maximum character limit (None = unlimited)
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(CoreError::invalid_params("Command cannot be empty"));
    }

    // Check length limit
    if let Some(max) = max_chars {
        if trimmed.len() > max {
            return Err(CoreError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max,
                trimmed.len()
            )));
        }
    }

    Ok(trimmed.to_string())
}

/// Escape a string for safe use inside single-quoted shell contexts.
///
/// Replaces single quotes with the pattern `'"'"'` which:
/// 1. Ends the current single-quoted string
/// 2. Adds a literal quote via double quotes
/// 3. Starts a new single-quoted string
///
/// Every place in this crate that interpolates text into shell syntax goes
/// through this one helper.
pub fn escape_single_quoted(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Wrap a value in single quotes, escaping any quotes it contains
pub fn quote(s: &str) -> String {
    format!("'{}'", escape_single_quoted(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_command_valid() {
        let result = sanitize_command("ls -la", Some(1000));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "ls -la");
    }

    #[test]
    fn test_sanitize_command_trims_whitespace() {
        let result = sanitize_command("  ls -la  ", Some(1000));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "ls -la");
    }

    #[test]
    fn test_sanitize_command_empty() {
        let result = sanitize_command("", Some(1000));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sanitize_command_whitespace_only() {
        let result = sanitize_command("   ", Some(1000));
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitize_command_too_long() {
        let long_cmd = "a".repeat(100);
        let result = sanitize_command(&long_cmd, Some(50));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_sanitize_command_exactly_at_limit() {
        let cmd = "a".repeat(50);
        assert!(sanitize_command(&cmd, Some(50)).is_ok());
    }

    #[test]
    fn test_sanitize_command_unlimited() {
        let long_cmd = "a".repeat(10000);
        assert!(sanitize_command(&long_cmd, None).is_ok());
    }

    #[test]
    fn test_escape_no_quotes() {
        assert_eq!(escape_single_quoted("ls -la"), "ls -la");
    }

    #[test]
    fn test_escape_with_quotes() {
        assert_eq!(escape_single_quoted("it's"), "it'\"'\"'s");
        assert_eq!(
            escape_single_quoted("echo 'a' 'b'"),
            "echo '\"'\"'a'\"'\"' '\"'\"'b'\"'\"'"
        );
    }

    #[test]
    fn test_escape_empty() {
        assert_eq!(escape_single_quoted(""), "");
    }

    #[test]
    fn test_quote_wraps_and_escapes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
    }
}
