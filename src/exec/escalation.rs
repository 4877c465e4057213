//! Privilege escalation for remote commands
//!
//! Wraps a command so it runs with elevated rights on the target. When a
//! sudo password is available it is piped into `sudo -S` via `printf` —
//! never interpolated into the command as an argument — with quoting done
//! by the shared escape helper. Without a password the command is sent
//! unmodified, relying on passwordless escalation configured on the target.

use super::sanitize::escape_single_quoted;

/// Wrap `command` for privileged execution.
///
/// # Examples
///
/// ```
/// use remote_exec::exec::escalation::wrap_escalated;
///
/// // Passwordless path: command is passed through untouched.
/// assert_eq!(wrap_escalated("systemctl restart smokeping", None),
///            "systemctl restart smokeping");
///
/// // With a password, the secret is piped to sudo's stdin.
/// assert_eq!(
///     wrap_escalated("apt update", Some("mypassword")),
///     "printf '%s\\n' 'mypassword' | sudo -p \"\" -S sh -c 'apt update'"
/// );
/// ```
pub fn wrap_escalated(command: &str, password: Option<&str>) -> String {
    match password {
        None => command.to_string(),
        Some(pwd) => {
            let escaped_pwd = escape_single_quoted(pwd);
            let escaped_command = escape_single_quoted(command);
            format!(
                "printf '%s\\n' '{}' | sudo -p \"\" -S sh -c '{}'",
                escaped_pwd, escaped_command
            )
        }
    }
}

/// Checks if a password is usable in the escalation pipe.
///
/// A valid password is not empty after trimming and contains no null bytes.
pub fn is_valid_password(password: &str) -> bool {
    !password.trim().is_empty() && !password.contains('\0')
}
