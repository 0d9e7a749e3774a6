//! Command allowlisting for `run_command`.
//!
//! Rules:
//! - Empty allowlist → every command may run
//! - `"*"` in the allowlist → every command may run
//! - Otherwise the base command (first word, without directory) must be listed,
//!   and shell chaining is refused since it would run unlisted commands

/// Error returned when a command is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandPolicyError {
    #[error("Empty command")]
    Empty,

    #[error("Command '{command}' not in allowlist")]
    NotAllowed { command: String },

    #[error("Command chaining ('{operator}') is not allowed with a command allowlist")]
    Chaining { operator: String },
}

const CHAIN_OPERATORS: &[&str] = &["&&", "||", ";", "|", "`", "$(", "\n"];

/// The first word of `command`, stripped of any leading directory.
pub fn base_command(command: &str) -> &str {
    let first = command.split_whitespace().next().unwrap_or("");
    first.rsplit(['/', '\\']).next().unwrap_or(first)
}

/// Check `command` against `allowed`.
pub fn check_command(command: &str, allowed: &[String]) -> Result<(), CommandPolicyError> {
    let base = base_command(command);
    if base.is_empty() {
        return Err(CommandPolicyError::Empty);
    }

    if allowed.is_empty() || allowed.iter().any(|a| a == "*") {
        return Ok(());
    }

    if let Some(op) = CHAIN_OPERATORS.iter().find(|op| command.contains(*op)) {
        return Err(CommandPolicyError::Chaining {
            operator: op.escape_default().to_string(),
        });
    }

    if allowed.iter().any(|a| a == base) {
        Ok(())
    } else {
        Err(CommandPolicyError::NotAllowed {
            command: base.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> Vec<String> {
        vec!["ls".into(), "cat".into(), "cargo".into()]
    }

    #[test]
    fn allowlist_check() {
        assert!(check_command("ls -la", &allowlist()).is_ok());
        assert!(check_command("cargo test --workspace", &allowlist()).is_ok());
        assert!(check_command("/usr/bin/cat file.txt", &allowlist()).is_ok());
        assert_eq!(
            check_command("rm -rf /", &allowlist()),
            Err(CommandPolicyError::NotAllowed { command: "rm".into() })
        );
    }

    #[test]
    fn empty_allowlist_allows_all() {
        assert!(check_command("anything goes && more", &[]).is_ok());
        assert!(check_command("rm x", &["*".into()]).is_ok());
    }

    #[test]
    fn chaining_refused_with_allowlist() {
        assert!(matches!(
            check_command("ls && rm -rf /", &allowlist()),
            Err(CommandPolicyError::Chaining { .. })
        ));
        assert!(check_command("cat a | sh", &allowlist()).is_err());
        assert!(check_command("ls $(whoami)", &allowlist()).is_err());
    }

    #[test]
    fn blank_command_rejected() {
        assert_eq!(check_command("   ", &[]), Err(CommandPolicyError::Empty));
    }

    #[test]
    fn base_command_strips_directory() {
        assert_eq!(base_command("/bin/ls -l"), "ls");
        assert_eq!(base_command("git status"), "git");
        assert_eq!(base_command(""), "");
    }
}
