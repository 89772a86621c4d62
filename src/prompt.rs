//! Prompt assembly.
//!
//! Turns a conversation log (plus the optional system directive) into the
//! ordered message list handed to the completion backend.

use crate::history::{ConversationTurn, Role};

/// Assemble the message list for a completion call.
///
/// The system directive, when present and non-empty, becomes the first
/// message; the log follows in stored order. Pure function: callers decide
/// what the log contains (the full history, or a single turn when history is
/// disabled).
pub fn assemble(system_directive: Option<&str>, log: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let mut messages = Vec::with_capacity(log.len() + 1);

    if let Some(directive) = system_directive {
        if !directive.is_empty() {
            messages.push(ConversationTurn::new(Role::System, directive));
        }
    }

    messages.extend_from_slice(log);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_system_directive() {
        let log = vec![ConversationTurn::new(Role::User, "hi")];
        let messages = assemble(Some("You are helpful."), &log);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You are helpful.");
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn no_directive_passes_log_through() {
        let log = vec![
            ConversationTurn::new(Role::User, "a"),
            ConversationTurn::new(Role::Assistant, "b"),
        ];
        let messages = assemble(None, &log);
        assert_eq!(messages, log);
    }

    #[test]
    fn empty_directive_is_skipped() {
        let log = vec![ConversationTurn::new(Role::User, "hi")];
        let messages = assemble(Some(""), &log);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn empty_log_with_directive_is_system_only() {
        let messages = assemble(Some("Be terse."), &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn preserves_log_order() {
        let log: Vec<ConversationTurn> = (0..5)
            .map(|i| ConversationTurn::new(Role::User, format!("m{i}")))
            .collect();
        let messages = assemble(None, &log);
        let contents: Vec<&str> = messages.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }
}
