//! Seed messages for a run.

use crate::llm::Message;

use super::state::Specification;

/// Marker that ends the loop when a plain text answer starts with it.
pub const DONE_SENTINEL: &str = "DONE:";

const SYSTEM_PROMPT: &str = "You are a senior engineer generating a project inside a sandboxed \
directory. Use the fs_* tools to inspect and change files; every path is relative to the project \
root. Keep edits small and purposeful. When the project satisfies the specification, reply with \
a single message starting with DONE: followed by a one-line summary.";

const KICKOFF_PROMPT: &str = "Start by mapping the project with fs_map, then create or update \
the files the specification needs.";

pub(crate) const CONTINUE_PROMPT: &str = "Continue with the tools. Reply starting with DONE: \
once the work is complete.";

pub(crate) fn seed_messages(spec: &Specification, dev_instructions: Option<&str>) -> Vec<Message> {
    let spec_json = serde_json::to_string_pretty(spec).unwrap_or_else(|_| spec.name.clone());

    let mut messages = vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!("SPECIFICATION:\n{spec_json}")),
    ];
    if let Some(instructions) = dev_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        messages.push(Message::user(format!("DEV_INSTRUCTIONS:\n{instructions}")));
    }
    messages.push(Message::user(KICKOFF_PROMPT));
    messages
}

/// Whether a plain text answer declares the work finished.
pub(crate) fn is_done_sentinel(text: &str) -> bool {
    text.trim_start()
        .get(..DONE_SENTINEL.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(DONE_SENTINEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_sentinel_detection() {
        assert!(is_done_sentinel("DONE: all files written"));
        assert!(is_done_sentinel("  done: finished"));
        assert!(!is_done_sentinel("Not done: still going"));
        assert!(!is_done_sentinel("DONE"));
        assert!(!is_done_sentinel(""));
        assert!(!is_done_sentinel("ñé"));
    }

    #[test]
    fn test_seed_messages_order() {
        let spec = Specification::new("demo");
        let messages = seed_messages(&spec, Some("use riverpod"));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("\"name\": \"demo\""));
        assert!(messages[2].content.starts_with("DEV_INSTRUCTIONS:"));

        let without = seed_messages(&spec, Some("   "));
        assert_eq!(without.len(), 3);
    }
}
