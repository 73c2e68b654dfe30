/// A slash command the REPL understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatCommand {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const CHAT_COMMANDS: &[ChatCommand] = &[
    ChatCommand {
        name: "new",
        usage: "/new",
        summary: "start a new conversation with the next message",
    },
    ChatCommand {
        name: "stream",
        usage: "/stream on|off",
        summary: "print replies as they arrive",
    },
    ChatCommand {
        name: "ocr",
        usage: "/ocr <path>",
        summary: "read the text in an image file",
    },
    ChatCommand {
        name: "conversation",
        usage: "/conversation",
        summary: "show the current conversation id",
    },
    ChatCommand {
        name: "help",
        usage: "/help",
        summary: "list commands",
    },
    ChatCommand {
        name: "quit",
        usage: "/quit",
        summary: "leave the chat (also /exit)",
    },
];

pub fn help_lines() -> Vec<String> {
    let width = CHAT_COMMANDS
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);
    CHAT_COMMANDS
        .iter()
        .map(|command| format!("{:<width$}  {}", command.usage, command.summary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_command_aligned() {
        let lines = help_lines();
        assert_eq!(lines.len(), CHAT_COMMANDS.len());
        assert!(lines[1].starts_with("/stream on|off  print"));
        assert!(lines[0].starts_with("/new            start"));
    }
}
