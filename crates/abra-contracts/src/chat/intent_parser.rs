#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMode {
    On,
    Off,
    Toggle,
    Invalid(String),
}

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Prompt(String),
    NewConversation,
    ShowConversation,
    SetStream(StreamMode),
    Ocr { path: Option<String> },
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

/// Parses one REPL line. `/name args` lines are commands; any other text,
/// including a bare `/`, is a prompt for the backend.
pub fn parse_input(text: &str) -> ChatInput {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    let Some((command, arg)) = split_command(trimmed) else {
        return ChatInput::Prompt(trimmed.to_string());
    };

    match command.as_str() {
        "new" => ChatInput::NewConversation,
        "conversation" => ChatInput::ShowConversation,
        "help" => ChatInput::Help,
        "quit" | "exit" => ChatInput::Quit,
        "stream" => ChatInput::SetStream(match arg.to_ascii_lowercase().as_str() {
            "" => StreamMode::Toggle,
            "on" | "true" | "1" => StreamMode::On,
            "off" | "false" | "0" => StreamMode::Off,
            other => StreamMode::Invalid(other.to_string()),
        }),
        "ocr" => ChatInput::Ocr {
            path: path_argument(arg),
        },
        _ => ChatInput::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}

fn split_command(line: &str) -> Option<(String, &str)> {
    let tail = line.strip_prefix('/')?;
    let name_len = tail
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .unwrap_or(tail.len());
    if name_len == 0 {
        return None;
    }
    Some((tail[..name_len].to_ascii_lowercase(), tail[name_len..].trim()))
}

/// Accepts shell-style quoting so paths with spaces survive.
fn path_argument(arg: &str) -> Option<String> {
    let joined = match shell_words::split(arg) {
        Ok(words) => words.join(" "),
        Err(_) => arg.to_string(),
    };
    let joined = joined.trim();
    (!joined.is_empty()).then(|| joined.to_string())
}
