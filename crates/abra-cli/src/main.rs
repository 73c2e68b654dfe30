mod server;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use abra_contracts::chat::{help_lines, parse_input, ChatInput, StreamMode};
use abra_contracts::{ExtractedReply, TranscriptWriter};
use abra_engine::{ClientConfig, MetaAiClient, TextExtractionService};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "abra", version, about = "Meta AI conversational client and OCR service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Prompt(PromptArgs),
    Chat(ChatArgs),
    Ocr(OcrArgs),
    Serve(ServeArgs),
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long)]
    message: String,
    #[arg(long)]
    stream: bool,
    #[arg(long)]
    new_conversation: bool,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Print the full reply (message, sources, media) as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    stream: bool,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct OcrArgs {
    /// Local file path or http(s) URL.
    #[arg(long)]
    image: String,
    #[arg(long)]
    refine: bool,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("abra error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Prompt(args) => run_prompt(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ocr(args) => run_ocr(args),
        Command::Serve(args) => run_serve(args),
    }
}

fn open_client(events: Option<&Path>) -> Result<MetaAiClient> {
    let client = MetaAiClient::connect(ClientConfig::from_env())
        .context("failed to open a Meta AI session")?;
    Ok(match events {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            client.with_transcript(TranscriptWriter::new(path, uuid::Uuid::new_v4().to_string()))
        }
        None => client,
    })
}

fn run_prompt(args: PromptArgs) -> Result<i32> {
    let mut client = open_client(args.events.as_deref())?;
    if args.stream {
        let reply = stream_reply(&mut client, &args.message, args.new_conversation)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        } else {
            print_attachments(&reply);
        }
    } else {
        let reply = client.prompt(&args.message, args.new_conversation)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        } else {
            print_reply(&reply);
        }
    }
    Ok(0)
}

/// Echoes streamed fragments as they grow and returns the last one.
fn stream_reply(
    client: &mut MetaAiClient,
    message: &str,
    new_conversation: bool,
) -> Result<ExtractedReply> {
    let mut printed = String::new();
    let mut last = ExtractedReply::default();
    let mut stdout = io::stdout();
    for fragment in client.prompt_stream(message, new_conversation)? {
        let fragment = fragment?;
        match fragment.message.strip_prefix(printed.as_str()) {
            Some(delta) => write!(stdout, "{delta}")?,
            None => write!(stdout, "\n{}", fragment.message)?,
        }
        stdout.flush()?;
        printed = fragment.message.clone();
        last = fragment;
    }
    if !printed.ends_with('\n') {
        writeln!(stdout)?;
    }
    Ok(last)
}

fn print_reply(reply: &ExtractedReply) {
    println!("{}", reply.message.trim_end());
    print_attachments(reply);
}

fn print_attachments(reply: &ExtractedReply) {
    for (index, source) in reply.sources.iter().enumerate() {
        println!(
            "[{}] {} {}",
            index + 1,
            source.title.as_deref().unwrap_or("(untitled)"),
            source.link.as_deref().unwrap_or_default()
        );
    }
    for media in &reply.media {
        println!(
            "media: {} ({})",
            media.url.as_deref().unwrap_or_default(),
            media.media_type.as_deref().unwrap_or("unknown")
        );
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut client = open_client(args.events.as_deref())?;
    let mut stream = args.stream;
    let mut new_conversation = false;
    let mut ocr_service: Option<TextExtractionService> = None;

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Abra chat started. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_input(&line) {
            ChatInput::Empty => continue,
            ChatInput::Help => {
                for help in help_lines() {
                    println!("  {help}");
                }
            }
            ChatInput::Quit => break,
            ChatInput::NewConversation => {
                new_conversation = true;
                println!("Next message starts a new conversation.");
            }
            ChatInput::ShowConversation => match client.conversation().external_id() {
                Some(id) => println!("Conversation: {id}"),
                None => println!("Conversation: (none yet)"),
            },
            ChatInput::SetStream(mode) => {
                stream = match mode {
                    StreamMode::On => true,
                    StreamMode::Off => false,
                    StreamMode::Toggle => !stream,
                    StreamMode::Invalid(other) => {
                        println!("/stream expects on or off (got {other})");
                        continue;
                    }
                };
                println!("Streaming {}", if stream { "on" } else { "off" });
            }
            ChatInput::Ocr { path: None } => println!("/ocr requires a path"),
            ChatInput::Ocr { path: Some(path) } => {
                if ocr_service.is_none() {
                    ocr_service = Some(TextExtractionService::from_env()?);
                }
                let Some(service) = ocr_service.as_ref() else {
                    continue;
                };
                match recognize_image(service, &path, false) {
                    Ok(text) => println!("{}", text.trim_end()),
                    Err(err) => println!("OCR failed: {err:#}"),
                }
            }
            ChatInput::Prompt(message) => {
                let outcome = if stream {
                    stream_reply(&mut client, &message, new_conversation)
                        .map(|reply| print_attachments(&reply))
                } else {
                    client
                        .prompt(&message, new_conversation)
                        .map(|reply| print_reply(&reply))
                        .map_err(anyhow::Error::from)
                };
                match outcome {
                    Ok(()) => new_conversation = false,
                    Err(err) => println!("Prompt failed: {err:#}"),
                }
            }
            ChatInput::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }
    }
    Ok(())
}

fn run_ocr(args: OcrArgs) -> Result<i32> {
    let service = TextExtractionService::from_env()?;
    let text = recognize_image(&service, &args.image, args.refine)?;
    println!("{}", text.trim_end());
    Ok(0)
}

/// OCR for a local file, or for a URL when no such file exists.
fn recognize_image(service: &TextExtractionService, image: &str, refine: bool) -> Result<String> {
    let path = Path::new(image);
    let text = if path.is_file() {
        let bytes = fs::read(path).with_context(|| format!("failed to read {image}"))?;
        service.extract_from_bytes(&bytes, Some(refine))?
    } else {
        service.retrieve_text(image, Some(refine))?
    };
    Ok(text)
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let service = TextExtractionService::from_env()?;
    let state = server::AppState {
        service: Arc::new(service),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(server::serve(&args.host, args.port, state))?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_to_all_interfaces_on_8000() {
        let cli = Cli::parse_from(["abra", "serve"]);
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.host, "0.0.0.0");
                assert_eq!(args.port, 8000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn prompt_flags_parse() {
        let cli = Cli::parse_from([
            "abra",
            "prompt",
            "--message",
            "hello",
            "--stream",
            "--new-conversation",
        ]);
        match cli.command {
            Command::Prompt(args) => {
                assert_eq!(args.message, "hello");
                assert!(args.stream);
                assert!(args.new_conversation);
                assert!(args.events.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ocr_accepts_urls_and_refine_flag() {
        let cli = Cli::parse_from(["abra", "ocr", "--image", "https://img.test/a.png", "--refine"]);
        match cli.command {
            Command::Ocr(args) => {
                assert_eq!(args.image, "https://img.test/a.png");
                assert!(args.refine);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
