//! Interactive and one-shot chat front ends.

use std::io::Write;

use anyhow::Result;
use docchat_retrieval::{
    ChatMessage, ChatSession, DocChatConfig, PipelineError, QueryPipeline, ScoredPassage,
    connection_hint,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const SOURCE_PREVIEW_CHARS: usize = 80;

const HELP: &str = "Commands:
  /connect     connect (or reconnect) to the knowledge base
  /disconnect  drop the connection
  /clear       clear the conversation
  /help        show this help
  /quit        exit
Anything else is sent as a question.";

/// A line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Ask(&'a str),
    Connect,
    Disconnect,
    Clear,
    Help,
    Quit,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line {
            "/connect" => Self::Connect,
            "/disconnect" => Self::Disconnect,
            "/clear" => Self::Clear,
            "/help" | "/?" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other if other.starts_with('/') => Self::Unknown(other),
            question => Self::Ask(question),
        }
    }
}

/// Connect, answer `query`, print the reply.
pub async fn run_once(config: &DocChatConfig, query: &str, show_sources: bool) -> Result<()> {
    let mut session = ChatSession::new(QueryPipeline::from_config(config)?);
    connect(&mut session, config, false).await?;
    if let Some(reply) = session.ask(query).await? {
        print_reply(reply, show_sources);
    }
    Ok(())
}

/// Read questions from stdin until `/quit` or end of input.
pub async fn run_interactive(config: &DocChatConfig, show_sources: bool) -> Result<()> {
    let mut session = ChatSession::new(QueryPipeline::from_config(config)?);
    println!(
        "Chat with your documents in '{}'. Type /help for commands.",
        config.pipeline.collection
    );
    // A failed first connect leaves the session usable; /connect retries.
    let _ = connect(&mut session, config, true).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::Ask(question) => match session.ask(question).await {
                Ok(Some(reply)) => print_reply(reply, show_sources),
                Ok(None) => {}
                Err(PipelineError::NotReady) => {
                    println!("Not connected. Type /connect to connect to the knowledge base.");
                }
                Err(err) => println!("{err}"),
            },
            Command::Connect => {
                let _ = connect(&mut session, config, true).await;
            }
            Command::Disconnect => {
                session.disconnect();
                println!("Disconnected.");
            }
            Command::Clear => {
                session.clear_history();
                println!("Conversation cleared.");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(command) => println!("Unknown command {command}. Type /help."),
        }
    }
    debug!(messages = session.messages().len(), "session ended");
    Ok(())
}

/// Connect the session, printing progress and any hint on failure.
async fn connect(
    session: &mut ChatSession,
    config: &DocChatConfig,
    interactive: bool,
) -> std::result::Result<(), PipelineError> {
    let result = session
        .connect(|progress| {
            eprintln!("[{:>3}%] {}", progress.percent, progress.stage.description());
        })
        .await;

    match &result {
        Ok(()) => {
            if interactive {
                println!("Connected to knowledge base.");
            }
        }
        Err(err) => {
            eprintln!("Error connecting to knowledge base: {err}");
            if let Some(hint) = connection_hint(err, &config.store.url) {
                eprintln!("{hint}");
            }
        }
    }
    result
}

fn print_reply(reply: &ChatMessage, show_sources: bool) {
    println!("{}", reply.content);
    if show_sources && !reply.sources.is_empty() {
        println!();
        for (index, source) in reply.sources.iter().enumerate() {
            println!("{}", format_source(index + 1, source));
        }
    }
}

fn format_source(number: usize, source: &ScoredPassage) -> String {
    let metadata = &source.passage.metadata;
    let origin = match (metadata.get("file_name"), metadata.get("page_label")) {
        (Some(file), Some(page)) => format!("{file} p.{page}"),
        (Some(file), None) => file.clone(),
        _ => source.passage.id.clone(),
    };

    let text = source.text().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut preview: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    if text.chars().count() > SOURCE_PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("[{number}] {origin} ({:.3}): {preview}", source.score)
}
