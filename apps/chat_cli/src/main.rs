use std::{io::Write, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, ChatSession, HttpBackend, SendOutcome, SessionEvent, UploadFile,
};
use shared::domain::{Document, DocumentId, Message};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{parse_input, Input, HELP};

#[derive(Parser, Debug)]
#[command(name = "ragchat", about = "Chat with the assistant and manage its documents")]
struct Cli {
    /// Base url of the chat api; overrides ragchat.toml and the environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Start the chat with retrieval-augmented answers switched on.
    #[arg(long)]
    rag: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive conversation (default).
    Chat,
    /// Manage the server's document collection.
    Documents {
        #[command(subcommand)]
        command: DocumentsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DocumentsCommand {
    List {
        #[arg(long)]
        json: bool,
    },
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    Delete {
        id: String,
    },
    Ingest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    let backend = HttpBackend::from_settings(&settings).context("invalid api settings")?;
    info!(api = backend.base_url(), "using chat api");

    let session = ChatSession::create(Arc::new(backend)).await;
    let result = match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(&session, cli.rag).await,
        Command::Documents { command } => run_documents(&session, command).await,
    };
    session.dispose();
    result
}

async fn run_documents(session: &ChatSession, command: DocumentsCommand) -> Result<()> {
    match command {
        DocumentsCommand::List { json } => {
            let documents = session.documents();
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                print_documents(&documents);
            }
        }
        DocumentsCommand::Upload { paths } => {
            let complete = upload_paths(session, &paths).await?;
            println!("{}", session.status_message());
            if !complete {
                anyhow::bail!("upload did not complete");
            }
        }
        DocumentsCommand::Delete { id } => {
            let deleted = session.delete_document(&DocumentId::from(id)).await;
            println!("{}", session.status_message());
            if !deleted {
                anyhow::bail!("delete failed");
            }
        }
        DocumentsCommand::Ingest => {
            for source in session.ingest_existing().await {
                println!(" - {source}");
            }
            println!("{}", session.status_message());
        }
    }
    Ok(())
}

async fn run_chat(session: &ChatSession, rag: bool) -> Result<()> {
    session.set_rag_enabled(rag);
    let status_printer = spawn_status_printer(session.subscribe());

    println!(
        "{}",
        session
            .messages()
            .first()
            .map(|welcome| welcome.content.as_str())
            .unwrap_or_default()
    );
    println!(
        "{} document(s) available, RAG mode {}. Type /help for commands.\n",
        session.document_count(),
        on_off(session.rag_enabled())
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Status => println!("{}", session.status_message()),
            Input::Documents => print_documents(&session.documents()),
            Input::Ingest => {
                let sources = session.ingest_existing().await;
                for source in sources {
                    println!(" - {source}");
                }
            }
            Input::Rag(None) => println!("RAG mode is {}", on_off(session.rag_enabled())),
            Input::Rag(Some(enabled)) => {
                if enabled && !session.has_documents() {
                    println!("No documents uploaded yet; answers will say so.");
                }
                session.set_rag_enabled(enabled);
                println!("RAG mode {}", on_off(enabled));
            }
            Input::Upload(paths) => {
                let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                if let Err(err) = upload_paths(session, &paths).await {
                    println!("{err:#}");
                }
            }
            Input::Delete(id) => {
                session.delete_document(&DocumentId::from(id)).await;
            }
            Input::Message(text) => match session.send_message(&text).await {
                SendOutcome::Answered | SendOutcome::Failed => {
                    if let Some(answer) = session.messages().last() {
                        print_answer(answer);
                    }
                }
                SendOutcome::Skipped => println!("Still waiting for the previous answer."),
                SendOutcome::Discarded => {}
            },
            Input::Invalid(reason) => println!("{reason}"),
        }
    }

    status_printer.abort();
    println!("Goodbye!");
    Ok(())
}

/// Returns whether every file was uploaded.
async fn upload_paths(session: &ChatSession, paths: &[PathBuf]) -> Result<bool> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(UploadFile::from_path(path).await?);
    }
    let report = session.upload_documents(files).await;
    for document in &report.uploaded {
        println!("uploaded {} (id {})", document.name, document.id);
    }
    Ok(report.is_complete())
}

fn spawn_status_printer(mut events: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StatusChanged(status)) if !status.is_empty() => {
                    eprintln!("[status] {status}");
                }
                Ok(SessionEvent::Reset { epoch }) => {
                    eprintln!("[session {epoch}] conversation reset, RAG mode off");
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_answer(message: &Message) {
    println!("Intent: {}", message.intent);
    if !message.used_documents.is_empty() {
        println!("Documents used:");
        for source in &message.used_documents {
            println!(" - {source}");
        }
    }
    println!("Assistant: {}\n", message.content);
}

fn print_documents(documents: &[Document]) {
    if documents.is_empty() {
        println!("No documents.");
        return;
    }
    for document in documents {
        println!(
            "{:>6}  {:<40}  {:<28}  {:>10} B  {}",
            document.id.as_str(),
            document.name,
            document.doc_type,
            document.size,
            document.uploaded_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
