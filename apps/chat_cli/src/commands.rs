//! Parsing of lines typed into the interactive chat loop.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Quit,
    Help,
    Status,
    Documents,
    Ingest,
    Rag(Option<bool>),
    Upload(Vec<String>),
    Delete(String),
    Message(String),
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  /rag [on|off]        show or switch retrieval-augmented answers
  /docs                list known documents
  /upload <path>...    upload files, one after another
  /delete <id>         delete a document
  /ingest              ingest the server's document folder
  /status              show the last operation status
  /help                show this help
  quit | exit | q      leave
Anything else is sent to the assistant.";

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if matches!(line.to_ascii_lowercase().as_str(), "quit" | "exit" | "q") {
        return Input::Quit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();

    match name.as_str() {
        "help" | "?" => Input::Help,
        "status" => Input::Status,
        "docs" | "documents" => Input::Documents,
        "ingest" => Input::Ingest,
        "quit" | "exit" => Input::Quit,
        "rag" => match args.first().map(|arg| arg.to_ascii_lowercase()).as_deref() {
            None => Input::Rag(None),
            Some("on" | "true" | "1") => Input::Rag(Some(true)),
            Some("off" | "false" | "0") => Input::Rag(Some(false)),
            Some(other) => Input::Invalid(format!("expected on or off, got '{other}'")),
        },
        "upload" if args.is_empty() => Input::Invalid("usage: /upload <path>...".to_string()),
        "upload" => Input::Upload(args),
        "delete" | "rm" => match args.as_slice() {
            [id] => Input::Delete(id.clone()),
            _ => Input::Invalid("usage: /delete <id>".to_string()),
        },
        other => Input::Invalid(format!("unknown command '/{other}', try /help")),
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
