use std::io::Write;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use dotchat_client::{ChatClient, ClientConfig, ClientEvent, ClientState, Command, Renderer, run};
use dotchat_types::MediaKind;

/// Writes one line per event to stdout.
struct Terminal;

impl Renderer for Terminal {
    fn render(&mut self, event: ClientEvent) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", event);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dotchat=info,dotchat_client=info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let state = ClientState::new(config.name.clone());
    if let Some(reason) = state.crypto_unavailable() {
        warn!("encryption unavailable ({}); messages will be sent in plaintext", reason);
    }

    let client = ChatClient::connect(&config.url, state).await?;
    info!("joined {} as {}", config.url, client.state().display_name());

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_stdin(tx));

    run(client, rx, &mut Terminal).await?;
    Ok(())
}

async fn read_stdin(tx: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = match parse_line(&line) {
            Some(Input::Quit) => Command::Quit,
            Some(Input::Text(text)) => Command::Text(text),
            Some(Input::Attach(media_type, path)) => match attach(media_type, &path).await {
                Ok(command) => command,
                Err(e) => {
                    warn!("could not read {}: {}", path, e);
                    continue;
                }
            },
            None => continue,
        };
        let quit = command == Command::Quit;
        if tx.send(command).is_err() || quit {
            return;
        }
    }
    let _ = tx.send(Command::Quit);
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Text(String),
    Attach(MediaKind, String),
    Quit,
}

fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let attach = |kind, rest: &str| {
        let path = rest.trim();
        (!path.is_empty()).then(|| Input::Attach(kind, path.to_string()))
    };
    if line == "/quit" {
        Some(Input::Quit)
    } else if let Some(rest) = line.strip_prefix("/file ") {
        attach(MediaKind::File, rest)
    } else if let Some(rest) = line.strip_prefix("/image ") {
        attach(MediaKind::Image, rest)
    } else if let Some(rest) = line.strip_prefix("/audio ") {
        attach(MediaKind::Audio, rest)
    } else {
        Some(Input::Text(line.to_string()))
    }
}

async fn attach(media_type: MediaKind, path: &str) -> std::io::Result<Command> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    Ok(Command::Media {
        media_type,
        data: BASE64.encode(bytes),
        file_name,
    })
}
