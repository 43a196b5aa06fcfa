use std::{
    io::{self, BufRead, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc as std_mpsc,
    },
    thread,
};

use arboard::Clipboard;
use clap::Parser;
use roomshare_client::{
    App, AppCommand, ClientArgs, ClientConfig, Frontend, HttpRoomApi, NotificationPhase, Render,
    WsTransport,
};
use roomshare_core::{
    CatalogEntry, CatalogView, ChatMessage, HistoryUpdate, LatestView, UploadStatus,
    format::{format_eta, format_size, format_speed, format_timestamp},
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  <text>               send a chat message
  /upload <path>...    upload one or more files
  /files               refresh the file list
  /delete <id>         delete a file (asks first)
  /link <id>           copy a file's share link
  /download <id>       save a file into the download directory
  /history             show or hide the chat history
  /quit                leave the room";

fn main() {
    init_logging();

    let args = ClientArgs::parse();
    let config = match ClientConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    runtime.block_on(run(config));
}

async fn run(config: ClientConfig) {
    info!(origin = %config.origin, "joining room");
    println!("{HELP}");

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (confirm_tx, confirm_rx) = std_mpsc::channel();
    let awaiting_confirm = Arc::new(AtomicBool::new(false));
    spawn_stdin_reader(command_tx, confirm_tx, Arc::clone(&awaiting_confirm));

    let api = Arc::new(HttpRoomApi::new(config.origin.clone()));
    let transport = Arc::new(WsTransport::new(config.connect_timeout));
    let frontend = TerminalFrontend {
        confirm_rx,
        awaiting_confirm,
    };

    let (mut app, events_rx) = App::new(config, api, frontend);
    app.start(transport);
    app.run(events_rx, command_rx).await;
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
}

/// Reads stdin on a plain thread. While a confirmation is pending the next
/// line answers it instead of being parsed as a command.
fn spawn_stdin_reader(
    commands: mpsc::UnboundedSender<AppCommand>,
    answers: std_mpsc::Sender<String>,
    awaiting_confirm: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if awaiting_confirm.swap(false, Ordering::SeqCst) {
                if answers.send(line).is_err() {
                    break;
                }
                continue;
            }
            match AppCommand::parse(&line) {
                Some(command) => {
                    let quit = command == AppCommand::Shutdown;
                    if commands.send(command).is_err() || quit {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("{HELP}"),
            }
        }
    });
}

struct TerminalFrontend {
    confirm_rx: std_mpsc::Receiver<String>,
    awaiting_confirm: Arc<AtomicBool>,
}

impl Frontend for TerminalFrontend {
    fn render(&mut self, update: Render<'_>) {
        match update {
            Render::Connection(state) => println!("[status] {}", state.label()),
            Render::Latest(view) => println!("[latest] {}", latest_line(view)),
            Render::History { update, messages } => match update {
                HistoryUpdate::Hidden => {}
                HistoryUpdate::Appended => {
                    if let Some(message) = messages.last() {
                        println!("  {}", chat_line(message));
                    }
                }
                HistoryUpdate::Rebuilt => {
                    println!("--- chat history ({}) ---", messages.len());
                    for message in messages {
                        println!("  {}", chat_line(message));
                    }
                }
            },
            Render::Catalog(view) => render_catalog(&view),
            Render::Room(summary) => println!(
                "[room] {}  clients: {}  files: {}  messages: {}",
                summary.room_url,
                summary.total_clients,
                summary.total_files,
                summary.chat_message_count
            ),
            Render::Transfer(job) => {
                let rate = job.rate.map(|rate| {
                    let eta = rate.eta.map(format_eta).unwrap_or_else(|| "--".to_owned());
                    format!("{}  eta {eta}", format_speed(rate.bytes_per_second))
                });
                println!(
                    "[upload] {}  {:.1}%  {}",
                    job.file_name,
                    job.percent(),
                    rate.unwrap_or_default()
                );
            }
            Render::Notification(Some(notification)) => match notification.phase {
                NotificationPhase::Visible => {
                    println!("[{}] {}", notification.kind.label(), notification.text);
                }
                NotificationPhase::Leaving => println!(
                    "\x1b[2m[{}] {}\x1b[0m",
                    notification.kind.label(),
                    notification.text
                ),
            },
            Render::Notification(None) => {}
        }
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        let _ = io::stdout().flush();
        self.awaiting_confirm.store(true, Ordering::SeqCst);
        match self.confirm_rx.recv() {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), String> {
        let mut clipboard = Clipboard::new().map_err(|err| err.to_string())?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|err| err.to_string())
    }
}

fn chat_line(message: &ChatMessage) -> String {
    format!(
        "{} {}: {}",
        message.time_str, message.client_name, message.message
    )
}

fn latest_line(view: &LatestView) -> String {
    let suffix = if view.pending { " (sending…)" } else { "" };
    format!("{}{suffix}", chat_line(&view.message))
}

fn render_catalog(view: &CatalogView<'_>) {
    match view {
        CatalogView::Loading => println!("[files] loading…"),
        CatalogView::Empty => println!("[files] no files yet, use /upload <path>"),
        CatalogView::Entries(entries) => {
            println!("[files]");
            for entry in entries {
                match entry {
                    CatalogEntry::Upload(job) => {
                        let state = match job.status {
                            UploadStatus::Failed => "failed",
                            _ => "uploading",
                        };
                        println!(
                            "  ^ {}  {}  {:.1}%  {state}",
                            job.file_name,
                            format_size(job.total_bytes),
                            job.percent()
                        );
                    }
                    CatalogEntry::File(file) => println!(
                        "  {}  {}  {}",
                        file.id,
                        format_size(file.size),
                        format_timestamp(file.modified)
                    ),
                }
            }
        }
    }
}
