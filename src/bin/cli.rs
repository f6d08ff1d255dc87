// Proctor Sync CLI
// Operator tool for poking the exam service and watching a live session from a terminal

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use tokio::time::interval;

use proctor_sync::config::{ExamServiceConfig, SessionConfig, DEFAULT_REQUEST_TIMEOUT_MS};
use proctor_sync::exam::{ExamService, HistoryStatus, HttpExamService, ParticipantRecord, RoomSnapshot};
use proctor_sync::session::{SessionEvent, SessionMode, SessionSynchronizer, SessionView};

#[derive(Parser)]
#[command(name = "proctor-cli")]
#[command(about = "Proctor Sync operator CLI", long_about = None)]
struct Cli {
    /// Exam service base URL (falls back to EXAM_API_URL)
    #[arg(short, long)]
    api: Option<String>,

    /// Bearer token (falls back to EXAM_API_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Session to operate on (falls back to EXAM_SESSION_ID)
    #[arg(short, long)]
    session: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Session(SessionCommand),

    /// Query a running proctor-sync daemon's control API
    Status {
        /// Daemon address
        #[arg(short, long, default_value = "127.0.0.1:8090")]
        daemon: String,
    },
}

/// Commands that talk to the exam service directly
#[derive(Subcommand)]
enum SessionCommand {
    /// Show room info for the session
    Room,

    /// List the roster with check-in state
    Roster,

    /// Rotate the access code once
    Rotate,

    /// Toggle check-in for one participant
    CheckIn {
        /// Participant ID
        #[arg(short, long)]
        participant: String,
    },

    /// Close the session on the server
    Close,

    /// Run a live synchronizer and print the session every second
    Watch {
        /// Observe without rotating codes or closing
        #[arg(short, long)]
        read_only: bool,
    },
}

fn resolve(value: &Option<String>, key: &str) -> Option<String> {
    value
        .clone()
        .or_else(|| std::env::var(key).ok())
        .filter(|v| !v.is_empty())
}

struct Connection {
    service: Arc<HttpExamService>,
    session_id: String,
    request_timeout: Duration,
}

fn connect(cli: &Cli) -> Option<Connection> {
    let Some(api) = resolve(&cli.api, "EXAM_API_URL") else {
        println!("{} No exam service URL, use --api or EXAM_API_URL", "✗".red());
        return None;
    };
    let Some(session_id) = resolve(&cli.session, "EXAM_SESSION_ID") else {
        println!("{} No session, use --session or EXAM_SESSION_ID", "✗".red());
        return None;
    };

    let config = ExamServiceConfig {
        base_url: api.trim_end_matches('/').to_string(),
        api_token: resolve(&cli.token, "EXAM_API_TOKEN"),
        request_timeout: Duration::from_millis(cli.timeout_ms),
    };
    match HttpExamService::new(&config) {
        Ok(service) => Some(Connection {
            service: Arc::new(service),
            session_id,
            request_timeout: config.request_timeout,
        }),
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Status { daemon } => daemon_status(daemon).await,
        Commands::Session(command) => {
            if let Some(conn) = connect(&cli) {
                run_session_command(command, conn).await;
            }
        }
    }
}

async fn run_session_command(command: &SessionCommand, conn: Connection) {
    let service = conn.service.as_ref();
    let session_id = conn.session_id.as_str();

    match command {
        SessionCommand::Room => show_room(service, session_id).await,
        SessionCommand::Roster => show_roster(service, session_id).await,
        SessionCommand::Rotate => rotate(service, session_id).await,
        SessionCommand::CheckIn { participant } => check_in(service, session_id, participant).await,
        SessionCommand::Close => close(service, session_id).await,
        SessionCommand::Watch { read_only } => {
            let mode = if *read_only {
                SessionMode::ReadOnly
            } else {
                SessionMode::Active
            };
            let mut session = SessionConfig::new(session_id, mode);
            session.request_timeout = conn.request_timeout;
            watch(conn.service.clone(), session).await
        }
    }
}

async fn show_room(service: &HttpExamService, session_id: &str) {
    println!("{}", "Fetching room info...".cyan());
    match service.session_info(session_id).await {
        Ok(room) => print_room(&room),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

async fn show_roster(service: &HttpExamService, session_id: &str) {
    println!("{}", "Fetching roster...".cyan());
    match service.roster(session_id).await {
        Ok(roster) => print_roster(&roster, |p| p.checked_in),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

async fn rotate(service: &HttpExamService, session_id: &str) {
    println!("{}", "Rotating access code...".cyan());
    if let Err(e) = service.rotate_code(session_id).await {
        println!("{} {}", "✗".red(), e);
        return;
    }
    println!("{} Access code rotated", "✓".green());
    if let Ok(room) = service.session_info(session_id).await {
        println!(
            "  New code: {}",
            room.access_code.as_deref().unwrap_or("-").green().bold()
        );
    }
}

async fn check_in(service: &HttpExamService, session_id: &str, participant_id: &str) {
    println!("{} {}", "Toggling check-in for".cyan(), participant_id);
    match service.check_in(session_id, participant_id).await {
        Ok(()) => println!("{} Check-in toggled", "✓".green()),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

async fn close(service: &HttpExamService, session_id: &str) {
    println!("{}", "Closing session...".cyan());
    match service.close_session(session_id).await {
        Ok(()) => println!("{} Session {} closed", "✓".green(), session_id),
        Err(e) => {
            println!("{} Could not close the session: {}", "✗".red(), e);
            println!("  Retry with {}", "proctor-cli close".cyan());
        }
    }
}

async fn watch(service: Arc<HttpExamService>, session: SessionConfig) {
    let (sync, mut events) = match SessionSynchronizer::open(service, session) {
        Ok(opened) => opened,
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            return;
        }
    };

    println!("{}", "Starting session synchronizer...".cyan());
    if let Err(e) = sync.start().await {
        println!("{} {}", "✗".red(), e);
        return;
    }
    println!("Press {} to stop watching.", "Ctrl+C".bold());

    let mut ticker = interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => print_view(&sync.view()),
            event = events.recv() => match event {
                Some(SessionEvent::EndedRemotely { reason }) => {
                    println!("{} Session ended remotely ({:?})", "■".yellow(), reason);
                    break;
                }
                Some(SessionEvent::Error(err)) => {
                    println!("{} {} failed: {}", "⚠".yellow(), err.operation, err.message);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                sync.leave();
                println!("\n{} Stopped watching, session left open", "✓".green());
                break;
            }
        }
    }
}

async fn daemon_status(daemon: &str) {
    println!("{}", "Querying proctor-sync daemon...".cyan());

    let url = format!("http://{}/session", daemon);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<SessionView>().await {
            Ok(view) => print_view(&view),
            Err(e) => println!("{} Unexpected response: {}", "✗".red(), e),
        },
        Ok(resp) => println!("{} Status request failed: {}", "✗".red(), resp.status()),
        Err(e) => {
            println!("{} Cannot connect to daemon: {}", "✗".red(), e);
            println!("  Make sure proctor-sync is running on {}", daemon);
        }
    }
}

fn print_room(room: &RoomSnapshot) {
    println!("\n{}", "═".repeat(50).green());
    println!("{} {}", "Session:".bold(), room.session_id);
    println!("  Subject: {}", room.subject);
    println!("  Slot:    {}", room.slot);
    println!("  Room:    {}", room.room);
    println!("  Status:  {:?}", room.status);
    println!(
        "  Code:    {}",
        room.access_code.as_deref().unwrap_or("-").green().bold()
    );
    println!("{}", "═".repeat(50).green());
}

fn print_roster<F>(roster: &[ParticipantRecord], checked_in: F)
where
    F: Fn(&ParticipantRecord) -> bool,
{
    for participant in roster {
        let mark = if checked_in(participant) {
            "✓".green()
        } else {
            "·".dimmed()
        };
        let history = match participant.history_status {
            HistoryStatus::NotStarted => "not started".dimmed(),
            HistoryStatus::InProgress => "in progress".yellow(),
            HistoryStatus::Submitted => "submitted".green(),
        };
        println!(
            "  {} {:<10} {:<30} {}",
            mark, participant.display_code, participant.full_name, history
        );
    }
    println!("  {} participants", roster.len());
}

fn print_view(view: &SessionView) {
    if let Some(room) = &view.room {
        print_room(room);
    }
    println!(
        "  Next code in {}s, roster in {}s {}",
        view.code_countdown,
        view.roster_countdown,
        format!("[{:?}]", view.lifecycle).dimmed()
    );
    print_roster(&view.roster, |p| {
        view.check_ins.get(&p.id).copied().unwrap_or(p.checked_in)
    });
}
