use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use domain::models::{Notification, RsvpStatus};
use domain::services::{DetailSnapshot, TaskState};
use rsvp_inbox_client::app::{create_inbox, Inbox};
use rsvp_inbox_client::{config, logging};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "rsvp-inbox")]
#[command(about = "Notification inbox and event invitation RSVPs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List unread and read notifications (default)
    List,
    /// Open a notification and show its invitation details
    Open { id: String },
    /// Answer an invitation
    Answer { id: String, response: Response },
    /// Mark a notification as read
    Read { id: String },
    /// Delete a notification
    Delete { id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Response {
    Accept,
    Decline,
}

impl From<Response> for RsvpStatus {
    fn from(response: Response) -> Self {
        match response {
            Response::Accept => RsvpStatus::Accepted,
            Response::Decline => RsvpStatus::Declined,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    logging::init_logging(&config.logging);

    info!("Starting rsvp-inbox v{}", env!("CARGO_PKG_VERSION"));

    let inbox = create_inbox(&config)?;
    inbox
        .store
        .load()
        .await
        .context("Failed to load notifications")?;

    match cli.command.unwrap_or(Command::List) {
        Command::List => list(&inbox).await,
        Command::Open { id } => {
            let snapshot = open(&inbox, &id).await?;
            print_details(&snapshot);
        }
        Command::Answer { id, response } => {
            let snapshot = open(&inbox, &id).await?;
            print_details(&snapshot);
            let outcome = inbox.session.answer(response.into()).await?;
            println!("Answered: {}", outcome.status);
            if outcome.exit_flow {
                inbox.session.close();
            }
        }
        Command::Read { id } => {
            let outcome = inbox.store.mark_as_read(&id).await?;
            println!("{id}: {outcome:?}");
        }
        Command::Delete { id } => {
            inbox.store.delete(&id).await?;
            println!("{id}: deleted");
        }
    }

    Ok(())
}

async fn list(inbox: &Inbox) {
    let snapshot = inbox.store.snapshot().await;
    println!("Unread ({})", snapshot.unread.len());
    for notification in snapshot.unread.iter() {
        print_row(notification);
    }
    println!("Read ({})", snapshot.read.len());
    for notification in snapshot.read.iter() {
        print_row(notification);
    }
}

async fn open(inbox: &Inbox, id: &str) -> Result<DetailSnapshot> {
    let opened = inbox
        .open_settled(id)
        .await
        .with_context(|| format!("Failed to open notification {id}"))?;
    if let Some(e) = &opened.read_error {
        eprintln!("Notice: could not mark {id} as read ({e})");
    }
    Ok(opened.snapshot)
}

fn print_row(notification: &Notification) {
    let created = notification
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<10} {:<13} {:<16} {}",
        notification.id,
        notification.kind().to_string(),
        created,
        notification.title
    );
}

fn print_details(snapshot: &DetailSnapshot) {
    let Some(notification) = &snapshot.notification else {
        return;
    };
    println!("{}", notification.title);
    if !notification.message.is_empty() {
        println!("{}", notification.message);
    }
    if !notification.is_invite() {
        return;
    }

    match snapshot.resolved_identity() {
        Some(identity) => println!("Guest: {} ({})", identity.guest_id, identity.source),
        None => println!("Guest: missing information, cannot answer"),
    }
    match &snapshot.image {
        TaskState::Done(Some(url)) => println!("Invitation image: {url}"),
        TaskState::Failed(e) => println!("Invitation image unavailable: {e}"),
        _ => {}
    }
    match &snapshot.rsvp {
        TaskState::Done(status) => println!("RSVP: {status}"),
        TaskState::Failed(e) => println!("RSVP status unavailable: {e}"),
        _ => {}
    }
}
