//! Reelcollab CLI client - send and answer collaboration requests

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::client::ReelClient;
use crate::messages::{Decision, Direction, InboxEntry, Profile};

#[derive(Parser)]
#[command(name = "reelcollab")]
#[command(about = "CLI client for Reelcollab - collaboration requests between filmmakers")]
#[command(version)]
struct Cli {
    /// Server URL (default: ws://localhost:3000/ws)
    #[arg(short, long, default_value = "ws://localhost:3000/ws")]
    server: String,

    /// Act as this user
    #[arg(short, long, env = "REELCOLLAB_USER")]
    user: Uuid,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update your display profile
    Profile {
        #[arg(short = 'n', long)]
        username: String,

        #[arg(short, long)]
        avatar: Option<String>,

        /// Your craft, e.g. "cinematography"
        #[arg(long)]
        specialty: Option<String>,
    },

    /// Send a collaboration request
    Send {
        /// Receiver's user id
        #[arg(short, long)]
        to: Uuid,

        #[arg(short, long)]
        message: Option<String>,

        /// Proposed payment (50 to 10000, in steps of 50)
        #[arg(short, long)]
        amount: Option<i64>,

        /// USD, EUR, GBP or INR
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// Show received (or sent) requests
    Inbox {
        #[arg(long)]
        sent: bool,

        /// Page size; shows everything when omitted
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Accept or decline a request you received
    Respond {
        #[arg(short, long)]
        request: Uuid,

        #[arg(value_enum)]
        decision: Decision,
    },

    /// Withdraw a pending request you sent
    Cancel {
        #[arg(short, long)]
        request: Uuid,
    },

    /// Attach payment terms to a request you sent
    Terms {
        #[arg(short, long)]
        request: Uuid,

        #[arg(short, long)]
        amount: i64,

        #[arg(short, long, default_value = "USD")]
        currency: String,
    },

    /// Accept or decline the terms of a request you accepted
    Agree {
        #[arg(short, long)]
        request: Uuid,

        #[arg(value_enum)]
        decision: Decision,
    },

    /// Print the inbox again whenever something changes
    Watch {
        #[arg(long)]
        sent: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelcollab_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let mut client = ReelClient::connect(&cli.server).await?;
    client.identify(cli.user).await?;

    match cli.command {
        Commands::Profile {
            username,
            avatar,
            specialty,
        } => {
            let profile = client.save_profile(username, avatar, specialty).await?;
            println!("Saved profile {} ({})", profile.username, profile.id);
        }
        Commands::Send {
            to,
            message,
            amount,
            currency,
        } => {
            let (request, agreement) = client.send_request(to, message, amount, currency).await?;
            println!(
                "Sent request {} ({} {})",
                request.id, agreement.payment_amount, agreement.currency
            );
        }
        Commands::Inbox { sent, limit } => run_inbox(&mut client, direction(sent), limit).await?,
        Commands::Respond { request, decision } => {
            let request = client.respond(request, decision).await?;
            println!("Request {} is now {}", request.id, request.status.as_str());
        }
        Commands::Cancel { request } => {
            client.cancel(request).await?;
            println!("Cancelled request {}", request);
        }
        Commands::Terms {
            request,
            amount,
            currency,
        } => {
            let agreement = client.propose_terms(request, amount, currency).await?;
            println!(
                "Proposed {} {} for request {}",
                agreement.payment_amount, agreement.currency, agreement.request_id
            );
        }
        Commands::Agree { request, decision } => {
            let agreement = client.respond_to_terms(request, decision).await?;
            println!(
                "Terms for request {} are now {}",
                agreement.request_id,
                agreement.status.as_str()
            );
        }
        Commands::Watch { sent } => run_watch(&mut client, direction(sent)).await?,
    }

    Ok(())
}

fn direction(sent: bool) -> Direction {
    if sent {
        Direction::Sent
    } else {
        Direction::Received
    }
}

async fn run_inbox(client: &mut ReelClient, direction: Direction, limit: Option<usize>) -> Result<()> {
    let mut cursor = None;
    loop {
        let (items, next) = client.inbox(direction, cursor, limit).await?;
        print_inbox(&items);
        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(())
}

async fn run_watch(client: &mut ReelClient, direction: Direction) -> Result<()> {
    loop {
        let (items, _) = client.inbox(direction, None, None).await?;
        print_inbox(&items);
        println!("{:─<60}", "");

        if !client.changed().await {
            tracing::info!("Server closed the connection");
            return Ok(());
        }
    }
}

fn display_name(profile: &Profile) -> String {
    match &profile.specialty {
        Some(specialty) => format!("{} ({})", profile.username, specialty),
        None => profile.username.clone(),
    }
}

fn print_inbox(items: &[InboxEntry]) {
    if items.is_empty() {
        println!("No requests.");
        return;
    }

    for entry in items {
        let terms = match &entry.agreement {
            Some(a) => format!(
                "{} {} [{}]",
                a.payment_amount,
                a.currency,
                a.status.as_str()
            ),
            None => "no terms".to_string(),
        };
        println!(
            "  {} {} -> {} [{}] {} ({})",
            entry.request.id,
            display_name(&entry.sender),
            display_name(&entry.receiver),
            entry.request.status.as_str(),
            terms,
            entry.request.created_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(message) = &entry.request.message {
            println!("      \"{}\"", message);
        }
    }
}
