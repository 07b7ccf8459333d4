//! # garagelink
//!
//! Terminal front end for the GarageLink chat client.
//!
//! Starts the unread-count aggregator, optionally joins one conversation,
//! sends every stdin line as a chat message and prints what arrives. Ctrl+C
//! tears everything down.

use std::future::pending;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use garagelink_client::{
    AppContext, ClientConfig, ConversationParams, ConversationStore, ConversationUpdate,
    NotificationSnapshot, StatusIndicator,
};
use garagelink_shared::constants::APP_NAME;
use garagelink_shared::types::{ConversationId, Credential, SenderType};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    /// The customer who opened the service request.
    Customer,
    /// The workshop handling it.
    Workshop,
}

impl From<Role> for SenderType {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => SenderType::PartyA,
            Role::Workshop => SenderType::PartyB,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "garagelink", version, about = "GarageLink chat client")]
struct Cli {
    /// Access token. Overrides GARAGELINK_ACCESS_TOKEN.
    #[arg(long, env = "GARAGELINK_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Conversation (service request) to join.
    #[arg(long)]
    conversation: Option<String>,

    /// Which side of the conversation you are on.
    #[arg(long, value_enum, default_value_t = Role::Customer)]
    role: Role,

    /// Treat the conversation as having no workshop assigned yet.
    #[arg(long)]
    no_counterpart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    garagelink_client::init_tracing();
    let cli = Cli::parse();

    info!("Starting {} client v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::from_env();
    if let Some(token) = cli.token {
        config.access_token = Credential::new(token);
    }
    info!(?config, "Loaded configuration");

    let context = AppContext::from_config(config)?;
    context.notifications.start(context.credential().cloned())?;
    let mut notifications = context.notifications.subscribe();

    let mut store = match cli.conversation {
        Some(id) => {
            let mut store = context.conversation(ConversationParams {
                conversation_id: ConversationId::new(id),
                viewer: cli.role.into(),
                has_counterpart: !cli.no_counterpart,
            })?;
            store.activate()?;
            if let garagelink_client::DisplayState::Unavailable(text) = store.display_state() {
                println!("{text}");
            }
            Some(store)
        }
        None => None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Ctrl+C received, shutting down");
                break;
            }

            snapshot = notifications.changed() => {
                match snapshot {
                    Some(snapshot) => print_summary(&snapshot),
                    None => break,
                }
            }

            update = next_store_update(&mut store) => {
                if let Some(store) = store.as_ref() {
                    print_update(store, &update);
                }
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => submit_line(store.as_mut(), line),
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    if let Some(mut store) = store {
        store.deactivate();
    }
    notifications.unsubscribe();
    context.notifications.stop().await;
    info!("Client stopped");

    Ok(())
}

async fn next_store_update(store: &mut Option<ConversationStore>) -> ConversationUpdate {
    match store {
        Some(store) => match store.next_update().await {
            Some(update) => update,
            None => pending().await,
        },
        None => pending().await,
    }
}

fn submit_line(store: Option<&mut ConversationStore>, line: String) {
    let Some(store) = store else {
        println!("(no conversation joined; pass --conversation <id>)");
        return;
    };
    store.set_input(line);
    if let Err(e) = store.submit_input() {
        println!("! not sent: {e}");
    }
}

fn print_update(store: &ConversationStore, update: &ConversationUpdate) {
    match update {
        ConversationUpdate::Appended(messages) => {
            for m in messages {
                let who = m.sender_name.as_deref().unwrap_or(match m.sender_type {
                    SenderType::PartyA => "customer",
                    SenderType::PartyB => "workshop",
                });
                println!("[{}] {who}: {}", m.created_at.format("%H:%M"), m.content);
            }
        }
        ConversationUpdate::HistoryLoaded { total } => {
            println!("-- {total} messages --");
            for m in store.messages() {
                println!("[{}] {}", m.created_at.format("%H:%M"), m.content);
            }
        }
        ConversationUpdate::HistoryFailed(e) => println!("! history unavailable: {e}"),
        ConversationUpdate::Status(state) => println!("* {}", StatusIndicator::from(*state)),
        ConversationUpdate::Error(text) => println!("! {text}"),
        ConversationUpdate::SendSettled => {}
    }
}

fn print_summary(snapshot: &NotificationSnapshot) {
    if snapshot.loading {
        return;
    }
    println!(
        "* unread: {} ({})",
        snapshot.total_unread(),
        StatusIndicator::from(snapshot.status)
    );
}
