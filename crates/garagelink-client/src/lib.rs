//! GarageLink chat client: conversation stores, the global unread-count
//! aggregator and the read-state reconciler, on top of `garagelink-net`.

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod notifications;
pub mod read_state;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use conversation::{ConversationLog, ConversationParams, ConversationStore};
pub use error::{ClientError, SendRejected};
pub use events::{ConversationUpdate, DisplayState, StatusIndicator};
pub use notifications::{NotificationAggregator, NotificationSnapshot, NotificationSubscription};
pub use read_state::{ReadStateReconciler, ReadTrigger};
pub use state::AppContext;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("garagelink_client=debug,garagelink_net=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
