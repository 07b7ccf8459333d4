//! Realtime transport layer: endpoint candidates, socket sessions over
//! tokio-tungstenite, and the reconnecting channel that drives them.

pub mod channel;
pub mod endpoint;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::{ChannelConfig, ChannelEvent, ChannelState, ReconnectingChannel};
pub use endpoint::{socket_url, ChannelPurpose, Endpoint, EndpointError, EndpointList};
pub use retry::{FailoverCursor, RetryPolicy, RetryStep};
pub use session::{ConnectFuture, Connector, Frame, SessionEvent, SessionHandle};
pub use transport::WsConnector;
