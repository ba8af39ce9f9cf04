//! WebSocket Real-Time Streaming
//!
//! Fans ingested readings out to live dashboard clients.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: single worker task owning the subscriber registry
//! - **Queue**: bounded per-connection FIFO between hub and socket writer
//! - **Connection**: inbound/outbound loops and session teardown
//! - **Handler**: HTTP upgrade entry point
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8080/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'reading') console.log(msg.data.temperature);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod queue;

pub use connection::{run_inbound, run_outbound, serve_socket, InboundExit, OutboundExit};
pub use handler::websocket_handler;
pub use hub::{ConnectionHub, HubConfig, HubError, HubStats};
pub use messages::ServerMessage;
pub use queue::{subscriber_channel, ConnectionId, Offer, OutboundQueue, SubscriberHandle};
