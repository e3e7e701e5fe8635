//! hl-agent: Host agent for hostlink
//!
//! The agent runs on each host and keeps one outbound WebSocket to the
//! broker. Sessions opened by the broker are multiplexed over that socket
//! and dispatched to handlers; the proxy handler replays HTTP requests
//! against local endpoints or relays raw bytes for upgraded connections.

pub mod http_io;
pub mod proxy;
pub mod tunnel;

pub use proxy::ProxyHandler;
pub use tunnel::{ActiveTunnel, HandlerTable, TunnelConnector};
