//! Broker connection: dialing, session multiplexing and keepalive

mod connector;
mod reconnect;
mod router;
mod watchdog;

pub use connector::{ActiveTunnel, DisconnectReason, TunnelConnector};
pub use reconnect::ExponentialBackoff;
pub use router::{HandlerTable, HandlerTableBuilder};
pub use watchdog::KeepaliveWatchdog;
