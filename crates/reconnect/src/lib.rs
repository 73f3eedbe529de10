//! Reconnect-tolerant client sessions.
//!
//! A [`ReconnectSession`] keeps a client's outbound traffic warm across a
//! transient disconnect: messages are sequenced, flow-controlled through a
//! sliding window and replayed on reconnection. When the reconnect timeout
//! passes the session is torn down once and for all; the
//! [`ReconnectManager`] owns the registry and the per-session timers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod manager;
mod session;
mod window;

pub use config::ReconnectConfig;
pub use error::{Error, Result};
pub use manager::{ExpiredSession, ReconnectManager};
pub use session::{DisconnectAction, Reconnect, ReconnectSession, SessionState, Teardown};
pub use window::{OutboundMessage, SendWindow};
