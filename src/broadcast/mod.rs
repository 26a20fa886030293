//! Broadcast Pipeline
//!
//! Connects the synchronous change tracker to live viewers:
//!
//! ```text
//! Tracker --[queue]--> BroadcastActor --[WebSocket]--> viewers
//!                          ^
//!                 server (accept thread)
//! ```
//!
//! # Modules
//!
//! - `message` - wire protocol message types
//! - `queue` - bounded update channel with pause / wait-for-client gates
//! - `server` - TCP listener feeding accepted streams to the actor
//! - `actor` - connection management, batching, fan-out

pub mod actor;
pub mod message;
pub mod queue;
pub mod server;
