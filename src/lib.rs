//! spyglass - expose live program state to external viewers.
//!
//! Values registered with [`Session::observe`] become instrumented,
//! path-addressable trees. Every subsequent mutation through the session
//! is translated into minimal diffs describing exactly which path inside
//! which view changed, and pushed to all connected viewers over a
//! persistent WebSocket. A viewer that (re)connects receives a full
//! snapshot, so it never needs history to reconstruct current state.
//! Captured sessions can be streamed again with the replay server.
//!
//! ```no_run
//! use spyglass::{Raw, Session, SessionConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let session = Session::start(SessionConfig::default())?;
//! let root = session.observe(
//!     "view1",
//!     Raw::record("Counter", [("count", Raw::from(0))]),
//!     None,
//! )?;
//! session.set_field(root, "count", Raw::from(5))?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod log;
pub mod logger;
pub mod serialize;
pub mod session;
pub mod track;
pub mod value;

pub use broadcast::message::{ClientMessage, ServerMessage, UpdateMsg, PROTOCOL_VERSION};
pub use error::{Error, Result};
pub use log::replay::{ReplayConfig, ReplayServer};
pub use log::{SessionLog, read_log};
pub use serialize::{WireNode, serialize};
pub use session::{Session, SessionConfig};
pub use track::Tracker;
pub use value::{NodeId, Payload, Raw, Scalar};
