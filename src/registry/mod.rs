//! Stream registry for session accounting
//!
//! The registry records every live streaming session, whichever transport it
//! arrived on. Transports register a session before playback starts and
//! release it on the way out. The counts feed logging and health output, and
//! reaching zero is the signal that a shutdown has drained.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<StreamRegistry>
//!                   ┌──────────────────────────┐
//!                   │ RwLock<Inner {           │
//!                   │   streams: HashMap<id,   │
//!                   │     StreamEntry>,        │
//!                   │   next_id, closed, ...   │
//!                   │ }>                       │
//!                   │ watch::Sender<Stats>     │
//!                   └────────────┬─────────────┘
//!                                │
//!          ┌─────────────────────┼─────────────────────┐
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//!    [ssh session]        [telnet session]       [health check]
//!    connect()            connect()              snapshot()
//!    disconnect()         disconnect()           wait_drained()
//! ```
//!
//! The registry is passed by `Arc` into every server; there is no global
//! instance.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{StreamEntry, Transport};
pub use error::RegistryError;
pub use store::StreamRegistry;
