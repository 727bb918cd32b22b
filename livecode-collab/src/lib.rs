//! # livecode-collab: Real-time synchronization client for shared code rooms
//!
//! Joins a room on the collaboration server over WebSocket, keeps a
//! last-write-wins copy of the shared buffer, tracks participants and
//! activity, reconnects on its own and fetches debounced autocomplete
//! suggestions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Command   ┌──────────────────────────────────────────┐
//! │ SessionHandle│ ─────────► │ session driver (one task, one inbox)     │
//! │ (UI side)    │ ◄───────── │                                          │
//! └──────────────┘  watch     │  ConnectionMachine ──► SessionState      │
//!                   Snapshot  │     │  ▲                 (reconciler,    │
//!                             │     │  │ TransportEvent   ActivityLog)   │
//!                             │     ▼  │                                 │
//!                             │  Transport        SuggestionRequestor    │
//!                             └─────┬─────────────────────┬──────────────┘
//!                                   │ JSON frames         │ HTTP
//!                                   ▼                     ▼
//!                             ┌────────────┐       ┌──────────────┐
//!                             │ room server│       │ rooms / AI   │
//!                             └────────────┘       └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire protocol (`ClientMessage` / `ServerMessage`)
//! - [`connection`]: transport lifecycle and reconnect state machine
//! - [`state`]: buffer, participants and the inbound-message reconciler
//! - [`activity`]: bounded activity log
//! - [`suggest`]: debounced autocomplete queries
//! - [`session`]: session context, `CollabClient` and `SessionHandle`
//! - [`transport`]: transport seam, WebSocket and in-memory transports
//! - [`api`]: room and autocomplete HTTP services
//! - [`timer`]: cancelable scheduled tasks
//! - [`config`]: client configuration
//!
//! ## Timing
//!
//! | Timer | Default |
//! |-------|---------|
//! | Reconnect delay after close | 3000 ms |
//! | Suggestion debounce | 600 ms |
//! | Suggestion auto-hide | 5000 ms |

pub mod activity;
pub mod api;
pub mod config;
pub mod connection;
mod inbox;
pub mod protocol;
pub mod session;
pub mod state;
pub mod suggest;
pub mod timer;
pub mod transport;

// Re-exports for convenience
pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use api::{ApiError, HttpApi, RoomService, SuggestionService};
pub use config::ClientConfig;
pub use connection::{ConnectionMachine, ConnectionStats, ConnectionStatus, Phase};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use session::{CollabClient, JoinError, SessionHandle, SessionInfo, SessionSnapshot};
pub use state::{BufferSource, BufferState, SessionState, WELCOME_CODE};
pub use suggest::{Suggestion, SuggestionRequestor, SuggestionState};
pub use transport::{Connector, MemoryConnector, Transport, TransportEvent, TransportSink, WsConnector};
