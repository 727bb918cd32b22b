//! Connection state machine.
//!
//! Owns the transport for one session and turns its raw events into state
//! changes:
//!
//! ```text
//!            connect()                 Open
//!   Idle ───────────────► Connecting ────────► Open
//!    ▲                        ▲                 │ Error (status only)
//!    │ disconnect()           │ reconnect timer │ Closed
//!    │                        │                 ▼
//!    └──────────────────── any state ◄──────── Closed
//! ```
//!
//! Invariants:
//! - at most one live transport: `connect` closes the previous one first,
//!   and events from any transport but the live one are discarded by
//!   generation;
//! - at most one pending reconnect timer: scheduling always cancels the
//!   previous timer, and `connect`/`disconnect` cancel it outright.

use serde::Serialize;

use crate::activity::ActivityKind;
use crate::config::ClientConfig;
use crate::inbox::{Inbox, Input};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::SessionState;
use crate::timer::{ScheduledTask, TimerToken};
use crate::transport::{Connector, Transport, TransportEvent, TransportSink};

/// Connectivity as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Lifecycle phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session requested, or explicitly disconnected
    Idle,
    Connecting,
    Open,
    /// Transport closed, reconnect pending
    Closed,
}

/// Counters for monitoring connection health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub attempts: u64,
    pub reconnects: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub decode_errors: u64,
}

struct LiveTransport {
    generation: u64,
    transport: Box<dyn Transport>,
}

/// The connection state machine.
pub struct ConnectionMachine<C: Connector> {
    connector: C,
    config: ClientConfig,
    inbox: Inbox,
    session_id: Option<String>,
    phase: Phase,
    status: ConnectionStatus,
    error: Option<String>,
    live: Option<LiveTransport>,
    reconnect: Option<ScheduledTask>,
    generation: u64,
    stats: ConnectionStats,
}

impl<C: Connector> ConnectionMachine<C> {
    pub(crate) fn new(connector: C, config: ClientConfig, inbox: Inbox) -> Self {
        Self {
            connector,
            config,
            inbox,
            session_id: None,
            phase: Phase::Idle,
            status: ConnectionStatus::Disconnected,
            error: None,
            live: None,
            reconnect: None,
            generation: 0,
            stats: ConnectionStats::default(),
        }
    }

    /// Open a fresh transport to `session_id`, replacing any existing one.
    ///
    /// An empty id is ignored.
    pub fn connect(&mut self, session_id: &str) {
        if session_id.trim().is_empty() {
            log::warn!("connect() without a session id, ignoring");
            return;
        }

        self.cancel_reconnect();
        if let Some(mut previous) = self.live.take() {
            log::debug!("Closing transport generation {} before reconnecting", previous.generation);
            previous.transport.close();
        }

        self.generation += 1;
        self.session_id = Some(session_id.to_string());
        self.phase = Phase::Connecting;
        self.status = ConnectionStatus::Connecting;
        self.stats.attempts += 1;

        let url = self.config.room_url(session_id);
        log::info!("Connecting to {url} (attempt {})", self.stats.attempts);
        let sink = TransportSink::new(self.generation, self.inbox.clone());
        let transport = self.connector.open(&url, sink);
        self.live = Some(LiveTransport {
            generation: self.generation,
            transport,
        });
    }

    /// Stop for good: cancel the reconnect timer, close the transport and
    /// clear room membership. Idempotent.
    pub fn disconnect(&mut self, state: &mut SessionState) {
        if self.phase == Phase::Idle && self.live.is_none() && self.reconnect.is_none() {
            state.reset_room();
            return;
        }

        self.cancel_reconnect();
        if let Some(mut live) = self.live.take() {
            live.transport.close();
        }
        self.phase = Phase::Idle;
        self.status = ConnectionStatus::Disconnected;
        state.reset_room();
        log::info!(
            "Disconnected from room {}",
            self.session_id.as_deref().unwrap_or("<none>")
        );
    }

    /// Send a message if the transport is open. Otherwise the message is
    /// dropped with a warning.
    pub fn send(&mut self, msg: &ClientMessage) -> bool {
        let Some(live) = self.live.as_mut().filter(|l| l.transport.is_open()) else {
            log::warn!("Not connected, cannot send {} message", msg.kind());
            self.stats.frames_dropped += 1;
            return false;
        };

        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("{e}");
                self.stats.frames_dropped += 1;
                return false;
            }
        };

        if live.transport.send(frame) {
            self.stats.frames_sent += 1;
            true
        } else {
            log::warn!("Transport refused {} message", msg.kind());
            self.stats.frames_dropped += 1;
            false
        }
    }

    /// Process an event from transport `generation`.
    ///
    /// Decoded messages go straight to the reconciler. Returns whether any
    /// observable state changed.
    pub fn handle_event(
        &mut self,
        generation: u64,
        event: TransportEvent,
        state: &mut SessionState,
    ) -> bool {
        if self.live.as_ref().map(|l| l.generation) != Some(generation) {
            log::trace!("Dropping {event:?} from stale transport generation {generation}");
            return false;
        }

        match event {
            TransportEvent::Open => {
                log::info!("Connected to room {}", self.session_id.as_deref().unwrap_or(""));
                self.phase = Phase::Open;
                self.status = ConnectionStatus::Connected;
                self.error = None;
                state.set_connected(true);
                state.log(ActivityKind::System, "Connected to room");
            }

            TransportEvent::Message(frame) => match ServerMessage::decode(&frame) {
                Ok(msg) => {
                    log::debug!("Received {} message", msg.kind());
                    return state.apply(msg);
                }
                Err(e) => {
                    log::warn!("Dropping frame: {e}");
                    self.stats.decode_errors += 1;
                    return false;
                }
            },

            TransportEvent::Error(reason) => {
                log::warn!("Transport error: {reason}");
                self.status = ConnectionStatus::Error;
                self.error = Some(format!("Connection error occurred: {reason}"));
            }

            TransportEvent::Closed => {
                log::info!("Transport closed");
                self.live = None;
                self.phase = Phase::Closed;
                self.status = ConnectionStatus::Disconnected;
                state.set_connected(false);
                state.log(ActivityKind::System, "Disconnected from room");
                self.schedule_reconnect();
            }
        }
        true
    }

    /// The reconnect timer identified by `token` fired.
    pub fn handle_reconnect_due(&mut self, token: TimerToken) -> bool {
        if !self.reconnect.as_ref().is_some_and(|t| t.is(token)) {
            log::trace!("Ignoring stale reconnect timer");
            return false;
        }
        self.reconnect = None;

        let Some(session_id) = self.session_id.clone() else {
            return false;
        };
        log::info!("Attempting to reconnect...");
        self.stats.reconnects += 1;
        self.connect(&session_id);
        true
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        let delay = self.config.reconnect_delay;
        log::info!("Reconnecting in {} ms", delay.as_millis());
        self.reconnect = Some(ScheduledTask::after(delay, self.inbox.clone(), Input::ReconnectDue));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            log::debug!("Cancelled pending reconnect");
            timer.cancel();
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Human-readable description of the last transport error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the live transport currently accepts sends.
    pub fn is_ready(&self) -> bool {
        self.live.as_ref().is_some_and(|l| l.transport.is_open())
    }

    pub fn has_transport(&self) -> bool {
        self.live.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}
