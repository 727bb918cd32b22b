//! Transport seam between the connection state machine and the network.
//!
//! A [`Connector`] opens one [`Transport`] per connection attempt. The
//! transport reports its lifecycle through a [`TransportSink`], which tags
//! every event with the generation of the attempt that produced it. The
//! state machine drops events from any generation but the live one.
//!
//! - [`ws`]: WebSocket transport on tokio-tungstenite
//! - [`memory`]: in-process transport driven by the caller

pub mod memory;
pub mod ws;

use crate::inbox::{Inbox, Input};

pub use memory::MemoryConnector;
pub use ws::WsConnector;

/// Lifecycle and traffic events raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established, sends are accepted from now on
    Open,
    /// Inbound text frame
    Message(String),
    /// Transport-level failure. A `Closed` event follows.
    Error(String),
    Closed,
}

/// Where a transport reports its events.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    inbox: Inbox,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, inbox: Inbox) -> Self {
        Self { generation, inbox }
    }

    /// Connection attempt this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the session has ended.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.inbox
            .send(Input::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Opens transports to a URL.
pub trait Connector: Send + 'static {
    /// Begin connecting to `url`.
    ///
    /// Must return immediately; the outcome is reported through `sink`
    /// (`Open`, or `Error` followed by `Closed`).
    fn open(&mut self, url: &str, sink: TransportSink) -> Box<dyn Transport>;
}

/// One live or connecting transport.
pub trait Transport: Send {
    /// Whether the transport currently accepts frames.
    fn is_open(&self) -> bool;

    /// Queue a text frame. Returns `false` if the transport is not open.
    fn send(&mut self, frame: String) -> bool;

    /// Close the transport. Idempotent. A `Closed` event may still follow.
    fn close(&mut self);
}
