//! In-process transport.
//!
//! [`MemoryConnector`] hands out transports whose server side is driven by
//! the caller: accept a connection, deliver frames, inject errors or drop
//! the connection, and inspect what the client sent. Used by the tests and
//! handy for exercising a session without a room server.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{Connector, Transport, TransportEvent, TransportSink};

#[derive(Debug)]
struct Slot {
    url: String,
    sink: TransportSink,
    open: bool,
    /// Closed by the client side
    closed: bool,
    sent: Vec<String>,
}

/// Connector whose transports are controlled through this handle.
///
/// Clones share the same set of transports.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of transports opened so far.
    pub fn opened(&self) -> usize {
        self.slots().len()
    }

    /// Transports the client has not closed and the server has not dropped.
    pub fn live(&self) -> usize {
        self.slots().iter().filter(|s| !s.closed).count()
    }

    /// Index of the most recently opened transport.
    pub fn latest(&self) -> Option<usize> {
        self.opened().checked_sub(1)
    }

    pub fn url(&self, index: usize) -> Option<String> {
        self.slots().get(index).map(|s| s.url.clone())
    }

    /// Frames the client sent on transport `index`.
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.slots().get(index).map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Whether the client closed transport `index`.
    pub fn is_closed(&self, index: usize) -> bool {
        self.slots().get(index).map_or(true, |s| s.closed)
    }

    /// Complete the handshake of transport `index`.
    pub fn accept(&self, index: usize) {
        self.with_slot(index, |slot| {
            slot.open = true;
            Some(TransportEvent::Open)
        });
    }

    /// Deliver an inbound text frame on transport `index`.
    pub fn deliver(&self, index: usize, frame: impl Into<String>) {
        let frame = frame.into();
        self.with_slot(index, |_| Some(TransportEvent::Message(frame)));
    }

    /// Raise a transport error on `index`.
    pub fn fail(&self, index: usize, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_slot(index, |_| Some(TransportEvent::Error(reason)));
    }

    /// Server side drops transport `index`.
    pub fn drop_connection(&self, index: usize) {
        self.with_slot(index, |slot| {
            slot.open = false;
            slot.closed = true;
            Some(TransportEvent::Closed)
        });
    }

    fn with_slot(&self, index: usize, f: impl FnOnce(&mut Slot) -> Option<TransportEvent>) {
        let (sink, event) = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(index) else {
                log::warn!("No memory transport #{index}");
                return;
            };
            let event = f(slot);
            (slot.sink.clone(), event)
        };
        if let Some(event) = event {
            sink.emit(event);
        }
    }
}

impl Connector for MemoryConnector {
    fn open(&mut self, url: &str, sink: TransportSink) -> Box<dyn Transport> {
        let mut slots = self.slots();
        let index = slots.len();
        slots.push(Slot {
            url: url.to_string(),
            sink,
            open: false,
            closed: false,
            sent: Vec::new(),
        });
        Box::new(MemoryTransport {
            index,
            slots: self.slots.clone(),
        })
    }
}

/// Client half of an in-process transport.
#[derive(Debug)]
pub struct MemoryTransport {
    index: usize,
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl MemoryTransport {
    fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn is_open(&self) -> bool {
        self.slots().get(self.index).is_some_and(|s| s.open && !s.closed)
    }

    fn send(&mut self, frame: String) -> bool {
        let mut slots = self.slots();
        match slots.get_mut(self.index) {
            Some(slot) if slot.open && !slot.closed => {
                slot.sent.push(frame);
                true
            }
            _ => false,
        }
    }

    fn close(&mut self) {
        let sink = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(self.index) else {
                return;
            };
            if slot.closed {
                return;
            }
            slot.open = false;
            slot.closed = true;
            slot.sink.clone()
        };
        sink.emit(TransportEvent::Closed);
    }
}
