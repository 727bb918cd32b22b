//! WebSocket transport.
//!
//! Each transport runs one tokio task that connects, then multiplexes the
//! socket reader and an outgoing frame channel:
//! ```text
//!  WsTransport::send ──► mpsc ──┐
//!                               ├── socket task ──► TransportSink (Open / Message / Error / Closed)
//!  WebSocket reader ────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{Connector, Transport, TransportEvent, TransportSink};

/// Opens [`WsTransport`]s with `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str, sink: TransportSink) -> Box<dyn Transport> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_socket(url.to_string(), sink, outgoing_rx, open.clone()));

        Box::new(WsTransport {
            outgoing: outgoing_tx,
            open,
            task: task.abort_handle(),
            closed: false,
        })
    }
}

enum Outgoing {
    Frame(String),
    Close,
}

/// Client side of one WebSocket connection.
pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
    task: AbortHandle,
    closed: bool,
}

impl Transport for WsTransport {
    fn is_open(&self) -> bool {
        !self.closed && self.open.load(Ordering::Acquire)
    }

    fn send(&mut self, frame: String) -> bool {
        self.is_open() && self.outgoing.send(Outgoing::Frame(frame)).is_ok()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.open.swap(false, Ordering::AcqRel) {
            // Let the socket task send a close frame
            let _ = self.outgoing.send(Outgoing::Close);
        } else {
            // Still handshaking: nothing to close gracefully
            self.task.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: String,
    sink: TransportSink,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    open: Arc<AtomicBool>,
) {
    let ws_stream = match tokio_tungstenite::connect_async(&url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            log::warn!("WebSocket connect to {url} failed: {e}");
            sink.emit(TransportEvent::Error(e.to_string()));
            sink.emit(TransportEvent::Closed);
            return;
        }
    };

    open.store(true, Ordering::Release);
    log::debug!("WebSocket open: {url} (generation {})", sink.generation());
    sink.emit(TransportEvent::Open);

    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !sink.emit(TransportEvent::Message(text.as_str().to_owned())) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::debug!("WebSocket closed by peer: {url}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("WebSocket error on {url}: {e}");
                        sink.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            out = outgoing.recv() => {
                match out {
                    Some(Outgoing::Frame(text)) => {
                        if let Err(e) = ws_writer.send(Message::text(text)).await {
                            log::warn!("WebSocket send on {url} failed: {e}");
                            sink.emit(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = ws_writer.close().await;
                        break;
                    }
                }
            }
        }
    }

    open.store(false, Ordering::Release);
    sink.emit(TransportEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::{self, InboxReceiver, Input};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Duration};

    async fn next_event(rx: &mut InboxReceiver) -> TransportEvent {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Input::Transport { event, .. })) => event,
            other => panic!("Expected a transport event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wss_starts_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (inbox, mut rx) = inbox::channel();

        let mut connector = WsConnector::new();
        let _transport = connector.open(
            &format!("wss://127.0.0.1:{port}/ws/abc123"),
            TransportSink::new(1, inbox),
        );

        let (mut stream, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut record_type = [0u8; 1];
        stream.read_exact(&mut record_type).await.unwrap();
        // 0x16: TLS handshake record (ClientHello)
        assert_eq!(record_type[0], 0x16);
        drop(stream);

        match next_event(&mut rx).await {
            TransportEvent::Error(reason) => {
                assert!(!reason.contains("TLS support not compiled in"), "{reason}");
            }
            other => panic!("Expected Error, got {other:?}"),
        }
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_closed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (inbox, mut rx) = inbox::channel();

        let mut transport = WsConnector::new()
            .open(&format!("ws://127.0.0.1:{port}/ws/abc123"), TransportSink::new(7, inbox));
        assert!(!transport.send("{}".to_string()));

        assert!(matches!(next_event(&mut rx).await, TransportEvent::Error(_)));
        assert_eq!(next_event(&mut rx).await, TransportEvent::Closed);
        assert!(!transport.is_open());
    }
}
