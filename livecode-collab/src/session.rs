//! Session context: one joined room, owned by one driver task.
//!
//! ```text
//!  SessionHandle ──Command──┐
//!  Transport (sink) ─event──┤
//!  ScheduledTask ──expiry───┼──► inbox ──► SessionCore::handle ──► watch<SessionSnapshot>
//!  autocomplete task ─reply─┘
//! ```
//!
//! The driver processes inputs one at a time in arrival order, so the
//! reconciler, the local edit path and the timers never race. The UI only
//! ever sees [`SessionSnapshot`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::api::{ApiError, HttpApi, RoomService, SuggestionService};
use crate::config::ClientConfig;
use crate::connection::{ConnectionMachine, ConnectionStatus};
use crate::inbox::{self, Command, Inbox, InboxReceiver, Input};
use crate::protocol::ClientMessage;
use crate::state::{BufferState, SessionState, WELCOME_CODE};
use crate::suggest::{SuggestionRequestor, SuggestionState};
use crate::transport::Connector;

/// Identity of the joined room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: String,
}

/// Everything the UI needs to render a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session: SessionInfo,
    pub user_id: String,
    pub status: ConnectionStatus,
    pub connected: bool,
    pub error: Option<String>,
    pub buffer: BufferState,
    pub participants: u32,
    pub remote_cursors: BTreeMap<String, usize>,
    /// Most recent first
    pub activity: Vec<ActivityEntry>,
    pub suggestion: SuggestionState,
}

/// Failure to create or join a room. Nothing is started on failure.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("Room {room_id} not found: {source}")]
    RoomNotFound {
        room_id: String,
        #[source]
        source: ApiError,
    },
    #[error("Failed to create room: {0}")]
    CreateFailed(#[source] ApiError),
    #[error("Room id is empty")]
    EmptyRoomId,
}

impl JoinError {
    /// Text to show the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RoomNotFound { .. } => "Room not found. Please check the room ID.",
            Self::CreateFailed(_) => "Failed to create room. Please try again.",
            Self::EmptyRoomId => "Please enter a room ID.",
        }
    }
}

/// `user_` followed by nine lowercase alphanumerics.
fn generate_user_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("user_{}", &id[..9])
}

/// Entry point: creates and joins rooms.
pub struct CollabClient<R, S> {
    config: ClientConfig,
    rooms: Arc<R>,
    suggestions: Arc<S>,
}

impl CollabClient<HttpApi, HttpApi> {
    /// Client backed by the HTTP API at `config.api_base_url`.
    pub fn http(config: ClientConfig) -> Self {
        let api = Arc::new(HttpApi::new(&config));
        Self {
            rooms: api.clone(),
            suggestions: api,
            config,
        }
    }
}

impl<R: RoomService, S: SuggestionService> CollabClient<R, S> {
    pub fn new(config: ClientConfig, rooms: R, suggestions: S) -> Self {
        Self {
            config,
            rooms: Arc::new(rooms),
            suggestions: Arc::new(suggestions),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a new room and join it with the welcome buffer.
    pub async fn create_room<C: Connector>(&self, connector: C) -> Result<SessionHandle, JoinError> {
        let room = self.rooms.create_room().await.map_err(|e| {
            log::error!("Failed to create room: {e}");
            JoinError::CreateFailed(e)
        })?;

        let buffer = BufferState::new(WELCOME_CODE, self.config.default_language.clone());
        let info = SessionInfo {
            id: room.room_id,
            created_at: room.created_at,
        };
        Ok(self.start(info, buffer, connector))
    }

    /// Join an existing room, seeding the buffer with its persisted code.
    pub async fn join_room<C: Connector>(
        &self,
        room_id: &str,
        connector: C,
    ) -> Result<SessionHandle, JoinError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(JoinError::EmptyRoomId);
        }

        let room = self.rooms.get_room(room_id).await.map_err(|e| {
            log::warn!("Failed to join room {room_id}: {e}");
            JoinError::RoomNotFound {
                room_id: room_id.to_string(),
                source: e,
            }
        })?;

        let buffer = BufferState::new(room.code, room.language);
        let info = SessionInfo {
            id: room_id.to_string(),
            created_at: room.created_at,
        };
        Ok(self.start(info, buffer, connector))
    }

    fn start<C: Connector>(&self, info: SessionInfo, buffer: BufferState, connector: C) -> SessionHandle {
        let (inbox, rx) = inbox::channel();
        let user_id = generate_user_id();
        log::info!("Joining room {} as {user_id}", info.id);

        let mut core = SessionCore {
            info: info.clone(),
            user_id: user_id.clone(),
            view_len: self.config.activity_view_len,
            state: SessionState::new(buffer, self.config.activity_capacity),
            connection: ConnectionMachine::new(connector, self.config.clone(), inbox.clone()),
            suggestions: SuggestionRequestor::new(
                self.suggestions.clone(),
                &self.config,
                inbox.clone(),
                Uuid::new_v4(),
            ),
        };
        core.connection.connect(&info.id);

        let (snapshot_tx, snapshots) = watch::channel(core.snapshot());
        let driver = tokio::spawn(run(core, rx, snapshot_tx));

        SessionHandle {
            info,
            user_id,
            inbox,
            snapshots,
            driver: Some(driver),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// All state of one session. Only the driver task touches it.
struct SessionCore<C: Connector, S: SuggestionService> {
    info: SessionInfo,
    user_id: String,
    view_len: usize,
    state: SessionState,
    connection: ConnectionMachine<C>,
    suggestions: SuggestionRequestor<S>,
}

impl<C: Connector, S: SuggestionService> SessionCore<C, S> {
    fn handle(&mut self, input: Input) -> Flow {
        match input {
            Input::Command(command) => return self.handle_command(command),
            Input::Transport { generation, event } => {
                self.connection.handle_event(generation, event, &mut self.state);
            }
            Input::ReconnectDue(token) => {
                self.connection.handle_reconnect_due(token);
            }
            Input::DebounceElapsed(token) => {
                self.suggestions.on_debounce(token, self.state.buffer());
            }
            Input::HideSuggestion(token) => {
                self.suggestions.on_hide(token);
            }
            Input::SuggestionReady(reply) => {
                self.suggestions.on_reply(reply);
            }
        }
        Flow::Continue
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Edit { code, cursor } => self.local_edit(code, cursor),
            Command::Append(text) => {
                let mut code = self.state.buffer().content.clone();
                code.push_str(&text);
                let cursor = code.chars().count();
                self.local_edit(code, Some(cursor));
            }
            Command::MoveCursor(offset) => {
                let offset = offset.min(self.state.buffer().char_len());
                self.state.set_cursor(offset);
                self.connection
                    .send(&ClientMessage::cursor_move(offset, self.user_id.clone()));
            }
            Command::SetLanguage(language) => {
                log::debug!("Language set to {language}");
                self.state.set_language(language);
            }
            Command::Reconnect => {
                log::info!("Manual reconnect to {}", self.info.id);
                self.connection.connect(&self.info.id);
            }
            Command::ClearActivity => self.state.clear_activity(),
            Command::Leave => {
                self.teardown();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn local_edit(&mut self, code: String, cursor: Option<usize>) {
        self.state.apply_local_edit(code, cursor);
        let buffer = self.state.buffer();
        let msg = ClientMessage::code_update(
            buffer.content.clone(),
            self.user_id.clone(),
            buffer.language.clone(),
        );
        self.connection.send(&msg);
        self.suggestions.on_buffer_changed();
    }

    fn teardown(&mut self) {
        self.suggestions.teardown();
        self.connection.disconnect(&mut self.state);
        log::info!("Left room {}", self.info.id);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.info.clone(),
            user_id: self.user_id.clone(),
            status: self.connection.status(),
            connected: self.state.is_connected(),
            error: self.connection.error().map(str::to_string),
            buffer: self.state.buffer().clone(),
            participants: self.state.participants(),
            remote_cursors: self.state.remote_cursors().clone(),
            activity: self.state.activity_view(self.view_len),
            suggestion: self.suggestions.state(),
        }
    }

    fn publish(&self, tx: &watch::Sender<SessionSnapshot>) {
        let next = self.snapshot();
        tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn run<C: Connector, S: SuggestionService>(
    mut core: SessionCore<C, S>,
    mut inbox: InboxReceiver,
    snapshots: watch::Sender<SessionSnapshot>,
) {
    // The core holds inbox senders itself, so the loop ends on Leave only
    while let Some(input) = inbox.recv().await {
        let flow = core.handle(input);
        core.publish(&snapshots);
        if flow == Flow::Stop {
            break;
        }
    }
    log::debug!("Session driver for {} stopped", core.info.id);
}

/// Handle to a running session.
///
/// Dropping the handle leaves the session.
pub struct SessionHandle {
    info: SessionInfo,
    user_id: String,
    inbox: Inbox,
    snapshots: watch::Receiver<SessionSnapshot>,
    driver: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.info.id
    }

    pub fn created_at(&self) -> &str {
        &self.info.created_at
    }

    /// Id sent as `userId` on outbound messages.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Replace the buffer with a local edit and broadcast it.
    ///
    /// `cursor` is the caret after the edit, in characters.
    pub fn edit(&self, code: impl Into<String>, cursor: Option<usize>) {
        self.command(Command::Edit {
            code: code.into(),
            cursor,
        });
    }

    /// Append `text` to the buffer as it stands when the session processes
    /// the edit, leaving the caret at the end, and broadcast the result.
    pub fn append(&self, text: impl Into<String>) {
        self.command(Command::Append(text.into()));
    }

    pub fn move_cursor(&self, offset: usize) {
        self.command(Command::MoveCursor(offset));
    }

    pub fn set_language(&self, language: impl Into<String>) {
        self.command(Command::SetLanguage(language.into()));
    }

    /// Reopen the transport now instead of waiting for the reconnect timer.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    pub fn clear_activity(&self) {
        self.command(Command::ClearActivity);
    }

    /// Receiver notified after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Cancel all timers, disconnect and wait for the driver to finish.
    pub async fn leave(mut self) {
        self.command(Command::Leave);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                log::error!("Session driver for {} failed: {e}", self.info.id);
            }
        }
    }

    fn command(&self, command: Command) {
        if self.inbox.send(Input::Command(command)).is_err() {
            log::warn!("Session {} has ended, ignoring command", self.info.id);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.inbox.send(Input::Command(Command::Leave));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AutocompleteRequest, AutocompleteResponse, Room, RoomInfo};
    use crate::transport::MemoryConnector;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeRooms {
        missing: bool,
        fail_create: bool,
    }

    impl RoomService for FakeRooms {
        async fn create_room(&self) -> Result<Room, ApiError> {
            if self.fail_create {
                return Err(ApiError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(Room {
                room_id: "abc123".to_string(),
                created_at: "2024-05-01T10:00:00".to_string(),
            })
        }

        async fn get_room(&self, room_id: &str) -> Result<RoomInfo, ApiError> {
            if self.missing {
                return Err(ApiError::NotFound(format!("room {room_id}")));
            }
            Ok(RoomInfo {
                room_id: room_id.to_string(),
                created_at: "2024-05-01T10:00:00".to_string(),
                code: "print(1)".to_string(),
                language: "javascript".to_string(),
            })
        }
    }

    struct FixedSuggestions;

    impl SuggestionService for FixedSuggestions {
        async fn autocomplete(
            &self,
            request: AutocompleteRequest,
        ) -> Result<AutocompleteResponse, ApiError> {
            Ok(AutocompleteResponse {
                suggestion: format!("{}pass", request.code),
                confidence: 0.85,
                description: None,
            })
        }
    }

    fn client(rooms: FakeRooms) -> CollabClient<FakeRooms, FixedSuggestions> {
        CollabClient::new(ClientConfig::default(), rooms, FixedSuggestions)
    }

    async fn wait_for(
        handle: &SessionHandle,
        f: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(20), rx.wait_for(f))
            .await
            .expect("timed out waiting for snapshot")
            .expect("session ended");
        snapshot.clone()
    }

    #[test]
    fn test_user_id_format() {
        let id = generate_user_id();
        assert!(id.starts_with("user_"));
        let suffix = &id["user_".len()..];
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_missing_room_starts_nothing() {
        let net = MemoryConnector::new();
        let err = client(FakeRooms {
            missing: true,
            ..Default::default()
        })
        .join_room("nope", net.clone())
        .await
        .err()
        .unwrap();

        assert!(matches!(err, JoinError::RoomNotFound { .. }));
        assert_eq!(err.user_message(), "Room not found. Please check the room ID.");
        assert_eq!(net.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_empty_room_id() {
        let net = MemoryConnector::new();
        let err = client(FakeRooms::default()).join_room("  ", net.clone()).await.err().unwrap();
        assert!(matches!(err, JoinError::EmptyRoomId));
        assert_eq!(net.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure() {
        let net = MemoryConnector::new();
        let err = client(FakeRooms {
            fail_create: true,
            ..Default::default()
        })
        .create_room(net.clone())
        .await
        .err()
        .unwrap();

        assert!(matches!(err, JoinError::CreateFailed(_)));
        assert_eq!(err.user_message(), "Failed to create room. Please try again.");
        assert_eq!(net.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_room_seeds_welcome_buffer() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).create_room(net.clone()).await.unwrap();

        assert_eq!(handle.session_id(), "abc123");
        assert_eq!(net.url(0).unwrap(), "ws://localhost:8000/ws/abc123");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.buffer.content, WELCOME_CODE);
        assert_eq!(snapshot.buffer.language, "python");
        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        assert_eq!(snapshot.user_id, handle.user_id());
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_room_seeds_persisted_buffer() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room(" r9 ", net.clone()).await.unwrap();

        assert_eq!(handle.session_id(), "r9");
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.buffer.content, "print(1)");
        assert_eq!(snapshot.buffer.language, "javascript");
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_init_and_join() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();

        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        net.deliver(0, r#"{"type":"init","code":"x=1","connectionCount":1}"#);
        let snapshot = wait_for(&handle, |s| s.participants == 1).await;
        assert_eq!(snapshot.buffer.content, "x=1");
        assert_eq!(snapshot.activity[0].text, "Room joined. 1 user(s) online");

        net.deliver(0, r#"{"type":"user_joined","connectionCount":2}"#);
        let snapshot = wait_for(&handle, |s| s.participants == 2).await;
        let texts: Vec<_> = snapshot.activity.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            ["User joined (2 total)", "Room joined. 1 user(s) online", "Connected to room"]
        );
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_broadcasts_and_requests_suggestion() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        handle.edit("def ", Some(4));
        let snapshot = wait_for(&handle, |s| s.buffer.content == "def ").await;
        assert_eq!(snapshot.buffer.cursor, 4);
        assert!(!snapshot.suggestion.visible);

        let sent = net.sent(0);
        assert_eq!(sent.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["type"], "code_update");
        assert_eq!(frame["code"], "def ");
        assert_eq!(frame["userId"], handle.user_id());
        assert_eq!(frame["language"], "javascript");

        let snapshot = wait_for(&handle, |s| s.suggestion.visible).await;
        assert_eq!(snapshot.suggestion.suggestion.unwrap().text, "def pass");

        let snapshot = wait_for(&handle, |s| !s.suggestion.visible).await;
        assert!(snapshot.suggestion.suggestion.is_none());
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_appends_keep_every_line() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        handle.append("line one\n");
        handle.append("line two\n");
        let expected = "print(1)line one\nline two\n";
        let snapshot = wait_for(&handle, |s| s.buffer.content.ends_with("line two\n")).await;
        assert_eq!(snapshot.buffer.content, expected);
        assert_eq!(snapshot.buffer.cursor, expected.len());

        let sent = net.sent(0);
        assert_eq!(sent.len(), 2);
        let last: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(last["code"], expected);
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_while_disconnected_is_local_only() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();

        handle.edit("offline", None);
        wait_for(&handle, |s| s.buffer.content == "offline").await;
        assert!(net.sent(0).is_empty());
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_cursor_sends_clamped_offset() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        handle.move_cursor(100);
        let snapshot = wait_for(&handle, |s| s.buffer.cursor != 0).await;
        assert_eq!(snapshot.buffer.cursor, "print(1)".len());

        let frame: serde_json::Value = serde_json::from_str(&net.sent(0)[0]).unwrap();
        assert_eq!(frame["type"], "cursor_move");
        assert_eq!(frame["cursorPosition"], 8);
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_stops_reconnecting() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        net.drop_connection(0);
        wait_for(&handle, |s| s.status == ConnectionStatus::Disconnected).await;

        let mut rx = handle.subscribe();
        handle.leave().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(net.opened(), 1);
        let last = rx.borrow_and_update().clone();
        assert_eq!(last.participants, 0);
        assert!(!last.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reconnect_and_clear_activity() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        handle.reconnect();
        wait_for(&handle, |s| s.status == ConnectionStatus::Connecting).await;
        assert_eq!(net.opened(), 2);
        assert!(net.is_closed(0));

        handle.clear_activity();
        let snapshot = wait_for(&handle, |s| s.activity.is_empty()).await;
        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_language_travels_with_edits() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        handle.set_language("rust");
        handle.edit("fn main() {}", None);
        wait_for(&handle, |s| s.buffer.content == "fn main() {}").await;

        let frame: serde_json::Value = serde_json::from_str(&net.sent(0)[0]).unwrap();
        assert_eq!(frame["language"], "rust");
        handle.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_leaves() {
        let net = MemoryConnector::new();
        let handle = client(FakeRooms::default()).join_room("abc123", net.clone()).await.unwrap();
        net.accept(0);
        wait_for(&handle, |s| s.connected).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(net.live(), 0);
    }
}
