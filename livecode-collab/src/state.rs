//! Application state of one session and the reconciler that applies
//! inbound protocol messages to it.
//!
//! The buffer is last-write-wins: a local edit, an inbound `code_update` and
//! an inbound `init` each replace the content outright, and whichever is
//! applied last is what remains. The participant count is never adjusted
//! locally, it is only ever replaced by the server's `connectionCount`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::activity::{unix_millis, ActivityEntry, ActivityKind, ActivityLog};
use crate::protocol::ServerMessage;

/// Buffer content for a newly created room.
pub const WELCOME_CODE: &str =
    "# Welcome to Real-Time Pair Programming!\n# Start typing to collaborate...\n";

/// Who wrote the current buffer content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BufferSource {
    /// Seeded when the session was created
    Seed,
    /// The local user typed it
    Local,
    /// Server snapshot (`init`)
    Snapshot,
    /// Another participant (`code_update`); `None` when the sender is unnamed
    Remote { user_id: Option<String> },
}

/// The shared text buffer as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferState {
    pub content: String,
    pub language: String,
    /// Local caret, in characters
    pub cursor: usize,
    /// Milliseconds since the Unix epoch of the last content replacement
    pub last_update: u64,
    pub source: BufferSource,
}

impl BufferState {
    pub fn new(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            language: language.into(),
            cursor: 0,
            last_update: unix_millis(),
            source: BufferSource::Seed,
        }
    }

    fn replace(&mut self, content: String, source: BufferSource) {
        self.content = content;
        self.source = source;
        self.last_update = unix_millis();
        self.cursor = self.clamped_cursor();
    }

    /// Length of the content in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// The caret clamped to the current content.
    pub fn clamped_cursor(&self) -> usize {
        self.cursor.min(self.char_len())
    }
}

/// Room-level state mutated by the reconciler and the local edit path.
#[derive(Debug, Clone)]
pub struct SessionState {
    buffer: BufferState,
    participants: u32,
    connected: bool,
    remote_cursors: BTreeMap<String, usize>,
    activity: ActivityLog,
}

impl SessionState {
    pub fn new(buffer: BufferState, activity_capacity: usize) -> Self {
        Self {
            buffer,
            participants: 0,
            connected: false,
            remote_cursors: BTreeMap::new(),
            activity: ActivityLog::new(activity_capacity),
        }
    }

    /// Apply one inbound message. Returns `false` if nothing changed.
    pub fn apply(&mut self, msg: ServerMessage) -> bool {
        match msg {
            ServerMessage::Init {
                code,
                connection_count,
                language,
            } => {
                self.buffer.replace(code, BufferSource::Snapshot);
                if let Some(language) = language {
                    self.buffer.language = language;
                }
                self.participants = connection_count;
                self.activity.append(
                    ActivityKind::System,
                    format!("Room joined. {connection_count} user(s) online"),
                );
            }

            ServerMessage::CodeUpdate {
                code,
                user_id,
                cursor_position,
            } => {
                if let (Some(user), Some(position)) = (&user_id, cursor_position) {
                    self.remote_cursors.insert(user.clone(), position);
                }
                let author = user_id.as_deref().unwrap_or("another user");
                self.activity
                    .append(ActivityKind::Update, format!("Code updated by {author}"));
                self.buffer.replace(code, BufferSource::Remote { user_id });
            }

            ServerMessage::UserJoined { connection_count } => {
                self.participants = connection_count;
                self.activity.append(
                    ActivityKind::Join,
                    format!("User joined ({connection_count} total)"),
                );
            }

            ServerMessage::UserLeft { connection_count } => {
                self.participants = connection_count;
                self.activity.append(
                    ActivityKind::Leave,
                    format!("User left ({connection_count} remaining)"),
                );
            }

            ServerMessage::CursorMove {
                cursor_position,
                user_id,
            } => match (user_id, cursor_position) {
                (Some(user), Some(position)) => {
                    log::trace!("Remote cursor {user} at {position}");
                    self.remote_cursors.insert(user, position);
                }
                _ => return false,
            },

            ServerMessage::Unknown { kind } => {
                log::debug!("Ignoring unknown message type: {kind}");
                return false;
            }
        }
        true
    }

    /// Replace the buffer with a local edit.
    pub fn apply_local_edit(&mut self, code: String, cursor: Option<usize>) {
        self.buffer.replace(code, BufferSource::Local);
        if let Some(cursor) = cursor {
            self.buffer.cursor = cursor;
        }
        self.buffer.cursor = self.buffer.clamped_cursor();
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.buffer.cursor = cursor;
    }

    pub fn set_language(&mut self, language: String) {
        self.buffer.language = language;
    }

    /// Connectivity flag, maintained by the connection state machine.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Forget room membership after an explicit disconnect.
    pub fn reset_room(&mut self) {
        self.participants = 0;
        self.connected = false;
        self.remote_cursors.clear();
    }

    pub fn log(&mut self, kind: ActivityKind, text: impl Into<String>) {
        self.activity.append(kind, text);
    }

    pub fn clear_activity(&mut self) {
        self.activity.clear();
    }

    pub fn buffer(&self) -> &BufferState {
        &self.buffer
    }

    pub fn participants(&self) -> u32 {
        self.participants
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn remote_cursors(&self) -> &BTreeMap<String, usize> {
        &self.remote_cursors
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Most-recent-first display slice of the activity log.
    pub fn activity_view(&self, len: usize) -> Vec<ActivityEntry> {
        self.activity.recent(len)
    }
}
