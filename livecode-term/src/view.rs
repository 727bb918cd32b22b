//! Prints what changed between consecutive session snapshots.

use livecode_collab::{ActivityEntry, BufferSource, ConnectionStatus, SessionSnapshot, Suggestion};

/// What has already been shown to the user.
#[derive(Debug, Default)]
pub struct View {
    status: Option<ConnectionStatus>,
    error: Option<String>,
    participants: Option<u32>,
    last_activity: Option<ActivityEntry>,
    suggestion: Option<Suggestion>,
}

impl View {
    /// Print everything in `snapshot` that differs from what was last shown.
    pub fn render(&mut self, snapshot: &SessionSnapshot) {
        for line in self.diff(snapshot) {
            println!("{line}");
        }
    }

    fn diff(&mut self, snapshot: &SessionSnapshot) -> Vec<String> {
        let mut out = Vec::new();

        if self.status != Some(snapshot.status) {
            self.status = Some(snapshot.status);
            out.push(format!("[{}]", status_label(snapshot.status)));
        }
        if snapshot.error != self.error {
            if let Some(error) = &snapshot.error {
                out.push(format!("! {error}"));
            }
            self.error = snapshot.error.clone();
        }
        if self.participants != Some(snapshot.participants) {
            self.participants = Some(snapshot.participants);
            out.push(format!("{} online", snapshot.participants));
        }

        // The view is most recent first; print unseen entries oldest first
        let unseen: Vec<&ActivityEntry> = snapshot
            .activity
            .iter()
            .take_while(|e| Some(*e) != self.last_activity.as_ref())
            .collect();
        for entry in unseen.iter().rev() {
            out.push(format!("* {}", entry.text));
        }
        if let Some(entry) = snapshot.activity.first() {
            if !unseen.is_empty() && matches!(snapshot.buffer.source, BufferSource::Remote { .. }) {
                out.push(snapshot.buffer.content.trim_end().to_string());
            }
            self.last_activity = Some(entry.clone());
        } else {
            self.last_activity = None;
        }

        let suggestion = snapshot.suggestion.suggestion.clone();
        if suggestion != self.suggestion {
            if let Some(s) = &suggestion {
                out.push(format!("> suggestion: {} ({}%)", s.preview(), s.confidence_percent()));
            }
            self.suggestion = suggestion;
        }
        out
    }

    pub fn print_buffer(&self, snapshot: &SessionSnapshot) {
        let buffer = &snapshot.buffer;
        println!("--- {} ({} chars, caret {}) ---", buffer.language, buffer.char_len(), buffer.cursor);
        print!("{}", buffer.content);
        if !buffer.content.ends_with('\n') {
            println!();
        }
        println!("---");
    }

    pub fn print_activity(&self, snapshot: &SessionSnapshot) {
        if snapshot.activity.is_empty() {
            println!("(no activity)");
        }
        for entry in snapshot.activity.iter().rev() {
            println!("{:>13} {:?} {}", entry.timestamp, entry.kind, entry.text);
        }
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecode_collab::{ActivityKind, BufferState, SessionInfo, SuggestionState};
    use std::collections::BTreeMap;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session: SessionInfo {
                id: "abc123".to_string(),
                created_at: "2024-05-01T10:00:00".to_string(),
            },
            user_id: "user_abcdefghi".to_string(),
            status: ConnectionStatus::Connecting,
            connected: false,
            error: None,
            buffer: BufferState::new("", "python"),
            participants: 0,
            remote_cursors: BTreeMap::new(),
            activity: Vec::new(),
            suggestion: SuggestionState::default(),
        }
    }

    fn entry(text: &str, timestamp: u64) -> ActivityEntry {
        ActivityEntry {
            kind: ActivityKind::System,
            text: text.to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_first_render_shows_status() {
        let mut view = View::default();
        let lines = view.diff(&snapshot());
        assert_eq!(lines, ["[connecting]", "0 online"]);
        assert!(view.diff(&snapshot()).is_empty());
    }

    #[test]
    fn test_only_new_activity_printed_oldest_first() {
        let mut view = View::default();
        let mut snap = snapshot();
        snap.activity = vec![entry("Connected to room", 1)];
        view.diff(&snap);

        snap.activity = vec![
            entry("User joined (3 total)", 3),
            entry("User joined (2 total)", 2),
            entry("Connected to room", 1),
        ];
        let lines = view.diff(&snap);
        assert_eq!(lines, ["* User joined (2 total)", "* User joined (3 total)"]);
    }

    #[test]
    fn test_suggestion_printed_once() {
        let mut view = View::default();
        let mut snap = snapshot();
        view.diff(&snap);

        snap.suggestion = SuggestionState {
            suggestion: Some(Suggestion {
                text: "pass".to_string(),
                confidence: 0.85,
                description: None,
            }),
            visible: true,
        };
        assert_eq!(view.diff(&snap), ["> suggestion: pass (85%)"]);
        assert!(view.diff(&snap).is_empty());
    }
}
