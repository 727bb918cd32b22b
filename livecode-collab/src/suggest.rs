//! Debounced autocomplete queries.
//!
//! Every local edit restarts the debounce timer. When it fires, one query is
//! built from the buffer as it is *then* and sent to the suggestion service
//! on a spawned task; the reply comes back through the session inbox.
//! Replies are discarded when the session they were issued for has been torn
//! down, or when a newer reply has already been applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::api::{AutocompleteRequest, SuggestionService};
use crate::config::ClientConfig;
use crate::inbox::{Inbox, Input, SuggestionReply};
use crate::state::BufferState;
use crate::timer::{ScheduledTask, TimerToken};

const PREVIEW_CHARS: usize = 50;

/// An applied autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub text: String,
    pub confidence: f64,
    pub description: Option<String>,
}

impl Suggestion {
    /// The first 50 characters of the suggestion, with `...` when cut.
    pub fn preview(&self) -> String {
        let mut chars = self.text.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }

    /// Confidence as a whole percentage.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// The suggestion currently offered to the user, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuggestionState {
    pub suggestion: Option<Suggestion>,
    pub visible: bool,
}

/// Debounces buffer changes into autocomplete queries.
pub struct SuggestionRequestor<S: SuggestionService> {
    service: Arc<S>,
    inbox: Inbox,
    session: Uuid,
    debounce_delay: Duration,
    hide_after: Duration,
    min_confidence: f64,
    debounce: Option<ScheduledTask>,
    /// Pending hide timers and the sequence number of the suggestion each
    /// one was scheduled for
    hide_timers: HashMap<TimerToken, (ScheduledTask, u64)>,
    current: Option<(u64, Suggestion)>,
    next_seq: u64,
    last_applied: Option<u64>,
    torn_down: bool,
}

impl<S: SuggestionService> SuggestionRequestor<S> {
    pub(crate) fn new(service: Arc<S>, config: &ClientConfig, inbox: Inbox, session: Uuid) -> Self {
        Self {
            service,
            inbox,
            session,
            debounce_delay: config.suggestion_debounce,
            hide_after: config.suggestion_hide_after,
            min_confidence: config.suggestion_min_confidence,
            debounce: None,
            hide_timers: HashMap::new(),
            current: None,
            next_seq: 0,
            last_applied: None,
            torn_down: false,
        }
    }

    /// Restart the debounce window after a local edit.
    pub fn on_buffer_changed(&mut self) {
        if self.torn_down {
            return;
        }
        if let Some(previous) = self.debounce.take() {
            previous.cancel();
        }
        self.debounce = Some(ScheduledTask::after(
            self.debounce_delay,
            self.inbox.clone(),
            Input::DebounceElapsed,
        ));
    }

    /// The debounce timer fired: query with the buffer as it is now.
    ///
    /// Returns the sequence number of the issued query.
    pub fn on_debounce(&mut self, token: TimerToken, buffer: &BufferState) -> Option<u64> {
        if !self.debounce.as_ref().is_some_and(|t| t.is(token)) {
            log::trace!("Ignoring stale debounce timer");
            return None;
        }
        self.debounce = None;
        if self.torn_down {
            return None;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let request = AutocompleteRequest {
            code: buffer.content.clone(),
            cursor_position: buffer.clamped_cursor(),
            language: buffer.language.clone(),
        };
        log::debug!(
            "Requesting suggestion #{seq} at offset {} ({})",
            request.cursor_position,
            request.language
        );

        let service = self.service.clone();
        let inbox = self.inbox.clone();
        let session = self.session;
        tokio::spawn(async move {
            let result = service.autocomplete(request).await;
            // Inbox closed: the session ended while the query was in flight
            let _ = inbox.send(Input::SuggestionReady(SuggestionReply {
                session,
                seq,
                result,
            }));
        });
        Some(seq)
    }

    /// A query completed. Returns whether the visible suggestion changed.
    pub(crate) fn on_reply(&mut self, reply: SuggestionReply) -> bool {
        if self.torn_down || reply.session != self.session {
            log::debug!("Discarding suggestion #{} for an ended session", reply.seq);
            return false;
        }

        let response = match reply.result {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Autocomplete query failed: {e}");
                return false;
            }
        };

        if self.last_applied.is_some_and(|last| reply.seq < last) {
            log::debug!("Discarding out-of-order suggestion #{}", reply.seq);
            return false;
        }
        if response.confidence <= self.min_confidence {
            log::trace!(
                "Suggestion #{} below confidence threshold ({:.2})",
                reply.seq,
                response.confidence
            );
            return false;
        }

        self.last_applied = Some(reply.seq);
        self.current = Some((
            reply.seq,
            Suggestion {
                text: response.suggestion,
                confidence: response.confidence,
                description: response.description,
            },
        ));

        let timer = ScheduledTask::after(self.hide_after, self.inbox.clone(), Input::HideSuggestion);
        self.hide_timers.insert(timer.token(), (timer, reply.seq));
        true
    }

    /// A hide timer fired. Clears the suggestion only if it is still the one
    /// this timer was scheduled for.
    pub fn on_hide(&mut self, token: TimerToken) -> bool {
        let Some((_timer, seq)) = self.hide_timers.remove(&token) else {
            return false;
        };
        if !self.current.as_ref().is_some_and(|(current, _)| *current == seq) {
            return false;
        }
        log::trace!("Hiding suggestion #{seq}");
        self.current = None;
        true
    }

    /// Cancel every timer and discard whatever is still in flight.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        if let Some(debounce) = self.debounce.take() {
            debounce.cancel();
        }
        for (_, (timer, _)) in self.hide_timers.drain() {
            timer.cancel();
        }
        self.current = None;
    }

    pub fn state(&self) -> SuggestionState {
        SuggestionState {
            suggestion: self.current.as_ref().map(|(_, s)| s.clone()),
            visible: self.current.is_some(),
        }
    }

    pub fn debounce_pending(&self) -> bool {
        self.debounce.is_some()
    }

    pub fn pending_hide_timers(&self) -> usize {
        self.hide_timers.len()
    }

    /// Number of queries issued so far.
    pub fn queries_issued(&self) -> u64 {
        self.next_seq
    }
}
