//! Inputs processed by the session driver, in arrival order.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::{ApiError, AutocompleteResponse};
use crate::timer::TimerToken;
use crate::transport::TransportEvent;

pub(crate) type Inbox = mpsc::UnboundedSender<Input>;
pub(crate) type InboxReceiver = mpsc::UnboundedReceiver<Input>;

/// Everything that can wake the session driver.
#[derive(Debug)]
pub(crate) enum Input {
    /// Request from the UI boundary
    Command(Command),
    /// Event from the transport opened as `generation`
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectDue(TimerToken),
    DebounceElapsed(TimerToken),
    HideSuggestion(TimerToken),
    SuggestionReady(SuggestionReply),
}

/// UI-side operations on a running session.
#[derive(Debug)]
pub(crate) enum Command {
    /// Local edit replaced the buffer; `cursor` is the caret after the edit.
    Edit { code: String, cursor: Option<usize> },
    /// Local edit appending to the current buffer; the caret moves to the end.
    Append(String),
    MoveCursor(usize),
    SetLanguage(String),
    Reconnect,
    ClearActivity,
    Leave,
}

/// Completion of one autocomplete query.
#[derive(Debug)]
pub(crate) struct SuggestionReply {
    /// Session context that issued the query
    pub session: Uuid,
    pub seq: u64,
    pub result: Result<AutocompleteResponse, ApiError>,
}

pub(crate) fn channel() -> (Inbox, InboxReceiver) {
    mpsc::unbounded_channel()
}
