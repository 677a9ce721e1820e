//! Sequenced, replayable event fan-out for one pipeline session.
//!
//! The module is organised around a per-session [`EventBroker`] (ring buffer
//! plus live listener set) and a [`SessionManager`] mapping session ids to
//! broker instances. Transports replay with [`EventBroker::history`] and then
//! follow live via [`EventBroker::subscribe`].

pub mod event;
pub mod hub;
pub mod session;

pub use event::{EventDraft, EventKind, EventPayload, StreamEvent};
pub use hub::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTENER_CAPACITY, EventBroker, ListenerHandle, ListenerId,
    ListenerPoll,
};
pub use session::SessionManager;
