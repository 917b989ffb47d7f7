//! In-memory session store: every session plus the active pointer.

use crate::session::{Message, Session, SessionId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Owns all sessions for the lifetime of the process.
///
/// Sessions are kept in creation order. Mutations addressed to an id that is
/// not (or no longer) present are ignored: the user action that produced the
/// id and the mutation itself can be separated by a network round trip.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<Session>,
    index: HashMap<SessionId, usize>,
    active: Option<SessionId>,
    /// Text the user is composing for the next send.
    draft: String,
    stale_references: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding one empty default session.
    ///
    /// The active pointer stays unset until the first call to [`Self::active`].
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self {
            sessions: Vec::new(),
            index: HashMap::new(),
            active: None,
            draft: String::new(),
            stale_references: 0,
        };
        store.insert_empty();
        store
    }

    fn insert_empty(&mut self) -> SessionId {
        let mut id = SessionId::generate();
        while self.index.contains_key(&id) {
            id = SessionId::generate();
        }
        self.index.insert(id.clone(), self.sessions.len());
        self.sessions.push(Session::new(id.clone()));
        id
    }

    fn record_stale(&mut self, op: &str, id: &SessionId) {
        self.stale_references += 1;
        warn!(op, session = %id, "stale session reference ignored");
    }

    /// Start a new empty conversation and make it active.
    pub fn create_session(&mut self) -> SessionId {
        let id = self.insert_empty();
        self.active = Some(id.clone());
        self.draft.clear();
        debug!(session = %id, "created session");
        id
    }

    /// Append a message to a session's transcript.
    ///
    /// Returns `false` without touching anything if `id` is unknown.
    pub fn append_message(&mut self, id: &SessionId, message: Message) -> bool {
        let Some(&slot) = self.index.get(id) else {
            self.record_stale("append_message", id);
            return false;
        };
        self.sessions[slot].messages.push(message);
        true
    }

    /// Point the active session at `id`. Unknown ids are ignored.
    pub fn set_active(&mut self, id: &SessionId) -> bool {
        if !self.index.contains_key(id) {
            self.record_stale("set_active", id);
            return false;
        }
        self.active = Some(id.clone());
        true
    }

    /// The active session id, resolving it to the oldest session on first read.
    pub fn active(&mut self) -> SessionId {
        if let Some(id) = &self.active {
            return id.clone();
        }
        // Never empty after construction.
        let id = self.sessions[0].id.clone();
        self.active = Some(id.clone());
        id
    }

    /// The active id without resolving it.
    #[must_use]
    pub fn active_if_set(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.index.get(id).map(|&slot| &self.sessions[slot])
    }

    #[must_use]
    pub fn messages(&self, id: &SessionId) -> Option<&[Message]> {
        self.get(id).map(Session::messages)
    }

    /// Sessions in creation order, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Session> {
        self.sessions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Always false once constructed; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of mutations ignored because they named an unknown session.
    #[must_use]
    pub fn stale_references(&self) -> usize {
        self.stale_references
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }
}
