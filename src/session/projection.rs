//! Display-ready session list derived from the store.

use crate::session::{SessionId, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub title: String,
    pub id: SessionId,
}

/// List sessions newest first. Never mutates the store.
#[must_use]
pub fn project(store: &SessionStore) -> Vec<SessionEntry> {
    store
        .iter()
        .rev()
        .map(|session| SessionEntry {
            title: session.title().to_string(),
            id: session.id().clone(),
        })
        .collect()
}
