//! Transcript synchronization with the completion endpoint.
//!
//! A send appends the user's turn, ships the whole transcript, and later
//! appends exactly one assistant message to the session that originated it:
//! the reply, the backend's error text, or a fixed fallback.

use crate::completion::{CompletionApi, Reply};
use crate::session::{Message, SessionId, SessionStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Assistant text used when no payload could be obtained at all.
pub const DEFAULT_FALLBACK: &str = "Something went wrong.";

/// How a send settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The backend answered with a reply.
    Reply,
    /// The backend reported an error; its text was appended.
    BackendError,
    /// Transport or parse failure; the fallback message was appended.
    Fallback,
}

/// Emitted once per send after its assistant message is appended.
#[derive(Debug, Clone)]
pub struct Settled {
    pub session: SessionId,
    pub kind: Settlement,
    pub content: String,
    /// False if the session vanished before the reply landed.
    pub delivered: bool,
}

/// A transport failure kept for later inspection.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub session: SessionId,
    pub error: String,
}

/// Handle to an in-flight send. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct SendHandle {
    session: SessionId,
    rx: oneshot::Receiver<Settled>,
}

impl SendHandle {
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Wait for the assistant message to land. `None` if the task died.
    pub async fn settled(self) -> Option<Settled> {
        self.rx.await.ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Lock poisoned, recovering");
        poisoned.into_inner()
    })
}

pub struct Synchronizer {
    store: Arc<Mutex<SessionStore>>,
    backend: Arc<dyn CompletionApi>,
    fallback: Arc<str>,
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    events: Option<mpsc::UnboundedSender<Settled>>,
}

impl Synchronizer {
    pub fn new(store: Arc<Mutex<SessionStore>>, backend: Arc<dyn CompletionApi>) -> Self {
        Self {
            store,
            backend,
            fallback: Arc::from(DEFAULT_FALLBACK),
            diagnostics: Arc::new(Mutex::new(Vec::new())),
            in_flight: Mutex::new(Vec::new()),
            events: None,
        }
    }

    /// Replace the text appended on transport failure.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Arc::from(fallback.into());
        self
    }

    /// Deliver a [`Settled`] event for every send on `tx`.
    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<Settled>) -> Self {
        self.events = Some(tx);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Mutex<SessionStore>> {
        &self.store
    }

    #[must_use]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Transport failures recorded so far, oldest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lock(&self.diagnostics).clone()
    }

    /// Send `user_text` as the next turn of `session_id`.
    ///
    /// Returns `None` without side effects for blank text or an unknown
    /// session. Otherwise the user message is appended and the draft cleared
    /// before this returns; the request runs on a spawned task, so this must
    /// be called from within a tokio runtime.
    pub fn send(&self, session_id: &SessionId, user_text: &str) -> Option<SendHandle> {
        if user_text.trim().is_empty() {
            return None;
        }

        let conversation = {
            let mut store = lock(&self.store);
            if !store.contains(session_id) {
                debug!(session = %session_id, "send to unknown session rejected");
                return None;
            }
            store.append_message(session_id, Message::user(user_text));
            store.clear_draft();
            store.messages(session_id)?.to_vec()
        };

        let (tx, rx) = oneshot::channel();
        let session = session_id.clone();
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let fallback = Arc::clone(&self.fallback);
        let diagnostics = Arc::clone(&self.diagnostics);
        let events = self.events.clone();

        debug!(
            session = %session,
            backend = backend.id(),
            turns = conversation.len(),
            "Issuing completion request"
        );

        let task = tokio::spawn(async move {
            let result = backend.complete(&conversation).await;

            let (kind, content) = match result {
                Ok(Reply::Response(text)) => (Settlement::Reply, text),
                Ok(Reply::Error(text)) => (Settlement::BackendError, text),
                Err(e) => {
                    error!(session = %session, "Completion failed: {e}");
                    lock(&diagnostics).push(Diagnostic {
                        at: Utc::now(),
                        session: session.clone(),
                        error: e.to_string(),
                    });
                    (Settlement::Fallback, fallback.to_string())
                }
            };

            // Always the captured id, never the currently active session.
            let delivered =
                lock(&store).append_message(&session, Message::assistant(content.clone()));
            debug!(session = %session, ?kind, delivered, "Completion settled");

            let settled = Settled {
                session,
                kind,
                content,
                delivered,
            };
            if let Some(events) = events {
                let _ = events.send(settled.clone());
            }
            let _ = tx.send(settled);
        });

        let mut in_flight = lock(&self.in_flight);
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(task);

        Some(SendHandle {
            session: session_id.clone(),
            rx,
        })
    }

    /// Send whatever the store's draft holds to the active session.
    pub fn send_draft(&self) -> Option<SendHandle> {
        let (active, draft) = {
            let mut store = lock(&self.store);
            (store.active(), store.draft().to_string())
        };
        self.send(&active, &draft)
    }

    /// Wait until every send issued so far has settled.
    pub async fn settle_all(&self) {
        let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.in_flight));
        for result in futures::future::join_all(pending).await {
            if let Err(e) = result {
                error!("Send task failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests;
