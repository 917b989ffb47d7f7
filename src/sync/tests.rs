use super::*;
use crate::completion::Error;
use crate::session::Role;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Notify;

struct Step {
    gate: Option<Arc<Notify>>,
    result: Result<Reply, Error>,
}

/// Backend scripted by the newest user message of each request.
#[derive(Default)]
struct MockBackend {
    script: Mutex<HashMap<String, Step>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    fn on(self, prompt: &str, result: Result<Reply, Error>) -> Self {
        self.script.lock().unwrap().insert(
            prompt.to_string(),
            Step {
                gate: None,
                result,
            },
        );
        self
    }

    fn gated(self, prompt: &str, result: Result<Reply, Error>, gate: Arc<Notify>) -> Self {
        self.script.lock().unwrap().insert(
            prompt.to_string(),
            Step {
                gate: Some(gate),
                result,
            },
        );
        self
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionApi for MockBackend {
    fn id(&self) -> &str {
        "mock"
    }

    async fn complete(&self, conversation: &[Message]) -> Result<Reply, Error> {
        let prompt = conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(conversation.to_vec());
        let step = self.script.lock().unwrap().remove(&prompt);
        let Some(step) = step else {
            return Err(Error::Api(format!("unscripted prompt: {prompt}")));
        };
        if let Some(gate) = step.gate {
            gate.notified().await;
        }
        step.result
    }
}

fn ok(text: &str) -> Result<Reply, Error> {
    Ok(Reply::Response(text.to_string()))
}

fn setup(backend: MockBackend) -> (Synchronizer, Arc<MockBackend>, SessionId) {
    let backend = Arc::new(backend);
    let store = Arc::new(Mutex::new(SessionStore::new()));
    let id = store.lock().unwrap().active();
    let sync = Synchronizer::new(store, backend.clone());
    (sync, backend, id)
}

fn transcript(sync: &Synchronizer, id: &SessionId) -> Vec<Message> {
    sync.store().lock().unwrap().messages(id).unwrap().to_vec()
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let (sync, backend, id) = setup(MockBackend::default());

    assert!(sync.send(&id, "").is_none());
    assert!(sync.send(&id, "   \n\t").is_none());
    sync.settle_all().await;

    assert!(transcript(&sync, &id).is_empty());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_rejected() {
    let (sync, backend, id) = setup(MockBackend::default());
    sync.store().lock().unwrap().set_draft("keep me");

    assert!(sync.send(&SessionId::from("ghost"), "hello").is_none());
    sync.settle_all().await;

    assert!(backend.calls().is_empty());
    assert!(transcript(&sync, &id).is_empty());
    assert_eq!(sync.store().lock().unwrap().draft(), "keep me");
}

#[tokio::test]
async fn test_successful_reply() {
    let (sync, backend, id) = setup(MockBackend::default().on("hello", ok("hi")));

    let settled = sync.send(&id, "hello").unwrap().settled().await.unwrap();
    assert_eq!(settled.kind, Settlement::Reply);
    assert!(settled.delivered);

    assert_eq!(
        transcript(&sync, &id),
        vec![Message::user("hello"), Message::assistant("hi")]
    );
    assert_eq!(backend.calls(), vec![vec![Message::user("hello")]]);
}

#[tokio::test]
async fn test_transport_failure_appends_fallback() {
    let (sync, _, id) = setup(
        MockBackend::default().on("hello", Err(Error::Parse("unexpected EOF".into()))),
    );

    let settled = sync.send(&id, "hello").unwrap().settled().await.unwrap();
    assert_eq!(settled.kind, Settlement::Fallback);

    assert_eq!(
        transcript(&sync, &id),
        vec![
            Message::user("hello"),
            Message::assistant("Something went wrong.")
        ]
    );
    let diagnostics = sync.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].session, id);
    assert!(diagnostics[0].error.contains("unexpected EOF"));
}

#[tokio::test]
async fn test_backend_error_is_shown_verbatim() {
    let (sync, _, id) = setup(
        MockBackend::default().on("hello", Ok(Reply::Error("No message provided".into()))),
    );

    let settled = sync.send(&id, "hello").unwrap().settled().await.unwrap();
    assert_eq!(settled.kind, Settlement::BackendError);
    assert_eq!(transcript(&sync, &id)[1], Message::assistant("No message provided"));
    assert!(sync.diagnostics().is_empty());
}

#[tokio::test]
async fn test_custom_fallback() {
    let backend = Arc::new(MockBackend::default());
    let store = Arc::new(Mutex::new(SessionStore::new()));
    let id = store.lock().unwrap().active();
    let sync = Synchronizer::new(store, backend).with_fallback("Backend unavailable.");

    assert_eq!(sync.fallback(), "Backend unavailable.");
    sync.send(&id, "hello").unwrap().settled().await.unwrap();
    assert_eq!(transcript(&sync, &id)[1].content, sync.fallback());
}

#[tokio::test]
async fn test_request_carries_full_post_append_transcript() {
    let (sync, backend, id) = setup(
        MockBackend::default()
            .on("hello", ok("hi"))
            .on("and then?", ok("that's all")),
    );

    sync.send(&id, "hello").unwrap().settled().await.unwrap();
    sync.send(&id, "and then?").unwrap().settled().await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        vec![
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("and then?"),
        ]
    );
    assert_eq!(transcript(&sync, &id).len(), 4);
}

#[tokio::test]
async fn test_reply_lands_in_originating_session_after_switch() {
    let gate = Arc::new(Notify::new());
    let (sync, _, first) = setup(MockBackend::default().gated("x", ok("reply to x"), gate.clone()));

    let handle = sync.send(&first, "x").unwrap();
    assert_eq!(handle.session(), &first);
    let second = sync.store().lock().unwrap().create_session();
    assert_eq!(sync.store().lock().unwrap().active(), second);

    gate.notify_one();
    let settled = handle.settled().await.unwrap();
    assert_eq!(settled.session, first);

    assert_eq!(
        transcript(&sync, &first),
        vec![Message::user("x"), Message::assistant("reply to x")]
    );
    assert!(transcript(&sync, &second).is_empty());
}

#[tokio::test]
async fn test_user_message_and_draft_clear_precede_reply() {
    let gate = Arc::new(Notify::new());
    let (sync, _, id) = setup(MockBackend::default().gated("hello", ok("hi"), gate.clone()));
    sync.store().lock().unwrap().set_draft("hello");

    let handle = sync.send(&id, "hello").unwrap();
    {
        let store = sync.store().lock().unwrap();
        assert!(store.draft().is_empty());
        assert_eq!(store.messages(&id).unwrap(), [Message::user("hello")].as_slice());
    }

    // Typing continues while the reply is pending.
    sync.store().lock().unwrap().set_draft("next question");

    gate.notify_one();
    handle.settled().await.unwrap();
    assert_eq!(transcript(&sync, &id).len(), 2);
    assert_eq!(sync.store().lock().unwrap().draft(), "next question");
}

#[tokio::test]
async fn test_concurrent_sends_settle_in_arrival_order() {
    let gate = Arc::new(Notify::new());
    let (sync, _, id) = setup(
        MockBackend::default()
            .gated("first", ok("answer one"), gate.clone())
            .on("second", ok("answer two")),
    );

    let slow = sync.send(&id, "first").unwrap();
    let fast = sync.send(&id, "second").unwrap();
    fast.settled().await.unwrap();

    gate.notify_one();
    slow.settled().await.unwrap();

    let contents: Vec<_> = transcript(&sync, &id)
        .into_iter()
        .map(|m| (m.role, m.content))
        .collect();
    assert_eq!(
        contents,
        vec![
            (Role::User, "first".to_string()),
            (Role::User, "second".to_string()),
            (Role::Assistant, "answer two".to_string()),
            (Role::Assistant, "answer one".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_events_and_settle_all() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend = Arc::new(
        MockBackend::default()
            .on("a", ok("1"))
            .on("b", Err(Error::EmptyReply)),
    );
    let store = Arc::new(Mutex::new(SessionStore::new()));
    let (first, second) = {
        let mut store = store.lock().unwrap();
        (store.active(), store.create_session())
    };
    let sync = Synchronizer::new(store, backend).with_events(tx);

    let _ = sync.send(&first, "a");
    let _ = sync.send(&second, "b");
    sync.settle_all().await;

    let mut events = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    events.sort_by_key(|e| e.content.clone());
    assert_eq!(events[0].session, first);
    assert_eq!(events[0].kind, Settlement::Reply);
    assert_eq!(events[1].session, second);
    assert_eq!(events[1].kind, Settlement::Fallback);
    assert_eq!(events[1].content, DEFAULT_FALLBACK);
}

#[tokio::test]
async fn test_send_draft_targets_active_session() {
    let (sync, _, _) = setup(MockBackend::default().on("from draft", ok("ok")));
    let target = {
        let mut store = sync.store().lock().unwrap();
        let target = store.create_session();
        store.set_draft("from draft");
        target
    };

    let settled = sync.send_draft().unwrap().settled().await.unwrap();
    assert_eq!(settled.session, target);
    assert_eq!(transcript(&sync, &target).len(), 2);

    // Draft is now empty, so nothing is sent.
    assert!(sync.send_draft().is_none());
}
