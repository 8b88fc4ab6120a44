//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{spawn_chat, ChatHandle, ChatUpdate, ChatView};
use crate::config::ChatScript;
use crate::conversation::Message;
use crate::engine::EngineError;
use crate::enrich::Entity;
use crate::state_machine::{Identity, SessionContext, SessionId, TurnResponse};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Barrier};

// ============================================================================
// Mock Turn Client
// ============================================================================

/// Mock engine that returns queued results
#[allow(dead_code)]
pub struct MockTurnClient {
    start_results: Mutex<VecDeque<Result<(), EngineError>>>,
    turn_results: Mutex<VecDeque<(Duration, Result<TurnResponse, EngineError>)>>,
    /// Record of start-session calls: (user id, session id)
    pub starts: Mutex<Vec<(String, SessionId)>>,
    /// Record of continue-turn texts
    pub turns: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockTurnClient {
    pub fn new() -> Self {
        Self {
            start_results: Mutex::new(VecDeque::new()),
            turn_results: Mutex::new(VecDeque::new()),
            starts: Mutex::new(Vec::new()),
            turns: Mutex::new(Vec::new()),
        }
    }

    /// Queue a start-session failure (start succeeds when nothing is queued)
    pub fn queue_start_error(&self, error: EngineError) {
        self.start_results.lock().unwrap().push_back(Err(error));
    }

    /// Queue a successful turn reply
    pub fn queue_response(&self, response: TurnResponse) {
        self.queue_delayed_response(Duration::ZERO, response);
    }

    /// Queue a turn reply that arrives after `delay`
    pub fn queue_delayed_response(&self, delay: Duration, response: TurnResponse) {
        self.turn_results
            .lock()
            .unwrap()
            .push_back((delay, Ok(response)));
    }

    /// Queue a turn failure
    pub fn queue_error(&self, error: EngineError) {
        self.turn_results
            .lock()
            .unwrap()
            .push_back((Duration::ZERO, Err(error)));
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn recorded_turns(&self) -> Vec<String> {
        self.turns.lock().unwrap().clone()
    }
}

impl Default for MockTurnClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnClient for MockTurnClient {
    async fn start_session(
        &self,
        identity: &Identity,
        session_id: &SessionId,
    ) -> Result<(), EngineError> {
        self.starts
            .lock()
            .unwrap()
            .push((identity.user_id.clone(), session_id.clone()));
        self.start_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn continue_turn(
        &self,
        _identity: &Identity,
        _session_id: &SessionId,
        text: &str,
    ) -> Result<TurnResponse, EngineError> {
        self.turns.lock().unwrap().push(text.to_string());
        let queued = self.turn_results.lock().unwrap().pop_front();
        let (delay, result) = queued.unwrap_or_else(|| {
            (
                Duration::ZERO,
                Err(EngineError::network("No mock response queued")),
            )
        });
        tokio::time::sleep(delay).await;
        result
    }
}

// ============================================================================
// Mock Entity Lookup
// ============================================================================

/// Mock lookup service with predefined entities; unknown ids fail
#[allow(dead_code)]
pub struct MockEntityLookup {
    entities: HashMap<String, Value>,
    delays: HashMap<String, Duration>,
    /// When set, every lookup waits here before answering
    barrier: Option<Barrier>,
    /// Record of looked-up ids
    pub lookups: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockEntityLookup {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            delays: HashMap::new(),
            barrier: None,
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_entity(mut self, id: impl Into<String>, record: Value) -> Self {
        self.entities.insert(id.into(), record);
        self
    }

    pub fn with_delay(mut self, id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(id.into(), delay);
        self
    }

    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Barrier::new(parties));
        self
    }

    pub fn recorded_lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl Default for MockEntityLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityLookup for MockEntityLookup {
    async fn lookup(&self, entity_id: &str) -> Result<Entity, EngineError> {
        self.lookups.lock().unwrap().push(entity_id.to_string());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delays.get(entity_id) {
            tokio::time::sleep(*delay).await;
        }

        self.entities
            .get(entity_id)
            .cloned()
            .map(Entity::new)
            .ok_or_else(|| EngineError::invalid_request(format!("Unknown entity: {entity_id}")))
    }
}

// ============================================================================
// Mock Identity Source
// ============================================================================

/// Identity source with a fixed answer, read once when the runtime starts
#[allow(dead_code)]
pub struct MockIdentity {
    loaded: bool,
    identity: Option<Identity>,
}

#[allow(dead_code)]
impl MockIdentity {
    pub fn resolved(identity: Identity) -> Self {
        Self {
            loaded: true,
            identity: Some(identity),
        }
    }

    /// Auth still in progress
    pub fn loading() -> Self {
        Self {
            loaded: false,
            identity: None,
        }
    }

    /// Auth finished without a user
    pub fn signed_out() -> Self {
        Self {
            loaded: true,
            identity: None,
        }
    }
}

impl IdentitySource for MockIdentity {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub handle: ChatHandle,
    pub updates: broadcast::Receiver<ChatUpdate>,
    pub view: watch::Receiver<ChatView>,
    pub engine: Arc<MockTurnClient>,
    pub lookup: Arc<MockEntityLookup>,
}

pub struct TestRuntimeBuilder {
    session_id: String,
    engine: Option<MockTurnClient>,
    lookup: Option<MockEntityLookup>,
    identity: MockIdentity,
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder {
            session_id: "test1sess".to_string(),
            engine: None,
            lookup: None,
            identity: MockIdentity::resolved(Identity::new("test-user")),
        }
    }
}

impl TestRuntimeBuilder {
    pub fn engine(mut self, engine: MockTurnClient) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn lookup(mut self, lookup: MockEntityLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn identity(mut self, identity: MockIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn build(self) -> TestRuntime {
        let engine = Arc::new(self.engine.unwrap_or_default());
        let lookup = Arc::new(self.lookup.unwrap_or_default());
        let context = SessionContext::new(SessionId::new(self.session_id), ChatScript::default());

        let (handle, updates) = spawn_chat(context, engine.clone(), lookup.clone(), self.identity);
        let view = handle.view();

        TestRuntime {
            handle,
            updates,
            view,
            engine,
            lookup,
        }
    }
}

impl TestRuntime {
    /// Type and submit a message
    pub async fn submit(&mut self, text: &str) {
        self.handle.set_draft(text);
        self.handle.submit().await.expect("runtime stopped");
    }

    /// Wait until the view satisfies `pred`
    pub async fn wait_for_view(
        &mut self,
        pred: impl Fn(&ChatView) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ready = pred(&*self.view.borrow_and_update());
            if ready {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.view.changed()).await {
                Ok(Ok(())) => continue,
                _ => return false,
            }
        }
    }

    /// Wait until `cond` holds, polling
    pub async fn wait_until(&self, cond: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    pub async fn wait_for_active(&mut self) -> bool {
        self.wait_for_view(|v| v.state.is_active(), Duration::from_secs(2))
            .await
    }

    pub fn current(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.view.borrow().messages.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Sender;
    use crate::state_machine::{FailureKind, SessionState};
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(2);
    const SETTLE: Duration = Duration::from_millis(100);

    fn bot_count(view: &ChatView) -> usize {
        view.messages
            .iter()
            .filter(|m| m.sender == Sender::Bot)
            .count()
    }

    #[tokio::test]
    async fn test_mock_turn_client() {
        let mock = MockTurnClient::new();
        mock.queue_response(TurnResponse::new("shoes", "Hi"));

        let identity = Identity::new("u");
        let session = SessionId::new("s");
        let response = mock.continue_turn(&identity, &session, "hello").await.unwrap();
        assert_eq!(response.state, "shoes");

        // Second call should fail (no more responses)
        assert!(mock.continue_turn(&identity, &session, "again").await.is_err());
        assert_eq!(mock.recorded_turns(), vec!["hello", "again"]);
    }

    #[tokio::test]
    async fn test_bootstrap_logs_announcement_and_greeting() {
        let mut rt = TestRuntime::builder().build();
        assert!(rt.wait_for_active().await);

        assert_eq!(
            rt.messages(),
            vec![
                Message::new("Your session ID is test1sess", Sender::User),
                Message::new("Session started. How can I assist you today?", Sender::Bot),
            ]
        );
        assert_eq!(rt.engine.start_count(), 1);
        assert_eq!(
            rt.engine.starts.lock().unwrap()[0],
            ("test-user".to_string(), SessionId::new("test1sess"))
        );
    }

    #[tokio::test]
    async fn test_bootstrap_updates_arrive_in_order() {
        let mut rt = TestRuntime::builder().build();
        assert!(rt.wait_for_active().await);

        let first = rt.updates.recv().await.unwrap();
        let second = rt.updates.recv().await.unwrap();
        let third = rt.updates.recv().await.unwrap();
        assert!(matches!(first, ChatUpdate::Message(m) if m.sender == Sender::User));
        assert!(matches!(second, ChatUpdate::Message(m) if m.sender == Sender::Bot));
        assert!(matches!(third, ChatUpdate::SessionStarted { .. }));
    }

    #[tokio::test]
    async fn test_bootstrap_deferred_until_identity() {
        let mut rt = TestRuntime::builder()
            .identity(MockIdentity::loading())
            .build();

        tokio::time::sleep(SETTLE).await;
        assert_eq!(rt.engine.start_count(), 0);
        assert_eq!(rt.current().state, SessionState::Uninitialized);

        rt.handle
            .identity_resolved(Identity::new("late-user"))
            .await
            .unwrap();

        assert!(rt.wait_for_active().await);
        assert_eq!(rt.engine.start_count(), 1);
        assert_eq!(rt.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_stays_uninitialized() {
        let engine = MockTurnClient::new();
        engine.queue_start_error(EngineError::server_error("engine down"));
        let mut rt = TestRuntime::builder().engine(engine).build();

        assert!(rt.wait_until(|| rt.engine.start_count() == 1, WAIT).await);
        tokio::time::sleep(SETTLE).await;

        let view = rt.current();
        assert_eq!(view.state, SessionState::Uninitialized);
        assert_eq!(view.last_failure, Some(FailureKind::Bootstrap));
        assert!(view.messages.is_empty());
        // No automatic retry
        assert_eq!(rt.engine.start_count(), 1);

        // Turns are refused before the session exists
        rt.submit("hello?").await;
        tokio::time::sleep(SETTLE).await;
        assert!(rt.engine.recorded_turns().is_empty());
        assert!(rt.messages().is_empty());
    }

    #[tokio::test]
    async fn test_topic_turn_with_entities() {
        let engine = MockTurnClient::new();
        engine.queue_response(
            TurnResponse::new("shoes", "Here are some options").with_entities(["p1", "p2"]),
        );
        let lookup = MockEntityLookup::new()
            .with_entity("p1", json!({ "id": "p1", "name": "Trail runner" }))
            .with_entity("p2", json!({ "id": "p2", "name": "Court shoe" }));

        let mut rt = TestRuntime::builder().engine(engine).lookup(lookup).build();
        assert!(rt.wait_for_active().await);

        rt.submit("show me shoes").await;
        assert!(rt.wait_for_view(|v| v.entities.len() == 2, WAIT).await);

        let view = rt.current();
        assert_eq!(view.state.topic(), "shoes");
        assert_eq!(view.title, "shoes");
        assert_eq!(view.background, "/bgs/shoes.jpg");
        assert_eq!(
            &view.messages[2..],
            &[
                Message::new("show me shoes", Sender::User),
                Message::new("Here are some options", Sender::Bot),
            ]
        );
        assert!(view.input_enabled);

        let mut looked_up = rt.lookup.recorded_lookups();
        looked_up.sort();
        assert_eq!(looked_up, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_completed_turn_ends_chat() {
        let engine = MockTurnClient::new();
        engine.queue_response(TurnResponse::new("completed", "Goodbye"));
        let mut rt = TestRuntime::builder().engine(engine).build();
        assert!(rt.wait_for_active().await);

        rt.submit("that's all").await;
        assert!(rt.wait_for_view(|v| !v.input_enabled, WAIT).await);

        let view = rt.current();
        assert!(view.state.is_terminal());
        assert_eq!(
            view.messages.last(),
            Some(&Message::new("Chat ended. Goodbye", Sender::Bot))
        );
        assert!(!rt.handle.input_enabled());

        // Further submissions never reach the engine
        rt.submit("hello again").await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(rt.engine.recorded_turns(), vec!["that's all"]);
        assert_eq!(rt.messages().len(), 4);
        assert_eq!(rt.handle.draft(), "");
    }

    #[tokio::test]
    async fn test_blank_submission_is_noop() {
        let mut rt = TestRuntime::builder().build();
        assert!(rt.wait_for_active().await);

        rt.submit("   \t").await;
        assert_eq!(rt.handle.draft(), "");
        tokio::time::sleep(SETTLE).await;

        assert!(rt.engine.recorded_turns().is_empty());
        assert_eq!(rt.messages().len(), 2);
        assert_eq!(
            rt.current().state,
            SessionState::Active {
                topic: String::new(),
                latest_turn: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_turn_failure_allows_retry() {
        let engine = MockTurnClient::new();
        engine.queue_error(EngineError::network("Connection reset"));
        engine.queue_response(TurnResponse::new("hats", "We have hats"));
        let mut rt = TestRuntime::builder().engine(engine).build();
        assert!(rt.wait_for_active().await);

        rt.submit("hats?").await;
        assert!(rt.wait_until(|| rt.engine.recorded_turns().len() == 1, WAIT).await);
        tokio::time::sleep(SETTLE).await;

        // User message logged, no bot reply, still accepting input
        let view = rt.current();
        assert_eq!(view.messages.len(), 3);
        assert_eq!(bot_count(&view), 1);
        assert!(view.input_enabled);
        assert_eq!(view.state.topic(), "");

        rt.submit("hats?").await;
        assert!(rt.wait_for_view(|v| v.state.topic() == "hats", WAIT).await);
        assert_eq!(
            rt.messages().last(),
            Some(&Message::new("We have hats", Sender::Bot))
        );
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_bot_text() {
        let engine = MockTurnClient::new();
        engine.queue_response(TurnResponse::new("bags", "Take a look").with_entities(["missing"]));
        let mut rt = TestRuntime::builder().engine(engine).build();
        assert!(rt.wait_for_active().await);

        rt.submit("bags").await;
        assert!(rt.wait_for_view(|v| v.state.topic() == "bags", WAIT).await);
        assert!(rt.wait_until(|| rt.lookup.recorded_lookups().len() == 1, WAIT).await);
        tokio::time::sleep(SETTLE).await;

        let view = rt.current();
        assert_eq!(
            view.messages.last(),
            Some(&Message::new("Take a look", Sender::Bot))
        );
        assert!(view.entities.is_empty());
        assert!(view.input_enabled);
    }

    #[tokio::test]
    async fn test_stale_enrichment_is_discarded() {
        let engine = MockTurnClient::new();
        engine.queue_response(TurnResponse::new("shoes", "Older picks").with_entities(["slow"]));
        engine.queue_response(TurnResponse::new("shoes", "Newer picks").with_entities(["fast"]));
        let lookup = MockEntityLookup::new()
            .with_entity("slow", json!({ "id": "slow" }))
            .with_entity("fast", json!({ "id": "fast" }))
            .with_delay("slow", Duration::from_millis(300));
        let mut rt = TestRuntime::builder().engine(engine).lookup(lookup).build();
        assert!(rt.wait_for_active().await);

        rt.submit("first").await;
        assert!(rt.wait_until(|| rt.lookup.recorded_lookups().len() == 1, WAIT).await);

        rt.submit("second").await;
        assert!(rt.wait_for_view(|v| v.entities.len() == 1, WAIT).await);
        assert_eq!(rt.current().entities[0].as_value()["id"], "fast");

        // Let the slow lookup for the superseded turn land
        tokio::time::sleep(Duration::from_millis(500)).await;
        let view = rt.current();
        assert_eq!(view.entities.len(), 1);
        assert_eq!(view.entities[0].as_value()["id"], "fast");
    }

    #[tokio::test]
    async fn test_superseded_reply_keeps_text_only() {
        let engine = MockTurnClient::new();
        engine.queue_delayed_response(
            Duration::from_millis(300),
            TurnResponse::new("old_topic", "Late answer").with_entities(["p1"]),
        );
        engine.queue_response(TurnResponse::new("new_topic", "Fresh answer"));
        let lookup = MockEntityLookup::new().with_entity("p1", json!({ "id": "p1" }));
        let mut rt = TestRuntime::builder().engine(engine).lookup(lookup).build();
        assert!(rt.wait_for_active().await);

        rt.submit("first").await;
        assert!(rt.wait_until(|| rt.engine.recorded_turns().len() == 1, WAIT).await);
        rt.submit("second").await;

        assert!(rt.wait_for_view(|v| v.state.topic() == "new_topic", WAIT).await);
        assert!(rt.wait_for_view(|v| v.messages.len() == 6, WAIT).await);
        tokio::time::sleep(SETTLE).await;

        let view = rt.current();
        assert_eq!(view.state.topic(), "new_topic");
        assert_eq!(view.title, "new_topic");
        let texts: Vec<&str> = view.messages[2..].iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "Fresh answer", "Late answer"]);
        // The superseded reply never triggers enrichment
        assert!(rt.lookup.recorded_lookups().is_empty());
        assert!(view.entities.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_completed_reply_ends_chat() {
        let engine = MockTurnClient::new();
        engine.queue_delayed_response(
            Duration::from_millis(300),
            TurnResponse::new("completed", "Goodbye"),
        );
        engine.queue_error(EngineError::invalid_request("Session is closing"));
        let mut rt = TestRuntime::builder().engine(engine).build();
        assert!(rt.wait_for_active().await);

        rt.submit("bye").await;
        assert!(rt.wait_until(|| rt.engine.recorded_turns().len() == 1, WAIT).await);
        rt.submit("are you there").await;

        assert!(rt.wait_for_view(|v| !v.input_enabled, WAIT).await);

        let view = rt.current();
        assert!(view.state.is_terminal());
        assert_eq!(
            view.messages.last(),
            Some(&Message::new("Chat ended. Goodbye", Sender::Bot))
        );
        assert_eq!(view.pending_calls, 0);
    }

    #[tokio::test]
    async fn test_chat_end_keeps_topic_presentation() {
        let engine = MockTurnClient::new();
        engine.queue_response(TurnResponse::new("shoes", "Here are some options"));
        engine.queue_response(TurnResponse::new("completed", "Goodbye"));
        let mut rt = TestRuntime::builder().engine(engine).build();
        assert!(rt.wait_for_active().await);

        rt.submit("shoes please").await;
        assert!(rt.wait_for_view(|v| v.state.topic() == "shoes", WAIT).await);
        rt.submit("that's all").await;
        assert!(rt.wait_for_view(|v| !v.input_enabled, WAIT).await);

        let view = rt.current();
        assert!(view.state.is_terminal());
        assert_eq!(view.state.topic(), "shoes");
        assert_eq!(view.title, "shoes");
        assert_eq!(view.background, "/bgs/shoes.jpg");
    }

    #[tokio::test]
    async fn test_pending_calls_track_turn_and_enrichment() {
        let engine = MockTurnClient::new();
        engine.queue_delayed_response(
            Duration::from_millis(100),
            TurnResponse::new("shoes", "Here are some options").with_entities(["p1"]),
        );
        let lookup = MockEntityLookup::new()
            .with_entity("p1", json!({ "id": "p1" }))
            .with_delay("p1", Duration::from_millis(200));
        let mut rt = TestRuntime::builder().engine(engine).lookup(lookup).build();
        assert!(rt.wait_for_active().await);
        assert_eq!(rt.current().pending_calls, 0);

        rt.submit("shoes").await;
        // The turn is in flight
        assert!(
            rt.wait_for_view(|v| v.pending_calls == 1 && v.state.topic().is_empty(), WAIT)
                .await
        );
        // The reply arrived and enrichment took over
        assert!(
            rt.wait_for_view(|v| v.pending_calls == 1 && v.state.topic() == "shoes", WAIT)
                .await
        );
        assert!(
            rt.wait_for_view(|v| v.pending_calls == 0 && v.entities.len() == 1, WAIT)
                .await
        );
    }

    #[tokio::test]
    async fn test_signed_out_identity_defers_bootstrap() {
        let mut rt = TestRuntime::builder()
            .identity(MockIdentity::signed_out())
            .build();

        tokio::time::sleep(SETTLE).await;
        assert_eq!(rt.engine.start_count(), 0);
        assert_eq!(rt.current().state, SessionState::Uninitialized);

        rt.handle
            .identity_resolved(Identity::new("signed-in"))
            .await
            .unwrap();
        assert!(rt.wait_for_active().await);
        assert_eq!(
            rt.engine.starts.lock().unwrap()[0].0,
            "signed-in".to_string()
        );
    }
}
