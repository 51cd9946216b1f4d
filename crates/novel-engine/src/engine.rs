//! The novel session engine.
//!
//! Ties the assistant gateway, the session store and the segmenter together:
//! session lifecycle (create, end, payment-gated restart) and the turn
//! protocol (send prompt, await run, execute tools, deliver reply).

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use novel_assistant::{AssistantGateway, GatewayError, RunOutcome, ToolCall, ToolOutput};
use novel_core::{plain_text, scene_number, segment};
use novel_models::{Session, SessionUpdate};
use novel_persistence::SessionStore;

use crate::config::EngineConfig;
use crate::delivery::{Delivery, Notice};
use crate::error::{EngineError, Result};
use crate::locks::UserLocks;
use crate::tools::{error_output, success_output, StoryTool};

/// How many recent thread messages to scan for the name turn and fallbacks.
const HISTORY_LOOKBACK: usize = 10;

/// Thread size right after the kickoff prompt and its reply.
const NAME_TURN_THREAD_LEN: usize = 2;

/// Upper bound on tool-call rounds within one turn.
const MAX_TOOL_ROUNDS: u32 = 5;

/// What the player contributed to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// Opening turn of a fresh session.
    Kickoff,
    /// Free text typed by the player.
    User(String),
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was delivered. `ended` is set if the story finished.
    Delivered { ended: bool },
    /// The turn failed; the player was sent a notice.
    Failed,
}

/// Orchestrates sessions and turns for all users.
pub struct NovelEngine {
    gateway: Arc<dyn AssistantGateway>,
    store: Arc<dyn SessionStore>,
    config: EngineConfig,
    locks: UserLocks,
}

impl NovelEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        gateway: Arc<dyn AssistantGateway>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            locks: UserLocks::new(),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The session of a user, if any.
    pub async fn get_session(&self, user_id: i64) -> Result<Option<Session>> {
        Ok(self.store.get(user_id).await?)
    }

    /// Start a fresh session for a user, replacing any previous one.
    ///
    /// Returns `Ok(None)` when the previous session still waits for payment;
    /// nothing is touched in that case.
    pub async fn create_session(&self, user_id: i64) -> Result<Option<Session>> {
        let _guard = self.locks.acquire(user_id).await;

        if let Some(existing) = self.store.get(user_id).await? {
            if existing.blocks_restart() {
                info!(user_id, session_id = %existing.id, "Restart blocked until payment");
                return Ok(None);
            }
        }

        let thread_id = self.create_thread().await?;

        let (session, previous) = match self.store.replace(user_id, &thread_id).await {
            Ok(pair) => pair,
            Err(err) => {
                error!(user_id, thread_id = %thread_id, error = %err, "Failed to store new session");
                self.discard_thread(&thread_id).await;
                return Err(err.into());
            }
        };

        if let Some(previous) = previous {
            debug!(user_id, session_id = %previous.id, "Superseded previous session");
            self.discard_thread(&previous.thread_id).await;
        }

        info!(user_id, session_id = %session.id, thread_id = %session.thread_id, "Session created");
        Ok(Some(session))
    }

    /// Run one turn and hand the reply to `delivery`.
    ///
    /// Never returns an error: failures are logged and reported to the
    /// player through a [`Notice`].
    pub async fn process_turn(
        &self,
        session: &Session,
        input: TurnInput,
        delivery: &dyn Delivery,
    ) -> TurnOutcome {
        let _guard = self.locks.acquire(session.user_id).await;

        match self.run_turn(session, input, delivery).await {
            Ok(ended) => TurnOutcome::Delivered { ended },
            Err(err) => {
                let notice = match &err {
                    EngineError::SessionCompleted(_) => Notice::StoryCompleted,
                    err if err.is_permission() => Notice::ServiceUnavailable,
                    _ => Notice::ProcessingError,
                };
                error!(
                    user_id = session.user_id,
                    session_id = %session.id,
                    error = %err,
                    ?notice,
                    "Turn failed"
                );
                delivery.notify(notice).await;
                TurnOutcome::Failed
            }
        }
    }

    /// Mark a session finished, drop its thread and optionally tell the player.
    pub async fn end_session(
        &self,
        session: &Session,
        notify: bool,
        delivery: &dyn Delivery,
    ) -> Result<()> {
        let _guard = self.locks.acquire(session.user_id).await;

        self.store
            .update(&session.id, SessionUpdate::complete())
            .await?;
        self.discard_thread(&session.thread_id).await;
        info!(user_id = session.user_id, session_id = %session.id, "Session ended");

        if notify {
            delivery.notify(Notice::StoryCompleted).await;
        }
        Ok(())
    }

    /// The last thing the assistant said, cleaned for display.
    ///
    /// Reads the local history first and falls back to the remote thread.
    /// Remote failures are logged and yield `None`.
    pub async fn get_last_assistant_message(&self, session: &Session) -> Result<Option<String>> {
        if let Some(message) = self.store.last_assistant_message(&session.id).await? {
            return Ok(Some(message.content));
        }

        match self
            .gateway
            .list_messages(&session.thread_id, HISTORY_LOOKBACK)
            .await
        {
            Ok(messages) => Ok(messages
                .into_iter()
                .find(|m| m.is_assistant())
                .map(|m| plain_text(&segment(&m.text)))),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "Failed to read remote history");
                Ok(None)
            }
        }
    }

    async fn run_turn(
        &self,
        session: &Session,
        input: TurnInput,
        delivery: &dyn Delivery,
    ) -> Result<bool> {
        // The row may have moved to a replacement thread since the caller read it.
        let mut session = self
            .store
            .get_by_id(&session.id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session.id.clone()))?;
        if session.is_completed {
            return Err(EngineError::SessionCompleted(session.id));
        }

        let prompt = match input {
            TurnInput::Kickoff => self.config.prompts.kickoff.clone(),
            TurnInput::User(text) => {
                self.store.append_message(&session.id, &text, true).await?;
                if self.is_name_turn(&session).await? {
                    debug!(session_id = %session.id, "Name turn");
                    self.config.prompts.name_turn(&text)
                } else {
                    text
                }
            }
        };

        self.append_with_recovery(&mut session, &prompt).await?;
        let (reply, ended) = self.await_reply(&session).await?;

        let segments = segment(&reply);
        self.store
            .append_message(&session.id, &plain_text(&segments), false)
            .await?;

        if let Some(scene) = scene_number(&reply).filter(|&n| n > session.current_scene) {
            self.store
                .update(&session.id, SessionUpdate::scene(scene))
                .await?;
            debug!(session_id = %session.id, scene, "Scene advanced");
        }

        if ended {
            // Completion waits for the stored final reply.
            self.store
                .update(&session.id, SessionUpdate::complete())
                .await?;
        }

        delivery.deliver(&segments).await;

        if ended {
            self.discard_thread(&session.thread_id).await;
            delivery.notify(Notice::StoryCompleted).await;
        }

        info!(
            user_id = session.user_id,
            session_id = %session.id,
            segments = segments.len(),
            ended,
            "Turn delivered"
        );
        Ok(ended)
    }

    /// The first user answer after the kickoff is the player's name.
    async fn is_name_turn(&self, session: &Session) -> Result<bool> {
        match self
            .gateway
            .list_messages(&session.thread_id, NAME_TURN_THREAD_LEN + 1)
            .await
        {
            Ok(messages) => Ok(messages.len() == NAME_TURN_THREAD_LEN),
            Err(GatewayError::ThreadNotFound(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Append a user message, replacing the thread once if it vanished.
    async fn append_with_recovery(&self, session: &mut Session, prompt: &str) -> Result<()> {
        match self
            .gateway
            .append_user_message(&session.thread_id, prompt)
            .await
        {
            Ok(()) => Ok(()),
            Err(GatewayError::ThreadNotFound(lost)) => {
                warn!(session_id = %session.id, thread_id = %lost, "Thread vanished, replacing");
                let thread_id = self.create_thread().await?;
                match self
                    .store
                    .update(&session.id, SessionUpdate::thread(thread_id.clone()))
                    .await
                {
                    Ok(updated) => *session = updated,
                    Err(err) => {
                        self.discard_thread(&thread_id).await;
                        return Err(err.into());
                    }
                }
                self.gateway
                    .append_user_message(&session.thread_id, prompt)
                    .await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run the assistant, resolving tool calls until it replies.
    ///
    /// Returns the reply and whether the story ended during the run.
    async fn await_reply(&self, session: &Session) -> Result<(String, bool)> {
        let assistant_id = self.config.assistant_id.as_str();
        let mut outcome = self
            .config
            .run_retry
            .run("run", GatewayError::is_run_retryable, || {
                self.gateway.run_and_await(&session.thread_id, assistant_id)
            })
            .await?;

        let mut ended = false;
        let mut rounds = 0;
        loop {
            match outcome {
                RunOutcome::Reply(text) => return Ok((text, ended)),
                RunOutcome::ToolCalls { run_id, calls } => {
                    rounds += 1;
                    if rounds > MAX_TOOL_ROUNDS {
                        return Err(EngineError::ToolLoop(MAX_TOOL_ROUNDS));
                    }

                    let mut outputs = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let (output, finished) = self.execute_tool(session, call);
                        ended |= finished;
                        outputs.push(output);
                    }

                    outcome = self
                        .gateway
                        .submit_tool_outputs(&session.thread_id, &run_id, outputs)
                        .await?;
                }
            }
        }
    }

    /// Execute one tool call. Returns its output and whether the story ended.
    fn execute_tool(&self, session: &Session, call: &ToolCall) -> (ToolOutput, bool) {
        match StoryTool::try_from(call) {
            Ok(StoryTool::EndStory { reason }) => {
                info!(
                    user_id = session.user_id,
                    session_id = %session.id,
                    %reason,
                    "Assistant ended the story"
                );
                (success_output(call), true)
            }
            Err(err) => {
                warn!(session_id = %session.id, tool = %call.name, error = %err, "Rejected tool call");
                (error_output(call, &err), false)
            }
        }
    }

    async fn create_thread(&self) -> Result<String> {
        let thread_id = self
            .config
            .thread_retry
            .run("create_thread", GatewayError::is_transient, || {
                self.gateway.create_thread()
            })
            .await?;
        Ok(thread_id)
    }

    /// Best-effort remote thread deletion.
    async fn discard_thread(&self, thread_id: &str) {
        if let Err(err) = self.gateway.delete_thread(thread_id).await {
            warn!(thread_id, error = %err, "Failed to delete thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use novel_assistant::{RetryPolicy, ToolCall};
    use novel_models::Segment;
    use novel_persistence::JsonSessionStore;

    use crate::testing::{FakeGateway, RecordingDelivery, DEFAULT_REPLY};
    use crate::tools::END_STORY;

    const USER: i64 = 42;

    struct Harness {
        engine: NovelEngine,
        gateway: Arc<FakeGateway>,
        store: Arc<JsonSessionStore>,
        delivery: RecordingDelivery,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(FakeGateway::new());
        let store = Arc::new(JsonSessionStore::in_memory());
        let mut config = EngineConfig::new("asst_test");
        config.thread_retry = RetryPolicy::new(3, Duration::ZERO);
        config.run_retry = RetryPolicy::new(3, Duration::ZERO);
        let engine = NovelEngine::new(gateway.clone(), store.clone(), config);
        Harness {
            engine,
            gateway,
            store,
            delivery: RecordingDelivery::new(),
        }
    }

    fn end_story_call(reason: &str) -> RunOutcome {
        RunOutcome::ToolCalls {
            run_id: "run_1".into(),
            calls: vec![ToolCall::new(
                "call_1",
                END_STORY,
                format!(r#"{{"reason":"{}"}}"#, reason),
            )],
        }
    }

    #[tokio::test]
    async fn test_create_session() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();

        assert_eq!(session.user_id, USER);
        assert!(!session.is_completed && !session.needs_payment);
        assert!(h.gateway.has_thread(&session.thread_id));
        assert_eq!(h.engine.get_session(USER).await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_double_create_replaces_thread() {
        let h = harness();
        let first = h.engine.create_session(USER).await.unwrap().unwrap();
        h.store
            .append_message(&first.id, "старое", false)
            .await
            .unwrap();

        let second = h.engine.create_session(USER).await.unwrap().unwrap();

        assert_ne!(first.thread_id, second.thread_id);
        assert_ne!(first.id, second.id);
        assert!(!h.gateway.has_thread(&first.thread_id));
        assert!(h.gateway.deleted().contains(&first.thread_id));
        assert!(h.store.messages(&first.id).await.unwrap().is_empty());
        assert_eq!(h.engine.get_session(USER).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_create_blocked_until_payment() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.engine
            .end_session(&session, false, &h.delivery)
            .await
            .unwrap();
        let before = h.engine.get_session(USER).await.unwrap().unwrap();
        let threads_before = h.gateway.thread_count();

        assert!(h.engine.create_session(USER).await.unwrap().is_none());

        assert_eq!(h.engine.get_session(USER).await.unwrap(), Some(before));
        assert_eq!(h.gateway.thread_count(), threads_before);
    }

    #[tokio::test]
    async fn test_create_retries_transient_thread_failures() {
        let h = harness();
        h.gateway
            .fail_next_create(GatewayError::Transient("503".into()));
        h.gateway
            .fail_next_create(GatewayError::Transient("503".into()));

        assert!(h.engine.create_session(USER).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_permission_failure_leaves_no_row() {
        let h = harness();
        h.gateway
            .fail_next_create(GatewayError::Permission("region denied".into()));

        let err = h.engine.create_session(USER).await.unwrap_err();
        assert!(err.is_permission());
        assert!(h.engine.get_session(USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kickoff_turn() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.script_run(Ok(RunOutcome::Reply(
            "**СЦЕНА 1: Встреча**\nПривет! [AI отправляет фото: ![cat](https://drive.google.com/file/d/XYZ123/view?usp=sharing)] Как дела?".into(),
        )));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::Kickoff, &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Delivered { ended: false });
        assert_eq!(
            h.delivery.deliveries(),
            vec![vec![
                Segment::text("Привет!"),
                Segment::image("XYZ123"),
                Segment::text("Как дела?"),
            ]]
        );
        assert!(h.delivery.notices().is_empty());
        assert_eq!(
            h.gateway.user_messages(&session.thread_id),
            vec![crate::config::KICKOFF_PROMPT.to_string()]
        );

        // Only the assistant reply is stored for a kickoff.
        let messages = h.store.messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_user);
        assert_eq!(messages[0].content, "Привет!\nКак дела?");

        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert_eq!(stored.current_scene, 1);
    }

    #[tokio::test]
    async fn test_name_turn_then_plain_turn() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.engine
            .process_turn(&session, TurnInput::Kickoff, &h.delivery)
            .await;

        h.engine
            .process_turn(&session, TurnInput::User("Алиса".into()), &h.delivery)
            .await;
        h.engine
            .process_turn(&session, TurnInput::User("Иду налево".into()), &h.delivery)
            .await;

        let sent = h.gateway.user_messages(&session.thread_id);
        assert_eq!(sent.len(), 3);
        assert!(sent[1].starts_with("Теперь представь персонажей"));
        assert!(sent[1].contains("\"Алиса\""));
        assert_eq!(sent[2], "Иду налево");

        // The raw name is what the local history keeps.
        let messages = h.store.messages(&session.id).await.unwrap();
        let user_texts: Vec<_> = messages
            .iter()
            .filter(|m| m.is_user)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(user_texts, vec!["Алиса", "Иду налево"]);
    }

    #[tokio::test]
    async fn test_thread_not_found_is_replaced() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.forget_thread(&session.thread_id);

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("Привет".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Delivered { ended: false });
        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert_ne!(stored.thread_id, session.thread_id);
        assert!(h.gateway.has_thread(&stored.thread_id));
        assert_eq!(h.gateway.user_messages(&stored.thread_id), vec!["Привет"]);
        assert_eq!(
            h.delivery.deliveries(),
            vec![vec![Segment::text(DEFAULT_REPLY)]]
        );
    }

    #[tokio::test]
    async fn test_end_story_tool() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.script_run(Ok(end_story_call("final_scene")));
        h.gateway
            .script_submit(Ok(RunOutcome::Reply("Конец истории.".into())));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("Да".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Delivered { ended: true });
        assert_eq!(
            h.delivery.deliveries(),
            vec![vec![Segment::text("Конец истории.")]]
        );
        assert_eq!(h.delivery.notices(), vec![Notice::StoryCompleted]);

        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert!(stored.is_completed && stored.needs_payment);
        assert!(!h.gateway.has_thread(&session.thread_id));

        let submitted = h.gateway.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0][0].tool_call_id, "call_1");
        assert_eq!(submitted[0][0].output, r#"{"success":true}"#);

        // The final reply is still in the local history.
        assert_eq!(
            h.engine.get_last_assistant_message(&stored).await.unwrap(),
            Some("Конец истории.".into())
        );
    }

    #[tokio::test]
    async fn test_end_story_with_failed_submit_keeps_story_open() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.script_run(Ok(end_story_call("completed")));
        h.gateway.script_submit(Err(GatewayError::RunFailed {
            run_id: "run_1".into(),
            status: "failed".into(),
            detail: None,
        }));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("Да".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.delivery.notices(), vec![Notice::ProcessingError]);

        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert!(!stored.is_completed && !stored.needs_payment);
        assert!(h.gateway.has_thread(&session.thread_id));
        let messages = h.store.messages(&session.id).await.unwrap();
        assert!(messages.iter().all(|m| m.is_user));

        // The player can simply try again.
        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("Да".into()), &h.delivery)
            .await;
        assert_eq!(outcome, TurnOutcome::Delivered { ended: false });
    }

    #[tokio::test]
    async fn test_turn_on_completed_session_is_rejected() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.engine
            .end_session(&session, false, &h.delivery)
            .await
            .unwrap();
        let threads_before = h.gateway.thread_count();

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("ещё".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.delivery.notices(), vec![Notice::StoryCompleted]);
        assert!(h.delivery.deliveries().is_empty());
        assert_eq!(h.gateway.thread_count(), threads_before);

        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert_eq!(stored.thread_id, session.thread_id);
        assert!(stored.needs_payment);
        assert!(h.store.messages(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_answered_with_error() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.script_run(Ok(RunOutcome::ToolCalls {
            run_id: "run_1".into(),
            calls: vec![ToolCall::new("call_9", "roll_dice", "{}")],
        }));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::Kickoff, &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Delivered { ended: false });
        let output: serde_json::Value =
            serde_json::from_str(&h.gateway.submitted()[0][0].output).unwrap();
        assert_eq!(output["success"], false);
        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert!(!stored.is_completed);
    }

    #[tokio::test]
    async fn test_run_retry_exhaustion() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        for _ in 0..3 {
            h.gateway.script_run(Err(GatewayError::RunFailed {
                run_id: "run_x".into(),
                status: "failed".into(),
                detail: None,
            }));
        }

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::User("Привет".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.gateway.runs(), 3);
        assert_eq!(h.delivery.notices(), vec![Notice::ProcessingError]);
        assert!(h.delivery.deliveries().is_empty());

        // Pre-turn row state, plus the persisted user message.
        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert!(!stored.is_completed);
        let messages = h.store.messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_user);
    }

    #[tokio::test]
    async fn test_run_recovers_after_timeout() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.script_run(Err(GatewayError::RunTimeout {
            run_id: "run_x".into(),
            elapsed: Duration::from_secs(90),
        }));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::Kickoff, &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Delivered { ended: false });
        assert_eq!(h.gateway.runs(), 2);
    }

    #[tokio::test]
    async fn test_permission_error_notice() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway
            .script_run(Err(GatewayError::Permission("region denied".into())));

        let outcome = h
            .engine
            .process_turn(&session, TurnInput::Kickoff, &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.gateway.runs(), 1);
        assert_eq!(h.delivery.notices(), vec![Notice::ServiceUnavailable]);
    }

    #[tokio::test]
    async fn test_turn_on_superseded_session_fails() {
        let h = harness();
        let old = h.engine.create_session(USER).await.unwrap().unwrap();
        h.engine.create_session(USER).await.unwrap().unwrap();

        let outcome = h
            .engine
            .process_turn(&old, TurnInput::User("hi".into()), &h.delivery)
            .await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(h.delivery.notices(), vec![Notice::ProcessingError]);
    }

    #[tokio::test]
    async fn test_end_session() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();

        h.engine
            .end_session(&session, true, &h.delivery)
            .await
            .unwrap();

        let stored = h.engine.get_session(USER).await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert!(stored.needs_payment);
        assert!(stored.is_consistent());
        assert!(!h.gateway.has_thread(&session.thread_id));
        assert_eq!(h.delivery.notices(), vec![Notice::StoryCompleted]);
    }

    #[tokio::test]
    async fn test_end_session_silent() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.engine
            .end_session(&session, false, &h.delivery)
            .await
            .unwrap();
        assert!(h.delivery.notices().is_empty());
    }

    #[tokio::test]
    async fn test_last_assistant_message_falls_back_to_thread() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        assert_eq!(
            h.engine.get_last_assistant_message(&session).await.unwrap(),
            None
        );

        h.gateway
            .push_assistant_message(&session.thread_id, "**СЦЕНА 2: Лес**\nТемно.");
        assert_eq!(
            h.engine.get_last_assistant_message(&session).await.unwrap(),
            Some("Темно.".into())
        );

        h.store
            .append_message(&session.id, "Из базы", false)
            .await
            .unwrap();
        assert_eq!(
            h.engine.get_last_assistant_message(&session).await.unwrap(),
            Some("Из базы".into())
        );
    }

    #[tokio::test]
    async fn test_last_assistant_message_remote_failure_is_none() {
        let h = harness();
        let session = h.engine.create_session(USER).await.unwrap().unwrap();
        h.gateway.forget_thread(&session.thread_id);

        assert_eq!(
            h.engine.get_last_assistant_message(&session).await.unwrap(),
            None
        );
    }
}
