//! In-process fakes for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use novel_assistant::{
    AssistantGateway, AssistantId, AssistantSpec, GatewayError, MessageRole, Result, RunOutcome,
    ThreadId, ThreadMessage, ToolOutput,
};
use novel_models::Segment;

use crate::delivery::{Delivery, Notice};

/// Default reply of a run when nothing is scripted.
pub const DEFAULT_REPLY: &str = "Продолжение истории.";

#[derive(Default)]
struct FakeState {
    next_thread: u32,
    /// Thread messages, oldest first.
    threads: HashMap<String, Vec<ThreadMessage>>,
    deleted: Vec<String>,
    create_failures: VecDeque<GatewayError>,
    run_script: VecDeque<Result<RunOutcome>>,
    submit_script: VecDeque<Result<RunOutcome>>,
    submitted: Vec<Vec<ToolOutput>>,
    runs: u32,
}

impl FakeState {
    fn thread(&mut self, thread_id: &str) -> Result<&mut Vec<ThreadMessage>> {
        self.threads
            .get_mut(thread_id)
            .ok_or_else(|| GatewayError::ThreadNotFound(thread_id.to_string()))
    }

    fn settle(&mut self, thread_id: &str, outcome: Result<RunOutcome>) -> Result<RunOutcome> {
        if let Ok(RunOutcome::Reply(ref text)) = outcome {
            let thread = self.thread(thread_id)?;
            let id = format!("msg_{}", thread.len() + 1);
            thread.push(ThreadMessage {
                id,
                role: MessageRole::Assistant,
                text: text.clone(),
            });
        }
        outcome
    }
}

/// Scriptable [`AssistantGateway`] keeping threads in memory.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self, err: GatewayError) {
        self.state.lock().unwrap().create_failures.push_back(err);
    }

    pub fn script_run(&self, outcome: Result<RunOutcome>) {
        self.state.lock().unwrap().run_script.push_back(outcome);
    }

    pub fn script_submit(&self, outcome: Result<RunOutcome>) {
        self.state.lock().unwrap().submit_script.push_back(outcome);
    }

    /// Drop a thread on the remote side without the engine knowing.
    pub fn forget_thread(&self, thread_id: &str) {
        self.state.lock().unwrap().threads.remove(thread_id);
    }

    pub fn has_thread(&self, thread_id: &str) -> bool {
        self.state.lock().unwrap().threads.contains_key(thread_id)
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().unwrap().threads.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn runs(&self) -> u32 {
        self.state.lock().unwrap().runs
    }

    pub fn submitted(&self) -> Vec<Vec<ToolOutput>> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// User messages of a thread, oldest first.
    pub fn user_messages(&self, thread_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .threads
            .get(thread_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.role == MessageRole::User)
                    .map(|m| m.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Put an assistant message straight into a thread.
    pub fn push_assistant_message(&self, thread_id: &str, text: &str) {
        let mut state = self.state.lock().unwrap();
        let thread = state.threads.entry(thread_id.to_string()).or_default();
        thread.push(ThreadMessage {
            id: format!("msg_{}", thread.len() + 1),
            role: MessageRole::Assistant,
            text: text.to_string(),
        });
    }
}

#[async_trait]
impl AssistantGateway for FakeGateway {
    async fn create_thread(&self) -> Result<ThreadId> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }
        state.next_thread += 1;
        let thread_id = format!("thread_{}", state.next_thread);
        state.threads.insert(thread_id.clone(), Vec::new());
        Ok(thread_id)
    }

    async fn append_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let thread = state.thread(thread_id)?;
        thread.push(ThreadMessage {
            id: format!("msg_{}", thread.len() + 1),
            role: MessageRole::User,
            text: content.to_string(),
        });
        Ok(())
    }

    async fn run_and_await(&self, thread_id: &str, _assistant_id: &str) -> Result<RunOutcome> {
        let mut state = self.state.lock().unwrap();
        state.runs += 1;
        state.thread(thread_id)?;
        let outcome = state
            .run_script
            .pop_front()
            .unwrap_or_else(|| Ok(RunOutcome::Reply(DEFAULT_REPLY.to_string())));
        state.settle(thread_id, outcome)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        _run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunOutcome> {
        let mut state = self.state.lock().unwrap();
        state.thread(thread_id)?;
        state.submitted.push(outputs);
        let outcome = state
            .submit_script
            .pop_front()
            .unwrap_or_else(|| Ok(RunOutcome::Reply(DEFAULT_REPLY.to_string())));
        state.settle(thread_id, outcome)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deleted.push(thread_id.to_string());
        state
            .threads
            .remove(thread_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::ThreadNotFound(thread_id.to_string()))
    }

    async fn list_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ThreadMessage>> {
        let mut state = self.state.lock().unwrap();
        let thread = state.thread(thread_id)?;
        Ok(thread.iter().rev().take(limit).cloned().collect())
    }

    async fn create_assistant(&self, _spec: &AssistantSpec) -> Result<AssistantId> {
        Ok("asst_fake".to_string())
    }
}

/// [`Delivery`] that records everything it is handed.
#[derive(Default)]
pub struct RecordingDelivery {
    deliveries: Mutex<Vec<Vec<Segment>>>,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Vec<Segment>> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, segments: &[Segment]) {
        self.deliveries.lock().unwrap().push(segments.to_vec());
    }

    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}
