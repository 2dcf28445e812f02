//! In-memory fakes for the pipeline seams (testing only).
//!
//! Provides `ScriptedReasoningService`, `RecordingSleeper` and
//! `MemoryArtifactStore`, which satisfy the trait contracts without network
//! or filesystem access.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ReasoningError, StoreError, UnitKind};
use crate::reasoning::{ReasoningRequest, ReasoningService};
use crate::retry::Sleeper;
use crate::store::ArtifactStore;

type Reply = Result<String, ReasoningError>;

// ---------------------------------------------------------------------------
// ScriptedReasoningService
// ---------------------------------------------------------------------------

/// Reasoning service that answers from per-kind scripts.
///
/// Queued replies for a kind are consumed in order; once a queue is empty
/// the kind's fallback (if any) answers every further call. Every request is
/// recorded.
#[derive(Debug, Default)]
pub struct ScriptedReasoningService {
    queued: Mutex<HashMap<UnitKind, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<UnitKind, Reply>>,
    calls: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedReasoningService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reply for `kind`.
    pub fn with_reply(self, kind: UnitKind, reply: Reply) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(reply);
        self
    }

    /// Answer every unscripted call for `kind` with `reply`.
    pub fn with_fallback(self, kind: UnitKind, reply: Reply) -> Self {
        self.fallback.lock().unwrap().insert(kind, reply);
        self
    }

    pub fn calls(&self) -> Vec<ReasoningRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, kind: UnitKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.kind() == kind)
            .count()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoningService {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let kind = request.kind();
        self.calls.lock().unwrap().push(request.clone());

        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        self.fallback
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| {
                Err(ReasoningError::InvalidResponse(format!(
                    "no scripted reply for {kind}"
                )))
            })
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// Artifact store backed by a `BTreeMap<path, content>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, path: &str) -> Result<String, StoreError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::TestRequest;

    fn test_request() -> ReasoningRequest {
        ReasoningRequest::Test(TestRequest {
            test_identifier: "t".into(),
            failure_type: "Failure".into(),
            failure_message: "boom".into(),
            failure_details: String::new(),
        })
    }

    #[tokio::test]
    async fn test_scripted_replies_then_fallback() {
        let service = ScriptedReasoningService::new()
            .with_reply(UnitKind::Test, Err(ReasoningError::Transport("reset".into())))
            .with_fallback(UnitKind::Test, Ok("{}".into()));

        assert!(service.complete(&test_request()).await.is_err());
        assert_eq!(service.complete(&test_request()).await.unwrap(), "{}");
        assert_eq!(service.complete(&test_request()).await.unwrap(), "{}");
        assert_eq!(service.call_count(UnitKind::Test), 3);
        assert_eq!(service.call_count(UnitKind::Step), 0);
    }

    #[tokio::test]
    async fn test_unscripted_kind_is_invalid_response() {
        let service = ScriptedReasoningService::new();
        assert!(matches!(
            service.complete(&test_request()).await,
            Err(ReasoningError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_list_and_get() {
        let store = MemoryArtifactStore::new();
        store.insert("artifacts/b.log", "b");
        store.insert("artifacts/a.log", "a");
        store.insert("job.json", "{}");

        assert_eq!(
            store.list("artifacts/").await.unwrap(),
            vec!["artifacts/a.log", "artifacts/b.log"]
        );
        assert_eq!(store.get("artifacts/a.log").await.unwrap(), "a");
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
    }
}
