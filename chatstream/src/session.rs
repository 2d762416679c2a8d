// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Session record and persistence.
//
// A `ConversationSession` is serialized as a single JSON blob keyed by a
// fixed session key. Writes go through a two-tier `WritePolicy`:
// low-priority writes are coalesced within a short window, state
// transitions force an immediate flush.

use crate::message::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Conversation id
// ---------------------------------------------------------------------------

/// Backend conversation identifier.
///
/// Opaque to the transcript, but the backend accepts it as a large integer,
/// so every value must fit a non-negative `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(i64);

/// Random component scale: ids are `random(8 digits) * 10^10 + (millis mod 10^10)`.
const TIME_MODULUS: i64 = 10_000_000_000;
const RANDOM_UPPER: i64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("conversation id \"{0}\" is not a non-negative 64-bit integer")]
    OutOfRange(String),
}

impl ConversationId {
    /// Build from a raw value. Negative values are rejected.
    pub fn new(value: i64) -> Result<Self, IdError> {
        if value < 0 {
            return Err(IdError::OutOfRange(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Generate a fresh id from 8 random digits and the low 10 digits of
    /// the current millisecond timestamp.
    pub fn generate() -> Self {
        let random_part = rand::thread_rng().gen_range(0..RANDOM_UPPER);
        let time_part = Utc::now().timestamp_millis().rem_euclid(TIME_MODULUS);
        Self::compose(random_part, time_part)
    }

    /// Checked composition; wraps into range instead of overflowing.
    fn compose(random_part: i64, time_part: i64) -> Self {
        let combined = (random_part as i128) * (TIME_MODULUS as i128) + time_part as i128;
        Self((combined.rem_euclid(i64::MAX as i128)) as i64)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| IdError::OutOfRange(trimmed.to_string()))?;
        Self::new(value)
    }
}

// Persisted as a decimal string so no consumer of the blob loses precision.
impl Serialize for ConversationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(i64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Number(n) => ConversationId::new(n).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// The abstract session record shared with durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Fresh session with a newly generated id and an empty transcript.
    pub fn new() -> Self {
        Self::with_id(ConversationId::generate())
    }

    pub fn with_id(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn to_blob(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(blob)?)
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Persistence backends
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session blob is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable storage for session blobs.
///
/// Implementations must be thread-safe (Send + Sync): debounced writes
/// run on a background task.
pub trait SessionPersistence: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError>;

    fn save(&self, key: &str, blob: &str) -> Result<(), PersistError>;
}

/// In-memory persistence backed by `DashMap`.
///
/// Suitable for tests and for runs that should not outlive the process.
#[derive(Default)]
pub struct InMemoryPersistence {
    blobs: DashMap<String, String>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs (for testing).
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl SessionPersistence for InMemoryPersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), PersistError> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

/// Stores each blob as `<dir>/<key>.json`.
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SessionPersistence for FilePersistence {
    fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), PersistError> {
        // Write-then-rename so a crash never leaves a torn blob.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, blob)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Two-tier write policy
// ---------------------------------------------------------------------------

/// Coalesces low-priority writes; `flush` bypasses the window.
///
/// The first `schedule` in a window arms a timer; later calls only replace
/// the snapshot, so the newest one reaches storage when the timer fires.
/// Timer writes run on the blocking pool. Without a tokio runtime (or with
/// a zero window) scheduled writes happen immediately. A snapshot still
/// pending on drop is written synchronously.
pub struct WritePolicy {
    backend: Arc<dyn SessionPersistence>,
    key: String,
    window: Duration,
    /// Held across every save so a timer write can never land after a
    /// newer flush.
    pending: Arc<Mutex<Pending>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Pending {
    /// Newest unwritten snapshot.
    blob: Option<String>,
    /// Window of the timer that will write `blob`. Cleared by the timer
    /// itself before it saves, so a snapshot stored during that save arms
    /// a fresh window.
    armed: Option<u64>,
    next_window: u64,
}

impl WritePolicy {
    pub fn new(backend: Arc<dyn SessionPersistence>, key: impl Into<String>, window: Duration) -> Self {
        Self {
            backend,
            key: key.into(),
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
            timer: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Result<Option<String>, PersistError> {
        self.backend.load(&self.key)
    }

    /// Low-priority write, coalesced within the window.
    pub fn schedule(&self, blob: String) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !self.window.is_zero() => runtime,
            _ => {
                self.flush(&blob);
                return;
            }
        };

        let mut pending = lock(&self.pending);
        pending.blob = Some(blob);
        if pending.armed.is_some() {
            return;
        }
        let window_id = pending.next_window;
        pending.next_window += 1;
        pending.armed = Some(window_id);

        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.pending);
        let key = self.key.clone();
        let window = self.window;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let write = tokio::task::spawn_blocking(move || {
                let mut pending = lock(&shared);
                if pending.armed != Some(window_id) {
                    return;
                }
                pending.armed = None;
                if let Some(blob) = pending.blob.take() {
                    if let Err(e) = backend.save(&key, &blob) {
                        tracing::warn!(key = %key, error = %e, "debounced session write failed");
                    }
                }
            });
            if let Err(e) = write.await {
                tracing::warn!(error = %e, "debounced session write task failed");
            }
        });
        *lock(&self.timer) = Some(handle);
    }

    /// Immediate write. Supersedes any pending snapshot.
    pub fn flush(&self, blob: &str) {
        let mut pending = lock(&self.pending);
        pending.blob = None;
        pending.armed = None;
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        if let Err(e) = self.backend.save(&self.key, blob) {
            tracing::warn!(key = %self.key, error = %e, "session write failed");
        }
    }
}

impl Drop for WritePolicy {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        pending.armed = None;
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        if let Some(blob) = pending.blob.take() {
            if let Err(e) = self.backend.save(&self.key, &blob) {
                tracing::warn!(key = %self.key, error = %e, "final session write failed");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use std::sync::mpsc;

    // ---------------------------------------------------------------
    // ConversationId
    // ---------------------------------------------------------------

    #[test]
    fn generated_ids_are_non_negative_and_fit_i64() {
        for _ in 0..100 {
            let id = ConversationId::generate();
            assert!(id.as_i64() >= 0);
            let parsed: ConversationId = id.to_string().parse().unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn compose_never_overflows() {
        let id = ConversationId::compose(RANDOM_UPPER - 1, TIME_MODULUS - 1);
        assert_eq!(id.as_i64(), 999_999_999_999_999_999);
        let wrapped = ConversationId::compose(i64::MAX, i64::MAX);
        assert!(wrapped.as_i64() >= 0);
    }

    #[test]
    fn parse_rejects_overflow_and_negatives() {
        assert!("9223372036854775807".parse::<ConversationId>().is_ok());
        assert!("9223372036854775808".parse::<ConversationId>().is_err());
        assert!("-5".parse::<ConversationId>().is_err());
        assert!("abc".parse::<ConversationId>().is_err());
    }

    #[test]
    fn id_serializes_as_string_and_accepts_numbers() {
        let id = ConversationId::new(7_391_020_114_511_223_344).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7391020114511223344\"");

        let from_str: ConversationId = serde_json::from_str("\"42\"").unwrap();
        let from_num: ConversationId = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, from_num);
    }

    // ---------------------------------------------------------------
    // Session blob
    // ---------------------------------------------------------------

    #[test]
    fn session_blob_uses_contract_field_names() {
        let mut session = ConversationSession::with_id(ConversationId::new(12).unwrap());
        session.messages.push(Message::user("hi"));
        let blob: serde_json::Value = serde_json::from_str(&session.to_blob().unwrap()).unwrap();

        assert_eq!(blob["conversationId"], "12");
        assert_eq!(blob["messages"][0]["role"], "user");
        assert_eq!(blob["messages"][0]["isStreaming"], false);
        assert!(blob.get("createdAt").is_some());
    }

    #[test]
    fn session_blob_restores() {
        let mut session = ConversationSession::new();
        session.messages.push(Message::user("question"));
        session.messages.push(Message::assistant("answer"));

        let restored = ConversationSession::from_blob(&session.to_blob().unwrap()).unwrap();
        assert_eq!(restored, session);
        assert_eq!(restored.messages[1].role, Role::Assistant);
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        assert!(matches!(
            ConversationSession::from_blob("{not json"),
            Err(PersistError::Serde(_))
        ));
    }

    // ---------------------------------------------------------------
    // Backends
    // ---------------------------------------------------------------

    #[test]
    fn in_memory_backend_round_trip() {
        let backend = InMemoryPersistence::new();
        assert!(backend.load("chatSession").unwrap().is_none());
        backend.save("chatSession", "{}").unwrap();
        assert_eq!(backend.load("chatSession").unwrap().as_deref(), Some("{}"));
        assert_eq!(backend.len(), 1);
        assert!(!backend.is_empty());
    }

    #[test]
    fn file_backend_writes_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilePersistence::new(dir.path().join("sessions")).unwrap();

        assert!(backend.load("chatSession").unwrap().is_none());
        backend.save("chatSession", "{\"a\":1}").unwrap();
        backend.save("chatSession", "{\"a\":2}").unwrap();

        let path = dir.path().join("sessions").join("chatSession.json");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"a\":2}");
        assert_eq!(backend.load("chatSession").unwrap().as_deref(), Some("{\"a\":2}"));
    }

    // ---------------------------------------------------------------
    // WritePolicy
    // ---------------------------------------------------------------

    #[test]
    fn schedule_without_runtime_writes_immediately() {
        let backend = Arc::new(InMemoryPersistence::new());
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(100));
        policy.schedule("v1".to_string());
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_writes_coalesce_within_window() {
        let backend = Arc::new(InMemoryPersistence::new());
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(100));

        policy.schedule("v1".to_string());
        policy.schedule("v2".to_string());
        policy.schedule("v3".to_string());
        assert!(backend.load("k").unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_bypasses_and_cancels_pending_write() {
        let backend = Arc::new(InMemoryPersistence::new());
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(100));

        policy.schedule("stale".to_string());
        policy.flush("fresh");
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("fresh"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_after_the_timer_fired_arm_a_new_window() {
        let backend = Arc::new(InMemoryPersistence::new());
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(100));

        policy.schedule("v1".to_string());
        tokio::time::sleep(Duration::from_millis(150)).await;
        policy.schedule("v2".to_string());
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v1"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v2"));
    }

    /// Blocks its first save until released, reporting when it started.
    struct GatedPersistence {
        inner: InMemoryPersistence,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl SessionPersistence for GatedPersistence {
        fn load(&self, key: &str) -> Result<Option<String>, PersistError> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, blob: &str) -> Result<(), PersistError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.save(key, blob)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_scheduled_during_a_timer_save_gets_its_own_window() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Arc::new(GatedPersistence {
            inner: InMemoryPersistence::new(),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(20));

        policy.schedule("v1".to_string());
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // The timer's save is in flight; this schedule waits for it.
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();
        });
        policy.schedule("v2".to_string());
        releaser.join().unwrap();
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v1"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.load("k").unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_writes_pending_snapshot() {
        let backend = Arc::new(InMemoryPersistence::new());
        let policy = WritePolicy::new(backend.clone(), "k", Duration::from_millis(100));

        policy.schedule("unsaved".to_string());
        drop(policy);

        assert_eq!(backend.load("k").unwrap().as_deref(), Some("unsaved"));
    }
}
