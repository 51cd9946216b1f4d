//! JSON file-backed session store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use novel_models::{Message, PaymentRecord, Session, SessionId, SessionUpdate};

use crate::atomic::{atomic_write, read_json_optional};
use crate::error::{PersistenceError, Result};
use crate::store::SessionStore;

/// Everything stored for one user, committed as one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    payments: Vec<PaymentRecord>,
}

impl UserRecord {
    /// The session, if it has the given id.
    fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.session.as_ref().filter(|s| &s.id == session_id)
    }

    fn session_mut(&mut self, session_id: &SessionId) -> Result<&mut Session> {
        self.session
            .as_mut()
            .filter(|s| &s.id == session_id)
            .ok_or_else(|| not_found(session_id))
    }

    /// Removes the session and cascades to its messages.
    fn take_session(&mut self) -> Option<Session> {
        self.messages.clear();
        self.session.take()
    }

    fn is_empty(&self) -> bool {
        self.session.is_none() && self.messages.is_empty() && self.payments.is_empty()
    }

    fn validate(&self, user_id: i64) -> Result<()> {
        if let Some(session) = &self.session {
            if session.user_id != user_id {
                return Err(PersistenceError::InvalidData(format!(
                    "session {} belongs to user {}, stored under user {user_id}",
                    session.id, session.user_id
                )));
            }
            if !session.is_consistent() {
                return Err(PersistenceError::InvalidData(format!(
                    "session {} needs payment but is not completed",
                    session.id
                )));
            }
        }
        let session_id = self.session.as_ref().map(|s| &s.id);
        if self.messages.iter().any(|m| Some(&m.session_id) != session_id) {
            return Err(PersistenceError::InvalidData(format!(
                "user {user_id} has messages of a session that is not stored"
            )));
        }
        if self.payments.iter().any(|p| p.user_id != user_id) {
            return Err(PersistenceError::InvalidData(format!(
                "user {user_id} has payments of another user"
            )));
        }
        Ok(())
    }
}

fn not_found(session_id: &SessionId) -> PersistenceError {
    PersistenceError::NotFound {
        kind: "session".to_string(),
        id: session_id.to_string(),
    }
}

type Slot = Arc<Mutex<UserRecord>>;

/// Session store persisted as one JSON file per user.
///
/// Each mutation runs against a copy of the user's record; the copy is
/// validated and written atomically, and only then becomes the live state.
/// A failure at any step leaves both the file and the in-memory state as
/// they were. Writes for different users never wait on each other, and the
/// file I/O runs on the blocking pool.
///
/// ```text
/// state/
/// └── sessions/
///     ├── 42.json     # { "session": {...}, "messages": [...], "payments": [...] }
///     └── 1337.json
/// ```
pub struct JsonSessionStore {
    /// Backing directory. `None` keeps the store in memory only.
    dir: Option<PathBuf>,
    /// Live records by user id.
    users: RwLock<HashMap<i64, Slot>>,
    /// Owner of each stored session.
    index: RwLock<HashMap<SessionId, i64>>,
}

impl JsonSessionStore {
    /// Open a store in the given directory, loading existing records.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let loaded = {
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || load_records(&dir)).await??
        };

        let mut users = HashMap::new();
        let mut index = HashMap::new();
        let mut sessions = 0;
        for (user_id, record) in loaded {
            if let Some(session) = &record.session {
                index.insert(session.id.clone(), user_id);
                sessions += 1;
            }
            users.insert(user_id, Arc::new(Mutex::new(record)));
        }

        info!(
            path = %dir.display(),
            users = users.len(),
            sessions,
            "Opened session store"
        );

        Ok(Self {
            dir: Some(dir),
            users: RwLock::new(users),
            index: RwLock::new(index),
        })
    }

    /// Create a store that never touches the file system.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            users: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// The backing directory, if any.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    async fn existing_slot(&self, user_id: i64) -> Option<Slot> {
        self.users.read().await.get(&user_id).cloned()
    }

    async fn slot(&self, user_id: i64) -> Slot {
        if let Some(slot) = self.existing_slot(user_id).await {
            return slot;
        }
        Arc::clone(self.users.write().await.entry(user_id).or_default())
    }

    async fn owner(&self, session_id: &SessionId) -> Option<i64> {
        self.index.read().await.get(session_id).copied()
    }

    async fn session_slot(&self, session_id: &SessionId) -> Option<Slot> {
        let user_id = self.owner(session_id).await?;
        self.existing_slot(user_id).await
    }

    /// Run a mutation of one user's record as one transaction.
    async fn transact<T, F>(&self, user_id: i64, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut UserRecord) -> Result<T>,
    {
        let slot = self.slot(user_id).await;
        let mut live = slot.lock().await;
        let mut draft = live.clone();

        let value = mutate(&mut draft)?;
        draft.validate(user_id)?;
        self.commit(user_id, &draft).await?;

        let before = live.session.as_ref().map(|s| s.id.clone());
        let after = draft.session.as_ref().map(|s| s.id.clone());
        if before != after {
            let mut index = self.index.write().await;
            if let Some(id) = before {
                index.remove(&id);
            }
            if let Some(id) = after {
                index.insert(id, user_id);
            }
        }

        *live = draft;
        Ok(value)
    }

    /// Write the record to its file, or remove the file once it is empty.
    async fn commit(&self, user_id: i64, record: &UserRecord) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = record_path(dir, user_id);
        let data = if record.is_empty() {
            None
        } else {
            Some(serde_json::to_vec_pretty(record)?)
        };

        tokio::task::spawn_blocking(move || match data {
            Some(data) => atomic_write(&path, &data),
            None => remove_record(&path),
        })
        .await?
    }
}

fn record_path(dir: &Path, user_id: i64) -> PathBuf {
    dir.join(format!("{user_id}.json"))
}

fn remove_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read every `<user_id>.json` record in the directory.
fn load_records(dir: &Path) -> Result<Vec<(i64, UserRecord)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::ReadError {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PersistenceError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        let Some(user_id) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<i64>().ok())
        else {
            warn!(path = %path.display(), "Skipping unrecognized file in session store");
            continue;
        };
        if let Some(record) = read_json_optional::<UserRecord>(&path)? {
            record.validate(user_id)?;
            records.push((user_id, record));
        }
    }
    Ok(records)
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn get(&self, user_id: i64) -> Result<Option<Session>> {
        match self.existing_slot(user_id).await {
            Some(slot) => Ok(slot.lock().await.session.clone()),
            None => Ok(None),
        }
    }

    async fn get_by_id(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let Some(user_id) = self.owner(session_id).await else {
            return Ok(None);
        };
        Ok(self
            .get(user_id)
            .await?
            .filter(|session| &session.id == session_id))
    }

    async fn create(&self, user_id: i64, thread_id: &str) -> Result<Session> {
        let session = self
            .transact(user_id, |record| {
                if record.session.is_some() {
                    return Err(PersistenceError::Conflict(user_id));
                }
                let session = Session::new(user_id, thread_id);
                record.session = Some(session.clone());
                Ok(session)
            })
            .await?;

        debug!(user_id, session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn replace(&self, user_id: i64, thread_id: &str) -> Result<(Session, Option<Session>)> {
        let (session, previous) = self
            .transact(user_id, |record| {
                let previous = record.take_session();
                let session = Session::new(user_id, thread_id);
                record.session = Some(session.clone());
                Ok((session, previous))
            })
            .await?;

        debug!(
            user_id,
            session_id = %session.id,
            replaced = ?previous.as_ref().map(|s| &s.id),
            "Session replaced"
        );
        Ok((session, previous))
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool> {
        let Some(user_id) = self.owner(session_id).await else {
            return Ok(false);
        };
        let removed = self
            .transact(user_id, |record| {
                if record.session(session_id).is_none() {
                    return Ok(false);
                }
                Ok(record.take_session().is_some())
            })
            .await?;
        debug!(session_id = %session_id, removed, "Session deleted");
        Ok(removed)
    }

    async fn update(&self, session_id: &SessionId, update: SessionUpdate) -> Result<Session> {
        let user_id = self
            .owner(session_id)
            .await
            .ok_or_else(|| not_found(session_id))?;
        self.transact(user_id, |record| {
            let session = record.session_mut(session_id)?;
            session.apply(&update);
            Ok(session.clone())
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: &SessionId,
        content: &str,
        is_user: bool,
    ) -> Result<Message> {
        let user_id = self
            .owner(session_id)
            .await
            .ok_or_else(|| not_found(session_id))?;
        self.transact(user_id, |record| {
            if record.session(session_id).is_none() {
                return Err(not_found(session_id));
            }
            let message = Message::new(session_id.clone(), content, is_user);
            record.messages.push(message.clone());
            Ok(message)
        })
        .await
    }

    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        let Some(slot) = self.session_slot(session_id).await else {
            return Ok(Vec::new());
        };
        let record = slot.lock().await;
        if record.session(session_id).is_none() {
            return Ok(Vec::new());
        }
        Ok(record.messages.clone())
    }

    async fn last_assistant_message(&self, session_id: &SessionId) -> Result<Option<Message>> {
        let Some(slot) = self.session_slot(session_id).await else {
            return Ok(None);
        };
        let record = slot.lock().await;
        if record.session(session_id).is_none() {
            return Ok(None);
        }
        Ok(record.messages.iter().rev().find(|m| !m.is_user).cloned())
    }

    async fn record_payment(&self, record: PaymentRecord) -> Result<()> {
        self.transact(record.user_id, |user| {
            user.payments.push(record);
            Ok(())
        })
        .await
    }

    async fn payments(&self, user_id: i64) -> Result<Vec<PaymentRecord>> {
        match self.existing_slot(user_id).await {
            Some(slot) => Ok(slot.lock().await.payments.clone()),
            None => Ok(Vec::new()),
        }
    }
}
