use rollquest_execution::{EngineLimits, Session};
use rollquest_types::constants::{
    DEFAULT_BALANCE, DEFAULT_HISTORY_LIMIT, MAX_BATCH_SIMULATIONS, MAX_BATCH_TRIALS,
    MAX_CONVERGENCE_TRIALS, MAX_SIMULATION_TRIALS,
};
use rollquest_types::EngineError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const DEFAULT_MAX_SESSIONS: usize = 10_000;
const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 100;
const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 200;
const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 1024 * 1024;
const MAX_SESSION_ID_LEN: usize = 64;

#[derive(Clone, Debug, Serialize)]
pub struct SimulatorConfig {
    /// Seed for the service generator (rolls and unseeded simulations).
    pub seed: Option<u64>,
    pub max_trials: u64,
    pub max_batch_simulations: u64,
    pub max_batch_trials: u64,
    pub max_convergence_trials: u64,
    pub starting_balance: f64,
    pub session_history_limit: Option<usize>,
    pub max_sessions: Option<usize>,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    pub allowed_http_origins: Vec<String>,
    pub allow_http_no_origin: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_trials: MAX_SIMULATION_TRIALS,
            max_batch_simulations: MAX_BATCH_SIMULATIONS,
            max_batch_trials: MAX_BATCH_TRIALS,
            max_convergence_trials: MAX_CONVERGENCE_TRIALS,
            starting_balance: DEFAULT_BALANCE,
            session_history_limit: Some(DEFAULT_HISTORY_LIMIT),
            max_sessions: Some(DEFAULT_MAX_SESSIONS),
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            allowed_http_origins: Vec::new(),
            allow_http_no_origin: false,
        }
    }
}

impl SimulatorConfig {
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_trials: self.max_trials,
            max_batch_simulations: self.max_batch_simulations,
            max_batch_trials: self.max_batch_trials,
            max_convergence_trials: self.max_convergence_trials,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn validate_session_id(id: &str) -> Result<(), EngineError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EngineError::invalid_parameter(format!(
            "session id must be 1-{MAX_SESSION_ID_LEN} characters of [A-Za-z0-9_-]"
        )))
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

struct Entry {
    session: SharedSession,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl Sessions {
    fn touch(&mut self, id: &str) -> Option<SharedSession> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(id).map(|entry| {
            entry.last_used = clock;
            entry.session.clone()
        })
    }

    fn evict_idlest(&mut self) -> Option<String> {
        let id = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&id);
        Some(id)
    }
}

/// Sessions keyed by id. Each session has its own lock so rounds on one session
/// are serialized while other sessions proceed.
///
/// At `max_sessions` the least recently used session is evicted to make room.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    starting_balance: f64,
    history_limit: Option<usize>,
    max_sessions: Option<usize>,
}

impl SessionStore {
    pub fn new(
        starting_balance: f64,
        history_limit: Option<usize>,
        max_sessions: Option<usize>,
    ) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            starting_balance,
            history_limit,
            max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Result<SharedSession, EngineError> {
        validate_session_id(id)?;
        lock(&self.sessions)
            .touch(id)
            .ok_or_else(|| EngineError::NoActiveSession(id.to_string()))
    }

    pub fn get_or_create(&self, id: &str) -> Result<SharedSession, EngineError> {
        validate_session_id(id)?;
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.touch(id) {
            return Ok(session);
        }
        Ok(self.insert(&mut sessions, id.to_string()))
    }

    /// Create a session under a fresh id.
    pub fn create(&self) -> (String, SharedSession) {
        let id = Uuid::new_v4().simple().to_string();
        let mut sessions = lock(&self.sessions);
        let session = self.insert(&mut sessions, id.clone());
        (id, session)
    }

    pub fn remove(&self, id: &str) -> Result<(), EngineError> {
        validate_session_id(id)?;
        lock(&self.sessions)
            .entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NoActiveSession(id.to_string()))
    }

    fn insert(&self, sessions: &mut Sessions, id: String) -> SharedSession {
        if let Some(max) = self.max_sessions {
            while sessions.entries.len() >= max {
                match sessions.evict_idlest() {
                    Some(evicted) => tracing::info!(session_id = %evicted, "session evicted"),
                    None => break,
                }
            }
        }
        sessions.clock += 1;
        let session = Arc::new(Mutex::new(
            Session::new(self.starting_balance).with_history_limit(self.history_limit),
        ));
        sessions.entries.insert(
            id,
            Entry {
                session: session.clone(),
                last_used: sessions.clock,
            },
        );
        session
    }
}
