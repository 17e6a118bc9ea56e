//! Server-side session store: high-entropy ids, a per-session typed data
//! bag, a read-once flash bucket, CSRF token issuance/validation, and a
//! background sweep that evicts expired entries. Mirrors the response
//! cache's [`parking_lot::RwLock`]-guarded-map shape rather than
//! introducing a new storage idiom for what is, structurally, another
//! keyed store with a TTL.

use crate::{config::SessionConfig, errors::ValidationError, http::types::Method};
use parking_lot::RwLock;
use rand::RngCore;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    String(String),
    Int(i64),
    Bool(bool),
}

/// A single session's data. Cloned out of the store for the duration of a
/// request rather than held behind the store's lock, so a handler can
/// mutate it freely and hand it back via [`SessionManager::save`].
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    data: HashMap<String, SessionValue>,
    flash: HashMap<String, SessionValue>,
    csrf_token: String,
    expires_at_secs: u64,
    modified: bool,
    is_new: bool,
}

impl Session {
    fn new(id: String, ttl: Duration) -> Self {
        Self {
            id,
            data: HashMap::new(),
            flash: HashMap::new(),
            csrf_token: generate_id(32),
            expires_at_secs: now_secs() + ttl.as_secs(),
            modified: true,
            is_new: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: SessionValue) {
        self.data.insert(key.into(), value);
        self.modified = true;
    }

    pub fn remove(&mut self, key: &str) {
        if self.data.remove(key).is_some() {
            self.modified = true;
        }
    }

    /// Stashes a value for exactly one subsequent read (`get_flash`),
    /// typically used to carry a one-time message across a redirect.
    pub fn set_flash(&mut self, key: impl Into<String>, value: SessionValue) {
        self.flash.insert(key.into(), value);
        self.modified = true;
    }

    /// Reads and removes a flash value; a second call returns `None`.
    pub fn get_flash(&mut self, key: &str) -> Option<SessionValue> {
        let value = self.flash.remove(key);
        if value.is_some() {
            self.modified = true;
        }
        value
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    fn is_expired(&self, at_secs: u64) -> bool {
        self.expires_at_secs <= at_secs
    }
}

pub struct SessionManager {
    config: SessionConfig,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(config: SessionConfig, ttl: Duration) -> Self {
        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Loads the session named by a cookie value, or creates a fresh one
    /// if the id is missing, malformed (wrong length — never trust a
    /// client-supplied id string blindly), or unknown to the store.
    pub fn load(&self, cookie_value: Option<&str>) -> Session {
        if let Some(id) = cookie_value {
            if id.len() == self.config.id_length * 2 {
                let mut sessions = self.sessions.write();
                if let Some(session) = sessions.get(id) {
                    if !session.is_expired(now_secs()) {
                        let mut session = session.clone();
                        session.modified = false;
                        session.is_new = false;
                        return session;
                    }
                    sessions.remove(id);
                }
            }
        }
        Session::new(generate_id(self.config.id_length), self.ttl)
    }

    /// Persists a session back to the store if it was created or modified
    /// this request, returning the `Set-Cookie` header value to emit, if
    /// any.
    pub fn save(&self, session: Session) -> Option<String> {
        let should_write = session.modified || session.is_new;
        let header = should_write.then(|| self.cookie_header(&session.id));
        if should_write {
            self.sessions.write().insert(session.id.clone(), session);
        }
        header
    }

    /// Issues a fresh session id carrying the old session's data across,
    /// then destroys the old id — prevents session fixation across a
    /// privilege change such as login.
    pub fn regenerate(&self, mut session: Session) -> Session {
        let old_id = session.id.clone();
        session.id = generate_id(self.config.id_length);
        session.modified = true;
        session.is_new = true;
        self.sessions.write().remove(&old_id);
        session
    }

    /// Destroys a session outright, returning the cookie-deletion header.
    pub fn invalidate(&self, session: &Session) -> String {
        self.sessions.write().remove(&session.id);
        delete_cookie_header(&self.config)
    }

    pub fn validate_csrf(&self, session: &Session, method: Method, token: Option<&str>) -> Result<(), ValidationError> {
        if is_safe_method(method) {
            return Ok(());
        }
        match token {
            Some(t) if t == session.csrf_token() => Ok(()),
            _ => Err(ValidationError::CsrfFailure),
        }
    }

    /// Sweeps expired sessions from the store. Intended to be driven by a
    /// periodic task at `cleanup_interval_seconds` cadence.
    pub fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    fn cookie_header(&self, id: &str) -> String {
        let mut header = format!("{}={}; Path={}", self.config.cookie_name, id, self.config.path);
        if let Some(domain) = &self.config.domain {
            header.push_str(&format!("; Domain={domain}"));
        }
        if let Some(max_age) = self.config.max_age_seconds {
            header.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.config.secure {
            header.push_str("; Secure");
        }
        if self.config.http_only {
            header.push_str("; HttpOnly");
        }
        header.push_str(&format!("; SameSite={}", self.config.same_site.as_str()));
        header
    }
}

fn is_safe_method(method: Method) -> bool {
    matches!(method, Method::Get | Method::Head | Method::Options)
}

fn delete_cookie_header(config: &SessionConfig) -> String {
    format!("{}=; Path={}; Max-Age=0", config.cookie_name, config.path)
}

fn generate_id(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Periodically sweeps expired sessions out of `manager` until the
/// process shuts down. Intended to be spawned once via `tokio::spawn` at
/// startup.
pub async fn run_cleanup_task(manager: Arc<SessionManager>) {
    let interval = Duration::from_secs(manager.config().cleanup_interval_seconds.max(1));
    loop {
        tokio::time::sleep(interval).await;
        let removed = manager.sweep_expired();
        if removed > 0 {
            tracing::debug!(removed, "swept expired sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default(), Duration::from_secs(3600))
    }

    #[test]
    fn missing_cookie_creates_a_new_session() {
        let manager = manager();
        let session = manager.load(None);
        assert!(session.is_new);
        assert_eq!(session.id.len(), SessionConfig::default().id_length * 2);
    }

    #[test]
    fn wrong_length_id_is_rejected_and_a_fresh_session_issued() {
        let manager = manager();
        let session = manager.load(Some("tooshort"));
        assert!(session.is_new);
    }

    #[test]
    fn save_then_load_round_trips_data() {
        let manager = manager();
        let mut session = manager.load(None);
        session.set("user_id", SessionValue::Int(42));
        let id = session.id.clone();
        let header = manager.save(session);
        assert!(header.is_some());

        let reloaded = manager.load(Some(&id));
        assert!(!reloaded.is_new);
        assert_eq!(reloaded.get("user_id"), Some(&SessionValue::Int(42)));
    }

    #[test]
    fn unmodified_session_emits_no_set_cookie() {
        let manager = manager();
        let mut session = manager.load(None);
        session.set("a", SessionValue::Bool(true));
        let id = session.id.clone();
        manager.save(session);

        let reloaded = manager.load(Some(&id));
        assert!(manager.save(reloaded.clone()).is_none());
        let _ = reloaded;
    }

    #[test]
    fn flash_value_is_readable_exactly_once() {
        let manager = manager();
        let mut session = manager.load(None);
        session.set_flash("notice", SessionValue::String("welcome".to_string()));
        assert_eq!(session.get_flash("notice"), Some(SessionValue::String("welcome".to_string())));
        assert_eq!(session.get_flash("notice"), None);
    }

    #[test]
    fn regenerate_issues_a_new_id_and_destroys_the_old_one() {
        let manager = manager();
        let mut session = manager.load(None);
        session.set("role", SessionValue::String("guest".to_string()));
        let old_id = session.id.clone();
        manager.save(session.clone());

        let regenerated = manager.regenerate(session);
        assert_ne!(regenerated.id, old_id);
        assert_eq!(regenerated.get("role"), Some(&SessionValue::String("guest".to_string())));

        manager.save(regenerated);
        let reloaded = manager.load(Some(&old_id));
        assert!(reloaded.is_new);
    }

    #[test]
    fn csrf_is_bypassed_for_safe_methods_but_enforced_otherwise() {
        let manager = manager();
        let session = manager.load(None);
        assert!(manager.validate_csrf(&session, Method::Get, None).is_ok());
        assert!(manager.validate_csrf(&session, Method::Post, None).is_err());
        assert!(manager.validate_csrf(&session, Method::Post, Some(session.csrf_token())).is_ok());
        assert!(manager.validate_csrf(&session, Method::Post, Some("wrong")).is_err());
    }

    #[test]
    fn sweep_removes_only_expired_sessions() {
        let manager = SessionManager::new(SessionConfig::default(), Duration::from_secs(0));
        let session = manager.load(None);
        manager.save(session);
        assert_eq!(manager.sweep_expired(), 1);
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn invalidate_removes_session_and_returns_delete_cookie_header() {
        let manager = manager();
        let session = manager.load(None);
        let id = session.id.clone();
        manager.save(session.clone());
        let header = manager.invalidate(&session);
        assert!(header.contains("Max-Age=0"));
        let reloaded = manager.load(Some(&id));
        assert!(reloaded.is_new);
    }
}
