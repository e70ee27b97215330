//! Common test utilities for xavyo-syncrepl integration tests.
//!
//! Provides a capturing sink responder, a recording change sink and a
//! scripted in-memory directory so the supervisor can be exercised without a
//! real LDAP server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use wiremock::{Request, Respond, ResponseTemplate};
use xavyo_syncrepl::{
    async_trait, AttributeMap, AttributeValue, ChangeEvent, ChangeSink, DirectoryConnector,
    DirectorySession, EntryId, SessionError, SessionResult, SyncMessage, SyncSearch,
};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

pub const SINK_PATH: &str = "/private/ldap";

pub fn dn(cn: &str) -> String {
    format!("cn={cn},ou=people,dc=example,dc=com")
}

pub fn attrs(cn: &str, mail: &str) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.insert("cn".to_string(), vec![AttributeValue::from(cn)]);
    map.insert("mail".to_string(), vec![AttributeValue::from(mail)]);
    map
}

pub fn entry(cn: &str, mail: &str) -> SyncMessage {
    SyncMessage::Entry {
        dn: dn(cn),
        attributes: attrs(cn, mail),
        id: EntryId::from(cn),
    }
}

pub fn search() -> SyncSearch {
    SyncSearch {
        base_dn: "ou=people,dc=example,dc=com".to_string(),
        scope: Default::default(),
        attributes: Vec::new(),
        filter: "(objectClass=*)".to_string(),
    }
}

/// Three existing entries followed by the end of the refresh.
pub fn initial_refresh() -> Vec<SyncMessage> {
    vec![
        entry("alice", "alice@example.com"),
        entry("bob", "bob@example.com"),
        entry("carol", "carol@example.com"),
        SyncMessage::RefreshDone,
    ]
}

// ---------------------------------------------------------------------------
// CaptureResponder - for inspecting sink requests
// ---------------------------------------------------------------------------

/// A captured HTTP request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self::with_status(200)
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.requests.lock().unwrap().push(CapturedRequest {
            method: request.method.to_string(),
            body: request.body.clone(),
        });
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink - collects change events in memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeSink for RecordingSink {
    async fn publish(&self, event: ChangeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Scripted directory
// ---------------------------------------------------------------------------

/// How a scripted session ends once its messages are consumed.
pub enum Ending {
    /// The server ends the search.
    Exhausted,
    /// Polling fails.
    Error(SessionError),
    /// Polling never returns.
    Hang,
}

/// A session replaying a fixed list of messages.
pub struct ScriptedSession {
    bind_error: Option<SessionError>,
    messages: VecDeque<SyncMessage>,
    ending: Option<Ending>,
}

impl ScriptedSession {
    pub fn new(messages: Vec<SyncMessage>, ending: Ending) -> Self {
        Self {
            bind_error: None,
            messages: messages.into(),
            ending: Some(ending),
        }
    }

    pub fn failing_bind(error: SessionError) -> Self {
        Self {
            bind_error: Some(error),
            messages: VecDeque::new(),
            ending: Some(Ending::Exhausted),
        }
    }
}

#[async_trait]
impl DirectorySession for ScriptedSession {
    async fn bind(&mut self) -> SessionResult<()> {
        match self.bind_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn start_sync(
        &mut self,
        _search: &SyncSearch,
        cookie: Option<Vec<u8>>,
    ) -> SessionResult<()> {
        assert!(cookie.is_none(), "a new attempt must not resume from a cookie");
        Ok(())
    }

    async fn poll(&mut self) -> SessionResult<Option<SyncMessage>> {
        if let Some(message) = self.messages.pop_front() {
            return Ok(Some(message));
        }
        match self.ending.take() {
            Some(Ending::Error(e)) => Err(e),
            Some(Ending::Hang) => std::future::pending().await,
            Some(Ending::Exhausted) | None => Ok(None),
        }
    }
}

/// One step of the scripted directory.
pub enum Attempt {
    ConnectError(SessionError),
    Session(ScriptedSession),
}

/// Hands out scripted sessions in order. Once the script runs out it requests
/// shutdown and reports the directory as unreachable.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    connects: AtomicU32,
    shutdown: CancellationToken,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>, shutdown: CancellationToken) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            connects: AtomicU32::new(0),
            shutdown,
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryConnector for ScriptedConnector {
    fn endpoint(&self) -> String {
        "ldap://scripted.example.com:389".to_string()
    }

    async fn connect(&self) -> SessionResult<Box<dyn DirectorySession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Session(session)) => Ok(Box::new(session)),
            Some(Attempt::ConnectError(e)) => Err(e),
            None => {
                self.shutdown.cancel();
                Err(SessionError::unreachable(self.endpoint(), "script finished"))
            }
        }
    }
}
