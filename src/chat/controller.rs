//! Client-side chat state: the session collection, the current session
//! pointer, settings, and the single in-flight send.
//!
//! Every change to sessions, the current pointer, or settings is written
//! through the [`StateStore`] so a restarted client picks up where it left
//! off. A send is split into [`ChatController::begin_send`] and
//! [`ChatController::complete_send`], joined by a [`RequestToken`]; a
//! completion whose token no longer matches the pending request is dropped.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chat::client::{ChatApi, ClientError};
use crate::chat::model::{
    create_message, create_session, generate_title, ChatSession, ChatSettings, Message, Role,
    SettingsPatch,
};
use crate::chat::store::{StateStore, CURRENT_SESSION_KEY, SESSIONS_KEY, SETTINGS_KEY};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("A message is already being sent")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Request was cancelled")]
    Cancelled,
    #[error("Session {0} not found")]
    SessionNotFound(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

/// Everything needed to perform the outbound call for one send.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub token: RequestToken,
    pub session_id: String,
    pub messages: Vec<Message>,
    pub settings: ChatSettings,
}

#[derive(Debug)]
struct InFlight {
    token: RequestToken,
    session_id: String,
    user_message_id: String,
}

pub struct ChatController<S: StateStore, A: ChatApi> {
    store: S,
    api: A,
    sessions: Vec<ChatSession>,
    current_session_id: Option<String>,
    settings: ChatSettings,
    is_loading: bool,
    error: Option<String>,
    in_flight: Option<InFlight>,
    next_token: u64,
}

impl<S: StateStore, A: ChatApi> ChatController<S, A> {
    pub fn new(store: S, api: A) -> Self {
        let sessions = load_sessions(&store);
        let current_session_id: Option<String> = store.get(CURRENT_SESSION_KEY, None);
        let settings: ChatSettings = store.get(SETTINGS_KEY, ChatSettings::default());

        debug!(sessions = sessions.len(), "loaded chat state");

        Self {
            store,
            api,
            sessions,
            current_session_id,
            settings,
            is_loading: false,
            error: None,
            in_flight: None,
            next_token: 0,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// The stored pointer if it still names a session, otherwise the first
    /// session, otherwise nothing.
    pub fn current_session_id(&self) -> Option<&str> {
        let stored = self.current_session_id.as_deref()?;
        if self.session(stored).is_some() {
            Some(stored)
        } else {
            self.sessions.first().map(|s| s.id.as_str())
        }
    }

    pub fn current_session(&self) -> Option<&ChatSession> {
        self.current_session_id().and_then(|id| self.session(id))
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Session the in-flight request will answer into, if any.
    pub fn pending_session_id(&self) -> Option<&str> {
        self.in_flight.as_ref().map(|f| f.session_id.as_str())
    }

    pub fn create_session(&mut self) -> ChatSession {
        let session = create_session(None);
        self.sessions.insert(0, session.clone());
        self.current_session_id = Some(session.id.clone());
        self.error = None;
        self.persist_sessions();
        self.persist_current();
        info!(session = %session.id, "created session");
        session
    }

    /// Clears the error either way; only moves the pointer when `id` exists.
    pub fn switch_session(&mut self, id: &str) -> bool {
        self.error = None;
        if self.session(id).is_none() {
            warn!(session = id, "ignoring switch to unknown session");
            return false;
        }
        self.current_session_id = Some(id.to_string());
        self.persist_current();
        true
    }

    pub fn delete_session(&mut self, id: &str) -> bool {
        let was_current = self.current_session_id() == Some(id);
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }

        if self.pending_session_id() == Some(id) {
            self.cancel_pending();
        }

        if was_current {
            self.current_session_id = self.sessions.first().map(|s| s.id.clone());
            self.persist_current();
        }
        self.persist_sessions();
        info!(session = id, "deleted session");
        true
    }

    pub fn rename_session(&mut self, id: &str, title: &str) -> Result<(), ChatError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        session.title = title.to_string();
        session.touch();
        self.persist_sessions();
        Ok(())
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.settings.merge(patch);
        self.store.set(SETTINGS_KEY, &self.settings);
    }

    /// Title-underlined transcript of one session.
    pub fn export_chat(&self, id: &str) -> Option<String> {
        self.session(id).map(ChatSession::transcript)
    }

    /// Appends the user's message and opens a request for it.
    ///
    /// Blank content and a send already in flight are rejected before any
    /// state changes.
    pub fn begin_send(&mut self, content: &str) -> Result<PendingRequest, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.is_loading {
            return Err(ChatError::Busy);
        }

        let session_id = match self.current_session_id().map(str::to_string) {
            Some(id) => id,
            None => self.create_session().id,
        };

        let user_message = create_message(Role::User, content);
        let user_message_id = user_message.id.clone();

        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| ChatError::SessionNotFound(session_id.clone()))?;
        if session.messages.is_empty() {
            session.title = generate_title(content);
        }
        session.push_message(user_message);
        let messages = session.messages.clone();
        self.persist_sessions();

        self.is_loading = true;
        self.error = None;

        let token = RequestToken(self.next_token);
        self.next_token += 1;
        self.in_flight = Some(InFlight {
            token,
            session_id: session_id.clone(),
            user_message_id,
        });

        debug!(session = %session_id, messages = messages.len(), "send started");

        Ok(PendingRequest {
            token,
            session_id,
            messages,
            settings: self.settings.clone(),
        })
    }

    /// Applies the outcome of a request opened by [`Self::begin_send`].
    ///
    /// A reply lands in the session that was current when the send began,
    /// even if another session is on screen now.
    pub fn complete_send(
        &mut self,
        token: RequestToken,
        result: Result<String, ClientError>,
    ) -> Result<(), ChatError> {
        let in_flight = match self.in_flight.take() {
            Some(f) if f.token == token => f,
            other => {
                self.in_flight = other;
                debug!(?token, "dropping completion for a cancelled request");
                return Err(ChatError::Cancelled);
            }
        };
        self.is_loading = false;

        match result {
            Ok(reply) => {
                let Some(session) = self.sessions.iter_mut().find(|s| s.id == in_flight.session_id) else {
                    warn!(session = %in_flight.session_id, "reply arrived for a session that no longer exists");
                    return Err(ChatError::SessionNotFound(in_flight.session_id));
                };

                let user_message = session
                    .messages
                    .iter()
                    .position(|m| m.id == in_flight.user_message_id)
                    .map(|i| session.messages.remove(i));
                if let Some(user_message) = user_message {
                    session.messages.push(user_message);
                }
                session.push_message(create_message(Role::Assistant, reply));
                self.persist_sessions();
                Ok(())
            }
            Err(e) => {
                warn!(session = %in_flight.session_id, error = %e, "send failed");
                self.error = Some(e.to_string());
                Err(ChatError::Client(e))
            }
        }
    }

    /// Drops the in-flight request. Its user message stays; a later
    /// completion for it is ignored.
    pub fn cancel_pending(&mut self) -> bool {
        match self.in_flight.take() {
            Some(f) => {
                info!(session = %f.session_id, "cancelled pending request");
                self.is_loading = false;
                true
            }
            None => false,
        }
    }

    /// Appends a user message, calls the relay, and appends its reply.
    pub async fn send_message(&mut self, content: &str) -> Result<(), ChatError> {
        let pending = self.begin_send(content)?;
        let result = self.api.send(&pending.messages, &pending.settings).await;
        self.complete_send(pending.token, result)
    }

    fn persist_sessions(&self) {
        self.store.set(SESSIONS_KEY, &self.sessions);
    }

    fn persist_current(&self) {
        self.store.set(CURRENT_SESSION_KEY, &self.current_session_id);
    }
}

/// Sessions are parsed one by one so a single malformed entry does not take
/// the whole history with it.
fn load_sessions<S: StateStore>(store: &S) -> Vec<ChatSession> {
    let raw: Vec<serde_json::Value> = store.get(SESSIONS_KEY, Vec::new());
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<ChatSession>(value) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "skipping unreadable stored session");
                None
            }
        })
        .collect()
}
