use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, trace};
use uuid::Uuid;

use dotchat_types::{Envelope, SystemEvent, display_name};

pub type SessionId = Uuid;

/// What a session's connection task is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Text(Arc<str>),
    /// Close the connection.
    Close,
}

/// How the hub handles one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `presence:join`: name the session, announce it to the others.
    Join(String),
    /// A known application frame: echo to every session, sender included.
    Relay,
    /// Not JSON, unknown `type`, or a kind clients must not originate.
    /// Forwarded verbatim like `Relay`.
    Opaque,
}

impl Route {
    pub fn of(raw: &str) -> Self {
        match Envelope::parse(raw) {
            Ok(Envelope::PresenceJoin { name }) => Self::Join(display_name(name.as_deref())),
            Ok(
                Envelope::Message { .. }
                | Envelope::MessageE2e { .. }
                | Envelope::CryptoPubkey { .. }
                | Envelope::Media { .. }
                | Envelope::MediaE2e { .. },
            ) => Self::Relay,
            Ok(Envelope::System { .. }) | Err(_) => Self::Opaque,
        }
    }
}

/// One live connection as the registry sees it.
#[derive(Debug)]
struct Session {
    /// Set by the first `presence:join`; `None` means no leave notice.
    display_name: Option<String>,
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Owns the live-session registry of one hub instance and fans frames out.
///
/// Connect, join, disconnect and shutdown take the write lock; relays take
/// the read lock. Every fan-out runs while the guard is held, so no frame is
/// ever offered to a session that has already been removed.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new, unnamed session. Returns its id and the receiver the
    /// connection task drains into the socket.
    pub async fn connect(&self) -> (SessionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sessions.write().await.insert(
            id,
            Session {
                display_name: None,
                tx,
            },
        );
        debug!("session {} connected", id);
        (id, rx)
    }

    /// Handle one text frame received from `session_id`.
    pub async fn on_frame(&self, session_id: SessionId, raw: &str) {
        match Route::of(raw) {
            Route::Join(name) => self.join(session_id, name).await,
            Route::Relay => {
                trace!("session {} relaying {} bytes", session_id, raw.len());
                self.broadcast(raw).await;
            }
            Route::Opaque => {
                trace!("session {} forwarding opaque frame ({} bytes)", session_id, raw.len());
                self.broadcast(raw).await;
            }
        }
    }

    async fn join(&self, session_id: SessionId, name: String) {
        let mut sessions = self.inner.sessions.write().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return;
        };
        if let Some(existing) = &session.display_name {
            debug!("session {} already joined as {}, ignoring", session_id, existing);
            return;
        }

        info!("{} joined ({})", name, session_id);
        session.display_name = Some(name.clone());
        let notice = Envelope::system(SystemEvent::Join, name).to_json();
        fan_out(&sessions, notice.into(), Some(session_id));
    }

    /// Send `text` unmodified to every live session.
    pub async fn broadcast(&self, text: &str) {
        let sessions = self.inner.sessions.read().await;
        fan_out(&sessions, text.into(), None);
    }

    /// Remove a session. Announces the leave if the session had joined.
    /// Returns `false` if it was already gone.
    pub async fn disconnect(&self, session_id: SessionId) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        let Some(session) = sessions.remove(&session_id) else {
            return false;
        };

        match session.display_name {
            Some(name) => {
                info!("{} left ({})", name, session_id);
                let notice = Envelope::system(SystemEvent::Leave, name).to_json();
                fan_out(&sessions, notice.into(), None);
            }
            None => debug!("unnamed session {} disconnected", session_id),
        }
        true
    }

    /// Drop every session and ask each connection to close. No leave notices
    /// are sent: there is nobody left to receive them.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            let _ = session.tx.send(Outbound::Close);
        }
        count
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Display names of sessions that have joined.
    pub async fn named_sessions(&self) -> Vec<String> {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .filter_map(|s| s.display_name.clone())
            .collect()
    }
}

/// Offer `text` to every session except `skip`. A failed send only means
/// that session's connection task has already exited; it is skipped and the
/// rest still receive the frame. Returns how many sessions accepted it.
fn fan_out(
    sessions: &HashMap<SessionId, Session>,
    text: Arc<str>,
    skip: Option<SessionId>,
) -> usize {
    let mut delivered = 0;
    for (&id, session) in sessions {
        if Some(id) == skip {
            continue;
        }
        match session.tx.send(Outbound::Text(text.clone())) {
            Ok(()) => delivered += 1,
            Err(_) => trace!("session {} not accepting frames, skipped", id),
        }
    }
    delivered
}
