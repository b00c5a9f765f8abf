// Application state and orchestration logic.
//
// The central event loop owns every live draft session. It receives
// participant events from the WebSocket server and catalog refreshes from the
// refresh job, applies updates, fans out snapshots to the participants of the
// affected draft, and periodically flushes changed drafts to SQLite.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use draft_together_core::champion::Catalog;
use draft_together_core::draft::{Draft, DraftError, DraftId};
use draft_together_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::catalog::CatalogEvent;
use crate::db::Database;
use crate::ws_server::{ConnId, WsEvent};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A draft held in memory while at least one participant is connected.
#[derive(Debug, Default)]
pub struct Session {
    pub draft: Draft,
    pub participants: HashSet<ConnId>,
    /// Changed since the last write to the database.
    pub dirty: bool,
}

#[derive(Debug)]
struct Participant {
    draft_id: DraftId,
    outbound: mpsc::Sender<String>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub db: Arc<Database>,
    pub catalog: Catalog,
    pub sessions: HashMap<DraftId, Session>,
    connections: HashMap<ConnId, Participant>,
}

impl AppState {
    pub fn new(db: Arc<Database>, catalog: Catalog) -> Self {
        AppState {
            db,
            catalog,
            sessions: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    pub fn session(&self, draft_id: &DraftId) -> Option<&Session> {
        self.sessions.get(draft_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Find the session in memory, else restore it from the database, else
    /// start an empty one. A stored draft that cannot be read is an error;
    /// no session is created for it.
    fn load_or_create(&mut self, draft_id: DraftId) -> anyhow::Result<&mut Session> {
        if !self.sessions.contains_key(&draft_id) {
            let draft = match self
                .db
                .load_draft(&draft_id)
                .with_context(|| format!("failed to load draft {draft_id}"))?
            {
                Some(draft) => {
                    info!("Restored draft {draft_id} from database");
                    let duplicates = draft.duplicate_champions();
                    if !duplicates.is_empty() {
                        warn!("Restored draft {draft_id} uses champions more than once: {duplicates:?}");
                    }
                    draft
                }
                None => {
                    info!("Starting new draft {draft_id}");
                    Draft::default()
                }
            };
            self.sessions.insert(
                draft_id,
                Session {
                    draft,
                    ..Session::default()
                },
            );
        }
        Ok(self.sessions.entry(draft_id).or_default())
    }

    pub fn handle_connected(
        &mut self,
        conn_id: ConnId,
        draft_id: DraftId,
        outbound: mpsc::Sender<String>,
    ) {
        let session = match self.load_or_create(draft_id) {
            Ok(session) => session,
            Err(e) => {
                error!("Refusing participant {conn_id}: {e:#}");
                // The participant is never registered; dropping `outbound`
                // closes the socket once the error is written.
                let msg = ServerMessage::error(format!("draft {draft_id} could not be loaded"));
                match msg.to_json() {
                    Ok(text) => {
                        let _ = outbound.try_send(text);
                    }
                    Err(e) => error!("Failed to serialize server message: {e}"),
                }
                return;
            }
        };
        session.participants.insert(conn_id);
        let snapshot = ServerMessage::DraftState {
            payload: session.draft.clone(),
        };

        self.connections
            .insert(conn_id, Participant { draft_id, outbound });
        debug!(
            "Draft {draft_id} now has {} participant(s)",
            self.sessions
                .get(&draft_id)
                .map_or(0, |s| s.participants.len())
        );

        self.send_to(conn_id, &snapshot);
    }

    pub fn handle_disconnected(&mut self, conn_id: ConnId) {
        self.drop_connection(conn_id);
    }

    /// Handle an incoming message (JSON from a participant).
    pub fn handle_message(&mut self, conn_id: ConnId, text: &str) {
        let Some(draft_id) = self.connections.get(&conn_id).map(|p| p.draft_id) else {
            debug!("Message from unknown participant {conn_id} ignored");
            return;
        };

        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to parse message from participant {conn_id}: {e}");
                self.send_to(conn_id, &ServerMessage::error(format!("invalid message: {e}")));
                return;
            }
        };

        match msg {
            ClientMessage::DraftUpdate { payload } => {
                let Some(session) = self.sessions.get_mut(&draft_id) else {
                    debug!("Participant {conn_id} has no session, update ignored");
                    return;
                };
                let result = if self.catalog.contains(payload.champion_id) {
                    session.draft.apply(&payload).map(|()| session.dirty = true)
                } else {
                    Err(DraftError::UnknownChampion(payload.champion_id))
                };

                match result {
                    Ok(()) => {
                        debug!(
                            "Draft {draft_id}: champion {} placed at {}",
                            payload.champion_id, payload.position
                        );
                        self.broadcast_state(draft_id);
                    }
                    Err(e) => {
                        info!("Rejected update from participant {conn_id}: {e}");
                        self.send_to(conn_id, &ServerMessage::error(e.to_string()));
                    }
                }
            }
            ClientMessage::ClearSlot { payload } => {
                let Some(session) = self.sessions.get_mut(&draft_id) else {
                    debug!("Participant {conn_id} has no session, clear ignored");
                    return;
                };
                if let Some(previous) = session.draft.clear(payload) {
                    session.dirty = true;
                    debug!(
                        "Draft {draft_id}: cleared {} (was {previous})",
                        payload.position_key()
                    );
                    self.broadcast_state(draft_id);
                }
            }
            ClientMessage::RequestChampions => {
                let champions = self.catalog.champions();
                self.send_to(conn_id, &ServerMessage::Champions { payload: champions });
            }
            ClientMessage::Heartbeat => {
                trace!("Heartbeat from participant {conn_id}");
            }
        }
    }

    pub fn handle_catalog_event(&mut self, event: CatalogEvent) {
        match event {
            CatalogEvent::Refreshed(catalog) => {
                info!(
                    "Champion catalog replaced: {} champions, version {}",
                    catalog.len(),
                    catalog.version().unwrap_or("unknown")
                );
                self.catalog = catalog;
            }
        }
    }

    /// Write every dirty session to the database. Returns how many were
    /// written; sessions that fail stay dirty for the next attempt. Sessions
    /// left without participants are evicted once they are saved.
    pub fn flush_dirty(&mut self) -> usize {
        let mut flushed = 0;
        for (draft_id, session) in self.sessions.iter_mut().filter(|(_, s)| s.dirty) {
            match self.db.save_draft(draft_id, &session.draft) {
                Ok(()) => {
                    session.dirty = false;
                    flushed += 1;
                }
                Err(e) => error!("Failed to save draft {draft_id}: {e:#}"),
            }
        }
        if flushed > 0 {
            debug!("Flushed {flushed} draft(s) to database");
        }

        self.sessions.retain(|draft_id, session| {
            let keep = session.dirty || !session.participants.is_empty();
            if !keep {
                info!("Draft {draft_id} saved after its participants left, evicted");
            }
            keep
        });
        flushed
    }

    fn broadcast_state(&mut self, draft_id: DraftId) {
        let Some(session) = self.sessions.get(&draft_id) else {
            return;
        };
        let msg = ServerMessage::DraftState {
            payload: session.draft.clone(),
        };
        let recipients: Vec<ConnId> = session.participants.iter().copied().collect();
        for conn_id in recipients {
            self.send_to(conn_id, &msg);
        }
    }

    /// Queue a message for one participant. A participant whose queue is
    /// full or closed is dropped.
    fn send_to(&mut self, conn_id: ConnId, msg: &ServerMessage) {
        let text = match msg.to_json() {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to serialize server message: {e}");
                return;
            }
        };
        let Some(participant) = self.connections.get(&conn_id) else {
            return;
        };
        match participant.outbound.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Participant {conn_id} is not keeping up, disconnecting");
                self.drop_connection(conn_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Participant {conn_id} outbound queue closed");
                self.drop_connection(conn_id);
            }
        }
    }

    /// Forget a participant. The last one out flushes and evicts the draft.
    fn drop_connection(&mut self, conn_id: ConnId) {
        let Some(participant) = self.connections.remove(&conn_id) else {
            return;
        };
        let draft_id = participant.draft_id;
        let Some(session) = self.sessions.get_mut(&draft_id) else {
            return;
        };
        session.participants.remove(&conn_id);
        if !session.participants.is_empty() {
            return;
        }

        if session.dirty {
            if let Err(e) = self.db.save_draft(&draft_id, &session.draft) {
                error!("Failed to save draft {draft_id}, keeping it in memory: {e:#}");
                return;
            }
        }
        debug!("Final state of draft {draft_id}:\n{}", session.draft.display());
        self.sessions.remove(&draft_id);
        info!("Draft {draft_id} has no participants left, evicted");
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens with `tokio::select!` for participant events, catalog refreshes,
/// the flush tick and `shutdown`. Dirty drafts are flushed before returning.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut catalog_rx: mpsc::Receiver<CatalogEvent>,
    shutdown: impl Future<Output = ()>,
    flush_interval: Duration,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");
    tokio::pin!(shutdown);

    // Stop polling the catalog channel once the refresh job is gone so
    // tokio::select! never spins on it.
    let mut catalog_open = true;

    let mut flush_tick = tokio::time::interval(flush_interval);
    // The first tick completes immediately.
    flush_tick.tick().await;

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { conn_id, draft_id, addr, outbound }) => {
                        debug!("Participant {conn_id} from {addr} connected to {draft_id}");
                        state.handle_connected(conn_id, draft_id, outbound);
                    }
                    Some(WsEvent::Disconnected { conn_id }) => {
                        state.handle_disconnected(conn_id);
                    }
                    Some(WsEvent::Message { conn_id, text }) => {
                        state.handle_message(conn_id, &text);
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            catalog_event = catalog_rx.recv(), if catalog_open => {
                match catalog_event {
                    Some(event) => state.handle_catalog_event(event),
                    None => {
                        info!("Catalog channel closed");
                        catalog_open = false;
                    }
                }
            }

            _ = flush_tick.tick() => {
                state.flush_dirty();
            }

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let flushed = state.flush_dirty();
    info!("Application event loop exiting, flushed {flushed} draft(s)");
    Ok(())
}
