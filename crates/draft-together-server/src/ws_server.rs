// WebSocket server for draft participants.
//
// Each connection runs in its own task: a reader that forwards inbound text
// to the application loop and a writer that drains the connection's bounded
// outbound queue. The application loop never touches sockets directly.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use draft_together_core::draft::DraftId;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Maximum number of server messages queued for one connection. A client
/// that falls this far behind is disconnected by the application loop.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Identifies one participant connection for its lifetime.
pub type ConnId = u64;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A participant finished the handshake for `draft_id`.
    Connected {
        conn_id: ConnId,
        draft_id: DraftId,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// The participant's socket closed.
    Disconnected { conn_id: ConnId },
    /// A text message was received (raw JSON string).
    Message { conn_id: ConnId, text: String },
}

/// Extract the draft id from a request path of the form `/ws/{uuid}`.
pub fn parse_draft_path(path: &str) -> Option<DraftId> {
    let rest = path.strip_prefix("/ws/")?;
    let id = rest.strip_suffix('/').unwrap_or(rest);
    if id.contains('/') {
        return None;
    }
    id.parse().ok()
}

fn bad_request(message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

/// Bind `addr` and serve connections until the listener fails or the
/// application loop goes away.
pub async fn run(addr: &str, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, tx).await
}

/// Accept connections on an already-bound listener.
pub async fn serve(listener: TcpListener, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    let next_conn_id = AtomicU64::new(1);

    loop {
        let (stream, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
        debug!("Accepted TCP connection {conn_id} from {addr}");
        tokio::spawn(handle_connection(stream, addr, conn_id, tx.clone()));
    }

    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: ConnId,
    tx: mpsc::Sender<WsEvent>,
) {
    let addr = addr.to_string();
    let mut draft_id = None;

    let callback = |request: &Request, response: Response| {
        match parse_draft_path(request.uri().path()) {
            Some(id) => {
                draft_id = Some(id);
                Ok(response)
            }
            None => {
                warn!("Rejecting {addr}: bad draft path {}", request.uri().path());
                Err(bad_request("expected /ws/{draft_id} with a UUID draft id"))
            }
        }
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    let Some(draft_id) = draft_id else {
        return;
    };

    let (mut write, read) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);

    if tx
        .send(WsEvent::Connected {
            conn_id,
            draft_id,
            addr: addr.clone(),
            outbound,
        })
        .await
        .is_err()
    {
        return;
    }
    info!("Participant {conn_id} ({addr}) joined draft {draft_id}");

    // Ends when the application loop drops the sender or the socket fails.
    let writer = async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("Send to participant {conn_id} failed: {e}");
                break;
            }
        }
        let _ = write.close().await;
    };

    tokio::select! {
        _ = process_message_stream(read, &tx, conn_id) => {}
        _ = writer => {
            debug!("Outbound queue for participant {conn_id} closed");
        }
    }

    let _ = tx.send(WsEvent::Disconnected { conn_id }).await;
    info!("Participant {conn_id} ({addr}) left draft {draft_id}");
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// Generic over the stream so it can be driven by in-memory streams in tests.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    conn_id: ConnId,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    conn_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Participant {conn_id} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from participant {conn_id}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry nothing for us.
            }
        }
    }
    Ok(())
}
