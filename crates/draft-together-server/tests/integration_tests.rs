// Integration tests for the Draft Together server.
//
// These exercise the subsystems together through the library crate's public
// API: catalog ingestion from fixture files into the database, and live
// websocket sessions running against the real accept loop and app loop.

use std::sync::Arc;
use std::time::Duration;

use draft_together_core::champion::{Catalog, ChampionId, ChampionRole};
use draft_together_core::draft::{Draft, DraftId, DraftUpdate, PositionKey, Team};
use draft_together_core::protocol::{ClientMessage, ServerMessage};
use draft_together_server::app::{self, AppState};
use draft_together_server::catalog::{self, CatalogSource, FileSource, RatesData};
use draft_together_server::db::Database;
use draft_together_server::ws_server;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the package root, which is the cwd
/// for `cargo test`).
const FIXTURES: &str = "tests/fixtures";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("{FIXTURES}/{name}")).unwrap()
}

struct Server {
    port: u16,
    db: Arc<Database>,
    stop: oneshot::Sender<()>,
    app: JoinHandle<anyhow::Result<()>>,
    ws: JoinHandle<anyhow::Result<()>>,
}

impl Server {
    async fn start(db: Arc<Database>, catalog: Catalog) -> Server {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (ws_tx, ws_rx) = mpsc::channel(64);
        let (_catalog_tx, catalog_rx) = mpsc::channel(1);
        let (stop, stop_rx) = oneshot::channel::<()>();

        let ws = tokio::spawn(ws_server::serve(listener, ws_tx));
        let state = AppState::new(Arc::clone(&db), catalog);
        let app = tokio::spawn(app::run(
            ws_rx,
            catalog_rx,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_secs(3600),
            state,
        ));

        Server {
            port,
            db,
            stop,
            app,
            ws,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{path}", self.port)
    }

    async fn join(&self, draft_id: DraftId) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(self.url(&format!("/ws/{draft_id}")))
            .await
            .unwrap();
        client
    }

    async fn shutdown(self) -> Arc<Database> {
        let _ = self.stop.send(());
        self.app.await.unwrap().unwrap();
        self.ws.abort();
        self.db
    }
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn recv_state(client: &mut Client) -> Draft {
    match recv(client).await {
        ServerMessage::DraftState { payload } => payload,
        other => panic!("expected DRAFT_STATE, got {other:?}"),
    }
}

async fn send(client: &mut Client, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).unwrap();
    client.send(Message::Text(text.into())).await.unwrap();
}

fn place(champion_id: i32, key: &str) -> ClientMessage {
    ClientMessage::DraftUpdate {
        payload: DraftUpdate::new(ChampionId(champion_id), key.parse().unwrap()),
    }
}

async fn snapshot_catalog(db: &Database) -> Catalog {
    let source = FileSource::new(format!("{FIXTURES}/catalog.json"));
    catalog::refresh(&source, db).await.unwrap().unwrap()
}

// ===========================================================================
// Catalog ingestion
// ===========================================================================

#[test]
fn data_dragon_fixture_with_play_rates() {
    let champions = catalog::parse_champion_full(
        &fixture("championFull.json"),
        "https://ddragon.leagueoflegends.com",
        "14.20.1",
    )
    .unwrap();
    let rates: RatesData = serde_json::from_str(&fixture("championrates.json")).unwrap();

    let db = Database::open(":memory:").unwrap();
    db.upsert_champions(&champions).unwrap();
    let updated = db
        .update_positions(&catalog::positions_from_rates(&rates, 0.1))
        .unwrap();
    assert_eq!(updated, 2);

    let catalog = Catalog::new(db.load_champions().unwrap());
    assert_eq!(catalog.len(), 3);

    let ahri = catalog.get(ChampionId(103)).unwrap();
    assert_eq!(ahri.positions, vec![ChampionRole::Mid]);
    assert_eq!(
        ahri.default_skin_image_path,
        "https://ddragon.leagueoflegends.com/cdn/14.20.1/img/champion/Ahri.png"
    );

    let fiddle = catalog.by_riot_id("Fiddlesticks").unwrap();
    assert_eq!(fiddle.positions, vec![ChampionRole::Jungle, ChampionRole::Support]);
    assert_eq!(
        fiddle.centered_default_skin_image_path,
        "https://ddragon.leagueoflegends.com/cdn/img/champion/centered/FiddleSticks_0.jpg"
    );

    // Pyke has no play-rate entry in the fixture.
    assert!(catalog.get(ChampionId(555)).unwrap().positions.is_empty());
}

#[tokio::test]
async fn snapshot_refresh_persists_catalog() {
    let db = Database::open(":memory:").unwrap();
    let source = FileSource::new(format!("{FIXTURES}/catalog.json"));
    assert_eq!(source.latest_version().await.unwrap(), "14.20.1");

    let imported = catalog::refresh(&source, &db).await.unwrap().unwrap();
    assert_eq!(imported.len(), 3);
    assert!(imported.by_riot_id("Thresh").is_some());
    assert_eq!(catalog::refresh_positions(&source, &db).await.unwrap(), 3);

    // Same version again: nothing to do.
    assert!(catalog::refresh(&source, &db).await.unwrap().is_none());

    let stored = catalog::load_stored(&db).unwrap();
    assert_eq!(stored.version(), Some("14.20.1"));
    let resolved = stored.resolve(&[Some(ChampionId(412)), None, Some(ChampionId(1)), None, None]);
    assert_eq!(resolved[0].as_ref().map(|c| c.name.as_str()), Some("Thresh"));
    assert!(resolved[1].is_none());
    assert!(resolved[2].is_none());
}

// ===========================================================================
// Live websocket sessions
// ===========================================================================

#[tokio::test]
async fn participants_share_a_draft_over_websocket() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let catalog = snapshot_catalog(&db).await;
    let server = Server::start(db, catalog).await;

    let draft_id = DraftId::new_random();
    let mut blue = server.join(draft_id).await;
    assert_eq!(recv_state(&mut blue).await, Draft::default());
    let mut red = server.join(draft_id).await;
    assert_eq!(recv_state(&mut red).await, Draft::default());
    let mut bystander = server.join(DraftId::new_random()).await;
    recv_state(&mut bystander).await;

    send(&mut blue, &place(266, "BlueBan1")).await;
    let expected = PositionKey::ban(Team::Blue, 0).unwrap();
    assert_eq!(recv_state(&mut blue).await.get(expected), Some(ChampionId(266)));
    assert_eq!(recv_state(&mut red).await.get(expected), Some(ChampionId(266)));

    // Red tries to take the banned champion: only Red hears about it.
    send(&mut red, &place(266, "Red1")).await;
    match recv(&mut red).await {
        ServerMessage::Error { payload } => assert!(payload.message.contains("BlueBan1")),
        other => panic!("expected ERROR, got {other:?}"),
    }

    send(&mut red, &place(412, "Red1")).await;
    assert_eq!(recv_state(&mut blue).await.red_champions[0], Some(ChampionId(412)));
    assert_eq!(recv_state(&mut red).await.red_champions[0], Some(ChampionId(412)));

    send(&mut bystander, &ClientMessage::RequestChampions).await;
    match recv(&mut bystander).await {
        ServerMessage::Champions { payload } => assert_eq!(payload.len(), 3),
        other => panic!("expected CHAMPIONS, got {other:?}"),
    }

    let db = server.shutdown().await;
    let stored = db.load_draft(&draft_id).unwrap().unwrap();
    assert_eq!(stored.blue_bans[0], Some(ChampionId(266)));
    assert_eq!(stored.red_champions[0], Some(ChampionId(412)));
}

#[tokio::test]
async fn draft_survives_everyone_leaving() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let catalog = snapshot_catalog(&db).await;
    let server = Server::start(db, catalog).await;

    let draft_id = DraftId::new_random();
    let mut first = server.join(draft_id).await;
    recv_state(&mut first).await;
    send(&mut first, &place(103, "Blue3")).await;
    recv_state(&mut first).await;
    first.close(None).await.unwrap();

    // The last participant leaving writes the draft out; poll until it lands.
    let mut stored = None;
    for _ in 0..50 {
        stored = server.db.load_draft(&draft_id).unwrap();
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored.unwrap().blue_champions[2], Some(ChampionId(103)));

    let mut second = server.join(draft_id).await;
    let restored = recv_state(&mut second).await;
    assert_eq!(restored.blue_champions[2], Some(ChampionId(103)));

    server.shutdown().await;
}

#[tokio::test]
async fn handshake_rejects_paths_without_a_draft_id() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let server = Server::start(db, Catalog::default()).await;

    for path in ["/ws/not-a-uuid", "/", "/draft"] {
        match tokio_tungstenite::connect_async(server.url(path)).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 400, "path {path}");
            }
            Err(e) => panic!("expected HTTP 400 for {path}, got {e}"),
            Ok(_) => panic!("handshake for {path} should have been refused"),
        }
    }

    server.shutdown().await;
}

#[tokio::test]
async fn updates_rejected_until_catalog_loaded() {
    let db = Arc::new(Database::open(":memory:").unwrap());
    let server = Server::start(db, Catalog::default()).await;

    let mut client = server.join(DraftId::new_random()).await;
    recv_state(&mut client).await;
    send(&mut client, &place(103, "Blue1")).await;
    match recv(&mut client).await {
        ServerMessage::Error { payload } => assert!(payload.message.contains("103")),
        other => panic!("expected ERROR, got {other:?}"),
    }

    server.shutdown().await;
}
