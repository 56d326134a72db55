//! End-to-end checks over real HTTP: a server on an ephemeral port and devices that
//! talk to it the same way the browser clients do.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use waypoint_core::{FieldName, FieldUpdate, FieldValue, SessionCode, SessionFields};
use waypoint_road::config::Config;
use waypoint_road::storage::{MemoryStore, RedisStore, SharedStore};
use waypoint_sync::{DeviceSession, LocalCache, WaypointClient};

const POLL: Duration = Duration::from_millis(200);

async fn start_server(store: SharedStore) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Config::default();
    let task = tokio::spawn(async move {
        waypoint_road::serve(listener, store, &config, None)
            .await
            .unwrap();
    });
    (addr, task)
}

async fn memory_server() -> (WaypointClient, JoinHandle<()>) {
    let store: SharedStore = Arc::new(MemoryStore::new(Duration::from_secs(60)));
    let (addr, task) = start_server(store).await;
    (WaypointClient::new(format!("http://{addr}")), task)
}

fn device(client: &WaypointClient) -> DeviceSession {
    DeviceSession::with_interval(Arc::new(client.clone()), LocalCache::new(), POLL)
}

async fn wait_for<F>(cache: &LocalCache, mut done: F)
where
    F: FnMut(&SessionFields) -> bool,
{
    for _ in 0..50 {
        if done(&cache.fields().await) {
            return;
        }
        tokio::time::sleep(POLL / 4).await;
    }
    panic!("cache never reached the expected state: {:?}", cache.fields().await);
}

#[test_timeout::tokio_timeout_test(30)]
async fn host_and_player_see_each_others_writes() {
    let (client, server) = memory_server().await;
    let session = SessionCode::parse("ABCD1234").unwrap();

    let host = device(&client);
    let player = device(&client);
    host.bind(session.clone()).await;
    player.bind(session.clone()).await;

    host.record(FieldName::Started, true)
        .await
        .unwrap()
        .await
        .unwrap();
    wait_for(player.cache(), |fields| fields.flag(&FieldName::Started)).await;

    player
        .record(FieldName::Token1, "C")
        .await
        .unwrap()
        .await
        .unwrap();
    wait_for(host.cache(), |fields| {
        fields.text(&FieldName::Token1) == Some("C")
    })
    .await;
    assert!(host.cache().flag(&FieldName::Started).await);

    let record = client.fetch_session(&session).await.unwrap();
    assert!(record.flag(&FieldName::Started));
    assert_eq!(record.text(&FieldName::Token1), Some("C"));

    host.unbind().await;
    player.unbind().await;
    server.abort();
}

#[test_timeout::tokio_timeout_test(30)]
async fn snapshot_lands_whole_when_racing_a_field_write() {
    let (client, server) = memory_server().await;
    let session = SessionCode::parse("RACE2345").unwrap();

    let mut snapshot = SessionFields::new();
    snapshot.insert("x", 1i64);
    snapshot.insert("y", 2i64);
    let snapshot = FieldUpdate::snapshot(session.clone(), snapshot);
    let field = FieldUpdate::field(session.clone(), "x", 99i64);

    let (a, b) = tokio::join!(client.push(&snapshot), client.push(&field));
    a.unwrap();
    b.unwrap();

    let record = client.fetch_session(&session).await.unwrap();
    let x = record.get(&"x".into()).cloned();
    assert!(
        x == Some(FieldValue::from(1i64)) || x == Some(FieldValue::from(99i64)),
        "unexpected x: {x:?}"
    );
    assert_eq!(record.get(&"y".into()), Some(&FieldValue::from(2i64)));
    server.abort();
}

#[test_timeout::tokio_timeout_test(30)]
async fn invalid_requests_are_rejected_without_writing() {
    let (client, server) = memory_server().await;
    let session = SessionCode::parse("ABCD1234").unwrap();

    let err = client
        .post_progress(&session, "   ", &json!(true))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid key parameter"), "{err}");

    let err = client
        .post_progress(&session, "__stateSnapshot", &json!({ "": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, waypoint_sync::ClientError::Rejected { .. }));

    assert!(client.fetch_session(&session).await.unwrap().is_empty());
    server.abort();
}

/// Runs the two-device scenario against a real Redis when `WAYPOINT_TEST_REDIS_URL`
/// is set (for example `redis://127.0.0.1:6379`); otherwise the test is a no-op.
#[test_timeout::tokio_timeout_test(30)]
async fn redis_store_round_trip_when_available() {
    let Ok(url) = std::env::var("WAYPOINT_TEST_REDIS_URL") else {
        return;
    };
    let token = std::env::var("WAYPOINT_TEST_REDIS_TOKEN").unwrap_or_default();
    let store = RedisStore::connect(&url, &token, Duration::from_secs(60))
        .await
        .unwrap();
    let (addr, server) = start_server(Arc::new(store)).await;
    let client = WaypointClient::new(format!("http://{addr}"));
    let session = SessionCode::generate();

    let host = device(&client);
    let player = device(&client);
    host.bind(session.clone()).await;
    player.bind(session.clone()).await;

    host.record(FieldName::HintsS1Unlocked, true)
        .await
        .unwrap()
        .await
        .unwrap();
    wait_for(player.cache(), |fields| {
        fields.flag(&FieldName::HintsS1Unlocked)
    })
    .await;

    player.record(FieldName::PlayerName, "Ada").await.unwrap().await.unwrap();
    host.record_snapshot().await.unwrap().await.unwrap();
    let record = client.fetch_session(&session).await.unwrap();
    assert_eq!(record.text(&FieldName::PlayerName), Some("Ada"));
    assert!(record.flag(&FieldName::HintsS1Unlocked));

    host.unbind().await;
    player.unbind().await;
    server.abort();
}
