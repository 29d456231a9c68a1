//! Drives `KVClient` against a live server and checks it agrees with a local
//! `MemoryEngine` running the same commands.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use rkv_client::{ClientAdapter, KVClient};
use rkv_common::{RkvError, ScoredMember, TtlStatus};
use rkv_engine::{KVEngine, MemoryEngine};
use rkv_server::{serve, Metrics};

async fn start_server() -> (String, Arc<MemoryEngine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let engine = Arc::new(MemoryEngine::new());
    let metrics = Arc::new(Metrics::new());
    tokio::spawn(serve(listener, engine.clone(), metrics));
    (addr, engine)
}

/// Runs a fixed scenario and returns observations that must match across
/// backends.
fn scenario(engine: &dyn KVEngine) -> Vec<String> {
    let mut seen = Vec::new();

    engine.set("greeting", "hello", Duration::ZERO).unwrap();
    seen.push(engine.get("greeting").unwrap());
    assert!(engine.get("absent").unwrap_err().is_nil());

    assert_eq!(engine.lpush("queue", &["a", "b", "c"]).unwrap(), 3);
    assert_eq!(engine.rpush("queue", &["z"]).unwrap(), 4);
    seen.extend(engine.lrange("queue", 0, -1).unwrap());
    seen.push(engine.lpop("queue").unwrap());
    seen.push(engine.rpop("queue").unwrap());

    assert_eq!(engine.hset("user", &["name", "ada", "lang", "rust"]).unwrap(), 2);
    seen.push(engine.hget("user", "lang").unwrap());
    let mut fields: Vec<_> = engine.hgetall("user").unwrap().into_iter().collect();
    fields.sort();
    seen.extend(fields.into_iter().map(|(field, value)| format!("{}={}", field, value)));
    assert_eq!(
        engine.lpush("user", &["x"]).unwrap_err(),
        RkvError::WrongType
    );

    assert_eq!(engine.sadd("tags", &["b", "a", "b"]).unwrap(), 2);
    let mut members = engine.smembers("tags").unwrap();
    members.sort();
    seen.extend(members);

    let scored = [
        ScoredMember::new("carol", 3.0),
        ScoredMember::new("alice", 1.0),
        ScoredMember::new("bob", 2.5),
    ];
    assert_eq!(engine.zadd("board", &scored).unwrap(), 3);
    seen.extend(engine.zrange("board", 0, 1).unwrap());
    for member in engine.zrange_with_scores("board", -1, -1).unwrap() {
        seen.push(format!("{}:{}", member.member, member.score));
    }
    assert_eq!(engine.zscore("board", "bob").unwrap(), 2.5);

    engine.set("session", "token", Duration::from_secs(100)).unwrap();
    match engine.ttl("session").unwrap() {
        TtlStatus::ExpiresIn(left) => assert!(left > Duration::from_secs(98)),
        other => panic!("unexpected ttl {:?}", other),
    }
    assert_eq!(engine.ttl("greeting").unwrap(), TtlStatus::NoExpiry);
    assert_eq!(engine.ttl("absent").unwrap(), TtlStatus::Missing);

    seen.push(engine.key_type("board").unwrap());
    seen.extend(engine.keys("*e*").unwrap());
    seen.push(engine.db_size().unwrap().to_string());
    seen
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_matches_local_engine() {
    let (addr, _server_engine) = start_server().await;

    let remote = tokio::task::spawn_blocking(move || {
        let client = KVClient::connect(addr);
        let seen = scenario(&client);
        client.close().unwrap();
        seen
    })
    .await
    .unwrap();

    let local = scenario(&MemoryEngine::new());
    assert_eq!(remote, local);
    assert_eq!(&remote[1..5], &["a", "b", "c", "z"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn lpush_order_is_visible_to_server_engine() {
    let (addr, server_engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let client = KVClient::connect(addr);
        client.lpush("list", &["v1", "v2", "v3"]).unwrap();
    })
    .await
    .unwrap();

    assert_eq!(
        server_engine.lrange("list", 0, -1).unwrap(),
        vec!["v1", "v2", "v3"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn adapter_over_remote_client() {
    let (addr, _server_engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let adapter = ClientAdapter::from(KVClient::connect(addr));
        assert!(!adapter.is_local());
        assert_eq!(adapter.ping().val(), "PONG");
        assert_eq!(adapter.set("k", "v", Duration::ZERO).val(), "OK");
        assert_eq!(adapter.get("k").val(), "v");
        assert!(adapter.get("missing").is_nil());
        adapter.close().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn select_and_info_round_trip() {
    let (addr, server_engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let client = KVClient::connect(addr);
        client.select(3).unwrap();
        assert_eq!(client.selected_db(), 3);
        assert!(matches!(
            client.select(16),
            Err(RkvError::InvalidArgument(_))
        ));

        client.set("counter", "1", Duration::ZERO).unwrap();
        let info = client.info().unwrap();
        assert!(info.contains("# Server"));
        assert!(info.contains("total_commands_processed:"));
    })
    .await
    .unwrap();

    assert_eq!(server_engine.selected_db(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipelined_commands_share_one_write() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let (addr, _server_engine) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\nPING\r\n")
        .await
        .unwrap();

    let expected = b"+OK\r\n$1\r\nv\r\n+PONG\r\n";
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[..], &expected[..]);
}
