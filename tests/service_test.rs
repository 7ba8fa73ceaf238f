//! Command service tests: line-delimited JSON over TCP.

mod common;

use std::sync::Arc;

use common::{registry_of, ScriptedFactory};
use marquee::core::{Module, QueueContainer, ReconcileLimits, UidAllocator};
use marquee::dispatch::{CommandHandler, QueueDispatcher};
use marquee::service::serve;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

struct Client {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn send(&mut self, raw: &str) -> Value {
        self.write.write_all(raw.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
        let line = self.lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }
}

#[tokio::test]
async fn tcp_round_trip_with_graceful_shutdown() {
    let text = ScriptedFactory::new("text");
    let container = QueueContainer::new(
        registry_of(&[&text]),
        registry_of(&[]),
        UidAllocator::sequential(),
        ReconcileLimits::default(),
    );
    let handler: Arc<dyn CommandHandler> =
        Arc::new(QueueDispatcher::new(Arc::clone(&container), None));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, handler, async move {
        let _ = stop_rx.await;
    }));

    let mut client = Client::connect(addr).await;

    let response = client
        .send(r#"{"cmd":"add","args":{"type":"text","args":{"message":"hi"}}}"#)
        .await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"]["uid"], json!("0"));
    assert!(text.last().is_on_top());

    let response = client.send(r#"{"cmd":"modules_available"}"#).await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"], json!(["text"]));

    let response = client.send(r#"{"cmd":"rm","args":{"uids":["9"]}}"#).await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["result"], json!(null));

    let response = client.send(r#"{"cmd":"dance"}"#).await;
    assert_eq!(response["success"], json!(false));
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("unknown command"));

    let response = client.send("this is not json").await;
    assert_eq!(response["success"], json!(false));
    assert!(response["error"].as_str().unwrap().contains("malformed"));

    // Requests queue up on one connection and answer in order.
    let response = client.send(r#"{"cmd":"queue","args":{}}"#).await;
    assert_eq!(response["result"].as_array().unwrap().len(), 1);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();

    // Shutdown ran the killall path through the dispatcher.
    assert!(container.snapshot(&std::collections::HashMap::new()).is_empty());
    assert_eq!(text.last().call_count("remove"), 1);
}

#[tokio::test]
async fn connections_are_independent() {
    let text = ScriptedFactory::new("text");
    let container = QueueContainer::new(
        registry_of(&[&text]),
        registry_of(&[]),
        UidAllocator::sequential(),
        ReconcileLimits::default(),
    );
    let handler: Arc<dyn CommandHandler> = Arc::new(QueueDispatcher::new(container, None));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, handler, async move {
        let _ = stop_rx.await;
    }));

    let mut first = Client::connect(addr).await;
    let mut second = Client::connect(addr).await;

    let response = first
        .send(r#"{"cmd":"add","args":{"type":"text"}}"#)
        .await;
    assert_eq!(response["success"], json!(true));

    // A second client observes the first client's mutation.
    let response = second.send(r#"{"cmd":"queue","args":{}}"#).await;
    assert_eq!(response["result"].as_array().unwrap().len(), 1);

    // One client disconnecting does not disturb the other.
    drop(first);
    let response = second.send(r#"{"cmd":"queue","args":{}}"#).await;
    assert_eq!(response["success"], json!(true));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
