//! End-to-end tests against a real server on an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use evalserve_core::MemoryStore;
use evalserve_executor::ScriptExecutor;
use evalserve_transport::{Server, ServerConfig, ServerError, ShutdownHandle};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::JoinHandle,
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    task: JoinHandle<()>,
}

async fn start_with(config: ServerConfig) -> TestServer {
    let server = Server::bind(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptExecutor::new()),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    TestServer { addr, handle, task }
}

async fn start() -> TestServer {
    start_with(ServerConfig::new("127.0.0.1", 0)).await
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connect and consume the greeting.
    async fn connect(addr: SocketAddr) -> (Self, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
        };
        let greeting = client.read_line().await.unwrap();
        (client, greeting)
    }

    async fn send_raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }

    /// Next line without its newline; `None` at EOF.
    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for the server")
            .unwrap_or(0);
        (n > 0).then(|| line.trim_end_matches('\n').to_string())
    }

    async fn request(&mut self, command: &str) -> String {
        self.send_raw(&format!("{command}\n")).await;
        self.read_line().await.expect("connection closed")
    }

    async fn expect_closed(&mut self) {
        assert_eq!(self.read_line().await, None);
    }
}

#[tokio::test]
async fn test_greeting_is_configurable() {
    let server = start_with(ServerConfig::new("127.0.0.1", 0).with_greeting("Hi there")).await;
    let (_client, greeting) = Client::connect(server.addr).await;
    assert_eq!(greeting, "Hi there");
}

#[tokio::test]
async fn test_example_session() {
    let server = start().await;
    let (mut client, greeting) = Client::connect(server.addr).await;
    assert_eq!(greeting, "Hello from evalserve!");

    assert_eq!(client.request("/set x=5").await, "Set 'x' to 5 success");
    assert_eq!(client.request("/eval x+2").await, "Result: 7");
    assert_eq!(client.request("/get_json x").await, "5");
    assert_eq!(
        client.request("/bogus").await,
        "Unrecognized command: '/bogus'"
    );
}

#[tokio::test]
async fn test_captured_output_precedes_result() {
    let server = start().await;
    let (mut client, _) = Client::connect(server.addr).await;

    assert_eq!(
        client.request("/eval print('a', 1)").await,
        "[PYTHON_PRINT]a 1"
    );
    assert_eq!(client.read_line().await.as_deref(), Some("Result: None"));
}

#[tokio::test]
async fn test_store_is_shared_between_connections() {
    let server = start().await;
    let (mut a, _) = Client::connect(server.addr).await;
    let (mut b, _) = Client::connect(server.addr).await;

    assert_eq!(
        a.request("/set_json cfg {\"rate\": 2, \"tags\": [\"x\"]}").await,
        "Set JSON 'cfg' success"
    );
    assert_eq!(
        b.request("/get_json cfg").await,
        "{\"rate\": 2, \"tags\": [\"x\"]}"
    );
    assert_eq!(b.request("/get cfg").await, "{'rate': 2, 'tags': ['x']}");
}

#[tokio::test]
async fn test_errors_keep_connection_open() {
    let server = start().await;
    let (mut client, _) = Client::connect(server.addr).await;

    assert_eq!(
        client.request("/eval 1/0").await,
        "Eval error: division by zero"
    );
    assert_eq!(
        client.request("/exec y = ").await,
        "Server error: invalid syntax: unexpected end of input"
    );
    assert_eq!(
        client.request("/get missing").await,
        "Error: Variable 'missing' not found"
    );
    assert_eq!(client.request("/eval 2*3").await, "Result: 6");
}

#[tokio::test]
async fn test_exit_ends_only_that_connection() {
    let server = start().await;
    let (mut a, _) = Client::connect(server.addr).await;
    let (mut b, _) = Client::connect(server.addr).await;

    a.send_raw("/exit\n").await;
    a.expect_closed().await;

    assert_eq!(b.request("/eval 1").await, "Result: 1");
    assert!(!server.handle.is_shutdown());
}

#[tokio::test]
async fn test_blank_line_ends_connection() {
    let server = start().await;
    let (mut client, _) = Client::connect(server.addr).await;
    client.send_raw("   \n").await;
    client.expect_closed().await;

    let (mut other, _) = Client::connect(server.addr).await;
    assert_eq!(other.request("/eval 'ok'").await, "Result: ok");
}

#[tokio::test]
async fn test_close_stops_server_and_idle_clients() {
    let server = start().await;
    let (mut a, _) = Client::connect(server.addr).await;
    let (mut b, _) = Client::connect(server.addr).await;

    assert_eq!(a.request("/close").await, "Server shutting down.");
    a.expect_closed().await;
    // B never sends anything and is still disconnected.
    b.expect_closed().await;

    timeout(WAIT, server.task).await.unwrap().unwrap();
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_handle() {
    let server = start().await;
    let (mut client, _) = Client::connect(server.addr).await;

    server.handle.shutdown();
    client.expect_closed().await;
    timeout(WAIT, server.task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_clients_do_not_lose_updates() {
    let server = start().await;
    let addr = server.addr;
    let clients = (0..8).map(|i| async move {
        let (mut client, _) = Client::connect(addr).await;
        for round in 0..10 {
            let reply = client.request(&format!("/set v{i}={round}")).await;
            assert_eq!(reply, format!("Set 'v{i}' to {round} success"));
        }
    });
    futures::future::join_all(clients).await;

    let (mut reader, _) = Client::connect(server.addr).await;
    for i in 0..8 {
        assert_eq!(reader.request(&format!("/get v{i}")).await, "9");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_writing_one_name() {
    let server = start().await;
    let addr = server.addr;
    let clients = (0..8).map(|i| async move {
        let (mut client, _) = Client::connect(addr).await;
        client.request(&format!("/set shared={i}")).await
    });
    let replies = futures::future::join_all(clients).await;
    assert!(replies.iter().all(|reply| reply.ends_with(" success")));

    let (mut reader, _) = Client::connect(addr).await;
    let value: i64 = reader.request("/get shared").await.parse().unwrap();
    assert!((0..8).contains(&value));
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let server = start().await;
    let config = ServerConfig::new("127.0.0.1", server.addr.port());
    let result = Server::bind(
        &config,
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptExecutor::new()),
    )
    .await;
    assert!(matches!(result, Err(ServerError::Bind { .. })));
}
