//! Provider behaviour over real loopback connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatbridge_net::{Listener, TcpLineListener, WebSocketListener};
use chatbridge_protocol::{CmdMsg, new_cmd};
use chatbridge_provider::{PROVIDER_AUTH_INFO, Provider, ProviderError, ProviderOptions};
use chatbridge_service::{LoginRequest, NewClientFn, Networker, Service, ServiceError};
use chatbridge_transport::{MultiTransport, Transport};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn no_sessions() -> NewClientFn {
    Arc::new(
        |_: &Arc<Service>, _: LoginRequest| -> Result<Arc<dyn Networker>, ServiceError> {
            Err(ServiceError::Client("no sessions here".into()))
        },
    )
}

fn provider(options: ProviderOptions) -> Provider {
    let transport = Arc::new(MultiTransport::new("test"));
    let service = Service::new(Arc::clone(&transport) as Arc<dyn Transport>, no_sessions());
    transport.advertise().unwrap();
    Provider::new(options, service, transport)
}

fn options(password: &str, auto_password: bool, max_conns: usize) -> ProviderOptions {
    ProviderOptions {
        password: password.into(),
        auto_password,
        max_conns,
        ..ProviderOptions::default()
    }
}

fn ping(id: &str, text: &str) -> CmdMsg {
    new_cmd(id, "ping", [text])
}

fn provider_auth(id: &str, credential: &str) -> CmdMsg {
    new_cmd(id, "provider-auth", [credential])
}

fn text(envelope: &Value) -> String {
    envelope["payload"]["msg"]
        .as_array()
        .and_then(|parts| parts.iter().find(|p| p["type"] == "text/plain"))
        .and_then(|p| p["content"].as_str())
        .unwrap_or_default()
        .to_string()
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn send(&mut self, msg: &CmdMsg) {
        let mut line = serde_json::to_vec(msg).unwrap();
        line.push(b'\n');
        self.write.write_all(&line).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for an envelope")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn recv_eof(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.lines.next_line()).await,
            Ok(Ok(None)) | Ok(Err(_))
        )
    }
}

async fn tcp_listener() -> (TcpLineListener, SocketAddr) {
    let listener = TcpLineListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_password_wrong_then_right() {
    let provider = provider(options("p1", false, 1));
    let (listener, addr) = tcp_listener().await;

    let client = tokio::spawn(async move {
        let mut c = Client::connect(addr).await;

        c.send(&provider_auth("1", "wrong")).await;
        let reply = c.recv().await;
        assert_eq!(reply["node"], "error");
        assert_eq!(reply["payload"]["id"], "1");
        assert_eq!(text(&reply), "authentication failed");

        c.send(&ping("2", "hi")).await;
        let reply = c.recv().await;
        assert_eq!(reply["node"], "error");
        assert_eq!(
            text(&reply),
            "must authenticate with the provider first (provider-auth)"
        );

        c.send(&provider_auth("3", "p1")).await;
        let reply = c.recv().await;
        assert_eq!(reply["node"], PROVIDER_AUTH_INFO);
        assert_eq!(reply["payload"]["type"], PROVIDER_AUTH_INFO);
        assert_eq!(text(&reply), "authenticated");

        c.send(&ping("4", "hi")).await;
        let reply = c.recv().await;
        assert_eq!(reply["node"], "other");
        assert_eq!(reply["payload"]["type"], "other/ping");
        assert_eq!(text(&reply), "hi");
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
    assert!(provider.service().is_closed());
}

#[tokio::test]
async fn test_provider_auth_argument_checks() {
    let provider = provider(options("p1", false, 1));
    let (listener, addr) = tcp_listener().await;

    let client = tokio::spawn(async move {
        let mut c = Client::connect(addr).await;

        c.send(&new_cmd("1", "provider-auth", ["p1", "extra"])).await;
        assert_eq!(text(&c.recv().await), "unexpected command args");

        let mut to_network = provider_auth("2", "p1");
        to_network.net.id = "net1".into();
        c.send(&to_network).await;
        assert_eq!(text(&c.recv().await), "cannot provider-auth to a network");

        c.write.write_all(b"{not json\n").await.unwrap();
        let reply = c.recv().await;
        assert_eq!(reply["node"], "error");
        assert!(text(&reply).starts_with("message load error"));
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_no_auth_dispatches_directly() {
    let provider = provider(options("", false, 1));
    let (listener, addr) = tcp_listener().await;

    let client = tokio::spawn(async move {
        let mut c = Client::connect(addr).await;
        c.send(&ping("1", "direct")).await;
        let reply = c.recv().await;
        assert_eq!(reply["node"], "other");
        assert_eq!(text(&reply), "direct");
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_bootstrap_skip_is_single_use() {
    let provider = provider(options("", true, 2));
    let (listener, addr) = tcp_listener().await;

    let clients = tokio::spawn(async move {
        let mut first = Client::connect(addr).await;
        first.send(&ping("1", "first")).await;
        let reply = first.recv().await;
        assert_eq!(reply["node"], "other");
        assert_eq!(text(&reply), "first");

        let mut second = Client::connect(addr).await;
        second.send(&ping("2", "second")).await;
        assert_eq!(
            text(&second.recv().await),
            "must authenticate with the provider first (provider-auth)"
        );
        second.send(&provider_auth("3", "anything")).await;
        assert_eq!(text(&second.recv().await), "authentication failed");
    });

    let (served, clients) = tokio::join!(provider.serve(listener), clients);
    clients.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_auto_password_set_by_first_auth() {
    let provider = provider(options("", true, 2));
    let (listener, addr) = tcp_listener().await;

    let clients = tokio::spawn(async move {
        let mut first = Client::connect(addr).await;
        first.send(&provider_auth("1", "secret")).await;
        assert_eq!(first.recv().await["node"], PROVIDER_AUTH_INFO);

        let mut second = Client::connect(addr).await;
        second.send(&ping("2", "x")).await;
        assert_eq!(
            text(&second.recv().await),
            "must authenticate with the provider first (provider-auth)"
        );
        second.send(&provider_auth("3", "other")).await;
        assert_eq!(text(&second.recv().await), "authentication failed");
        second.send(&provider_auth("4", "secret")).await;
        assert_eq!(second.recv().await["node"], PROVIDER_AUTH_INFO);
    });

    let (served, clients) = tokio::join!(provider.serve(listener), clients);
    clients.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_fanout_reaches_every_authenticated_connection() {
    let provider = provider(options("", false, 2));
    let (listener, addr) = tcp_listener().await;

    let clients = tokio::spawn(async move {
        let mut a = Client::connect(addr).await;
        a.send(&ping("1", "from-a")).await;
        assert_eq!(text(&a.recv().await), "from-a");

        let mut b = Client::connect(addr).await;
        b.send(&ping("2", "from-b")).await;
        assert_eq!(text(&b.recv().await), "from-b");
        assert_eq!(text(&a.recv().await), "from-b");
    });

    let (served, clients) = tokio::join!(provider.serve(listener), clients);
    clients.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_connections_over_cap_are_refused() {
    let provider = provider(options("", false, 2));
    let (listener, addr) = tcp_listener().await;

    let clients = tokio::spawn(async move {
        let mut a = Client::connect(addr).await;
        a.send(&ping("1", "a")).await;
        a.recv().await;
        let mut b = Client::connect(addr).await;
        b.send(&ping("2", "b")).await;
        b.recv().await;

        let mut refused = Client::connect(addr).await;
        assert!(refused.recv_eof().await);
    });

    let (served, clients) = tokio::join!(provider.serve(listener), clients);
    clients.unwrap();
    served.unwrap();
    assert_eq!(provider.connections(), 0);
    assert!(provider.service().is_closed());
}

#[tokio::test]
async fn test_websocket_auth_round_trip() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let provider = provider(options("p1", false, 1));
    let listener = WebSocketListener::bind("127.0.0.1:0", "/").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        let auth = serde_json::to_string(&provider_auth("1", "p1")).unwrap();
        ws.send(Message::text(auth)).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(reply["node"], PROVIDER_AUTH_INFO);
        ws.close(None).await.unwrap();
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_silent_peer_does_not_block_websocket_clients() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let provider = provider(ProviderOptions {
        handshake_timeout_secs: 1,
        ..options("", false, 2)
    });
    let listener = WebSocketListener::bind("127.0.0.1:0", "/").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let silent = TcpStream::connect(addr).await.unwrap();

        let (mut ws, _) = tokio::time::timeout(
            Duration::from_secs(3),
            tokio_tungstenite::connect_async(format!("ws://{addr}/")),
        )
        .await
        .expect("websocket handshake stalled behind a silent peer")
        .unwrap();
        let request = serde_json::to_string(&ping("1", "hi")).unwrap();
        ws.send(Message::text(request)).await.unwrap();

        let frame = ws.next().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(reply["node"], "other");
        assert_eq!(text(&reply), "hi");
        ws.close(None).await.unwrap();
        drop(silent);
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_handshake_timeout_frees_the_slot() {
    use futures_util::SinkExt;

    let provider = provider(ProviderOptions {
        handshake_timeout_secs: 1,
        ..options("", false, 1)
    });
    let listener = WebSocketListener::bind("127.0.0.1:0", "/").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let (mut ws, _) = tokio::time::timeout(
            Duration::from_secs(3),
            tokio_tungstenite::connect_async(format!("ws://{addr}/")),
        )
        .await
        .expect("slot still held after the handshake timeout")
        .unwrap();
        ws.close(None).await.unwrap();
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
}

#[tokio::test]
async fn test_run_rejects_invalid_options() {
    let opts = ProviderOptions {
        addr: "ws://127.0.0.1:0/".into(),
        cert_path: Some("cert.pem".into()),
        private_key_path: Some("key.pem".into()),
        ..ProviderOptions::default()
    };
    let err = Provider::run("test", opts, |_| panic!("service built for invalid options"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Config(_)));
}
