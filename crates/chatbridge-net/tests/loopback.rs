//! Listeners driven by real loopback clients.

use chatbridge_net::{DEFAULT_HANDSHAKE_TIMEOUT, Listener, NetError, TcpLineListener};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_tcp_lines_both_directions() {
    let mut ln = TcpLineListener::bind("127.0.0.1:0").await.unwrap();
    let addr = ln.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let incoming = ln.accept().await.unwrap();
        incoming.establish(DEFAULT_HANDSHAKE_TIMEOUT).await.unwrap()
    });
    let client = TcpStream::connect(addr).await.unwrap();
    let mut conn = server.await.unwrap();
    assert!(conn.id().into_inner() > 0);

    let (read, mut write) = client.into_split();
    write.write_all(b"{\"a\":1}\n{\"b\":2}\n").await.unwrap();
    assert_eq!(conn.recv().await.unwrap().unwrap(), b"{\"a\":1}");
    assert_eq!(conn.recv().await.unwrap().unwrap(), b"{\"b\":2}");

    conn.send(b"{\"node\":\"other\"}".to_vec()).await.unwrap();
    let mut lines = BufReader::new(read).lines();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "{\"node\":\"other\"}"
    );

    drop(write);
    assert!(conn.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_shutdown_stops_accepting() {
    let mut ln = TcpLineListener::bind("127.0.0.1:0").await.unwrap();
    ln.shutdown().await.unwrap();
    assert!(matches!(ln.accept().await, Err(NetError::Closed)));
}

#[tokio::test]
async fn test_tcp_bind_invalid_address() {
    let err = TcpLineListener::bind("not an address").await.err().unwrap();
    assert!(matches!(err, NetError::Bind { .. }));
}

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use chatbridge_net::{DEFAULT_HANDSHAKE_TIMEOUT, Listener, NetError, WebSocketListener};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_websocket_text_frames_both_directions() {
        let mut ln = WebSocketListener::bind("127.0.0.1:0", "/chat").await.unwrap();
        let addr = ln.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let incoming = ln.accept().await.unwrap();
            incoming.establish(DEFAULT_HANDSHAKE_TIMEOUT).await.unwrap()
        });
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/chat"))
            .await
            .unwrap();
        let mut conn = server.await.unwrap();

        client.send(Message::text("{\"x\":1}")).await.unwrap();
        client.send(Message::Ping(Vec::new().into())).await.unwrap();
        client.send(Message::text("{\"y\":2}")).await.unwrap();
        assert_eq!(conn.recv().await.unwrap().unwrap(), b"{\"x\":1}");
        assert_eq!(conn.recv().await.unwrap().unwrap(), b"{\"y\":2}");

        conn.send(b"{\"node\":\"msg\"}".to_vec()).await.unwrap();
        loop {
            match client.next().await.unwrap().unwrap() {
                Message::Text(text) => {
                    assert_eq!(text.as_str(), "{\"node\":\"msg\"}");
                    break;
                }
                Message::Pong(_) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }

        client.close(None).await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_websocket_wrong_path_is_refused() {
        let mut ln = WebSocketListener::bind("127.0.0.1:0", "/chat").await.unwrap();
        let addr = ln.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let incoming = ln.accept().await.unwrap();
            incoming.establish(DEFAULT_HANDSHAKE_TIMEOUT).await
        });
        let client = tokio_tungstenite::connect_async(format!("ws://{addr}/elsewhere")).await;
        assert!(client.is_err());
        assert!(server.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_websocket_accept_does_not_wait_for_upgrade() {
        let mut ln = WebSocketListener::bind("127.0.0.1:0", "/").await.unwrap();
        let addr = ln.local_addr().unwrap();

        let _silent = TcpStream::connect(addr).await.unwrap();
        let stalled = tokio::time::timeout(Duration::from_secs(3), ln.accept())
            .await
            .expect("accept returned")
            .unwrap();

        let client = tokio::spawn(tokio_tungstenite::connect_async(format!("ws://{addr}/")));
        let next = tokio::time::timeout(Duration::from_secs(3), ln.accept())
            .await
            .expect("second accept returned")
            .unwrap();
        next.establish(DEFAULT_HANDSHAKE_TIMEOUT).await.unwrap();
        assert!(client.await.unwrap().is_ok());

        let err = stalled
            .establish(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::HandshakeTimeout { .. }));
    }
}

#[tokio::test]
async fn test_connection_into_parts_drive_separately() {
    let (a, b) = tokio::io::duplex(1024);
    let (id, mut inbound, mut outbound) = chatbridge_net::Connection::from_stream("a", a).into_parts();
    let mut peer = chatbridge_net::Connection::from_stream("b", b);
    assert!(id.into_inner() > 0);

    outbound.send(b"ping".to_vec()).await.unwrap();
    assert_eq!(peer.recv().await.unwrap().unwrap(), b"ping");

    peer.send(b"pong".to_vec()).await.unwrap();
    assert_eq!(inbound.next().await.unwrap().unwrap(), b"pong");
}
