//! The dummy network served by a provider over loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use chatbridge_dummy::{NETWORK_ID, PROTOCOL, new_service};
use chatbridge_net::{Listener, TcpLineListener};
use chatbridge_protocol::{new_cmd, new_login, new_logout};
use chatbridge_provider::{Provider, ProviderOptions};
use chatbridge_transport::{MultiTransport, Transport};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

async fn recv(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Value {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_login_chat_logout_over_tcp() {
    let transport = Arc::new(MultiTransport::new(PROTOCOL));
    let service = new_service(Arc::clone(&transport) as Arc<dyn Transport>);
    transport.advertise().unwrap();
    let options = ProviderOptions {
        password: "p1".into(),
        ..ProviderOptions::default()
    };
    let provider = Provider::new(options, Arc::clone(&service), transport);
    let listener = TcpLineListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let (read, mut write) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(read).lines();

        let mut send_lines = Vec::new();
        for msg in [
            new_cmd("a1", "provider-auth", ["p1"]),
            new_login("l1", "remote", "me", ""),
        ] {
            send_lines.extend(serde_json::to_vec(&msg).unwrap());
            send_lines.push(b'\n');
        }
        write.write_all(&send_lines).await.unwrap();

        assert_eq!(recv(&mut lines).await["node"], "info/provider.auth");
        let online = recv(&mut lines).await;
        assert_eq!(online["node"], "network");
        assert_eq!(online["payload"]["type"], "online");
        assert_eq!(online["payload"]["net"]["id"], NETWORK_ID);
        let hello = recv(&mut lines).await;
        assert_eq!(hello["node"], "msg");
        assert_eq!(hello["payload"]["from"]["id"], "fakeuser");

        let mut logout = serde_json::to_vec(&new_logout("l2", NETWORK_ID)).unwrap();
        logout.push(b'\n');
        write.write_all(&logout).await.unwrap();
        let offline = recv(&mut lines).await;
        assert_eq!(offline["payload"]["type"], "offline");
    });

    let (served, client) = tokio::join!(provider.serve(listener), client);
    client.unwrap();
    served.unwrap();
    assert!(service.is_closed());
    assert!(service.clients().is_empty());
}
