//! APRS-IS client tests against a local TCP server

use std::time::Duration;

use meshgate_aprs::{AprsClient, AprsClientConfig, AprsLink, AprsPacket};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Instant};

async fn recv_within(client: &mut AprsClient, wait: Duration) -> Option<AprsPacket> {
    let deadline = Instant::now() + wait;
    while Instant::now() < deadline {
        if let Some(packet) = client.recv() {
            return Some(packet);
        }
        sleep(Duration::from_millis(5)).await;
    }
    None
}

#[tokio::test]
async fn test_login_receive_send_and_filter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = AprsClientConfig::new("N0CALL-10", 12345)
        .with_server("127.0.0.1", port)
        .with_filter("g/N0CALL-10/MESHID-01");
    let mut client = AprsClient::spawn(config);

    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let login = lines.next_line().await.unwrap().unwrap();
    assert!(login.starts_with("user N0CALL-10 pass 12345 vers meshgate "));
    assert!(login.ends_with(" filter g/N0CALL-10/MESHID-01"));

    write_half
        .write_all(b"# aprsc 2.1.14\r\nnot a packet\r\nW1AW>APRS,TCPIP*::N0CALL-10:hello{7\r\n")
        .await
        .unwrap();

    let packet = recv_within(&mut client, Duration::from_secs(5))
        .await
        .expect("message should arrive");
    assert_eq!(packet.from, "W1AW");
    assert_eq!(packet.addressee.as_deref(), Some("N0CALL-10"));
    assert_eq!(packet.message_text.as_deref(), Some("hello"));
    assert_eq!(packet.msg_no.as_deref(), Some("7"));

    client.send("N0CALL-10>APZMAG,TCPIP*:>status".to_string());
    client.set_filter("g/N0CALL-10/MESHID-01/N0CALL-5".to_string());

    let sent = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(sent, "N0CALL-10>APZMAG,TCPIP*:>status");

    let filter = timeout(Duration::from_secs(5), lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(filter, "#filter g/N0CALL-10/MESHID-01/N0CALL-5");

    assert!(client.recv().is_none());
    assert_eq!(
        client.filter().as_deref(),
        Some("g/N0CALL-10/MESHID-01/N0CALL-5")
    );
}

#[tokio::test]
async fn test_reconnect_keeps_updated_filter() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = AprsClientConfig::new("N0CALL-10", 12345)
        .with_server("127.0.0.1", port)
        .with_filter("g/N0CALL-10")
        .with_reconnect_delay(Duration::from_millis(20));
    let client = AprsClient::spawn(config);

    {
        let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut lines = BufReader::new(socket).lines();
        let login = lines.next_line().await.unwrap().unwrap();
        assert!(login.ends_with(" filter g/N0CALL-10"));

        client.set_filter("g/N0CALL-10/W1AW".to_string());
        let update = lines.next_line().await.unwrap().unwrap();
        assert_eq!(update, "#filter g/N0CALL-10/W1AW");
        // socket dropped here; server hangs up
    }

    let (socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut lines = BufReader::new(socket).lines();
    let login = lines.next_line().await.unwrap().unwrap();
    assert!(login.ends_with(" filter g/N0CALL-10/W1AW"));
}
