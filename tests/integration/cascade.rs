use crate::*;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream as PeerStream;

/// Open a tcp session "A" and a udp session "B" on `client`.
async fn open_pair(client: &mut Client) -> Result<(PeerStream, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let udp_port = free_udp_port()?;

    client
        .send(udp_frame(json!({"id": "B", "action": "bind", "port": udp_port})))
        .await?;
    assert_eq!(client.reply().await?["status"], "bound");

    client
        .send(tcp_frame(json!({"id": "A", "action": "connect", "address": "127.0.0.1", "port": port})))
        .await?;
    let (peer, _) = listener.accept().await?;
    assert_eq!(client.reply().await?["status"], "connected");

    Ok((peer, udp_port))
}

async fn assert_released(mut peer: PeerStream, udp_port: u16) -> Result<()> {
    let mut buf = [0u8; 16];
    let n = timeout(REPLY_TIMEOUT, peer.read(&mut buf)).await??;
    assert_eq!(n, 0, "tcp peer should see end of stream");

    // Channels deregister only after their sockets are closed.
    drop(std::net::UdpSocket::bind(("0.0.0.0", udp_port)).context("udp port still held")?);
    Ok(())
}

/// Client closes the WebSocket: every session it owned goes with it.
#[tokio::test]
async fn test_client_close_cascades() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;
    let (peer, udp_port) = open_pair(&mut client).await?;

    client.close().await?;
    wait_until("channel removal", || relay.registry.is_empty()).await?;
    assert_released(peer, udp_port).await
}

/// Dropping the connection without a close frame behaves the same.
#[tokio::test]
async fn test_abrupt_disconnect_cascades() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;
    let (peer, udp_port) = open_pair(&mut client).await?;

    drop(client);
    wait_until("channel removal", || relay.registry.is_empty()).await?;
    assert_released(peer, udp_port).await
}

/// Other channels are unaffected when one goes away.
#[tokio::test]
async fn test_cascade_is_per_channel() -> Result<()> {
    let relay = Relay::start().await?;
    let mut doomed = relay.connect().await?;
    let mut survivor = relay.connect().await?;

    let (peer, udp_port) = open_pair(&mut doomed).await?;
    survivor.send(udp_frame(json!({"id": "B", "action": "bind"}))).await?;
    assert_eq!(survivor.reply().await?["status"], "bound");

    doomed.close().await?;
    wait_until("one channel left", || relay.registry.len() == 1).await?;
    assert_released(peer, udp_port).await?;

    let snap = relay.channel()?;
    assert_eq!(snap.udp.len(), 1);
    survivor.send(udp_frame(json!({"id": "B", "action": "receive", "address": "127.0.0.1", "port": 9}))).await?;
    assert_eq!(
        survivor.reply().await?,
        json!({"type": "udp", "data": "", "id": "B", "queueLength": 0})
    );
    Ok(())
}

/// Daemon shutdown closes every channel and releases every socket.
#[tokio::test]
async fn test_shutdown_cascades() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;
    let (peer, udp_port) = open_pair(&mut client).await?;

    relay.shutdown.send(())?;
    assert!(client.closed_by_relay().await, "relay should close the channel");
    wait_until("channel removal", || relay.registry.is_empty()).await?;
    assert_released(peer, udp_port).await
}
