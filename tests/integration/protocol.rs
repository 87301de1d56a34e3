use crate::*;

/// Envelope problems are answered with the generic format error; the
/// channel stays usable.
#[tokio::test]
async fn test_malformed_envelopes() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;
    let format_error = json!({"type": "error", "message": "Invalid message format"});

    for frame in [
        "",
        "[]",
        "42",
        r#"{"data": {"id": "a", "action": "bind"}}"#,
        r#"{"type": "udp"}"#,
        r#"{"type": "udp", "data": null}"#,
        r#"{"type": "tcp", "data": "connect"}"#,
        r#"{"type": "tcp", "data": {"id": "a", "action": "connect", "port": "80"}}"#,
    ] {
        client.send_raw(frame).await?;
        assert_eq!(client.reply().await?, format_error, "frame: {frame:?}");
    }

    client.send(udp_frame(json!({"id": "u1", "action": "bind"}))).await?;
    assert_eq!(client.reply().await?["status"], "bound");
    Ok(())
}

/// Unknown transports are dropped without a reply.
#[tokio::test]
async fn test_unknown_type_is_silent() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;

    for kind in [json!("sctp"), json!(5), json!(true), json!(["tcp"])] {
        client
            .send(json!({"type": kind, "data": {"id": "x", "action": "connect"}}))
            .await?;
        client.expect_silence().await?;
    }
    assert_eq!(relay.channel()?.tcp.len() + relay.channel()?.udp.len(), 0);
    Ok(())
}

/// Binary frames are read as text.
#[tokio::test]
async fn test_binary_frames_are_commands() -> Result<()> {
    let relay = Relay::start().await?;
    let mut client = relay.connect().await?;

    let frame = udp_frame(json!({"id": "b1", "action": "bind"})).to_string();
    client.send_binary(frame.as_bytes()).await?;
    assert_eq!(
        client.reply().await?,
        json!({"type": "udp", "status": "bound", "id": "b1"})
    );
    Ok(())
}

/// Ids are scoped per transport and per channel.
#[tokio::test]
async fn test_id_scopes() -> Result<()> {
    let relay = Relay::start().await?;
    let mut first = relay.connect().await?;
    let mut second = relay.connect().await?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    first.send(udp_frame(json!({"id": "a", "action": "bind"}))).await?;
    assert_eq!(first.reply().await?["status"], "bound");

    first
        .send(tcp_frame(json!({"id": "a", "action": "connect", "address": "127.0.0.1", "port": port})))
        .await?;
    let _peer_one = listener.accept().await?;
    assert_eq!(
        first.reply().await?,
        json!({"type": "tcp", "status": "connected", "id": "a"})
    );

    second.send(udp_frame(json!({"id": "a", "action": "bind"}))).await?;
    assert_eq!(
        second.reply().await?,
        json!({"type": "udp", "status": "bound", "id": "a"})
    );

    // Commands on one channel never see the other channel's sessions.
    second.send(tcp_frame(json!({"id": "a", "action": "receive"}))).await?;
    assert_eq!(second.reply().await?, invalid_id("tcp", "a"));
    Ok(())
}
