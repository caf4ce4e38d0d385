//! Tests for RLPx connections over in-memory streams

use super::*;
use crate::domain::{
    decode_disconnect, encode_disconnect, Cap, DisconnectReason, HandshakeError, NodeId,
    ProtocolError, RlpxError, TransportError, DISCONNECT, EMPTY_LIST, HELLO, PING,
};
use crate::test_utils::{connection_pair, encrypted_pair, encrypted_pair_with, hello_for, node_key};
use std::time::Duration;

fn eth63() -> Vec<Cap> {
    vec![Cap::new("eth", 63), Cap::new("eth", 62)]
}

// =============================================================================
// TEST GROUP 1: Full Handshake
// =============================================================================

#[tokio::test]
async fn test_handshakes_then_frames_in_both_directions() {
    let (mut a, mut b) = connection_pair(RlpxConfig::for_testing(), eth63(), vec![Cap::new("eth", 63)])
        .await
        .unwrap();

    assert!(a.is_framed());
    assert!(b.is_framed());
    assert_eq!(a.remote_id(), a.remote_hello().map(|hello| hello.id));
    assert_eq!(b.remote_id(), b.remote_hello().map(|hello| hello.id));
    assert_ne!(a.remote_id(), b.remote_id());
    assert_eq!(a.remote_hello().unwrap().caps, vec![Cap::new("eth", 63)]);
    assert_eq!(b.remote_hello().unwrap().caps, eth63());

    a.send_data(0x10, b"from initiator").await.unwrap();
    b.send_data(0x11, b"from responder").await.unwrap();

    let at_b = b.read_msg().await.unwrap();
    assert_eq!(at_b.code, 0x10);
    assert_eq!(at_b.payload, b"from initiator");

    let at_a = a.read_msg().await.unwrap();
    assert_eq!(at_a.code, 0x11);
    assert_eq!(at_a.payload, b"from responder");
}

#[tokio::test]
async fn test_encryption_handshake_proves_identities() {
    let (initiator_key, responder_key) = (node_key(), node_key());
    let (a, b) = encrypted_pair_with(RlpxConfig::for_testing(), &initiator_key, &responder_key)
        .await
        .unwrap();

    assert_eq!(a.remote_id(), Some(NodeId::from(responder_key.public_key())));
    assert_eq!(b.remote_id(), Some(NodeId::from(initiator_key.public_key())));
    assert!(a.remote_hello().is_none());
}

#[tokio::test]
async fn test_many_frames_keep_ciphers_in_step() {
    let (mut a, mut b) = connection_pair(RlpxConfig::for_testing(), eth63(), eth63())
        .await
        .unwrap();

    for i in 0..50u64 {
        let payload = vec![i as u8; (i * 7) as usize];
        a.send_data(0x10 + i, &payload).await.unwrap();
    }
    for i in 0..50u64 {
        let message = b.read_msg().await.unwrap();
        assert_eq!(message.code, 0x10 + i);
        assert_eq!(message.payload.len(), (i * 7) as usize);
    }
}

// =============================================================================
// TEST GROUP 2: Handshake Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_encryption_handshake_times_out_on_silent_remote() {
    let (stream, _silent) = tokio::io::duplex(64 * 1024);
    let mut connection = Connection::new(stream, RlpxConfig::for_testing());
    let remote = NodeId::from(node_key().public_key());

    let error = connection
        .encryption_handshake(&node_key(), Some(remote))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        RlpxError::Transport(TransportError::Timeout { phase: "encryption handshake" })
    ));
    assert!(!connection.is_framed());
    assert_eq!(error.disconnect_reason(), DisconnectReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_protocol_handshake_times_out_without_remote_hello() {
    let (mut a, _b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    let key = node_key();

    let error = a.protocol_handshake(&hello_for(&key, eth63())).await.unwrap_err();

    assert!(matches!(
        error,
        RlpxError::Transport(TransportError::Timeout { phase: "protocol handshake" })
    ));
    assert!(!a.is_framed());
}

#[tokio::test]
async fn test_dialing_wrong_identity_fails_responder_decrypt() {
    let (a_stream, b_stream) = tokio::io::duplex(64 * 1024);
    let mut a = Connection::new(a_stream, RlpxConfig::for_testing());
    let mut b = Connection::new(b_stream, RlpxConfig::for_testing());
    let somebody_else = NodeId::from(node_key().public_key());
    let (a_key, b_key) = (node_key(), node_key());

    let (dialed, accepted) = tokio::join!(
        a.encryption_handshake(&a_key, Some(somebody_else)),
        b.encryption_handshake(&b_key, None),
    );

    assert!(matches!(
        accepted.unwrap_err(),
        RlpxError::Handshake(HandshakeError::MalformedAuth(_))
    ));
    assert!(matches!(
        dialed.unwrap_err(),
        RlpxError::Transport(TransportError::Closed)
    ));
}

#[tokio::test]
async fn test_dialing_self_is_rejected() {
    let (stream, _other) = tokio::io::duplex(64 * 1024);
    let mut connection = Connection::new(stream, RlpxConfig::for_testing());
    let key = node_key();
    let own_id = NodeId::from(key.public_key());

    let error = connection.encryption_handshake(&key, Some(own_id)).await.unwrap_err();

    assert!(matches!(error, RlpxError::Handshake(HandshakeError::SelfConnection)));
    assert_eq!(error.disconnect_reason(), DisconnectReason::SelfConnection);
}

#[tokio::test]
async fn test_hello_with_foreign_id_is_rejected() {
    let (a_key, b_key) = (node_key(), node_key());
    let (mut a, mut b) = encrypted_pair_with(RlpxConfig::for_testing(), &a_key, &b_key)
        .await
        .unwrap();

    let impostor = node_key();
    let a_hello = hello_for(&a_key, eth63());
    let b_hello = hello_for(&impostor, eth63());
    let (dialed, accepted) = tokio::join!(
        a.protocol_handshake(&a_hello),
        b.protocol_handshake(&b_hello),
    );

    let error = dialed.unwrap_err();
    assert!(matches!(error, RlpxError::Handshake(HandshakeError::UnexpectedIdentity)));
    assert_eq!(error.disconnect_reason(), DisconnectReason::UnexpectedIdentity);
    assert!(accepted.is_ok());
    assert!(a.remote_hello().is_none());
}

#[tokio::test]
async fn test_ping_before_hello_is_rejected() {
    let (mut a, mut b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    b.send_data(PING, &EMPTY_LIST).await.unwrap();

    let error = a.protocol_handshake(&hello_for(&node_key(), eth63())).await.unwrap_err();

    assert!(matches!(error, RlpxError::Protocol(ProtocolError::ExpectedHello(2))));
    assert_eq!(error.disconnect_reason(), DisconnectReason::ProtocolError);
}

#[tokio::test]
async fn test_disconnect_instead_of_hello_surfaces_reason() {
    let (mut a, mut b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    b.send_data(DISCONNECT, &encode_disconnect(DisconnectReason::TooManyPeers))
        .await
        .unwrap();

    let error = a.protocol_handshake(&hello_for(&node_key(), eth63())).await.unwrap_err();

    assert!(matches!(
        error,
        RlpxError::Protocol(ProtocolError::Disconnected(DisconnectReason::TooManyPeers))
    ));
}

#[tokio::test]
async fn test_undecodable_hello_is_malformed() {
    let (mut a, mut b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    b.send_data(HELLO, &[0xc1, 0xc0]).await.unwrap();

    let error = a.protocol_handshake(&hello_for(&node_key(), eth63())).await.unwrap_err();

    assert!(matches!(error, RlpxError::Handshake(HandshakeError::MalformedHello(_))));
}

#[tokio::test]
async fn test_oversized_hello_rejected_from_header() {
    let (mut a, mut b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    b.send_data(HELLO, &vec![0u8; 64 * 1024]).await.unwrap();

    let error = a.protocol_handshake(&hello_for(&node_key(), eth63())).await.unwrap_err();

    assert!(matches!(
        error,
        RlpxError::Handshake(HandshakeError::MalformedHello(ref detail)) if detail.starts_with("frame of")
    ));
}

#[tokio::test]
async fn test_remote_closing_during_handshake_is_closed() {
    let (stream, remote) = tokio::io::duplex(64 * 1024);
    drop(remote);
    let mut connection = Connection::new(stream, RlpxConfig::for_testing());

    let error = connection.encryption_handshake(&node_key(), None).await.unwrap_err();

    assert!(matches!(error, RlpxError::Transport(TransportError::Closed)));
}

// =============================================================================
// TEST GROUP 3: Stage Checks
// =============================================================================

#[tokio::test]
async fn test_framed_io_before_handshake_is_not_ready() {
    let (stream, _other) = tokio::io::duplex(1024);
    let mut connection = Connection::new(stream, RlpxConfig::for_testing());

    assert!(matches!(
        connection.send_data(0x10, b"early").await,
        Err(RlpxError::Transport(TransportError::NotReady(_)))
    ));
    assert!(matches!(
        connection.read_msg().await,
        Err(RlpxError::Transport(TransportError::NotReady(_)))
    ));
    assert!(matches!(
        connection.protocol_handshake(&hello_for(&node_key(), vec![])).await,
        Err(RlpxError::Transport(TransportError::NotReady(_)))
    ));
    assert!(connection.into_parts().is_err());
}

#[tokio::test]
async fn test_encryption_handshake_runs_once() {
    let (mut a, _b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    let remote = a.remote_id();

    let error = a.encryption_handshake(&node_key(), None).await.unwrap_err();

    assert!(matches!(error, RlpxError::Transport(TransportError::NotReady(_))));
    assert!(a.is_framed());
    assert_eq!(a.remote_id(), remote);
}

#[tokio::test]
async fn test_into_parts_requires_hello() {
    let (a, _b) = encrypted_pair(RlpxConfig::for_testing()).await.unwrap();
    assert!(a.into_parts().is_err());

    let (a, _b) = connection_pair(RlpxConfig::for_testing(), eth63(), eth63())
        .await
        .unwrap();
    let parts = a.into_parts().unwrap();
    assert_eq!(parts.remote_hello.id, parts.remote_id);
    assert_eq!(parts.config.client_name, "rlpx-test");
}

// =============================================================================
// TEST GROUP 4: Disconnect
// =============================================================================

#[tokio::test]
async fn test_disconnect_sends_reason_and_closes() {
    let (mut a, mut b) = connection_pair(RlpxConfig::for_testing(), eth63(), eth63())
        .await
        .unwrap();

    a.disconnect(DisconnectReason::UselessPeer).await;
    assert!(!a.is_framed());
    assert!(matches!(
        a.send_data(0x10, b"late").await,
        Err(RlpxError::Transport(TransportError::NotReady(_)))
    ));

    let message = b.read_msg().await.unwrap();
    assert_eq!(message.code, DISCONNECT);
    assert_eq!(
        decode_disconnect(&message.payload).unwrap(),
        DisconnectReason::UselessPeer
    );
    assert!(matches!(
        b.read_msg().await,
        Err(RlpxError::Transport(TransportError::Closed))
    ));
}

#[tokio::test]
async fn test_framed_writer_refuses_after_disconnect() {
    let (a, _b) = connection_pair(RlpxConfig::for_testing(), eth63(), eth63())
        .await
        .unwrap();
    let mut parts = a.into_parts().unwrap();

    parts.writer.send_disconnect(DisconnectReason::Requested).await.unwrap();

    assert!(parts.writer.is_closed());
    assert!(matches!(
        parts.writer.send(0x10, b"after").await,
        Err(RlpxError::Transport(TransportError::Closed))
    ));
}

// =============================================================================
// TEST GROUP 5: Configuration
// =============================================================================

#[test]
fn test_config_defaults() {
    let config = RlpxConfig::default();
    assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    assert_eq!(config.ping_interval, Some(Duration::from_secs(15)));
    assert_eq!(config.max_peers, 25);
    assert_eq!(config.inbound_queue_capacity, 256);
    assert!(config.client_name.starts_with("rlpx-core/v"));
}

#[test]
fn test_config_builders() {
    let config = RlpxConfig::for_testing()
        .with_handshake_timeout(Duration::from_secs(1))
        .with_client_name("custom")
        .with_listen_port(30303)
        .with_ping_interval(Some(Duration::from_secs(3)))
        .with_max_peers(2)
        .with_max_frame_size(4096)
        .with_inbound_queue_capacity(0);

    assert_eq!(config.handshake_timeout, Duration::from_secs(1));
    assert_eq!(config.client_name, "custom");
    assert_eq!(config.listen_port, 30303);
    assert_eq!(config.ping_interval, Some(Duration::from_secs(3)));
    assert_eq!(config.max_peers, 2);
    assert_eq!(config.max_frame_size, 4096);
    assert_eq!(config.inbound_queue_capacity, 1);
}

#[tokio::test]
async fn test_frame_limit_applies_to_receiver() {
    let (a_key, b_key) = (node_key(), node_key());
    let (mut a, mut b) = encrypted_pair_with(
        RlpxConfig::for_testing().with_max_frame_size(1024),
        &a_key,
        &b_key,
    )
    .await
    .unwrap();

    assert!(matches!(
        a.send_data(0x10, &vec![0u8; 2048]).await,
        Err(RlpxError::Protocol(ProtocolError::FrameTooLarge { .. }))
    ));
    a.send_data(0x10, &vec![0u8; 512]).await.unwrap();
    assert_eq!(b.read_msg().await.unwrap().payload.len(), 512);
}
