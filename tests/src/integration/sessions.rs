//! # Session Flows
//!
//! Two or more servers on loopback: capability negotiation, multiplexed
//! sub-protocol traffic, keepalive and peer limits.

#[cfg(test)]
mod tests {
    use super::super::*;
    use rlpx_core::test_utils::ProtocolEvent;
    use rlpx_core::{DisconnectReason, ProtocolError, RlpxError};

    fn received_count(count: usize) -> impl Fn(&[ProtocolEvent]) -> bool {
        move |events: &[ProtocolEvent]| {
            events
                .iter()
                .filter(|event| matches!(event, ProtocolEvent::Received { .. }))
                .count()
                >= count
        }
    }

    fn any_connected(events: &[ProtocolEvent]) -> bool {
        events
            .iter()
            .any(|event| matches!(event, ProtocolEvent::Connected(_)))
    }

    // =========================================================================
    // CAPABILITY NEGOTIATION
    // =========================================================================

    #[tokio::test]
    async fn test_highest_shared_version_is_bound_on_both_sides() {
        let a_eth63 = echo("eth", 63, 17);
        let a_eth62 = recorder("eth", 62, 8);
        let b_eth63 = recorder("eth", 63, 17);
        let b_hello = recorder("hello", 1, 4);

        let a = server(
            RlpxConfig::for_testing(),
            vec![dynamic(&a_eth63), dynamic(&a_eth62)],
        );
        let b = server(
            RlpxConfig::for_testing(),
            vec![dynamic(&b_eth63), dynamic(&b_hello)],
        );
        a.bind(loopback()).await.unwrap();

        let at_b = b.dial(&a.enode().unwrap()).await.unwrap();
        assert!(eventually(|| a.peer(&b.local_id()).is_some()).await);
        let at_a = a.peer(&b.local_id()).unwrap();

        for handle in [&at_a, &at_b] {
            let entries = handle.capabilities().entries();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].to_string(), "eth/63@16..33");
        }

        assert!(b_eth63.wait_for(WAIT, any_connected).await);
        let ctx = b_eth63.last_context().unwrap();
        ctx.send_data(7, b"block headers").await.unwrap();

        assert!(b_eth63.wait_for(WAIT, received_count(1)).await);
        assert_eq!(b_eth63.received(), vec![(7, b"block headers".to_vec())]);
        assert_eq!(a_eth63.received(), vec![(7, b"block headers".to_vec())]);
        assert!(a_eth62.events().is_empty());
        assert!(b_hello.events().is_empty());

        b.shutdown().await;
        a.shutdown().await;
    }

    #[tokio::test]
    async fn test_protocols_are_multiplexed_in_order() {
        let a_aaa = echo("aaa", 1, 3);
        let a_bbb = echo("bbb", 2, 5);
        let b_aaa = recorder("aaa", 1, 3);
        let b_bbb = recorder("bbb", 2, 5);

        let a = server(RlpxConfig::for_testing(), vec![dynamic(&a_aaa), dynamic(&a_bbb)]);
        let b = server(RlpxConfig::for_testing(), vec![dynamic(&b_aaa), dynamic(&b_bbb)]);
        a.bind(loopback()).await.unwrap();
        let handle = b.dial(&a.enode().unwrap()).await.unwrap();

        let aaa = handle.capabilities().get("aaa").unwrap().clone();
        let bbb = handle.capabilities().get("bbb").unwrap().clone();
        assert_eq!(aaa.range(), 16..19);
        assert_eq!(bbb.range(), 19..24);

        assert!(b_aaa.wait_for(WAIT, any_connected).await);
        assert!(b_bbb.wait_for(WAIT, any_connected).await);
        let (aaa_ctx, bbb_ctx) = (b_aaa.last_context().unwrap(), b_bbb.last_context().unwrap());

        for i in 0..20u8 {
            aaa_ctx.send_data(u64::from(i % 3), &[i]).await.unwrap();
            bbb_ctx.send_data(u64::from(i % 5), &[i, i]).await.unwrap();
        }

        assert!(b_aaa.wait_for(WAIT, received_count(20)).await);
        assert!(b_bbb.wait_for(WAIT, received_count(20)).await);

        let expected_aaa: Vec<_> = (0..20u8).map(|i| (u64::from(i % 3), vec![i])).collect();
        let expected_bbb: Vec<_> = (0..20u8).map(|i| (u64::from(i % 5), vec![i, i])).collect();
        assert_eq!(b_aaa.received(), expected_aaa);
        assert_eq!(b_bbb.received(), expected_bbb);

        b.shutdown().await;
        a.shutdown().await;
    }

    #[tokio::test]
    async fn test_large_payload_round_trip() {
        let a_eth = echo("eth", 63, 17);
        let b_eth = recorder("eth", 63, 17);
        let a = server(RlpxConfig::for_testing(), vec![dynamic(&a_eth)]);
        let b = server(RlpxConfig::for_testing(), vec![dynamic(&b_eth)]);
        a.bind(loopback()).await.unwrap();
        b.dial(&a.enode().unwrap()).await.unwrap();

        assert!(b_eth.wait_for(WAIT, any_connected).await);
        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        b_eth
            .last_context()
            .unwrap()
            .send_data(4, &payload)
            .await
            .unwrap();

        assert!(b_eth.wait_for(WAIT, received_count(1)).await);
        assert_eq!(b_eth.received(), vec![(4, payload)]);

        b.shutdown().await;
        a.shutdown().await;
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_keepalive_holds_idle_session_open() {
        let config = RlpxConfig::for_testing().with_ping_interval(Some(Duration::from_millis(50)));
        let a = server(config.clone(), vec![]);
        let b = server(config, vec![]);
        a.bind(loopback()).await.unwrap();
        let handle = b.dial(&a.enode().unwrap()).await.unwrap();

        // Several keepalive periods with no application traffic
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!handle.is_closing());
        assert_eq!(a.peer_count(), 1);
        assert_eq!(b.peer_count(), 1);

        b.shutdown().await;
        a.shutdown().await;
    }

    #[tokio::test]
    async fn test_hub_enforces_peer_limit() {
        let hub = server(RlpxConfig::for_testing().with_max_peers(3), vec![]);
        hub.bind(loopback()).await.unwrap();
        let enode = hub.enode().unwrap();

        let spokes: Vec<_> = (0..3).map(|_| server(RlpxConfig::for_testing(), vec![])).collect();
        for spoke in &spokes {
            spoke.dial(&enode).await.unwrap();
        }
        assert!(eventually(|| hub.peer_count() == 3).await);

        let extra = server(RlpxConfig::for_testing(), vec![]);
        let rejected = extra.dial(&enode).await.unwrap();
        rejected.closed().await;
        assert_eq!(rejected.disconnect_reason(), Some(DisconnectReason::TooManyPeers));
        assert_eq!(hub.peer_count(), 3);

        // A freed slot can be taken again
        spokes[0].shutdown().await;
        assert!(eventually(|| hub.peer_count() == 2).await);
        assert!(eventually(|| extra.peer_count() == 0).await);
        extra.dial(&enode).await.unwrap();
        assert!(eventually(|| hub.peer_count() == 3).await);

        for spoke in &spokes {
            spoke.shutdown().await;
        }
        extra.shutdown().await;
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_notifies_every_binding() {
        let hub_eth = recorder("eth", 63, 17);
        let hub = server(RlpxConfig::for_testing(), vec![dynamic(&hub_eth)]);
        hub.bind(loopback()).await.unwrap();
        let enode = hub.enode().unwrap();

        let mut handles = Vec::new();
        let mut spokes = Vec::new();
        for _ in 0..3 {
            let eth = recorder("eth", 63, 17);
            let spoke = server(RlpxConfig::for_testing(), vec![dynamic(&eth)]);
            handles.push(spoke.dial(&enode).await.unwrap());
            spokes.push((spoke, eth));
        }
        assert!(eventually(|| hub.peer_count() == 3).await);

        hub.shutdown().await;

        for handle in &handles {
            handle.closed().await;
            assert_eq!(handle.disconnect_reason(), Some(DisconnectReason::ClientQuitting));
        }
        for (_, eth) in &spokes {
            assert_eq!(eth.disconnect_count(), 1);
        }
        assert!(eventually(|| hub_eth.disconnect_count() == 3).await);

        let error = hub.dial(&enode).await.unwrap_err();
        assert!(matches!(
            error,
            RlpxError::Protocol(ProtocolError::Rejected(DisconnectReason::ClientQuitting))
        ));
    }
}
