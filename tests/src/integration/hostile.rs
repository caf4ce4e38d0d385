//! # Hostile Clients
//!
//! Raw sockets that never complete a handshake. The server must drop them
//! without registering a peer and keep serving honest dialers.

#[cfg(test)]
mod tests {
    use super::super::*;
    use rand::RngCore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// True once the remote has closed or reset the socket.
    async fn closed_by_remote(stream: &mut TcpStream) -> bool {
        tokio::time::timeout(WAIT, async {
            let mut buf = [0u8; 512];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => continue,
                }
            }
        })
        .await
        .is_ok()
    }

    async fn listening_server(config: RlpxConfig) -> (Server, SocketAddr) {
        let server = server(config, vec![]);
        let addr = server.bind(loopback()).await.unwrap();
        (server, addr)
    }

    async fn honest_dial_succeeds(target: &Server) -> bool {
        let honest = server(RlpxConfig::for_testing(), vec![]);
        let connected = honest.dial(&target.enode().unwrap()).await.is_ok();
        honest.shutdown().await;
        connected
    }

    #[tokio::test]
    async fn test_undersized_auth_prefix_is_dropped() {
        let (target, addr) = listening_server(RlpxConfig::for_testing()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&[0x00, 0x05, 1, 2, 3, 4, 5]).await.unwrap();

        assert!(closed_by_remote(&mut stream).await);
        assert_eq!(target.peer_count(), 0);
        assert!(honest_dial_succeeds(&target).await);
        target.shutdown().await;
    }

    #[tokio::test]
    async fn test_random_auth_body_is_dropped() {
        let (target, addr) = listening_server(RlpxConfig::for_testing()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut body = vec![0u8; 400];
        rand::thread_rng().fill_bytes(&mut body);
        body[0] = 0x04;
        let mut packet = (body.len() as u16).to_be_bytes().to_vec();
        packet.extend_from_slice(&body);
        stream.write_all(&packet).await.unwrap();

        assert!(closed_by_remote(&mut stream).await);
        assert_eq!(target.peer_count(), 0);
        assert!(honest_dial_succeeds(&target).await);
        target.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let config = RlpxConfig::for_testing().with_handshake_timeout(Duration::from_millis(200));
        let (target, addr) = listening_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        assert!(closed_by_remote(&mut stream).await);
        assert_eq!(target.peer_count(), 0);
        target.shutdown().await;
    }

    #[tokio::test]
    async fn test_truncated_auth_times_out() {
        let config = RlpxConfig::for_testing().with_handshake_timeout(Duration::from_millis(200));
        let (target, addr) = listening_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Declares 300 bytes, delivers 100, then stalls
        stream.write_all(&300u16.to_be_bytes()).await.unwrap();
        stream.write_all(&[0x04; 100]).await.unwrap();

        assert!(closed_by_remote(&mut stream).await);
        assert_eq!(target.peer_count(), 0);
        assert!(honest_dial_succeeds(&target).await);
        target.shutdown().await;
    }

    #[tokio::test]
    async fn test_many_hostile_clients_do_not_block_accept() {
        let config = RlpxConfig::for_testing().with_handshake_timeout(Duration::from_millis(300));
        let (target, addr) = listening_server(config).await;

        let mut idle = Vec::new();
        for _ in 0..16 {
            idle.push(TcpStream::connect(addr).await.unwrap());
        }

        // Handshakes run off the accept loop, so an honest peer gets through
        assert!(honest_dial_succeeds(&target).await);

        for stream in &mut idle {
            assert!(closed_by_remote(stream).await);
        }
        target.shutdown().await;
    }
}
