fn main() {
    println!("Run `cargo test -p filedrop-wire-compat` to execute wire compatibility tests.");
}

/// Byte-exact checks against peers that speak the raw protocol without
/// going through `filedrop-protocol`.
#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use filedrop_data_channel::UploadClient;
    use filedrop_upload_server::{ServerConfig, ServerError, UploadServer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    struct Running {
        server: Arc<UploadServer>,
        addr: SocketAddr,
        handle: JoinHandle<Result<(), ServerError>>,
    }

    impl Running {
        async fn stop(self) {
            self.server.shutdown();
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn start_server(base_dir: &Path, read_buffer_size: usize) -> Running {
        let config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            base_dir: base_dir.to_path_buf(),
            read_buffer_size,
        };
        let server = UploadServer::new(config, CancellationToken::new());
        let server2 = Arc::clone(&server);
        let handle = tokio::spawn(async move { server2.run().await });

        for _ in 0..100 {
            if let Some(addr) = server.local_addr().await {
                return Running {
                    server,
                    addr,
                    handle,
                };
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server did not bind");
    }

    /// Sends raw bytes, half-closes, and returns whatever the server sent
    /// back before closing.
    async fn raw_session(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    fn peer_dir(base: &Path) -> PathBuf {
        base.join("127.0.0.1")
    }

    #[tokio::test]
    async fn accepts_hand_written_session() {
        let base = tempfile::tempdir().unwrap();
        let running = start_server(base.path(), 8192).await;

        let reply = raw_session(running.addr, b"a.txt\x003\x00xyzb.bin\x000\x00\x000\x00").await;
        assert!(reply.is_empty(), "server never writes to the client");
        running.stop().await;

        let dir = peer_dir(base.path());
        assert_eq!(std::fs::read(dir.join("a.txt")).unwrap(), b"xyz");
        assert_eq!(std::fs::metadata(dir.join("b.bin")).unwrap().len(), 0);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn empty_name_with_size_ends_session() {
        let base = tempfile::tempdir().unwrap();
        let running = start_server(base.path(), 8192).await;

        // An empty name ends the session whatever size follows it.
        raw_session(running.addr, b"a.txt\x001\x00z\x0042\x00").await;
        running.stop().await;

        assert_eq!(std::fs::read(peer_dir(base.path()).join("a.txt")).unwrap(), b"z");
    }

    #[tokio::test]
    async fn tiny_read_buffer_reassembles_payload() {
        let base = tempfile::tempdir().unwrap();
        let running = start_server(base.path(), 7).await;

        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let mut bytes = format!("big.bin\x00{}\x00", payload.len()).into_bytes();
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(b"\x000\x00");

        raw_session(running.addr, &bytes).await;
        running.stop().await;

        assert_eq!(
            std::fs::read(peer_dir(base.path()).join("big.bin")).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn client_emits_exact_bytes() {
        let src = tempfile::tempdir().unwrap();
        let a = src.path().join("a.txt");
        let b = src.path().join("b.bin");
        std::fs::write(&a, b"xyz").unwrap();
        std::fs::write(&b, b"").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let capture = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).await.unwrap();
            wire
        });

        let report = UploadClient::upload(addr, &[a, b]).await.unwrap();
        assert_eq!(report.sent.len(), 2);

        let wire = capture.await.unwrap();
        assert_eq!(wire, b"a.txt\x003\x00xyzb.bin\x000\x00\x000\x00");
    }

    #[tokio::test]
    async fn client_skips_missing_file_on_the_wire() {
        let src = tempfile::tempdir().unwrap();
        let present = src.path().join("here.txt");
        std::fs::write(&present, b"1").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let capture = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).await.unwrap();
            wire
        });

        let paths = [src.path().join("gone.txt"), present];
        let report = UploadClient::upload(addr, &paths).await.unwrap();
        assert_eq!(report.failed.len(), 1);

        let wire = capture.await.unwrap();
        assert_eq!(wire, b"here.txt\x001\x001\x000\x00");
    }
}
