use std::{
    future::Future,
    io::{self, ErrorKind},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use byte_string::ByteStr;
use log::info;
use tokio::{
    net::{TcpListener, UdpSocket},
    time,
};

use shadowsocks_transport::{
    crypto::{AeadCipher, CipherKind},
    net::{DatagramConn, ListenOpts, UdpConn},
    relay::udprelay::ProxySocketError,
    security::replay::{ReplayConfig, ReplayProtector},
    ConnectOpts, Dialer, ProxySocket,
};

type SecureConn = ProxySocket<UdpConn, AeadCipher>;

fn cipher(kind: CipherKind) -> AeadCipher {
    let key = (0..kind.key_len()).map(|i| (i * 31 + 7) as u8).collect::<Vec<u8>>();
    AeadCipher::new(kind, &key).unwrap()
}

// Each peer plays a separate process, with its own protector
fn replay_protector() -> Arc<ReplayProtector> {
    let config = ReplayConfig {
        capacity: 10_000,
        false_positive_rate: 1e-9,
        slots: 4,
    };
    Arc::new(ReplayProtector::new(&config).unwrap())
}

async fn secure_conn(kind: CipherKind) -> SecureConn {
    let conn = UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    ProxySocket::new(conn, cipher(kind), replay_protector())
}

async fn within<F: Future>(fut: F) -> F::Output {
    time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation timed out")
}

async fn udp_echo(kind: CipherKind) -> io::Result<()> {
    let server = secure_conn(kind).await;
    let server_addr = server.local_addr()?;

    tokio::spawn(async move {
        let mut buffer = vec![0u8; 65536];
        loop {
            match server.recv_from(&mut buffer).await {
                Ok((n, peer_addr)) => {
                    info!("echo packet: {:?}", ByteStr::new(&buffer[..n]));
                    let _ = server.send_to(&buffer[..n], peer_addr).await;
                }
                Err(err) => info!("echo server dropped packet, error: {}", err),
            }
        }
    });

    let client = secure_conn(kind).await;

    const SEND_PAYLOAD: &[u8] = b"HELLO WORLD. \x0012345";
    let n = client.send_to(SEND_PAYLOAD, server_addr).await?;
    assert_eq!(n, SEND_PAYLOAD.len());

    let mut buffer = [0u8; 65536];
    let (n, peer_addr) = within(client.recv_from(&mut buffer)).await?;

    assert_eq!(peer_addr, server_addr);
    assert_eq!(&buffer[..n], SEND_PAYLOAD);

    Ok(())
}

#[tokio::test]
async fn udp_echo_aead() {
    let _ = env_logger::try_init();

    for kind in CipherKind::ALL {
        udp_echo(kind).await.unwrap();
    }
}

#[tokio::test]
async fn udp_wire_format() {
    let _ = env_logger::try_init();

    let client = secure_conn(CipherKind::AES_256_GCM).await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    client.send_to(b"ping", raw.local_addr().unwrap()).await.unwrap();

    let mut buffer = [0u8; 2048];
    let (n, _) = within(raw.recv_from(&mut buffer)).await.unwrap();

    // SALT (32) + "ping" + TAG (16)
    assert_eq!(n, 52);
}

#[cfg(feature = "security-replay-attack-detect")]
#[tokio::test]
async fn udp_reflected_packet_dropped() {
    let _ = env_logger::try_init();

    let client = secure_conn(CipherKind::CHACHA20_POLY1305).await;
    let client_addr = client.local_addr().unwrap();

    // Bounce the client's own packet back to it
    let reflector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"reflect me", reflector.local_addr().unwrap()).await.unwrap();

    let mut buffer = [0u8; 2048];
    let (n, _) = within(reflector.recv_from(&mut buffer)).await.unwrap();
    reflector.send_to(&buffer[..n], client_addr).await.unwrap();

    let mut recv_buf = [0u8; 2048];
    let err = within(client.recv_from(&mut recv_buf)).await.unwrap_err();
    match err {
        ProxySocketError::ProtocolErrorWithPeer(peer, ref perr) => {
            assert_eq!(peer, reflector.local_addr().unwrap());
            assert!(perr.is_repeated_salt(), "{}", perr);
        }
        err => panic!("unexpected error {}", err),
    }

    // The socket keeps working for legitimate peers
    let server = secure_conn(CipherKind::CHACHA20_POLY1305).await;
    server.send_to(b"legit", client_addr).await.unwrap();

    let (n, _) = within(client.recv_from(&mut recv_buf)).await.unwrap();
    assert_eq!(&recv_buf[..n], b"legit");
}

#[tokio::test]
async fn udp_forged_packets_dropped() {
    let _ = env_logger::try_init();

    let server = secure_conn(CipherKind::AES_128_GCM).await;
    let server_addr = server.local_addr().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut recv_buf = [0u8; 2048];

    raw.send_to(&[0x42u8; 64], server_addr).await.unwrap();
    let err = within(server.recv_from(&mut recv_buf)).await.unwrap_err();
    assert!(err.protocol_error().unwrap().is_decrypt_failure(), "{}", err);

    raw.send_to(&[0x42u8; 20], server_addr).await.unwrap();
    let err = within(server.recv_from(&mut recv_buf)).await.unwrap_err();
    assert!(err.protocol_error().unwrap().is_short_packet(), "{}", err);

    // Not an I/O error, converted for callers of `DatagramConn`
    let err: io::Error = err.into();
    assert_eq!(err.kind(), ErrorKind::Other);

    let client = secure_conn(CipherKind::AES_128_GCM).await;
    client.send_to(b"after forgery", server_addr).await.unwrap();
    let (n, _) = within(server.recv_from(&mut recv_buf)).await.unwrap();
    assert_eq!(&recv_buf[..n], b"after forgery");
}

#[tokio::test]
async fn udp_concurrent_writes() {
    let _ = env_logger::try_init();

    const TASKS: u8 = 8;
    const PACKETS: usize = 8;
    const PAYLOAD_LEN: usize = 512;

    let receiver = secure_conn(CipherKind::XCHACHA20_POLY1305).await;
    let receiver_addr = receiver.local_addr().unwrap();

    let sender = Arc::new(secure_conn(CipherKind::XCHACHA20_POLY1305).await);

    let mut tasks = Vec::new();
    for id in 0..TASKS {
        let sender = sender.clone();
        tasks.push(tokio::spawn(async move {
            let payload = [id; PAYLOAD_LEN];
            for _ in 0..PACKETS {
                sender.send_to(&payload, receiver_addr).await.unwrap();
            }
        }));
    }

    let mut counts = [0usize; TASKS as usize];
    let mut recv_buf = [0u8; 4096];
    for _ in 0..TASKS as usize * PACKETS {
        let (n, _) = within(receiver.recv_from(&mut recv_buf)).await.unwrap();
        assert_eq!(n, PAYLOAD_LEN);

        let id = recv_buf[0];
        assert!(recv_buf[..n].iter().all(|b| *b == id));
        counts[id as usize] += 1;
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert!(counts.iter().all(|c| *c == PACKETS), "{:?}", counts);
}

#[tokio::test]
async fn udp_read_deadline() {
    let _ = env_logger::try_init();

    let conn = UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let mut buf = [0u8; 128];

    conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(100)))
        .unwrap();
    let err = within(conn.recv_from(&mut buf)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);

    conn.set_read_deadline(None).unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"late", conn.local_addr().unwrap()).await.unwrap();
    let (n, _) = within(conn.recv_from(&mut buf)).await.unwrap();
    assert_eq!(&buf[..n], b"late");
}

#[tokio::test]
async fn udp_read_deadline_pending_read() {
    let _ = env_logger::try_init();

    let conn = Arc::new(UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());

    let reader = {
        let conn = conn.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            conn.recv_from(&mut buf).await
        })
    };

    // The read is already waiting without any deadline
    time::sleep(Duration::from_millis(50)).await;
    conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)))
        .unwrap();

    let err = within(reader).await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);

    // Clearing the deadline keeps a pending read waiting for data
    conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(200)))
        .unwrap();
    let reader = {
        let conn = conn.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            conn.recv_from(&mut buf).await.map(|(n, _)| buf[..n].to_vec())
        })
    };

    time::sleep(Duration::from_millis(50)).await;
    conn.set_read_deadline(None).unwrap();

    time::sleep(Duration::from_millis(300)).await;
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"still here", conn.local_addr().unwrap()).await.unwrap();
    assert_eq!(within(reader).await.unwrap().unwrap(), b"still here");
}

#[tokio::test]
async fn udp_close_unblocks_read() {
    let _ = env_logger::try_init();

    let conn = Arc::new(UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());

    let reader = {
        let conn = conn.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            conn.recv_from(&mut buf).await
        })
    };

    time::sleep(Duration::from_millis(50)).await;
    conn.close().unwrap();

    let err = within(reader).await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionAborted);

    assert!(conn.local_addr().is_err());
    assert!(conn.close().is_err());
    assert!(!conn.is_empty());
}

#[tokio::test]
async fn udp_empty_secure_conn() {
    let _ = env_logger::try_init();

    let socket = ProxySocket::new(UdpConn::default(), cipher(CipherKind::AES_128_GCM), replay_protector());
    assert!(socket.is_empty());

    let err = socket
        .send_to(b"nowhere", "127.0.0.1:9".parse().unwrap())
        .await
        .unwrap_err();
    match err {
        ProxySocketError::IoError(ref err) => assert_eq!(err.kind(), ErrorKind::NotConnected),
        err => panic!("unexpected error {}", err),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[tokio::test]
async fn udp_recv_original_destination() {
    let _ = env_logger::try_init();

    let opts = ListenOpts {
        recv_orig_dst: true,
        ..Default::default()
    };
    let conn = UdpConn::listen("127.0.0.1:0".parse().unwrap(), &opts).await.unwrap();
    let listen_addr = conn.local_addr().unwrap();
    let server = ProxySocket::new(conn, cipher(CipherKind::AES_256_GCM), replay_protector());

    let client = secure_conn(CipherKind::AES_256_GCM).await;
    client.send_to(b"where to?", listen_addr).await.unwrap();

    let mut buf = [0u8; 2048];
    let (n, peer_addr, control) = within(server.recv_msg(&mut buf)).await.unwrap();
    assert_eq!(&buf[..n], b"where to?");
    assert_eq!(peer_addr, client.local_addr().unwrap());

    // Not redirected, so the original destination is the listening address
    assert_eq!(control.original_destination().unwrap(), listen_addr);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[tokio::test]
async fn udp_recv_msg_without_option() {
    let _ = env_logger::try_init();

    let conn = UdpConn::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    raw.send_to(b"plain", conn.local_addr().unwrap()).await.unwrap();

    let mut buf = [0u8; 128];
    let (n, _, control) = within(conn.recv_msg(&mut buf)).await.unwrap();
    assert_eq!(&buf[..n], b"plain");
    assert_eq!(control.original_destination().unwrap_err().kind(), ErrorKind::InvalidData);
}

#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
#[tokio::test]
async fn udp_reuse_port() {
    let _ = env_logger::try_init();

    let opts = ListenOpts {
        reuse_port: true,
        ..Default::default()
    };
    let first = UdpConn::listen("127.0.0.1:0".parse().unwrap(), &opts).await.unwrap();
    let addr = first.local_addr().unwrap();

    let second = UdpConn::listen(addr, &opts).await.unwrap();
    assert_eq!(second.local_addr().unwrap(), addr);

    let err = UdpConn::bind(addr).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AddrInUse);
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "macos"))]
#[tokio::test]
async fn udp_do_not_fragment() {
    let _ = env_logger::try_init();

    let opts = ListenOpts {
        do_not_fragment: true,
        ..Default::default()
    };
    let conn = UdpConn::listen("127.0.0.1:0".parse().unwrap(), &opts).await.unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    conn.send_to(b"df", raw.local_addr().unwrap()).await.unwrap();

    let mut buf = [0u8; 16];
    let (n, _) = within(raw.recv_from(&mut buf)).await.unwrap();
    assert_eq!(&buf[..n], b"df");
}

// Privileged options either work, or are refused. Never silently skipped.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[tokio::test]
async fn udp_privileged_options() {
    let _ = env_logger::try_init();

    let options = [
        ListenOpts {
            transparent: true,
            ..Default::default()
        },
        ListenOpts {
            fwmark: Some(0x1000),
            ..Default::default()
        },
    ];

    for opts in options {
        match UdpConn::listen("127.0.0.1:0".parse().unwrap(), &opts).await {
            Ok(conn) => assert!(!conn.is_empty()),
            Err(err) => assert_eq!(err.kind(), ErrorKind::PermissionDenied, "{:?}: {}", opts, err),
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "ios", windows))]
#[tokio::test]
async fn udp_unsupported_option() {
    let _ = env_logger::try_init();

    let opts = ListenOpts {
        recv_orig_dst: true,
        ..Default::default()
    };
    let err = UdpConn::listen("127.0.0.1:0".parse().unwrap(), &opts).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(err.to_string().starts_with("original destination message not supported on"));
}

#[tokio::test]
async fn dialer_marks_are_not_fatal() {
    let _ = env_logger::try_init();

    let dialer = Dialer::new(ConnectOpts {
        fwmark: Some(0x1000),
        ..Default::default()
    });

    let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let echo_addr = echo.local_addr().unwrap();

    let socket = dialer.connect_udp(echo_addr).await.unwrap();
    socket.send(b"marked").await.unwrap();

    let mut buf = [0u8; 16];
    let (n, peer_addr) = within(echo.recv_from(&mut buf)).await.unwrap();
    assert_eq!(&buf[..n], b"marked");
    assert_eq!(peer_addr, socket.local_addr().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = listener.local_addr().unwrap();

    let (stream, accepted) = tokio::join!(dialer.connect_tcp(listen_addr), listener.accept());
    let stream = stream.unwrap();
    let (_, peer_addr) = accepted.unwrap();
    assert_eq!(peer_addr, stream.local_addr().unwrap());
}

#[tokio::test]
async fn dialer_bind_local_addr() {
    let _ = env_logger::try_init();

    let local_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let dialer = Dialer::new(ConnectOpts {
        bind_local_addr: Some(local_addr),
        allow_fragmentation: true,
        ..Default::default()
    });

    let socket = dialer.bind_udp(local_addr.into()).await.unwrap();
    assert_eq!(socket.local_addr().unwrap().ip(), local_addr.ip());
}
