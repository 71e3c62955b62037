//! End-to-end tests over a real TCP socket: login handshake, the command
//! loop, the rejection path, and isolation between two live connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use shellwire::config::ShellConfig;
use shellwire::server::{self, ShellState};

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (std::net::SocketAddr, Arc<ShellState>) {
    let state = ShellState::from_config(ShellConfig::default()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_state = state.clone();
    tokio::spawn(async move {
        let _ = server::serve(listener, serve_state).await;
    });
    (addr, state)
}

async fn read_until(stream: &mut TcpStream, acc: &mut String, needle: &str) {
    timeout(WAIT, async {
        loop {
            if acc.contains(needle) {
                return;
            }
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(
                n > 0,
                "connection closed while waiting for {:?}; got {:?}",
                needle,
                acc
            );
            acc.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {:?}; got {:?}", needle, acc));
}

async fn send(stream: &mut TcpStream, line: &str) {
    stream
        .write_all(format!("{}\n", line).as_bytes())
        .await
        .unwrap();
}

async fn login(addr: std::net::SocketAddr) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut acc = String::new();
    read_until(&mut stream, &mut acc, "login: ").await;
    send(&mut stream, "shellwire").await;
    read_until(&mut stream, &mut acc, "password: ").await;
    send(&mut stream, "shellwire").await;
    read_until(&mut stream, &mut acc, "shellwire> ").await;
    (stream, acc)
}

#[tokio::test]
async fn login_echo_and_exit() {
    let (addr, state) = start().await;
    let (mut stream, mut acc) = login(addr).await;
    assert!(acc.contains("Welcome, shellwire!"), "got: {}", acc);
    assert_eq!(state.registry.len(), 1);

    send(&mut stream, "echo round trip | grep round").await;
    read_until(&mut stream, &mut acc, "round trip").await;

    send(&mut stream, "exit").await;
    // server tears the connection down
    timeout(WAIT, async {
        let mut buf = [0u8; 256];
        loop {
            if stream.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn wrong_password_is_rejected_without_retry() {
    let (addr, state) = start().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut acc = String::new();

    read_until(&mut stream, &mut acc, "login: ").await;
    send(&mut stream, "shellwire").await;
    read_until(&mut stream, &mut acc, "password: ").await;
    send(&mut stream, "nope").await;
    read_until(&mut stream, &mut acc, "authentication failed").await;

    // no session was opened and the connection ends
    timeout(WAIT, async {
        let mut buf = [0u8; 256];
        loop {
            if stream.read(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(state.registry.len(), 0);
}

#[tokio::test]
async fn concurrent_connections_keep_separate_error_state() {
    let (addr, state) = start().await;
    let (mut a, mut acc_a) = login(addr).await;
    let (mut b, mut acc_b) = login(addr).await;
    assert_eq!(state.registry.len(), 2);

    // a fails; b must not see it
    send(&mut a, "frobnicate").await;
    read_until(&mut a, &mut acc_a, "unknown command 'frobnicate'").await;

    send(&mut b, "stacktrace").await;
    read_until(&mut b, &mut acc_b, "no error recorded for this session").await;

    send(&mut a, "stacktrace").await;
    read_until(&mut a, &mut acc_a, "last error [command]: unknown command 'frobnicate'").await;

    send(&mut a, "exit").await;
    send(&mut b, "exit").await;
}
