//! Linux-only integration tests for TCP_INFO queries over loopback.
//!
//! Everything runs against 127.0.0.1; no privileges or external network
//! needed.
//!
//! Run with: `cargo test --test loopback_integration`

#![cfg(target_os = "linux")]

use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tcp_vitals::{SharedTcpStream, TcpInfoError, TcpState, query_tcp_health};

fn connected_pair(listener: &TcpListener) -> (TcpStream, TcpStream) {
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).expect("connect");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

fn set_send_buffer(stream: &TcpStream, bytes: libc::c_int) {
    let ret = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_SNDBUF,
            (&raw const bytes).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    assert_eq!(ret, 0, "setsockopt(SO_SNDBUF): {}", std::io::Error::last_os_error());
}

/// Healthy loopback connection reports ESTABLISHED and sane counters.
#[test]
fn established_connection_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let (client, _server) = connected_pair(&listener);

    let info = query_tcp_health(&client).expect("query");

    assert_eq!(info.tcp_state(), Some(TcpState::Established));
    assert_eq!(info.retransmits, 0);
    assert_eq!(info.lost, 0);
    assert_eq!(info.unacked, 0);
    assert!(info.pmtu > 0);
    assert!(info.advmss > 0);
    assert!(info.rcv_space > 0);
    assert!(info.snd_buf_size > 0);
}

/// N threads, N connections, each with its own SO_SNDBUF: every snapshot
/// must report the buffer of the connection it was taken from.
#[test]
fn concurrent_queries_are_independent() {
    const CONNECTIONS: usize = 8;
    const BASE: libc::c_int = 4 * 1024;

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let pairs: Vec<_> = (0..CONNECTIONS)
        .map(|i| {
            let (client, server) = connected_pair(&listener);
            set_send_buffer(&client, BASE * (i as libc::c_int + 1));
            (Arc::new(client), server)
        })
        .collect();

    // The kernel may double (and clamp) the requested value; read back what
    // it actually stored so the comparison is exact.
    let expected: Vec<i32> = pairs
        .iter()
        .map(|(client, _)| query_tcp_health(&**client).expect("query").snd_buf_size)
        .collect();
    for pair in expected.windows(2) {
        assert!(pair[0] < pair[1], "buffer sizes should be distinct: {expected:?}");
    }

    let handles: Vec<_> = pairs
        .iter()
        .map(|(client, _)| {
            let client = Arc::clone(client);
            thread::spawn(move || {
                (0..50)
                    .map(|_| query_tcp_health(&client).expect("query").snd_buf_size)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let observed = handle.join().expect("query thread");
        assert!(
            observed.iter().all(|&size| size == expected[i]),
            "connection {i}: expected {} every time, got {observed:?}",
            expected[i]
        );
    }
}

/// Observing an idle connection must not reset its idle timers.
#[test]
fn idle_timers_do_not_decrease() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let (client, _server) = connected_pair(&listener);

    let first = query_tcp_health(&client).expect("first query");
    thread::sleep(Duration::from_millis(30));
    let second = query_tcp_health(&client).expect("second query");

    assert!(second.last_data_sent >= first.last_data_sent);
    assert!(second.last_data_recv >= first.last_data_recv);
    assert!(second.last_ack_recv >= first.last_ack_recv);
}

/// A shared connection closed by another holder yields HandleUnavailable,
/// never a snapshot.
#[test]
fn shared_connection_closed_elsewhere() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let (client, _server) = connected_pair(&listener);
    let shared = SharedTcpStream::new(client);
    let observer = shared.clone();

    let closer = thread::spawn(move || shared.close());
    assert!(closer.join().expect("closer thread"));

    match query_tcp_health(&observer) {
        Err(TcpInfoError::HandleUnavailable(_)) => {}
        other => panic!("expected HandleUnavailable, got {other:?}"),
    }
}

/// Queries racing a close either see a full snapshot or HandleUnavailable.
#[test]
fn query_racing_close_is_all_or_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let (client, _server) = connected_pair(&listener);
    let shared = SharedTcpStream::new(client);

    let reader = {
        let shared = shared.clone();
        thread::spawn(move || {
            let mut snapshots = 0;
            loop {
                match query_tcp_health(&shared) {
                    Ok(info) => {
                        assert!(info.is_established());
                        snapshots += 1;
                    }
                    Err(TcpInfoError::HandleUnavailable(_)) => return snapshots,
                    Err(e) => panic!("unexpected error while racing close: {e}"),
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    shared.close();
    let snapshots = reader.join().expect("reader thread");
    assert!(snapshots > 0);
}
