// ============================================================================
// TCP VITALS LIBRARY
// ============================================================================
// This library reads the kernel's own view of a live TCP connection: RTT,
// congestion window, retransmission counters, timers and the configured
// send buffer. It borrows the raw socket behind a connection the caller
// already owns, asks the kernel via getsockopt(), and returns a plain value.
//
// === KEY FEATURES ===
// 1. One call, one contract on every platform: query_tcp_health()
// 2. Real backend on Linux/Android (TCP_INFO + SO_SNDBUF)
// 3. Compile-time stub everywhere else (always Unsupported, zero cost)
// 4. Guarded socket access: the descriptor never escapes the query
// 5. Small network helpers (interface addresses, port probing) in `netutil`
//
// === WHAT THIS LIBRARY DOES NOT DO ===
// It never dials, closes, reconnects or writes to the connection. The caller
// owns the connection before, during and after every query.

// === MODULE DECLARATIONS ===
mod backend;
pub mod connection;
pub mod error;
pub mod netutil;
pub mod snapshot;

pub use connection::{SharedTcpStream, SocketHandle, TcpConnection};
pub use error::{NetUtilError, TcpInfoError};
pub use snapshot::{CaState, TcpInfo, TcpOption, TcpState};

use backend::{PlatformBackend, TcpInfoBackend};

// ============================================================================
// CONSTANTS: DEFAULTS FOR THE PROBE BINARY
// ============================================================================
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5; // Dial timeout per target
pub const MIN_WATCH_INTERVAL_SECS: u64 = 1; // Lower bound for --watch

// ============================================================================
// TCP STATE CONSTANTS
// ============================================================================
// These match the values used by the Linux kernel (include/net/tcp_states.h),
// which is what tcpi_state reports.
pub const TCP_ESTABLISHED: u8 = 0x01; // Active connection, data flowing
pub const TCP_SYN_SENT: u8 = 0x02; // Client sent connection request
pub const TCP_SYN_RECV: u8 = 0x03; // Server received connection request
pub const TCP_FIN_WAIT1: u8 = 0x04; // Closing connection (stage 1)
pub const TCP_FIN_WAIT2: u8 = 0x05; // Closing connection (stage 2)
pub const TCP_TIME_WAIT: u8 = 0x06; // Waiting for network to clear old packets
pub const TCP_CLOSE: u8 = 0x07; // Connection closed
pub const TCP_CLOSE_WAIT: u8 = 0x08; // Remote side closed, waiting for local close
pub const TCP_LAST_ACK: u8 = 0x09; // Waiting for final acknowledgment
pub const TCP_LISTEN: u8 = 0x0A; // Listening for incoming connections
pub const TCP_CLOSING: u8 = 0x0B; // Both sides closing simultaneously

// ============================================================================
// CONGESTION-AVOIDANCE STATE CONSTANTS
// ============================================================================
// enum tcp_ca_state from include/net/tcp.h (reported as tcpi_ca_state)
pub const TCP_CA_OPEN: u8 = 0; // Normal, no loss suspected
pub const TCP_CA_DISORDER: u8 = 1; // SACKs or dup ACKs seen, reordering?
pub const TCP_CA_CWR: u8 = 2; // cwnd reduced (ECN or local congestion)
pub const TCP_CA_RECOVERY: u8 = 3; // Fast retransmit in progress
pub const TCP_CA_LOSS: u8 = 4; // RTO fired, retransmitting from scratch

/// Whether the compiled-in backend can read TCP_INFO at all
pub const TCP_INFO_SUPPORTED: bool = <PlatformBackend as TcpInfoBackend>::SUPPORTED;

/// Convert a numeric TCP state to its conventional name
///
/// === MATCH EXPRESSION ===
/// Unknown values (a newer kernel, or garbage) map to "UNKNOWN" instead of
/// panicking, so this is safe to call on any raw `tcpi_state`.
#[inline]
#[must_use]
pub fn get_tcp_state_name(state: u8) -> &'static str {
    match state {
        TCP_ESTABLISHED => "ESTABLISHED",
        TCP_SYN_SENT => "SYN_SENT",
        TCP_SYN_RECV => "SYN_RECV",
        TCP_FIN_WAIT1 => "FIN_WAIT1",
        TCP_FIN_WAIT2 => "FIN_WAIT2",
        TCP_TIME_WAIT => "TIME_WAIT",
        TCP_CLOSE => "CLOSE",
        TCP_CLOSE_WAIT => "CLOSE_WAIT",
        TCP_LAST_ACK => "LAST_ACK",
        TCP_LISTEN => "LISTEN",
        TCP_CLOSING => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Convert a numeric congestion-avoidance state to its name
#[inline]
#[must_use]
pub fn get_ca_state_name(ca_state: u8) -> &'static str {
    match ca_state {
        TCP_CA_OPEN => "OPEN",
        TCP_CA_DISORDER => "DISORDER",
        TCP_CA_CWR => "CWR",
        TCP_CA_RECOVERY => "RECOVERY",
        TCP_CA_LOSS => "LOSS",
        _ => "UNKNOWN",
    }
}

// ============================================================================
// QUERY FAÇADE
// ============================================================================

/// Read the kernel's TCP state for `conn`
///
/// Borrows the connection's socket for the duration of the call, reads
/// `SO_SNDBUF` and `TCP_INFO`, and returns a fully populated [`TcpInfo`].
/// The connection itself is not touched: no reads, writes or shutdowns.
///
/// === ERRORS ===
/// - [`TcpInfoError::HandleUnavailable`]: the connection could not lend a
///   socket (e.g. a [`SharedTcpStream`] that was closed)
/// - [`TcpInfoError::QueryFailed`]: the kernel rejected the `TCP_INFO` read
/// - [`TcpInfoError::Unsupported`]: not Linux/Android
///
/// A failed `SO_SNDBUF` read is not an error; `snd_buf_size` is then 0.
///
/// === NO RETRIES ===
/// A snapshot is a point in time. Retrying after a failure would observe a
/// different point, so the first error is returned as-is.
///
/// # Example
///
/// ```no_run
/// use std::net::TcpStream;
/// use tcp_vitals::query_tcp_health;
///
/// let stream = TcpStream::connect("example.com:80")?;
/// match query_tcp_health(&stream) {
///     Ok(info) => println!("RTT: {:.3} ms, cwnd: {}", info.rtt_ms(), info.snd_cwnd),
///     Err(e) if e.is_unsupported() => println!("no TCP_INFO here"),
///     Err(e) => eprintln!("query failed: {e}"),
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn query_tcp_health<C: TcpConnection + ?Sized>(conn: &C) -> Result<TcpInfo, TcpInfoError> {
    PlatformBackend::query(conn)
}

/// Whether [`query_tcp_health`] can ever succeed in this build
#[inline]
#[must_use]
pub const fn is_supported() -> bool {
    TCP_INFO_SUPPORTED
}
