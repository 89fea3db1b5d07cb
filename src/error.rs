//! Error types for TCP_INFO queries
//!
//! Every failure of a query is terminal for that call. The crate never
//! retries or logs; the caller decides whether to skip the diagnostic cycle.

use std::io;

/// Errors that can occur while reading kernel TCP state
///
/// # Error Categories
///
/// - **HandleUnavailable**: the connection object could not lend its raw
///   socket (closed, or not backed by a socket at all)
/// - **QueryFailed**: the kernel rejected (or truncated) the `TCP_INFO` read
/// - **Unsupported**: this build targets a platform without `TCP_INFO`
///
/// A failed `SO_SNDBUF` read is *not* an error. See [`crate::TcpInfo::snd_buf_size`].
#[derive(Debug, thiserror::Error)]
pub enum TcpInfoError {
    #[error("raw socket handle unavailable: {0}")]
    HandleUnavailable(String),

    #[error("TCP_INFO query failed: {0}")]
    QueryFailed(#[source] io::Error),

    #[error("TCP info is not supported on this platform")]
    Unsupported,
}

impl TcpInfoError {
    /// True when the compiled-in backend cannot query at all.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TcpInfoError::Unsupported)
    }
}

/// Errors from the network utility helpers in [`crate::netutil`]
#[derive(Debug, thiserror::Error)]
pub enum NetUtilError {
    #[error("interface enumeration error: {0}")]
    Interface(#[source] io::Error),

    #[error("interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("no non-loopback private IPv4 address found")]
    NoInnerIp,

    #[error("cannot listen on {addr}: {source}")]
    Listen {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("not supported on this platform")]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = TcpInfoError::HandleUnavailable("connection closed".to_string());
        assert_eq!(e.to_string(), "raw socket handle unavailable: connection closed");

        let e = TcpInfoError::QueryFailed(io::Error::other("protocol not available"));
        assert_eq!(e.to_string(), "TCP_INFO query failed: protocol not available");

        assert_eq!(
            TcpInfoError::Unsupported.to_string(),
            "TCP info is not supported on this platform"
        );
    }

    #[test]
    fn test_query_failed_keeps_source() {
        use std::error::Error;

        let e = TcpInfoError::QueryFailed(io::Error::new(io::ErrorKind::InvalidData, "short"));
        let source = e.source().expect("source should be preserved");
        assert_eq!(source.to_string(), "short");
    }

    #[test]
    fn test_is_unsupported() {
        assert!(TcpInfoError::Unsupported.is_unsupported());
        assert!(!TcpInfoError::HandleUnavailable(String::new()).is_unsupported());
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TcpInfoError>();
        assert_send_sync::<NetUtilError>();
    }
}
