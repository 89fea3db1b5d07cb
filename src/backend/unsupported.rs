//! Stub backend for platforms without `TCP_INFO`
//!
//! Never touches the connection: no handle acquisition, no syscalls.

use super::TcpInfoBackend;
use crate::connection::TcpConnection;
use crate::error::TcpInfoError;
use crate::snapshot::TcpInfo;

pub(crate) struct UnsupportedBackend;

impl TcpInfoBackend for UnsupportedBackend {
    const SUPPORTED: bool = false;

    #[inline]
    fn query<C: TcpConnection + ?Sized>(_conn: &C) -> Result<TcpInfo, TcpInfoError> {
        Err(TcpInfoError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SocketHandle;

    /// Connection that records whether anyone asked for its socket
    struct Untouchable {
        touched: std::cell::Cell<bool>,
    }

    impl TcpConnection for Untouchable {
        fn with_socket<R, F>(&self, _f: F) -> Result<R, TcpInfoError>
        where
            F: FnOnce(SocketHandle<'_>) -> R,
        {
            self.touched.set(true);
            Err(TcpInfoError::HandleUnavailable("should not be asked".to_string()))
        }
    }

    #[test]
    fn test_stub_always_unsupported_without_acquiring() {
        let conn = Untouchable {
            touched: std::cell::Cell::new(false),
        };
        for _ in 0..3 {
            let result = UnsupportedBackend::query(&conn);
            assert!(matches!(result, Err(TcpInfoError::Unsupported)));
        }
        assert!(!conn.touched.get(), "stub must not acquire the socket");
        assert!(!UnsupportedBackend::SUPPORTED);
    }
}
