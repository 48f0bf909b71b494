//! Ephemeral port acquisition.
//!
//! A port is taken by binding `127.0.0.1:0` and reading back what the OS
//! assigned, then recorded in a process-wide set for as long as the lease
//! lives. The OS can hand the same port to a second caller once the first
//! listener is closed, so the set is what keeps concurrent sessions apart
//! after the socket is released for the target to bind.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{LazyLock, Mutex};

/// Ports currently held by a live [`PortLease`].
static LEASED_PORTS: LazyLock<Mutex<HashSet<u16>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

const MAX_ATTEMPTS: usize = 32;

/// A port reserved for one session.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    listener: Option<TcpListener>,
}

impl PortLease {
    /// Bind an OS-assigned port on the loopback interface and register it.
    pub fn acquire() -> std::io::Result<Self> {
        for _ in 0..MAX_ATTEMPTS {
            let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
            let port = listener.local_addr()?.port();

            if leased_ports().insert(port) {
                tracing::debug!(port, "Leased ephemeral port");
                return Ok(Self {
                    port,
                    listener: Some(listener),
                });
            }

            tracing::trace!(port, "Port already leased by another session, retrying");
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("no unleased port after {} attempts", MAX_ATTEMPTS),
        ))
    }

    /// The leased port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Close the listening socket so the target can bind the port.
    ///
    /// The port stays registered until the lease is dropped.
    pub fn release_socket(&mut self) {
        if self.listener.take().is_some() {
            tracing::trace!(port = self.port, "Released listener socket");
        }
    }

    /// Whether the lease still holds the listening socket.
    pub fn holds_socket(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.listener.take();
        leased_ports().remove(&self.port);
    }
}

fn leased_ports() -> std::sync::MutexGuard<'static, HashSet<u16>> {
    LEASED_PORTS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Check whether a port is currently leased in this process.
pub fn is_leased(port: u16) -> bool {
    leased_ports().contains(&port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_leases_are_distinct() {
        let leases: Vec<PortLease> = (0..16).map(|_| PortLease::acquire().unwrap()).collect();
        let ports: HashSet<u16> = leases.iter().map(|l| l.port()).collect();
        assert_eq!(ports.len(), leases.len());
        assert!(ports.iter().all(|p| *p != 0));
    }

    #[test]
    fn test_released_socket_keeps_registration() {
        let mut lease = PortLease::acquire().unwrap();
        let port = lease.port();
        assert!(lease.holds_socket());

        lease.release_socket();
        assert!(!lease.holds_socket());
        assert!(is_leased(port));

        // The port is free at the OS level again.
        let rebound = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
        assert!(rebound.is_ok());

        // And another lease can't pick it while this one lives.
        let other = PortLease::acquire().unwrap();
        assert_ne!(other.port(), port);
    }

    #[test]
    fn test_drop_unregisters() {
        let lease = PortLease::acquire().unwrap();
        let port = lease.port();
        drop(lease);
        assert!(!is_leased(port));
    }

    #[test]
    fn test_bound_port_is_in_use() {
        let lease = PortLease::acquire().unwrap();
        let clash = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, lease.port())));
        assert!(clash.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_acquisition() {
        let handles: Vec<_> = (0..8)
            .map(|_| tokio::task::spawn_blocking(|| PortLease::acquire().unwrap()))
            .collect();

        let mut leases = Vec::new();
        for h in handles {
            leases.push(h.await.unwrap());
        }
        let ports: HashSet<u16> = leases.iter().map(|l| l.port()).collect();
        assert_eq!(ports.len(), 8);
    }
}
