//! The socket facade: `socket`/`listen`/`accept`/`read`/`write`/`close`
//! over logical file descriptors.
//!
//! These fds exist only inside this process; the kernel never sees them.
//! All calls are non-blocking: `accept` reports "nothing yet" as `Ok(None)`
//! and `read` as zero bytes. The event loop wakes registered callbacks when
//! either would succeed, so applications never have to spin.
use core::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::tcp::{
    Endpoint, Limits, Listener, State, TcbHandle, TcbManager, PROTO_TCP};
use crate::wire::Ipv4Address;

/// Errors surfaced by the socket calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// Only TCP (protocol 0x06) sockets exist here.
    UnsupportedProtocol,
    /// The fd was never handed out or has been closed.
    UnknownFd,
    /// The call needs a listener but the fd is not one.
    NotAListener,
    /// The call needs a connection but the fd is not one.
    NotAConnection,
    /// The connection is gone; reads and writes are pointless.
    ConnectionClosed,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SocketError::UnsupportedProtocol => write!(f, "unsupported protocol"),
            SocketError::UnknownFd => write!(f, "unknown file descriptor"),
            SocketError::NotAListener => write!(f, "not a listening socket"),
            SocketError::NotAConnection => write!(f, "not a connected socket"),
            SocketError::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

/// Tracks every logical fd and what stands behind it.
pub struct SocketManager {
    next_fd: i32,
    /// Created by `socket()`, awaiting `listen()`.
    bound: HashMap<i32, Endpoint>,
    listeners: HashMap<i32, Rc<RefCell<Listener>>>,
    connections: HashMap<i32, TcbHandle>,
}

impl SocketManager {
    pub fn new() -> Self {
        SocketManager {
            next_fd: 1,
            bound: HashMap::new(),
            listeners: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    fn allocate_fd(&mut self) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }

    /// Create a socket bound to `addr:port`. `proto` must be 0x06.
    pub fn socket(
        &mut self,
        proto: u8,
        addr: Ipv4Address,
        port: u16,
    ) -> Result<i32, SocketError> {
        if proto != PROTO_TCP {
            return Err(SocketError::UnsupportedProtocol);
        }
        let fd = self.allocate_fd();
        self.bound.insert(fd, Endpoint::new(addr, port));
        trace!("socket fd {} bound to {}:{}", fd, addr, port);
        Ok(fd)
    }

    /// Turn a bound socket into a listener and register it with the
    /// connection manager. The backlog comes from `MAX_BACKLOG_PORT_<port>`.
    pub fn listen(&mut self, fd: i32, tcp: &mut TcbManager) -> Result<(), SocketError> {
        let endpoint = self.bound.remove(&fd).ok_or(SocketError::UnknownFd)?;
        let backlog = Limits::backlog_limit(endpoint.port);
        let listener = Rc::new(RefCell::new(Listener::new(fd, endpoint, backlog)));
        tcp.listen_port(endpoint, listener.clone());
        self.listeners.insert(fd, listener);
        debug!("fd {} listening on {} (backlog {})", fd, endpoint, backlog);
        Ok(())
    }

    /// Take the next established connection off a listener.
    ///
    /// `Ok(None)` means nothing is waiting (would block). Connections that
    /// died while queued are skipped.
    pub fn accept(&mut self, fd: i32) -> Result<Option<i32>, SocketError> {
        let listener = self.listeners.get(&fd).ok_or_else(|| {
            if self.bound.contains_key(&fd) || self.connections.contains_key(&fd) {
                SocketError::NotAListener
            } else {
                SocketError::UnknownFd
            }
        })?.clone();

        loop {
            let handle = {
                let mut listener = listener.borrow_mut();
                let handle = match listener.acceptors.pop_front() {
                    Some(handle) => handle,
                    None => return Ok(None),
                };
                if listener.backlog_stats.current > 0 {
                    listener.backlog_stats.current -= 1;
                }
                handle
            };

            if handle.borrow().state == State::Closed {
                continue;
            }

            let connection_fd = self.allocate_fd();
            handle.borrow_mut().socket_fd = Some(connection_fd);
            debug!("fd {} accepted {}", connection_fd, handle.borrow().remote);
            self.connections.insert(connection_fd, handle);
            return Ok(Some(connection_fd));
        }
    }

    /// Drain up to `buf.len()` bytes from the connection's receive queue.
    /// Non-blocking; zero means nothing buffered.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, SocketError> {
        let handle = self.connection(fd)?;
        let n = handle.borrow_mut().dequeue_received(buf);
        Ok(n)
    }

    /// Queue bytes for transmission and mark the connection active.
    /// Returns the number of bytes accepted.
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, SocketError> {
        let handle = self.connection(fd)?;
        let mut tcb = handle.borrow_mut();
        if !tcb.state.can_send_data() {
            return Err(SocketError::ConnectionClosed);
        }
        Ok(tcb.enqueue_send(buf.to_vec()))
    }

    /// Close our side of a connection, or forget a listener or bound fd.
    ///
    /// An established connection starts the FIN exchange; one the peer has
    /// already half-closed answers its FIN with ours.
    pub fn close(&mut self, fd: i32) -> Result<(), SocketError> {
        if let Some(handle) = self.connections.remove(&fd) {
            let mut tcb = handle.borrow_mut();
            tcb.socket_fd = None;
            match tcb.state {
                State::Established => {
                    tcb.next_state = State::FinWait1;
                    tcb.activate();
                }
                State::CloseWait => {
                    tcb.next_state = State::LastAck;
                    tcb.activate();
                }
                _ => {
                    tcb.state = State::Closed;
                    tcb.next_state = State::Closed;
                }
            }
            debug!("fd {} closed ({})", fd, tcb.state);
            return Ok(());
        }
        if self.listeners.remove(&fd).is_some() || self.bound.remove(&fd).is_some() {
            return Ok(());
        }
        Err(SocketError::UnknownFd)
    }

    fn connection(&self, fd: i32) -> Result<TcbHandle, SocketError> {
        match self.connections.get(&fd) {
            Some(handle) => Ok(handle.clone()),
            None if self.listeners.contains_key(&fd) || self.bound.contains_key(&fd) => {
                Err(SocketError::NotAConnection)
            }
            None => Err(SocketError::UnknownFd),
        }
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_requires_tcp() {
        let mut sockets = SocketManager::new();
        assert_eq!(
            sockets.socket(0x11, Ipv4Address::new(192, 168, 1, 1), 30000),
            Err(SocketError::UnsupportedProtocol));

        let fd = sockets.socket(0x06, Ipv4Address::new(192, 168, 1, 1), 30000).unwrap();
        assert!(fd > 0);
    }

    #[test]
    fn fds_are_distinct() {
        let mut sockets = SocketManager::new();
        let a = sockets.socket(0x06, Ipv4Address::new(192, 168, 1, 1), 30000).unwrap();
        let b = sockets.socket(0x06, Ipv4Address::new(192, 168, 1, 1), 30001).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn accept_on_non_listener_fails() {
        let mut sockets = SocketManager::new();
        let fd = sockets.socket(0x06, Ipv4Address::new(192, 168, 1, 1), 30000).unwrap();
        assert_eq!(sockets.accept(fd), Err(SocketError::NotAListener));
        assert_eq!(sockets.accept(99), Err(SocketError::UnknownFd));
    }
}
