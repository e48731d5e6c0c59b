//! The event loop and the readiness bridge to application callbacks.
//!
//! Exactly one real file descriptor is polled: the tap device. Socket
//! readiness is never polled; it is *published* by the protocol stack while
//! it processes packets, into a [`ReadySet`], and turned into callback
//! invocations after each poll cycle. That replaces any busy-waiting in the
//! application: `accept` and `read` are only called when they will succeed.
//!
//! [`ReadySet`]: struct.ReadySet.html
use std::collections::{HashMap, HashSet};
use std::io;

use log::{debug, info};

use crate::stack::Stack;
use crate::time::Duration;

/// How long one `poll` may sleep. Bounds the shutdown latency of
/// [`EventLoop::stop`].
///
/// [`EventLoop::stop`]: struct.EventLoop.html#method.stop
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Readiness gathered during one poll cycle.
///
/// The protocol stack marks logical fds here while segments are processed;
/// the event loop drains the sets into callback invocations and clears them
/// before the next cycle.
#[derive(Debug, Default)]
pub struct ReadySet {
    readable: HashSet<i32>,
    acceptable: HashSet<i32>,
}

impl ReadySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a connected socket as having readable data.
    pub fn mark_readable(&mut self, fd: i32) {
        self.readable.insert(fd);
    }

    /// Mark a listener as having connections to accept.
    pub fn mark_acceptable(&mut self, fd: i32) {
        self.acceptable.insert(fd);
    }

    /// Whether the socket was marked readable this cycle.
    pub fn is_readable(&self, fd: i32) -> bool {
        self.readable.contains(&fd)
    }

    /// Whether the listener was marked acceptable this cycle.
    pub fn is_acceptable(&self, fd: i32) -> bool {
        self.acceptable.contains(&fd)
    }

    /// Forget all marks.
    pub fn clear(&mut self) {
        self.readable.clear();
        self.acceptable.clear();
    }
}

/// An application callback, invoked with the loop, the stack and the fd the
/// event fired for.
///
/// Callbacks receive the loop itself so they can register further callbacks
/// (an accept callback typically registers a read callback for the accepted
/// connection) or stop the loop.
pub type Callback = Box<dyn FnMut(&mut EventLoop, &mut Stack, i32)>;

/// The process-wide event loop.
///
/// `run` polls the tap descriptor with `POLLIN|POLLOUT` and a 100 ms
/// timeout, drives inbound and outbound packet processing, then fires the
/// registered callbacks for every fd the stack marked ready.
pub struct EventLoop {
    running: bool,
    ready: ReadySet,
    accept_callbacks: HashMap<i32, Callback>,
    read_callbacks: HashMap<i32, Callback>,
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop {
            running: false,
            ready: ReadySet::new(),
            accept_callbacks: HashMap::new(),
            read_callbacks: HashMap::new(),
        }
    }

    /// Invoke `callback` whenever the listener `fd` has connections waiting.
    pub fn register_accept_callback(&mut self, fd: i32, callback: Callback) {
        self.accept_callbacks.insert(fd, callback);
    }

    /// Invoke `callback` whenever the socket `fd` has data waiting.
    pub fn register_read_callback(&mut self, fd: i32, callback: Callback) {
        self.read_callbacks.insert(fd, callback);
    }

    /// Drop any callbacks registered for `fd`.
    pub fn unregister_callbacks(&mut self, fd: i32) {
        self.accept_callbacks.remove(&fd);
        self.read_callbacks.remove(&fd);
    }

    /// Run until [`stop`] is called.
    ///
    /// [`stop`]: #method.stop
    pub fn run(&mut self, stack: &mut Stack) -> io::Result<()> {
        self.running = true;
        info!("event loop started");

        while self.running {
            self.ready.clear();

            let readiness = stack.poll_device(POLL_TIMEOUT)?;
            if readiness.readable {
                stack.process_inbound(&mut self.ready);
            }
            if readiness.writable {
                stack.process_outbound();
            }

            self.process_socket_events(stack);
        }

        info!("event loop stopped");
        Ok(())
    }

    /// Ask the loop to exit. The current poll wakes within its timeout and
    /// the loop returns; in-flight segments are discarded, connections are
    /// not flushed.
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn process_socket_events(&mut self, stack: &mut Stack) {
        let acceptable: Vec<i32> = self.ready.acceptable.iter().copied().collect();
        for fd in acceptable {
            // The callback is taken out of the table for the call so it may
            // itself register callbacks; a re-registration wins over the
            // put-back.
            if let Some(mut callback) = self.accept_callbacks.remove(&fd) {
                callback(self, stack, fd);
                self.accept_callbacks.entry(fd).or_insert(callback);
            } else {
                debug!("no accept callback for listener fd {}", fd);
            }
        }

        let readable: Vec<i32> = self.ready.readable.iter().copied().collect();
        for fd in readable {
            if let Some(mut callback) = self.read_callbacks.remove(&fd) {
                callback(self, stack, fd);
                self.read_callbacks.entry(fd).or_insert(callback);
            } else {
                debug!("no read callback for socket fd {}", fd);
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_set_marks_and_clears() {
        let mut ready = ReadySet::new();
        ready.mark_readable(3);
        ready.mark_acceptable(1);
        assert!(ready.is_readable(3));
        assert!(!ready.is_readable(1));
        assert!(ready.is_acceptable(1));

        ready.clear();
        assert!(!ready.is_readable(3));
        assert!(!ready.is_acceptable(1));
    }
}
