//! Thin wrappers around the libc interfaces the device layer needs.
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts from `smoltcp` originally distributed under 0-clause BSD
#![allow(unsafe_code)]

use std::io;
use std::os::unix::io::RawFd;

use crate::time::Duration;

pub const SIOCGIFMTU: libc::c_ulong = 0x8921;

pub const TUNSETIFF: libc::c_ulong = 0x400454CA;
pub const IFF_TAP:   libc::c_int   = 0x0002;
pub const IFF_NO_PI: libc::c_int   = 0x1000;

#[derive(Clone, Copy)]
pub(crate) struct FdResult(pub libc::c_int);

#[derive(Clone, Copy)]
pub(crate) struct IoLenResult(pub libc::ssize_t);

pub(crate) trait LibcResult: Copy {
    fn is_fail(self) -> bool;
}

pub(crate) fn test_result(ret: impl LibcResult) -> io::Result<()> {
    if ret.is_fail() {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl LibcResult for FdResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl LibcResult for IoLenResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

/// Base for an if ioctl request.
///
/// Contains the name of the interface followed by request specific data.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
#[allow(non_camel_case_types)]
pub(crate) struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
    ifr_data: libc::c_int,
}

impl ifreq {
    pub(crate) fn new(name: &str) -> Self {
        let mut ifr_name = [0; libc::IF_NAMESIZE];

        for (i, byte) in name.as_bytes().iter().enumerate() {
            ifr_name[i] = *byte as libc::c_char
        }

        ifreq { ifr_name, ifr_data: 0 }
    }

    pub(crate) fn tun_set_tap(&mut self, fd: RawFd) -> io::Result<()> {
        self.ifr_data = IFF_TAP | IFF_NO_PI;
        self.ioctl(fd, TUNSETIFF).map(|_| ())
    }

    pub(crate) fn get_mtu(&mut self, fd: RawFd) -> io::Result<usize> {
        self.ifr_data = 0;
        self.ioctl(fd, SIOCGIFMTU)?;
        Ok(self.ifr_data as usize)
    }

    fn ioctl(&mut self, fd: RawFd, cmd: libc::c_ulong) -> io::Result<libc::c_int> {
        let res = unsafe {
            libc::ioctl(fd, cmd as _, self as *mut Self)
        };
        test_result(FdResult(res))?;
        Ok(self.ifr_data)
    }
}

/// Readiness of the device descriptor as reported by `poll(2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

/// Wait until the descriptor becomes readable or writable, but no longer
/// than the given timeout.
///
/// Returns which of the two events were signalled; both `false` means the
/// timeout elapsed.
pub fn poll_device(fd: RawFd, timeout: Duration) -> io::Result<Readiness> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN | libc::POLLOUT,
        revents: 0,
    };

    let res = unsafe {
        libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout.as_millis() as libc::c_int)
    };
    test_result(FdResult(res))?;

    Ok(Readiness {
        readable: pollfd.revents & libc::POLLIN != 0,
        writable: pollfd.revents & libc::POLLOUT != 0,
    })
}

/// Fill `buf` with entropy from the operating system.
///
/// Falls back to mixing the current time when `getrandom(2)` is unavailable;
/// good enough for initial sequence number keys, which only need to be
/// unpredictable to remote peers.
pub fn fill_entropy(buf: &mut [u8]) {
    let res = unsafe {
        libc::getrandom(buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
    };
    if res == buf.len() as libc::ssize_t {
        return;
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= (nanos >> ((i % 16) * 8)) as u8;
    }
}
