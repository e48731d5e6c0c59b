//! A small server on top of the stack.
//!
//! Attaches to a tap device, listens on one TCP port and prints whatever
//! connected peers send, the classic smoke test for the whole stack:
//!
//! ```text
//! ip tuntap add dev tap0 mode tap user $USER
//! ip addr add 192.168.1.100/24 dev tap0
//! ip link set tap0 up
//! RUST_LOG=debug ustackd tap0
//! # then, from another shell:
//! nc 192.168.1.1 30000
//! ```
use std::io::{self, Write};

use log::{error, info};
use structopt::StructOpt;

use ustack::event::EventLoop;
use ustack::stack::{Stack, StackConfig};
use ustack::tcp::PROTO_TCP;
use ustack::wire::{EthernetAddress, Ipv4Address};

#[derive(StructOpt)]
#[structopt(name = "ustackd", about = "A userspace TCP/IP stack on a tap device")]
struct Options {
    /// Name of the tap interface to attach to.
    tap: String,

    /// Our IPv4 address on the virtual link.
    #[structopt(default_value = "192.168.1.1")]
    addr: Ipv4Address,

    /// Our hardware address on the virtual link.
    #[structopt(default_value = "02:00:00:aa:bb:cc")]
    mac: EthernetAddress,

    /// TCP port to listen on.
    #[structopt(short = "p", long = "port", default_value = "30000")]
    port: u16,
}

fn main() -> io::Result<()> {
    env_logger::init();
    let options = Options::from_args();

    let mut stack = Stack::new(StackConfig {
        tap_name: options.tap.clone(),
        addr: options.addr,
        mac: options.mac,
    })?;

    let listener_fd = stack.socket(PROTO_TCP, options.addr, options.port)
        .expect("a fresh socket table accepts a TCP socket");
    stack.listen(listener_fd)
        .expect("a bound socket can listen");
    info!("listening on {}:{}", options.addr, options.port);

    let mut events = EventLoop::new();
    events.register_accept_callback(listener_fd, Box::new(|events, stack, fd| {
        while let Ok(Some(connection_fd)) = stack.accept(fd) {
            info!("accepted connection fd {}", connection_fd);
            events.register_read_callback(connection_fd, Box::new(print_input));
        }
    }));

    events.run(&mut stack)
}

fn print_input(_: &mut EventLoop, stack: &mut Stack, fd: i32) {
    let mut buf = [0u8; 2000];
    loop {
        match stack.read(fd, &mut buf) {
            Ok(0) => break,
            Ok(size) => {
                println!("read size: {}", size);
                io::stdout().write_all(&buf[..size]).ok();
                println!();
            }
            Err(err) => {
                error!("read fd {}: {}", fd, err);
                break;
            }
        }
    }
}
