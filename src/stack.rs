//! Explicit wiring of the whole stack into one value.
//!
//! There are no process globals: the device, every layer endpoint, the
//! connection manager and the socket table live in a single [`Stack`] built
//! at startup, and everything that needs a sibling gets it passed in.
//!
//! [`Stack`]: struct.Stack.html
use std::io;

use log::{debug, error, info, trace, warn};

use crate::event::ReadySet;
use crate::layer::{arp, eth, icmp, ipv4};
use crate::nic::sys::Readiness;
use crate::nic::TapInterfaceDesc;
use crate::socket::{SocketError, SocketManager};
use crate::storage::PacketBuf;
use crate::tcp::{Endpoint, TcbManager, TcpSegment};
use crate::time::Duration;
use crate::wire::{
    tcp_verify_checksum, EthernetAddress, EthernetProtocol, EthernetRepr,
    IpProtocol, Ipv4Address, Ipv4Repr, TcpRepr, ETHERNET_HEADER_LEN,
    IPV4_HEADER_LEN};

/// Static device and addressing configuration.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Name of the kernel tap interface, e.g. `tap0`.
    pub tap_name: String,
    /// Our IPv4 address on the virtual link.
    pub addr: Ipv4Address,
    /// Our hardware address on the virtual link.
    pub mac: EthernetAddress,
}

/// The assembled stack: device, layers, connections, sockets.
pub struct Stack {
    device: TapInterfaceDesc,
    mtu: usize,
    frame_buffer: Vec<u8>,
    eth: eth::Endpoint,
    arp: arp::Endpoint,
    ip: ipv4::Endpoint,
    icmp: icmp::Endpoint,
    pub tcp: TcbManager,
    pub sockets: SocketManager,
}

impl Stack {
    /// Open and attach the tap device and wire up all layers.
    pub fn new(config: StackConfig) -> io::Result<Stack> {
        let mut device = TapInterfaceDesc::new(&config.tap_name)?;
        device.attach_interface()?;
        let mtu = device.interface_mtu().unwrap_or(1500);

        info!("device {} up, addr {} mac {} mtu {}",
              config.tap_name, config.addr, config.mac, mtu);

        Ok(Stack {
            device,
            mtu,
            frame_buffer: vec![0; mtu + ETHERNET_HEADER_LEN + 4],
            eth: eth::Endpoint::new(config.mac),
            arp: arp::Endpoint::new(config.mac, config.addr),
            ip: ipv4::Endpoint::new(config.addr),
            icmp: icmp::Endpoint::new(),
            tcp: TcbManager::new(),
            sockets: SocketManager::new(),
        })
    }

    /// Wait for device readiness, bounded by `timeout`.
    pub fn poll_device(&self, timeout: Duration) -> io::Result<Readiness> {
        self.device.poll(timeout)
    }

    /// The device's maximum transmission unit.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Drain every frame the device has buffered and dispatch each down the
    /// demultiplex chain, publishing socket readiness into `ready`.
    pub fn process_inbound(&mut self, ready: &mut ReadySet) {
        loop {
            let size = match self.device.recv(&mut self.frame_buffer) {
                Ok(size) => size,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    error!("device receive: {}", err);
                    break;
                }
            };
            let frame = PacketBuf::from_vec(self.frame_buffer[..size].to_vec());
            self.dispatch_frame(frame, ready);
        }
    }

    /// Drain the connection manager's outbound queue onto the wire, then
    /// sweep closed connections.
    pub fn process_outbound(&mut self) {
        while let Some(segment) = self.tcp.gather_packet() {
            self.transmit_tcp(segment);
        }
        self.tcp.cleanup_closed_connections();
    }

    fn dispatch_frame(&mut self, mut frame: PacketBuf, ready: &mut ReadySet) {
        let eth_repr = match EthernetRepr::parse(frame.as_slice()) {
            Ok(repr) => repr,
            Err(err) => {
                trace!("[RECEIVE] bad frame: {}", err);
                return;
            }
        };
        if !self.eth.accepts(&eth_repr) {
            trace!("[RECEIVE] frame for {} ignored", eth_repr.dst_addr);
            return;
        }
        frame.advance(ETHERNET_HEADER_LEN);

        match eth_repr.ethertype {
            EthernetProtocol::Arp => {
                if let Some((dst, reply)) = self.arp.process(frame.as_slice()) {
                    let out = self.eth.encapsulate(dst, EthernetProtocol::Arp, &reply);
                    self.transmit_frame(out);
                }
            }
            EthernetProtocol::Ipv4 => self.dispatch_ipv4(frame, &eth_repr, ready),
            EthernetProtocol::Unknown(ethertype) => {
                trace!("[RECEIVE] ethertype 0x{:04x} ignored", ethertype);
            }
        }
    }

    fn dispatch_ipv4(&mut self, mut datagram: PacketBuf, eth_repr: &EthernetRepr,
                     ready: &mut ReadySet) {
        let ip_repr = match Ipv4Repr::parse(datagram.as_slice()) {
            Ok(repr) => repr,
            Err(err) => {
                debug!("[RECEIVE] bad datagram: {}", err);
                return;
            }
        };
        if !self.ip.accepts(&ip_repr) {
            trace!("[RECEIVE] datagram for {} ignored", ip_repr.dst_addr);
            return;
        }
        // Whoever talks IP to us is a neighbor; remember the mapping so
        // answers do not depend on the age of the ARP cache.
        self.arp.learn(ip_repr.src_addr, eth_repr.src_addr);

        datagram.advance(IPV4_HEADER_LEN);

        match ip_repr.protocol {
            IpProtocol::Icmp => {
                if let Some(reply) = self.icmp.process(datagram.as_slice()) {
                    self.transmit_ip(IpProtocol::Icmp, ip_repr.src_addr, &reply);
                }
            }
            IpProtocol::Tcp => {
                if !tcp_verify_checksum(datagram.as_slice(),
                                        ip_repr.src_addr, ip_repr.dst_addr) {
                    debug!("[RECEIVE] tcp checksum mismatch from {}", ip_repr.src_addr);
                    return;
                }
                let tcp_repr = match TcpRepr::parse(datagram.as_slice()) {
                    Ok(repr) => repr,
                    Err(err) => {
                        debug!("[RECEIVE] bad tcp segment: {}", err);
                        return;
                    }
                };
                let segment = TcpSegment {
                    remote: Endpoint::new(ip_repr.src_addr, tcp_repr.src_port),
                    local: Endpoint::new(ip_repr.dst_addr, tcp_repr.dst_port),
                    buffer: datagram,
                };
                // An inadmissible attempt is answered with an immediate
                // reset that never had a control block.
                if let Some(reset) = self.tcp.receive(segment, ready) {
                    self.transmit_tcp(reset);
                }
            }
            protocol => {
                debug!("[RECEIVE] protocol {} ignored", protocol);
            }
        }
    }

    fn transmit_tcp(&mut self, segment: TcpSegment) {
        trace!("[OUT] tcp {} -> {} ({} octets)",
               segment.local, segment.remote, segment.buffer.remaining());
        let dst = segment.remote.addr;
        self.transmit_ip(IpProtocol::Tcp, dst, &segment.buffer);
    }

    fn transmit_ip(&mut self, protocol: IpProtocol, dst: Ipv4Address, payload: &PacketBuf) {
        let dst_mac = match self.arp.lookup(dst) {
            Some(mac) => mac,
            None => {
                warn!("[OUT] no neighbor entry for {}, dropped", dst);
                return;
            }
        };
        let datagram = self.ip.encapsulate(protocol, dst, payload);
        let frame = self.eth.encapsulate(dst_mac, EthernetProtocol::Ipv4, &datagram);
        self.transmit_frame(frame);
    }

    fn transmit_frame(&mut self, frame: PacketBuf) {
        match self.device.send(frame.as_slice()) {
            Ok(_) => {}
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                warn!("[OUT] device busy, frame dropped");
            }
            Err(err) => error!("device send: {}", err),
        }
    }

    // The socket facade, delegating to the socket table and the connection
    // manager.

    /// Create a TCP socket bound to `addr:port`.
    pub fn socket(&mut self, proto: u8, addr: Ipv4Address, port: u16)
        -> Result<i32, SocketError>
    {
        self.sockets.socket(proto, addr, port)
    }

    /// Start listening on a bound socket.
    pub fn listen(&mut self, fd: i32) -> Result<(), SocketError> {
        self.sockets.listen(fd, &mut self.tcp)
    }

    /// Accept an established connection, if one is waiting.
    pub fn accept(&mut self, fd: i32) -> Result<Option<i32>, SocketError> {
        self.sockets.accept(fd)
    }

    /// Read buffered in-order bytes; non-blocking.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, SocketError> {
        self.sockets.read(fd, buf)
    }

    /// Queue bytes for transmission.
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, SocketError> {
        self.sockets.write(fd, buf)
    }

    /// Close our side of a connection.
    pub fn close(&mut self, fd: i32) -> Result<(), SocketError> {
        self.sockets.close(fd)
    }
}
