//! Alerts coming in from the detection engine and the block requests
//! derived from them.

use std::net::Ipv4Addr;

use super::policy::BlockPolicy;
use super::types::Timestamp;
use super::wire::{ProtocolPacket, Status};

/// IP protocol number for TCP.
pub const IPPROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const IPPROTO_UDP: u8 = 17;

/// The parts of a detection event the block client needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// IP protocol number
    pub protocol: u8,
    /// Source port (meaningful for TCP/UDP only)
    pub src_port: u16,
    /// Destination port (meaningful for TCP/UDP only)
    pub dst_port: u16,
    /// Signature id of the matching rule
    pub sig_id: u32,
}

impl Alert {
    /// Create an alert without transport ports.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, sig_id: u32) -> Self {
        Self {
            src,
            dst,
            protocol,
            src_port: 0,
            dst_port: 0,
            sig_id,
        }
    }

    /// Builder: set transport ports.
    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = src_port;
        self.dst_port = dst_port;
        self
    }
}

/// A block to be sent to every live agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
    /// Source port, 0 unless TCP/UDP
    pub src_port: u16,
    /// Destination port, 0 unless TCP/UDP
    pub dst_port: u16,
    /// IP protocol number
    pub protocol: u8,
    /// Signature id
    pub sig_id: u32,
    /// Policy to apply
    pub policy: BlockPolicy,
    /// When the alert was seen
    pub created: Timestamp,
}

impl BlockRequest {
    /// Build a request from an alert. Ports are dropped for protocols
    /// other than TCP and UDP.
    pub fn new(alert: &Alert, policy: BlockPolicy, created: Timestamp) -> Self {
        let has_ports = matches!(alert.protocol, IPPROTO_TCP | IPPROTO_UDP);
        Self {
            src: alert.src,
            dst: alert.dst,
            src_port: if has_ports { alert.src_port } else { 0 },
            dst_port: if has_ports { alert.dst_port } else { 0 },
            protocol: alert.protocol,
            sig_id: alert.sig_id,
            policy,
            created,
        }
    }

    /// The BLOCK packet for this request under the given sequence numbers.
    pub fn to_packet(&self, local_seq: u16, remote_seq: u16) -> ProtocolPacket {
        ProtocolPacket {
            src_addr: self.src.octets(),
            dst_addr: self.dst.octets(),
            duration: self.policy.duration_secs,
            local_seq,
            remote_seq,
            src_port: self.src_port,
            dst_port: self.dst_port,
            protocol: u16::from(self.protocol),
            mode: self.policy.mode_bits(),
            sig_id: self.sig_id,
            ..ProtocolPacket::new(Status::Block)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(protocol: u8) -> Alert {
        Alert::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), protocol, 1001)
            .with_ports(4000, 80)
    }

    #[test]
    fn test_ports_kept_for_tcp_and_udp() {
        for proto in [IPPROTO_TCP, IPPROTO_UDP] {
            let req = BlockRequest::new(&alert(proto), BlockPolicy::default(), Timestamp::new(1));
            assert_eq!((req.src_port, req.dst_port), (4000, 80));
        }
    }

    #[test]
    fn test_ports_zeroed_for_icmp() {
        let req = BlockRequest::new(&alert(1), BlockPolicy::default(), Timestamp::new(1));
        assert_eq!((req.src_port, req.dst_port), (0, 0));
    }

    #[test]
    fn test_to_packet() {
        let policy = BlockPolicy::default();
        let req = BlockRequest::new(&alert(IPPROTO_TCP), policy, Timestamp::new(1));
        let packet = req.to_packet(500, 77);

        assert_eq!(packet.status, Status::Block);
        assert_eq!(packet.src_ip(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.dst_ip(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(packet.duration, 300);
        assert_eq!(packet.local_seq, 500);
        assert_eq!(packet.remote_seq, 77);
        assert_eq!(packet.protocol, 6);
        assert_eq!(packet.mode, policy.mode_bits());
        assert_eq!(packet.sig_id, 1001);
    }
}
