//! # Wire Codec
//!
//! Fixed 32-byte protocol packet, exchanged encrypted in both directions.
//! Multi-byte fields are little-endian regardless of host order; the
//! endian marker lets the agent detect a mismatched peer.
//!
//! ```text
//! off  len  field
//!   0    2  endian marker (always 1)
//!   2    4  source IPv4 (network order)
//!   6    4  destination IPv4 (network order)
//!  10    4  duration secs; carries the key modifier on CHECKIN / NEWKEY
//!  14    2  sensor sequence number
//!  16    2  agent sequence number
//!  18    2  source port
//!  20    2  destination port
//!  22    2  IP protocol; carries the key nonce on NEWKEY / RESYNC
//!  24    1  mode (who | how | log level)
//!  25    1  protocol version
//!  26    1  status
//!  27    4  signature id
//!  31    1  padding
//! ```

use std::net::Ipv4Addr;

use thiserror::Error;

/// Size of a decoded packet.
pub const PACKET_LEN: usize = 32;

/// Size of a packet once sealed by the link cipher.
pub const FRAME_LEN: usize = fwblock_crypto::sealed_len(PACKET_LEN);

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u8 = 14;

/// Value of the endian marker field.
pub const ENDIAN_MARKER: u16 = 1;

/// Packet status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Sensor announces itself, agent answers with OK / NEWKEY / RESYNC.
    CheckIn,
    /// Sensor says goodbye. No reply expected.
    CheckOut,
    /// Block request.
    Block,
    /// Unblock request (agent-side only).
    Unblock,
    /// Request accepted.
    Ok,
    /// Request rejected; usually a key problem on the agent side.
    Error,
    /// Request accepted, session key must be rotated.
    NewKey,
    /// Request accepted, session key must be re-derived from the original.
    Resync,
    /// Agent is busy; the real reply follows on the same connection.
    Hold,
    /// Anything this client does not know.
    Unknown(u8),
}

impl Status {
    /// True for the statuses that acknowledge a request.
    pub fn is_acknowledgement(self) -> bool {
        matches!(self, Status::Ok | Status::NewKey | Status::Resync)
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            1 => Status::CheckIn,
            2 => Status::CheckOut,
            3 => Status::Block,
            4 => Status::Ok,
            5 => Status::Error,
            6 => Status::NewKey,
            7 => Status::Resync,
            8 => Status::Hold,
            9 => Status::Unblock,
            other => Status::Unknown(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        match status {
            Status::CheckIn => 1,
            Status::CheckOut => 2,
            Status::Block => 3,
            Status::Ok => 4,
            Status::Error => 5,
            Status::NewKey => 6,
            Status::Resync => 7,
            Status::Hold => 8,
            Status::Unblock => 9,
            Status::Unknown(code) => code,
        }
    }
}

/// Errors decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Buffer is not exactly one packet long
    #[error("packet must be {PACKET_LEN} bytes, got {0}")]
    Length(usize),

    /// Endian marker is not 1
    #[error("bad endian marker {0:#06x}")]
    EndianMarker(u16),
}

/// One decoded protocol packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolPacket {
    /// Endian marker, [`ENDIAN_MARKER`] on valid packets
    pub endian_marker: u16,
    /// Source address octets
    pub src_addr: [u8; 4],
    /// Destination address octets
    pub dst_addr: [u8; 4],
    /// Block duration in seconds, or the key modifier
    pub duration: u32,
    /// Sensor sequence number
    pub local_seq: u16,
    /// Agent sequence number
    pub remote_seq: u16,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol, or the key nonce
    pub protocol: u16,
    /// Mode byte
    pub mode: u8,
    /// Protocol version
    pub version: u8,
    /// Status
    pub status: Status,
    /// Signature id
    pub sig_id: u32,
    /// Trailing padding byte
    pub padding: u8,
}

impl ProtocolPacket {
    /// An empty packet of the current protocol version.
    pub fn new(status: Status) -> Self {
        Self {
            endian_marker: ENDIAN_MARKER,
            src_addr: [0; 4],
            dst_addr: [0; 4],
            duration: 0,
            local_seq: 0,
            remote_seq: 0,
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            mode: 0,
            version: PROTOCOL_VERSION,
            status,
            sig_id: 0,
            padding: 0,
        }
    }

    /// Source address.
    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    /// Destination address.
    pub fn dst_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_addr)
    }

    /// The four duration bytes read as a key modifier.
    pub fn key_modifier(&self) -> [u8; 4] {
        self.duration.to_le_bytes()
    }

    /// Store a key modifier in the duration field.
    pub fn with_key_modifier(mut self, modifier: [u8; 4]) -> Self {
        self.duration = u32::from_le_bytes(modifier);
        self
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut out = [0u8; PACKET_LEN];
        out[0..2].copy_from_slice(&self.endian_marker.to_le_bytes());
        out[2..6].copy_from_slice(&self.src_addr);
        out[6..10].copy_from_slice(&self.dst_addr);
        out[10..14].copy_from_slice(&self.duration.to_le_bytes());
        out[14..16].copy_from_slice(&self.local_seq.to_le_bytes());
        out[16..18].copy_from_slice(&self.remote_seq.to_le_bytes());
        out[18..20].copy_from_slice(&self.src_port.to_le_bytes());
        out[20..22].copy_from_slice(&self.dst_port.to_le_bytes());
        out[22..24].copy_from_slice(&self.protocol.to_le_bytes());
        out[24] = self.mode;
        out[25] = self.version;
        out[26] = self.status.into();
        out[27..31].copy_from_slice(&self.sig_id.to_le_bytes());
        out[31] = self.padding;
        out
    }

    /// Parse the wire layout.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is not [`PACKET_LEN`] long or the endian marker is
    /// wrong. Unknown status codes and versions are not errors here.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let b: &[u8; PACKET_LEN] = bytes
            .try_into()
            .map_err(|_| WireError::Length(bytes.len()))?;

        let u16_at = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);

        let endian_marker = u16_at(0);
        if endian_marker != ENDIAN_MARKER {
            return Err(WireError::EndianMarker(endian_marker));
        }

        Ok(Self {
            endian_marker,
            src_addr: [b[2], b[3], b[4], b[5]],
            dst_addr: [b[6], b[7], b[8], b[9]],
            duration: u32_at(10),
            local_seq: u16_at(14),
            remote_seq: u16_at(16),
            src_port: u16_at(18),
            dst_port: u16_at(20),
            protocol: u16_at(22),
            mode: b[24],
            version: b[25],
            status: Status::from(b[26]),
            sig_id: u32_at(27),
            padding: b[31],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_len_is_three_blocks() {
        assert_eq!(FRAME_LEN, 48);
    }

    #[test]
    fn test_field_offsets() {
        let packet = ProtocolPacket {
            src_addr: [10, 0, 0, 1],
            dst_addr: [192, 168, 1, 2],
            duration: 0x0403_0201,
            local_seq: 0x1122,
            remote_seq: 0x3344,
            src_port: 80,
            dst_port: 0x0102,
            protocol: 6,
            mode: 0x70,
            sig_id: 0xDEAD_BEEF,
            ..ProtocolPacket::new(Status::Block)
        };
        let bytes = packet.encode();

        assert_eq!(&bytes[0..2], &[1, 0]);
        assert_eq!(&bytes[2..6], &[10, 0, 0, 1]);
        assert_eq!(&bytes[6..10], &[192, 168, 1, 2]);
        assert_eq!(&bytes[10..14], &[1, 2, 3, 4]);
        assert_eq!(&bytes[14..16], &[0x22, 0x11]);
        assert_eq!(&bytes[16..18], &[0x44, 0x33]);
        assert_eq!(&bytes[18..20], &[80, 0]);
        assert_eq!(&bytes[20..22], &[0x02, 0x01]);
        assert_eq!(&bytes[22..24], &[6, 0]);
        assert_eq!(bytes[24], 0x70);
        assert_eq!(bytes[25], PROTOCOL_VERSION);
        assert_eq!(bytes[26], 3);
        assert_eq!(&bytes[27..31], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(bytes[31], 0);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            ProtocolPacket::decode(&[1u8; 31]),
            Err(WireError::Length(31))
        );
        assert_eq!(
            ProtocolPacket::decode(&[1u8; 33]),
            Err(WireError::Length(33))
        );
    }

    #[test]
    fn test_decode_rejects_endian_marker() {
        let mut bytes = ProtocolPacket::new(Status::Ok).encode();
        bytes[0] = 0;
        bytes[1] = 1;
        assert_eq!(
            ProtocolPacket::decode(&bytes),
            Err(WireError::EndianMarker(0x0100))
        );
    }

    #[test]
    fn test_unknown_status_survives_decode() {
        let mut bytes = ProtocolPacket::new(Status::Ok).encode();
        bytes[26] = 42;
        let packet = ProtocolPacket::decode(&bytes).unwrap();
        assert_eq!(packet.status, Status::Unknown(42));
        assert_eq!(packet.encode()[26], 42);
    }

    #[test]
    fn test_status_codes() {
        for code in 0u8..=255 {
            assert_eq!(u8::from(Status::from(code)), code);
        }
        assert!(Status::Resync.is_acknowledgement());
        assert!(!Status::Hold.is_acknowledgement());
        assert!(!Status::Error.is_acknowledgement());
    }

    #[test]
    fn test_key_modifier_lives_in_duration() {
        let packet = ProtocolPacket::new(Status::CheckIn).with_key_modifier([9, 8, 7, 6]);
        assert_eq!(packet.key_modifier(), [9, 8, 7, 6]);
        assert_eq!(&packet.encode()[10..14], &[9, 8, 7, 6]);
    }

    proptest! {
        #[test]
        fn prop_decode_encode_is_identity(mut bytes in proptest::array::uniform32(any::<u8>())) {
            bytes[0] = 1;
            bytes[1] = 0;
            let packet = ProtocolPacket::decode(&bytes).unwrap();
            prop_assert_eq!(packet.encode(), bytes);
        }
    }
}
