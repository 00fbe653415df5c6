//! The wire codec: a 13-byte header plus 0..=1024 byte payload, packed with
//! `byteorder` and checksummed with a truncated CRC-32.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::CodecError;

pub const HEADER_LEN: usize = 13;
pub const MAX_PAYLOAD_LEN: usize = 1024;

bitflags::bitflags! {
    pub struct Flags: u8 {
        const SYN  = 0x01;
        const ACK  = 0x02;
        const FIN  = 0x04;
        const DATA = 0x08;
    }
}

/// An immutable, decoded wire packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub seq_no: u32,
    pub ack_no: u32,
    pub flags: Flags,
    pub window: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn syn(seq_no: u32, window: u16) -> Self {
        Self::new(seq_no, 0, Flags::SYN, window, Vec::new())
    }

    pub fn syn_ack(seq_no: u32, ack_no: u32, window: u16) -> Self {
        Self::new(seq_no, ack_no, Flags::SYN | Flags::ACK, window, Vec::new())
    }

    pub fn ack(ack_no: u32, window: u16) -> Self {
        Self::new(0, ack_no, Flags::ACK, window, Vec::new())
    }

    pub fn data(seq_no: u32, window: u16, payload: Vec<u8>) -> Self {
        Self::new(seq_no, 0, Flags::DATA, window, payload)
    }

    pub fn fin(seq_no: u32) -> Self {
        Self::new(seq_no, 0, Flags::FIN, 0, Vec::new())
    }

    pub fn fin_ack(seq_no: u32, ack_no: u32) -> Self {
        Self::new(seq_no, ack_no, Flags::FIN | Flags::ACK, 0, Vec::new())
    }

    pub fn new(seq_no: u32, ack_no: u32, flags: Flags, window: u16, payload: Vec<u8>) -> Self {
        Self {
            seq_no,
            ack_no,
            flags,
            window,
            payload,
        }
    }

    pub fn is_syn(&self) -> bool {
        self.flags.contains(Flags::SYN)
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(Flags::ACK)
    }

    pub fn is_fin(&self) -> bool {
        self.flags.contains(Flags::FIN)
    }

    pub fn is_data(&self) -> bool {
        self.flags.contains(Flags::DATA)
    }

    /// CRC-32 (IEEE) over `seq_no || ack_no || flags || window`, network
    /// byte order, concatenated with the payload, truncated to 16 bits.
    fn checksum(seq_no: u32, ack_no: u32, flags: u8, window: u16, payload: &[u8]) -> u16 {
        let mut buf = Vec::with_capacity(11 + payload.len());
        buf.write_u32::<BigEndian>(seq_no).expect("vec write");
        buf.write_u32::<BigEndian>(ack_no).expect("vec write");
        buf.write_u8(flags).expect("vec write");
        buf.write_u16::<BigEndian>(window).expect("vec write");
        buf.extend_from_slice(payload);
        (crc::crc32::checksum_ieee(&buf) & 0xFFFF) as u16
    }

    /// Encode to wire bytes. Fails if the payload exceeds `MAX_PAYLOAD_LEN`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::OversizedPayload);
        }
        let flags_byte = self.flags.bits();
        let checksum = Self::checksum(self.seq_no, self.ack_no, flags_byte, self.window, &self.payload);

        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.write_u32::<BigEndian>(self.seq_no).expect("vec write");
        buf.write_u32::<BigEndian>(self.ack_no).expect("vec write");
        buf.write_u8(flags_byte).expect("vec write");
        buf.write_u16::<BigEndian>(self.window).expect("vec write");
        buf.write_u16::<BigEndian>(checksum).expect("vec write");
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decode from wire bytes. Any datagram shorter than the header is
    /// `MalformedPacket`; a checksum mismatch is `ChecksumError`. No length
    /// enforcement beyond datagram size is applied to the payload on decode
    /// (excess bytes are simply treated as payload).
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::MalformedPacket);
        }
        let mut cursor = Cursor::new(data);
        let seq_no = cursor.read_u32::<BigEndian>().map_err(|_| CodecError::MalformedPacket)?;
        let ack_no = cursor.read_u32::<BigEndian>().map_err(|_| CodecError::MalformedPacket)?;
        let flags_byte = cursor.read_u8().map_err(|_| CodecError::MalformedPacket)?;
        let window = cursor.read_u16::<BigEndian>().map_err(|_| CodecError::MalformedPacket)?;
        let checksum = cursor.read_u16::<BigEndian>().map_err(|_| CodecError::MalformedPacket)?;
        let payload = data[HEADER_LEN..].to_vec();

        let expected = Self::checksum(seq_no, ack_no, flags_byte, window, &payload);
        if expected != checksum {
            return Err(CodecError::ChecksumError);
        }

        Ok(Self {
            seq_no,
            ack_no,
            flags: Flags::from_bits_truncate(flags_byte),
            window,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_data_packet() {
        let p = Packet::data(7, 10, b"hello world".to_vec());
        let bytes = p.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 11);
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn flags_combine() {
        let p = Packet::syn_ack(1, 2, 4);
        assert!(p.is_syn());
        assert!(p.is_ack());
        assert!(!p.is_fin());
        assert!(!p.is_data());
    }

    #[test]
    fn short_datagram_is_malformed() {
        let err = Packet::decode(&[0u8; 5]).unwrap_err();
        assert_eq!(err, CodecError::MalformedPacket);
    }

    #[test]
    fn bit_flip_is_detected() {
        let p = Packet::data(1, 10, vec![1, 2, 3, 4]);
        let mut bytes = p.encode().unwrap();
        bytes[0] ^= 0x01;
        let err = Packet::decode(&bytes).unwrap_err();
        assert_eq!(err, CodecError::ChecksumError);
    }

    #[test]
    fn oversized_payload_rejected() {
        let p = Packet::data(0, 10, vec![0u8; MAX_PAYLOAD_LEN + 1]);
        assert_eq!(p.encode().unwrap_err(), CodecError::OversizedPayload);
    }

    #[test]
    fn excess_payload_on_decode_is_kept() {
        // A datagram with more bytes than any single fragment we'd ever
        // produce is still decodable; the codec only enforces the payload
        // cap on encode.
        let p = Packet::data(0, 10, vec![9u8; 2000]);
        let bytes = p.encode().unwrap_or_else(|_| {
            // encode() rejects oversized payloads; build the wire bytes by
            // hand to exercise decode()'s lack of a length ceiling.
            let mut raw = Vec::new();
            raw.extend_from_slice(&0u32.to_be_bytes());
            raw.extend_from_slice(&0u32.to_be_bytes());
            raw.push(Flags::DATA.bits());
            raw.extend_from_slice(&10u16.to_be_bytes());
            let body = vec![9u8; 2000];
            let crc = Packet::checksum(0, 0, Flags::DATA.bits(), 10, &body) as u16;
            raw.extend_from_slice(&crc.to_be_bytes());
            raw.extend_from_slice(&body);
            raw
        });
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload.len(), 2000);
    }
}
