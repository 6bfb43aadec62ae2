// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use std::convert::TryFrom;
use std::fmt;

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS, VarInt, VarIntError,
};

/// Common interface of all decoded control packets.
pub trait Packet: Send + fmt::Debug {
    fn packet_type(&self) -> PacketType;

    /// Total byte length on the wire.
    ///
    /// # Errors
    ///
    /// Returns error if the packet exceeds the maximum packet length.
    fn bytes(&self) -> Result<usize, VarIntError>;
}

/// Control packet type, parsed from the first byte of the fixed header
/// together with its flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketType {
    /// Request to connect to broker.
    #[default]
    Connect,

    /// Broker reply to connect request.
    ConnectAck,

    /// Publish message.
    Publish { dup: bool, qos: QoS, retain: bool },

    /// Publish acknowledgement, QoS 1 response.
    PublishAck,

    /// Publish received, first QoS 2 response.
    PublishReceived,

    /// Publish release, second QoS 2 request.
    PublishRelease,

    /// Publish complete, final QoS 2 response.
    PublishComplete,

    /// Client subscribe request.
    Subscribe,

    /// Subscribe acknowledgement.
    SubscribeAck,

    /// Unsubscribe request.
    Unsubscribe,

    /// Unsubscribe acknowledgement.
    UnsubscribeAck,

    /// Client ping request.
    PingRequest,

    /// Server ping response.
    PingResponse,

    /// Connection is being closed.
    Disconnect,

    /// Authentication exchange, MQTT 5.0 only.
    Auth,
}

impl PacketType {
    /// Byte length in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        let type_bits: u8 = match packet_type {
            PacketType::Connect => 1,
            PacketType::ConnectAck => 2,
            PacketType::Publish { .. } => 3,
            PacketType::PublishAck => 4,
            PacketType::PublishReceived => 5,
            PacketType::PublishRelease => 6,
            PacketType::PublishComplete => 7,
            PacketType::Subscribe => 8,
            PacketType::SubscribeAck => 9,
            PacketType::Unsubscribe => 10,
            PacketType::UnsubscribeAck => 11,
            PacketType::PingRequest => 12,
            PacketType::PingResponse => 13,
            PacketType::Disconnect => 14,
            PacketType::Auth => 15,
        };

        let flag_bits: u8 = match packet_type {
            PacketType::Publish { dup, qos, retain } => {
                let dup = if dup { 0b0000_1000 } else { 0 };
                let qos = (qos as u8) << 1;
                let retain = u8::from(retain);
                dup | qos | retain
            }
            // Bits 3,2,1 and 0 of the fixed header of PUBREL, SUBSCRIBE and
            // UNSUBSCRIBE packets are reserved and MUST be set to 0,0,1,0
            // [MQTT-3.6.1-1], [MQTT-3.8.1-1], [MQTT-3.10.1-1].
            PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => {
                0b0000_0010
            }
            _ => 0,
        };

        (type_bits << 4) | flag_bits
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    /// Parse packet type and validate its flag bits.
    ///
    /// Where a flag bit is marked as reserved it MUST be set to the listed
    /// value; if invalid flags are received, the receiver MUST close the
    /// Network Connection [MQTT-2.2.2-2].
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flag = v & 0b0000_1111;

        let with_flag = |packet_type: Self, expected: u8| {
            if flag == expected {
                Ok(packet_type)
            } else {
                log::error!("header: invalid flag {flag:#b} in {packet_type:?}");
                Err(DecodeError::InvalidPacketFlags)
            }
        };

        match type_bits {
            1 => with_flag(Self::Connect, 0),
            2 => with_flag(Self::ConnectAck, 0),
            3 => {
                let dup = (flag & 0b0000_1000) != 0;
                let retain = (flag & 0b0000_0001) != 0;
                let qos = match flag & 0b0000_0110 {
                    0b0000_0000 => QoS::AtMostOnce,
                    0b0000_0010 => QoS::AtLeastOnce,
                    0b0000_0100 => QoS::ExactOnce,
                    _ => return Err(DecodeError::InvalidPacketFlags),
                };
                Ok(Self::Publish { dup, qos, retain })
            }
            4 => with_flag(Self::PublishAck, 0),
            5 => with_flag(Self::PublishReceived, 0),
            6 => with_flag(Self::PublishRelease, 0b0000_0010),
            7 => with_flag(Self::PublishComplete, 0),
            8 => with_flag(Self::Subscribe, 0b0000_0010),
            9 => with_flag(Self::SubscribeAck, 0),
            10 => with_flag(Self::Unsubscribe, 0b0000_0010),
            11 => with_flag(Self::UnsubscribeAck, 0),
            12 => with_flag(Self::PingRequest, 0),
            13 => with_flag(Self::PingResponse, 0),
            14 => with_flag(Self::Disconnect, 0),
            15 => with_flag(Self::Auth, 0),
            _ => Err(DecodeError::InvalidPacketType),
        }
    }
}

/// The fixed header every control packet starts with: packet type plus
/// flags in the first byte, then the remaining length as a variable byte
/// integer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    packet_type: PacketType,
    remaining_length: VarInt,
}

impl FixedHeader {
    /// Create a new fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if `remaining_length` exceeds the maximum packet
    /// length.
    pub const fn new(
        packet_type: PacketType,
        remaining_length: usize,
    ) -> Result<Self, VarIntError> {
        let remaining_length = match VarInt::from(remaining_length) {
            Ok(val) => val,
            Err(err) => return Err(err),
        };
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Byte length of variable header plus payload.
    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value()
    }

    /// Byte length of the fixed header itself.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;
        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?;

        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.packet_type));
        self.remaining_length.encode(buf)?;
        Ok(self.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_round_trip() {
        let publish = PacketType::Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        let byte = u8::from(publish);
        assert_eq!(byte, 0b0011_0011);
        assert_eq!(PacketType::try_from(byte).unwrap(), publish);
    }

    #[test]
    fn test_reserved_flag_bits() {
        // Subscribe with flag bits 0000 is malformed.
        assert_eq!(
            PacketType::try_from(0b1000_0000),
            Err(DecodeError::InvalidPacketFlags)
        );
        assert!(PacketType::try_from(0b1000_0010).is_ok());
    }

    #[test]
    fn test_fixed_header_decode() {
        let buf = [0b0011_0000, 0x0a];
        let mut ba = ByteArray::new(&buf);
        let header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(header.remaining_length(), 10);
        assert_eq!(header.bytes(), 2);
    }
}
