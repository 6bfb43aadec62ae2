// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Packet codec for MQTT 3.1.1 and 5.0.
//!
//! Packets decode from a [`ByteArray`] cursor and encode into a `Vec<u8>`.
//! Version specific packets live in the [`v3`] and [`v5`] modules; the
//! shared primitives, topic handling and data wrappers live at the crate
//! root.

mod base;
mod binary_data;
mod bool_data;
mod byte_array;
mod connect_flags;
mod error;
mod header;
mod string_data;
mod string_pair_data;
pub mod topic;
mod u16_data;
mod u32_data;
pub mod utils;
mod var_int;

pub mod v3;
pub mod v5;

pub use base::{DecodePacket, EncodePacket, PacketId, ProtocolLevel, QoS};
pub use binary_data::BinaryData;
pub use bool_data::BoolData;
pub use byte_array::{ByteArray, ByteArrayError};
pub use connect_flags::ConnectFlags;
pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, Packet, PacketType};
pub use string_data::StringData;
pub use string_pair_data::StringPairData;
pub use topic::{PubTopic, SubTopic, TopicFilter};
pub use u16_data::U16Data;
pub use u32_data::U32Data;
pub use var_int::{VarInt, VarIntError, MAX_PACKET_LEN};
