// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A Reason Code is a one byte unsigned value that indicates the result of
/// an operation.
///
/// Reason Codes less than 0x80 indicate successful completion of an
/// operation. Values of 0x80 or greater indicate failure. CONNACK, PUBACK,
/// PUBREC, PUBREL, PUBCOMP, DISCONNECT and AUTH carry a single Reason Code
/// in the variable header; SUBACK and UNSUBACK carry a list of them in the
/// payload.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// Success / Normal disconnection / Granted QoS 0.
    #[default]
    Success = 0x00,

    /// SUBACK only.
    GrantedQoS1 = 0x01,

    /// SUBACK only.
    GrantedQoS2 = 0x02,

    /// DISCONNECT only.
    DisconnectWithWillMessage = 0x04,

    /// PUBACK, PUBREC.
    NoMatchingSubscribers = 0x10,

    /// UNSUBACK only.
    NoSubscriptionExisted = 0x11,

    /// AUTH only.
    ContinueAuthentication = 0x18,

    /// AUTH only.
    ReAuthenticate = 0x19,

    UnspecifiedError = 0x80,

    MalformedPacket = 0x81,

    ProtocolError = 0x82,

    ImplementationSpecificError = 0x83,

    /// CONNACK only.
    UnsupportedProtocolVersion = 0x84,

    /// CONNACK only.
    ClientIdentifierNotValid = 0x85,

    /// CONNACK only.
    BadUserNameOrPassword = 0x86,

    NotAuthorized = 0x87,

    /// CONNACK only.
    ServerUnavailable = 0x88,

    ServerBusy = 0x89,

    /// CONNACK only.
    Banned = 0x8a,

    /// DISCONNECT only.
    ServerShuttingDown = 0x8b,

    BadAuthenticationMethod = 0x8c,

    /// DISCONNECT only.
    KeepAliveTimeout = 0x8d,

    /// DISCONNECT only.
    SessionTakenOver = 0x8e,

    /// SUBACK, UNSUBACK, DISCONNECT.
    TopicFilterInvalid = 0x8f,

    /// PUBACK, PUBREC, DISCONNECT.
    TopicNameInvalid = 0x90,

    /// PUBACK, PUBREC, SUBACK, UNSUBACK.
    PacketIdentifierInUse = 0x91,

    /// PUBREL, PUBCOMP.
    PacketIdentifierNotFound = 0x92,

    /// DISCONNECT only.
    ReceiveMaximumExceeded = 0x93,

    /// PUBLISH, DISCONNECT.
    TopicAliasInvalid = 0x94,

    /// CONNACK, DISCONNECT.
    PacketTooLarge = 0x95,

    /// DISCONNECT only.
    MessageRateTooHigh = 0x96,

    /// PUBACK, PUBREC, SUBACK, DISCONNECT, CONNACK.
    QuotaExceeded = 0x97,

    /// DISCONNECT only.
    AdministrativeAction = 0x98,

    /// PUBACK, PUBREC, CONNACK, DISCONNECT.
    PayloadFormatInvalid = 0x99,

    /// CONNACK, DISCONNECT.
    RetainNotSupported = 0x9a,

    /// CONNACK, DISCONNECT.
    QoSNotSupported = 0x9b,

    /// CONNACK, DISCONNECT.
    UseAnotherServer = 0x9c,

    /// CONNACK, DISCONNECT.
    ServerMoved = 0x9d,

    /// SUBACK, DISCONNECT.
    SharedSubscriptionsNotSupported = 0x9e,

    /// CONNACK, DISCONNECT.
    ConnectionRateExceeded = 0x9f,

    /// DISCONNECT only.
    MaximumConnectTime = 0xa0,

    /// SUBACK, DISCONNECT.
    SubscriptionIdentifiersNotSupported = 0xa1,

    /// SUBACK, DISCONNECT.
    WildcardSubscriptionsNotSupported = 0xa2,
}

impl ReasonCode {
    /// Byte length in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }

    /// Returns true if this code reports an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        (*self as u8) >= 0x80
    }
}

impl TryFrom<u8> for ReasonCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::GrantedQoS1),
            0x02 => Ok(Self::GrantedQoS2),
            0x04 => Ok(Self::DisconnectWithWillMessage),
            0x10 => Ok(Self::NoMatchingSubscribers),
            0x11 => Ok(Self::NoSubscriptionExisted),
            0x18 => Ok(Self::ContinueAuthentication),
            0x19 => Ok(Self::ReAuthenticate),
            0x80 => Ok(Self::UnspecifiedError),
            0x81 => Ok(Self::MalformedPacket),
            0x82 => Ok(Self::ProtocolError),
            0x83 => Ok(Self::ImplementationSpecificError),
            0x84 => Ok(Self::UnsupportedProtocolVersion),
            0x85 => Ok(Self::ClientIdentifierNotValid),
            0x86 => Ok(Self::BadUserNameOrPassword),
            0x87 => Ok(Self::NotAuthorized),
            0x88 => Ok(Self::ServerUnavailable),
            0x89 => Ok(Self::ServerBusy),
            0x8a => Ok(Self::Banned),
            0x8b => Ok(Self::ServerShuttingDown),
            0x8c => Ok(Self::BadAuthenticationMethod),
            0x8d => Ok(Self::KeepAliveTimeout),
            0x8e => Ok(Self::SessionTakenOver),
            0x8f => Ok(Self::TopicFilterInvalid),
            0x90 => Ok(Self::TopicNameInvalid),
            0x91 => Ok(Self::PacketIdentifierInUse),
            0x92 => Ok(Self::PacketIdentifierNotFound),
            0x93 => Ok(Self::ReceiveMaximumExceeded),
            0x94 => Ok(Self::TopicAliasInvalid),
            0x95 => Ok(Self::PacketTooLarge),
            0x96 => Ok(Self::MessageRateTooHigh),
            0x97 => Ok(Self::QuotaExceeded),
            0x98 => Ok(Self::AdministrativeAction),
            0x99 => Ok(Self::PayloadFormatInvalid),
            0x9a => Ok(Self::RetainNotSupported),
            0x9b => Ok(Self::QoSNotSupported),
            0x9c => Ok(Self::UseAnotherServer),
            0x9d => Ok(Self::ServerMoved),
            0x9e => Ok(Self::SharedSubscriptionsNotSupported),
            0x9f => Ok(Self::ConnectionRateExceeded),
            0xa0 => Ok(Self::MaximumConnectTime),
            0xa1 => Ok(Self::SubscriptionIdentifiersNotSupported),
            0xa2 => Ok(Self::WildcardSubscriptionsNotSupported),
            _ => Err(DecodeError::InvalidReasonCode),
        }
    }
}

impl DecodePacket for ReasonCode {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        Self::try_from(ba.read_byte()?)
    }
}

impl EncodePacket for ReasonCode {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(*self as u8);
        Ok(Self::bytes())
    }
}
