// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS};

/// The connect flags byte of the connect packet variable header.
///
/// It specifies the presence of optional payload fields and the session
/// behaviour. The Server MUST validate that the reserved flag in the
/// CONNECT packet is set to 0 [MQTT-3.1.2-3].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectFlags {
    /// `clean_session` in 3.1.1, clean start in 5.0. When set, client and
    /// server discard any previous session state.
    clean_session: bool,

    /// Store a will message on behalf of this client.
    will: bool,

    /// QoS used when the will message is published.
    will_qos: QoS,

    /// Publish the will message as a retained message.
    will_retain: bool,

    /// A password field is present in the payload.
    password: bool,

    /// A username field is present in the payload.
    username: bool,
}

impl Default for ConnectFlags {
    fn default() -> Self {
        Self {
            clean_session: true,
            will: false,
            will_qos: QoS::AtMostOnce,
            will_retain: false,
            password: false,
            username: false,
        }
    }
}

impl ConnectFlags {
    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_will(&mut self, will: bool) -> &mut Self {
        self.will = will;
        self
    }

    #[must_use]
    pub const fn will(&self) -> bool {
        self.will
    }

    pub fn set_will_qos(&mut self, qos: QoS) -> &mut Self {
        self.will_qos = qos;
        self
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.will_qos
    }

    pub fn set_will_retain(&mut self, will_retain: bool) -> &mut Self {
        self.will_retain = will_retain;
        self
    }

    #[must_use]
    pub const fn will_retain(&self) -> bool {
        self.will_retain
    }

    pub fn set_password(&mut self, password: bool) -> &mut Self {
        self.password = password;
        self
    }

    #[must_use]
    pub const fn password(&self) -> bool {
        self.password
    }

    pub fn set_username(&mut self, username: bool) -> &mut Self {
        self.username = username;
        self
    }

    #[must_use]
    pub const fn username(&self) -> bool {
        self.username
    }

    /// Byte length in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl DecodePacket for ConnectFlags {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;

        if flag & 0b0000_0001 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }

        let clean_session = (flag & 0b0000_0010) != 0;
        let will = (flag & 0b0000_0100) != 0;
        let will_qos = QoS::try_from((flag & 0b0001_1000) >> 3)?;
        let will_retain = (flag & 0b0010_0000) != 0;
        let password = (flag & 0b0100_0000) != 0;
        let username = (flag & 0b1000_0000) != 0;

        // If the Will Flag is set to 0, then Will QoS MUST be set to 0 and
        // Will Retain MUST be set to 0 [MQTT-3.1.2-13], [MQTT-3.1.2-15].
        if !will && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(DecodeError::InvalidConnectFlags);
        }

        // If the User Name Flag is set to 0, the Password Flag MUST be set
        // to 0 [MQTT-3.1.2-22].
        if !username && password {
            return Err(DecodeError::InvalidConnectFlags);
        }

        Ok(Self {
            clean_session,
            will,
            will_qos,
            will_retain,
            password,
            username,
        })
    }
}

impl EncodePacket for ConnectFlags {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let mut flag = 0u8;
        if self.clean_session {
            flag |= 0b0000_0010;
        }
        if self.will {
            flag |= 0b0000_0100;
        }
        flag |= (self.will_qos as u8) << 3;
        if self.will_retain {
            flag |= 0b0010_0000;
        }
        if self.password {
            flag |= 0b0100_0000;
        }
        if self.username {
            flag |= 0b1000_0000;
        }
        buf.push(flag);
        Ok(Self::bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_reserved_bit() {
        let buf = [0b0000_0011];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectFlags::decode(&mut ba),
            Err(DecodeError::InvalidConnectFlags)
        );
    }

    #[test]
    fn test_decode_rejects_will_qos_without_will() {
        let buf = [0b0000_1010];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectFlags::decode(&mut ba),
            Err(DecodeError::InvalidConnectFlags)
        );
    }

    #[test]
    fn test_round_trip() {
        let mut flags = ConnectFlags::default();
        flags
            .set_username(true)
            .set_password(true)
            .set_will(true)
            .set_will_qos(QoS::AtLeastOnce);

        let mut buf = Vec::new();
        flags.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectFlags::decode(&mut ba).unwrap(), flags);
    }
}
