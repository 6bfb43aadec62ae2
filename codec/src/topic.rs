// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Topic names, topic filters and wildcard matching.

use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::Write;

use crate::utils::{validate_utf8_string, StringError};
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// Separator of topic segments.
pub const TOPIC_SEPARATOR: char = '/';

/// Matches exactly one non-empty topic segment.
pub const SINGLE_WILDCARD: &str = "+";

/// Matches zero or more trailing topic segments; must be the last segment.
pub const MULTI_WILDCARD: &str = "#";

/// Prefix of topics reserved for broker originated messages, like `$SYS`.
pub const RESERVED_PREFIX: char = '$';

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    EmptyTopic,

    /// Topic contains a zero length segment.
    EmptySegment,

    /// Longer than 65535 bytes.
    TooManyData,

    /// `+` or `#` appears in a topic name.
    WildcardInTopicName,

    /// `#` is not the final segment, or a wildcard char is mixed into a
    /// literal segment.
    InvalidWildcard,

    InvalidString(StringError),
}

impl From<StringError> for TopicError {
    fn from(err: StringError) -> Self {
        Self::InvalidString(err)
    }
}

fn validate_topic_common(s: &str) -> Result<(), TopicError> {
    if s.is_empty() {
        return Err(TopicError::EmptyTopic);
    }
    if s.len() > crate::utils::STRING_MAX_BYTES {
        return Err(TopicError::TooManyData);
    }
    validate_utf8_string(s)?;
    if s.split(TOPIC_SEPARATOR).any(str::is_empty) {
        return Err(TopicError::EmptySegment);
    }
    Ok(())
}

/// A concrete topic name as used in publish packets.
///
/// The Topic Name in the PUBLISH packet MUST NOT contain wildcard
/// characters [MQTT-3.3.2-2].
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct PubTopic(String);

impl PubTopic {
    /// Create a new topic name from `s`.
    ///
    /// # Errors
    ///
    /// Returns error if `s` is empty, too long, has empty segments or
    /// contains wildcard characters.
    pub fn new(s: &str) -> Result<Self, TopicError> {
        validate_topic_common(s)?;
        if s.contains(['+', '#']) {
            return Err(TopicError::WildcardInTopicName);
        }
        Ok(Self(s.to_string()))
    }

    /// Byte length in packet, including the two length bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    /// Returns true if this topic belongs to the reserved `$` namespace.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(RESERVED_PREFIX)
    }
}

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = ba.read_u16()? as usize;
        let s = ba.read_string(len)?;
        Self::new(&s).map_err(Into::into)
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.0.len() as u16;
        buf.write_u16::<BigEndian>(len)?;
        buf.write_all(self.0.as_bytes())?;
        Ok(self.bytes())
    }
}

/// One parsed segment of a topic filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSegment {
    Literal(String),

    /// `+`
    Single,

    /// `#`
    Multi,
}

/// A topic filter as used in subscribe packets, possibly containing
/// wildcards.
///
/// `+` matches exactly one non-empty segment. `#` matches zero or more
/// trailing segments and must be the final segment. Filters starting with a
/// wildcard never match topics in the reserved `$` namespace.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct SubTopic(String);

impl SubTopic {
    /// Create a new topic filter from `s`.
    ///
    /// # Errors
    ///
    /// Returns error if `s` violates the wildcard rules.
    pub fn new(s: &str) -> Result<Self, TopicError> {
        TopicFilter::parse(s)?;
        Ok(Self(s.to_string()))
    }

    /// Byte length in packet, including the two length bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        2 + self.0.len()
    }

    /// Returns true if the filter contains `+` or `#`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.0.contains(['+', '#'])
    }
}

impl AsRef<str> for SubTopic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for SubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = ba.read_u16()? as usize;
        let s = ba.read_string(len)?;
        Self::new(&s).map_err(Into::into)
    }
}

impl EncodePacket for SubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.0.len() as u16;
        buf.write_u16::<BigEndian>(len)?;
        buf.write_all(self.0.as_bytes())?;
        Ok(self.bytes())
    }
}

/// A parsed topic filter, ready for repeated matching against concrete
/// topic names.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
    segments: Vec<FilterSegment>,
}

impl TopicFilter {
    /// Parse and validate a topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if `s` is empty, has empty segments, or `+`/`#` are
    /// used outside their own segment or `#` is not last.
    pub fn parse(s: &str) -> Result<Self, TopicError> {
        validate_topic_common(s)?;

        let raw: Vec<&str> = s.split(TOPIC_SEPARATOR).collect();
        let last = raw.len() - 1;
        let mut segments = Vec::with_capacity(raw.len());
        for (idx, part) in raw.iter().enumerate() {
            let segment = match *part {
                SINGLE_WILDCARD => FilterSegment::Single,
                MULTI_WILDCARD => {
                    // The multi-level wildcard character MUST be the last
                    // character of the topic filter [MQTT-4.7.1-2].
                    if idx != last {
                        return Err(TopicError::InvalidWildcard);
                    }
                    FilterSegment::Multi
                }
                literal => {
                    if literal.contains(['+', '#']) {
                        return Err(TopicError::InvalidWildcard);
                    }
                    FilterSegment::Literal(literal.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            filter: s.to_string(),
            segments,
        })
    }

    /// The original filter string.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns true if the filter contains `+` or `#`.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, FilterSegment::Literal(_)))
    }

    /// Match this filter against a concrete topic name.
    ///
    /// A subscription with a wildcard in the first segment never matches
    /// topics in the reserved `$` namespace [MQTT-4.7.2-1].
    #[must_use]
    pub fn is_match(&self, topic: &str) -> bool {
        if topic.starts_with(RESERVED_PREFIX)
            && !matches!(self.segments.first(), Some(FilterSegment::Literal(_)))
        {
            return false;
        }

        let parts: Vec<&str> = topic.split(TOPIC_SEPARATOR).collect();
        let mut pos = 0;
        for segment in &self.segments {
            match segment {
                FilterSegment::Multi => return true,
                FilterSegment::Single => {
                    if pos >= parts.len() || parts[pos].is_empty() {
                        return false;
                    }
                    pos += 1;
                }
                FilterSegment::Literal(literal) => {
                    if pos >= parts.len() || parts[pos] != literal {
                        return false;
                    }
                    pos += 1;
                }
            }
        }

        // Without a multi wildcard the filter must consume the topic exactly.
        pos == parts.len()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pub_topic_rejects_wildcards() {
        assert!(PubTopic::new("sensors/one/temp").is_ok());
        assert!(PubTopic::new("sensors/+/temp").is_err());
        assert!(PubTopic::new("sensors/#").is_err());
        assert!(PubTopic::new("").is_err());
        assert!(PubTopic::new("a//b").is_err());
    }

    #[test]
    fn test_filter_parse() {
        assert!(TopicFilter::parse("a/b/c").is_ok());
        assert!(TopicFilter::parse("a/+/c").is_ok());
        assert!(TopicFilter::parse("a/#").is_ok());
        assert!(TopicFilter::parse("#").is_ok());
        assert!(TopicFilter::parse("a/#/c").is_err());
        assert!(TopicFilter::parse("a+/b").is_err());
        assert!(TopicFilter::parse("a/b#").is_err());
        assert!(TopicFilter::parse("").is_err());
    }

    #[test]
    fn test_filter_match_literal() {
        let filter = TopicFilter::parse("sport/tennis").unwrap();
        assert!(filter.is_match("sport/tennis"));
        assert!(!filter.is_match("sport/tennis/player1"));
        assert!(!filter.is_match("sport"));
        // Topic names are case sensitive.
        assert!(!filter.is_match("Sport/tennis"));
    }

    #[test]
    fn test_filter_match_single_wildcard() {
        let filter = TopicFilter::parse("sport/+/player1").unwrap();
        assert!(filter.is_match("sport/tennis/player1"));
        assert!(filter.is_match("sport/golf/player1"));
        assert!(!filter.is_match("sport/tennis/player2"));
        assert!(!filter.is_match("sport/player1"));

        let filter = TopicFilter::parse("+").unwrap();
        assert!(filter.is_match("finance"));
        assert!(!filter.is_match("finance/stock"));
    }

    #[test]
    fn test_filter_match_multi_wildcard() {
        let filter = TopicFilter::parse("sport/tennis/#").unwrap();
        assert!(filter.is_match("sport/tennis"));
        assert!(filter.is_match("sport/tennis/player1"));
        assert!(filter.is_match("sport/tennis/player1/ranking"));
        assert!(!filter.is_match("sport/golf"));

        let filter = TopicFilter::parse("#").unwrap();
        assert!(filter.is_match("any/topic/at/all"));
    }

    #[test]
    fn test_filter_skips_reserved_topics() {
        // A subscription to "#" does not receive messages on "$SYS/..."
        let filter = TopicFilter::parse("#").unwrap();
        assert!(!filter.is_match("$SYS/uptime"));

        let filter = TopicFilter::parse("+/uptime").unwrap();
        assert!(!filter.is_match("$SYS/uptime"));

        // An explicit "$SYS/#" subscription does.
        let filter = TopicFilter::parse("$SYS/#").unwrap();
        assert!(filter.is_match("$SYS/uptime"));
    }
}
