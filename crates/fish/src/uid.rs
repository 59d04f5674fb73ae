//! 128-bit identifiers whose first six bytes are the creating node's UID
//! prefix, keeping causal locality when scanning a collection by key.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(#[serde(with = "hex_bytes")] pub [u8; 16]);

impl Uid {
    pub const NIL: Uid = Uid([0u8; 16]);

    /// Build a new id carrying `node_prefix` (the first six bytes of the
    /// creating node's own uid) followed by ten random bytes.
    pub fn new(node_prefix: &[u8; 6]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..6].copy_from_slice(node_prefix);
        rand::thread_rng().fill_bytes(&mut bytes[6..]);
        Uid(bytes)
    }

    /// The six-byte prefix identifying the node that minted this id.
    pub fn node_prefix(&self) -> [u8; 6] {
        let mut p = [0u8; 6];
        p.copy_from_slice(&self.0[..6]);
        p
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid uid: {0}")]
pub struct ParseUidError(String);

impl FromStr for Uid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(ParseUidError(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| ParseUidError(s.to_string()))?;
            bytes[i] = u8::from_str_radix(hex, 16).map_err(|_| ParseUidError(s.to_string()))?;
        }
        Ok(Uid(bytes))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::Uid(*bytes).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(d)?;
        super::Uid::from_str(&s)
            .map(|u| u.0)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_display_and_parse() {
        let uid = Uid::new(&[1, 2, 3, 4, 5, 6]);
        let parsed: Uid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn carries_node_prefix() {
        let prefix = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        let uid = Uid::new(&prefix);
        assert_eq!(uid.node_prefix(), prefix);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Uid::from_str("deadbeef").is_err());
    }
}
