//! Participant identities.
//!
//! Wire format:
//! ```text
//! [type: u8]
//! type 1 (client): [channel: u64]
//! type 2 (group):  [group: u8]
//! type 3 (server): [name_len: u16][name_bytes][uid: 16 bytes]
//! ```

use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::object_id::GroupId;

const CLIENT_TYPE: u8 = 1;
const GROUP_TYPE: u8 = 2;
const SERVER_TYPE: u8 = 3;

/// Identity of a connected client, assigned from its channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a new client ID
    #[must_use]
    pub const fn new(channel: u64) -> Self {
        Self(channel)
    }

    /// Get the inner value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Identity of a server process.
///
/// Ordered by name first, then by the uid chosen at startup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId {
    name: String,
    uid: Uuid,
}

impl ServerId {
    /// Create a server ID with a fresh uid
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: Uuid::new_v4(),
        }
    }

    /// Create a server ID with a known uid
    pub fn with_uid(name: impl Into<String>, uid: Uuid) -> Self {
        Self {
            name: name.into(),
            uid,
        }
    }

    /// Server name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server uid
    #[must_use]
    pub const fn uid(&self) -> &Uuid {
        &self.uid
    }
}

/// Identity of a cluster participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// A client process
    Client(ClientId),
    /// A partition acting as one logical participant
    Group(GroupId),
    /// A server process
    Server(ServerId),
}

impl NodeId {
    /// Shorthand for a client node
    #[must_use]
    pub const fn client(channel: u64) -> Self {
        Self::Client(ClientId::new(channel))
    }

    /// Shorthand for a group node
    #[must_use]
    pub const fn group(group: GroupId) -> Self {
        Self::Group(group)
    }

    /// Shorthand for a server node
    pub fn server(name: impl Into<String>, uid: Uuid) -> Self {
        Self::Server(ServerId::with_uid(name, uid))
    }

    /// Type discriminator used for ordering and on the wire
    #[must_use]
    pub const fn discriminator(&self) -> u8 {
        match self {
            Self::Client(_) => CLIENT_TYPE,
            Self::Group(_) => GROUP_TYPE,
            Self::Server(_) => SERVER_TYPE,
        }
    }

    /// Number of bytes `encode` will write
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Self::Client(_) => 8,
            Self::Group(_) => 1,
            Self::Server(server) => 2 + server.name.len() + 16,
        }
    }

    /// Append the wire form to `buf`.
    ///
    /// # Panics
    ///
    /// Panics if a server name is longer than `u16::MAX` bytes.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.discriminator());
        match self {
            Self::Client(client) => buf.put_u64(client.value()),
            Self::Group(group) => buf.put_u8(group.value()),
            Self::Server(server) => {
                let name_len =
                    u16::try_from(server.name.len()).expect("server name longer than u16::MAX");
                buf.put_u16(name_len);
                buf.put_slice(server.name.as_bytes());
                buf.put_slice(server.uid.as_bytes());
            }
        }
    }

    /// Read one node id from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input, an unknown discriminator, the
    /// reserved group value or a server name that is not UTF-8.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(Error::Truncated("node type"));
        }

        match buf.get_u8() {
            CLIENT_TYPE => {
                if buf.remaining() < 8 {
                    return Err(Error::Truncated("client id"));
                }
                Ok(Self::client(buf.get_u64()))
            }
            GROUP_TYPE => {
                if buf.remaining() < 1 {
                    return Err(Error::Truncated("group id"));
                }
                let raw = buf.get_u8();
                if raw > GroupId::MAX {
                    return Err(Error::ReservedGroup);
                }
                Ok(Self::Group(GroupId::new(raw)))
            }
            SERVER_TYPE => {
                if buf.remaining() < 2 {
                    return Err(Error::Truncated("server name length"));
                }
                let name_len = buf.get_u16() as usize;
                if buf.remaining() < name_len + 16 {
                    return Err(Error::Truncated("server id"));
                }
                let name_bytes = buf.copy_to_bytes(name_len);
                let name = String::from_utf8(name_bytes.to_vec())
                    .map_err(|_| Error::InvalidUtf8("server name"))?;
                let mut uid = [0u8; 16];
                buf.copy_to_slice(&mut uid);
                Ok(Self::server(name, Uuid::from_bytes(uid)))
            }
            other => Err(Error::UnknownNodeType(other)),
        }
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Client(a), Self::Client(b)) => a.cmp(b),
            (Self::Group(a), Self::Group(b)) => a.cmp(b),
            (Self::Server(a), Self::Server(b)) => a.cmp(b),
            _ => self.discriminator().cmp(&other.discriminator()),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(client) => write!(f, "client-{}", client.value()),
            Self::Group(group) => write!(f, "{group}"),
            Self::Server(server) => write!(f, "server-{}({})", server.name, server.uid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::BytesMut;

    fn uid(n: u8) -> Uuid {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn test_discriminator_orders_before_value() {
        let client = NodeId::client(u64::MAX);
        let group = NodeId::group(GroupId::new(0));
        let server = NodeId::server("a", uid(0));

        assert!(client < group);
        assert!(group < server);
        assert!(client < server);
    }

    #[test]
    fn test_intra_type_ordering() {
        assert!(NodeId::client(1) < NodeId::client(2));
        assert!(NodeId::server("a", uid(9)) < NodeId::server("b", uid(0)));
        assert!(NodeId::server("a", uid(1)) < NodeId::server("a", uid(2)));
    }

    #[test]
    fn test_wire_roundtrip_all_variants() {
        let nodes = [
            NodeId::client(42),
            NodeId::group(GroupId::new(7)),
            NodeId::server("l2-east", uid(3)),
        ];

        let mut buf = BytesMut::new();
        for node in &nodes {
            node.encode(&mut buf);
        }
        assert_eq!(
            buf.len(),
            nodes.iter().map(NodeId::encoded_len).sum::<usize>()
        );

        let mut reader = buf.freeze();
        for node in &nodes {
            assert_eq!(&NodeId::decode(&mut reader).unwrap(), node);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_matches!(
            NodeId::decode(&mut &[9u8][..]),
            Err(Error::UnknownNodeType(9))
        );
        assert_matches!(
            NodeId::decode(&mut &[CLIENT_TYPE, 0, 0][..]),
            Err(Error::Truncated(_))
        );
        assert_matches!(NodeId::decode(&mut &[][..]), Err(Error::Truncated(_)));
    }
}
