use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Address of one cluster node: the logical name it was configured with
/// and the socket address it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub addr: String,
    pub resolved: SocketAddr,
}

impl ServerAddr {
    pub fn new(addr: impl Into<String>, resolved: SocketAddr) -> Self {
        Self {
            addr: addr.into(),
            resolved,
        }
    }

    /// Key used to order and look up servers in a registry.
    pub fn resolved_key(&self) -> String {
        self.resolved.to_string()
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.addr == self.resolved.to_string() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.addr, self.resolved)
        }
    }
}

/// A single node attribute, e.g. `dc = "east"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

/// Tags a node must carry, all of them, to satisfy one filter entry.
pub type TagSet = Vec<Tag>;

/// Topology metadata for one node, as reported by the topology refresher.
///
/// Servers hold this behind an `Arc` and swap the whole value on update,
/// so a reader always sees one consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub primary: bool,
    pub router: bool,
    pub tags: Vec<Tag>,
    pub max_wire_version: i32,
    pub set_name: Option<String>,
}

impl ServerInfo {
    /// Whether this node satisfies at least one of `tag_sets`.
    ///
    /// For every tag in a set, the first node tag with the same name decides:
    /// a differing value fails the set even if a later tag would match.
    /// An empty set is trivially satisfied; an empty list of sets is not.
    pub fn has_tags(&self, tag_sets: &[TagSet]) -> bool {
        tag_sets.iter().any(|set| {
            set.iter().all(|required| {
                self.tags
                    .iter()
                    .find(|has| has.name == required.name)
                    .is_some_and(|has| has.value == required.value)
            })
        })
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }
}

/// Routing preference for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    #[default]
    Nearest,
}

impl ReadMode {
    pub const ALL: [ReadMode; 5] = [
        ReadMode::Primary,
        ReadMode::PrimaryPreferred,
        ReadMode::Secondary,
        ReadMode::SecondaryPreferred,
        ReadMode::Nearest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadMode::Primary => "primary",
            ReadMode::PrimaryPreferred => "primary_preferred",
            ReadMode::Secondary => "secondary",
            ReadMode::SecondaryPreferred => "secondary_preferred",
            ReadMode::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown read mode: {0}")]
pub struct UnknownReadMode(pub String);

impl FromStr for ReadMode {
    type Err = UnknownReadMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ReadMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| UnknownReadMode(s.to_string()))
    }
}
