use std::fmt;

use serde::{Deserialize, Serialize};

/// Ephemeral identifier assigned by the tracker; meaningless outside one scan.
pub type TrackId = u32;

/// Persistent, globally unique key for one person across videos.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HumanIdentity(String);

impl HumanIdentity {
    /// Mints a fresh identity (random UUID v4).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HumanIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HumanIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for HumanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gallery entry key. Allocated monotonically, so ordering by id is
/// insertion order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
