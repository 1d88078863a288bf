//! Node and dispatcher identifiers
//!
//! `ServerId` uses `Arc<str>` internally for O(1) clone operations,
//! `DispatcherId` is a 128-bit random identifier.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::ContractError;

/// Cluster node identifier with cheap cloning.
///
/// Used as message destination and as the producer-side binding of a
/// dispatcher's feed. Cloning only increments a reference count, which
/// matters because every outbound message carries it.
///
/// # Examples
/// ```
/// use contracts::ServerId;
///
/// let id: ServerId = "n1".into();
/// let id2 = id.clone();  // O(1) - just increments ref count
/// assert_eq!(id, id2);
/// assert_eq!(id.as_str(), "n1");
/// ```
#[derive(Clone, Default)]
pub struct ServerId(Arc<str>);

impl ServerId {
    /// Create a new ServerId from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ServerId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ServerId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServerId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ServerId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({:?})", self.0)
    }
}

impl PartialEq for ServerId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for ServerId {}

impl PartialEq<str> for ServerId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for ServerId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Same as str hash for HashMap compatibility
impl Hash for ServerId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for ServerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ServerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

/// Globally unique dispatcher identifier.
///
/// Stable for the dispatcher's lifetime and the routing key of the
/// collector's registry. On the wire it travels in the canonical hyphenated
/// UUID form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatcherId(Uuid);

impl DispatcherId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the string form carried in feed and control messages
    ///
    /// # Errors
    /// Returns `InvalidMessage` when `s` is not a UUID.
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ContractError::invalid_message(format!("invalid dispatcher id '{s}': {e}")))
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DispatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DispatcherId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for DispatcherId {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatcherId({})", self.0.hyphenated())
    }
}
