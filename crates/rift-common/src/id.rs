use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Server-minted identifier of one peer ↔ conduit pairing.
///
/// Freshly minted ids are random v4 UUIDs. Ids received over the wire are
/// accepted as opaque strings, since a conduit may echo back anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingId(String);

impl PairingId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PairingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for PairingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PairingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PairingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_CONN: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of one accepted socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    pub fn next() -> Self {
        Self(NEXT_CONN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pairing_id_is_v4_uuid() {
        let id = PairingId::new();
        let parsed = uuid::Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn pairing_ids_are_unique() {
        use std::collections::HashSet;
        let ids: HashSet<PairingId> = (0..256).map(|_| PairingId::new()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn pairing_id_serializes_as_plain_string() {
        let id = PairingId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: PairingId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn conn_ids_increase() {
        let a = ConnId::next();
        let b = ConnId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("#{}", a.get()));
    }
}
