use compact_str::{CompactString, ToCompactString};
use facet::Facet;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque, stable identifier for a node or an edge.
///
/// Identifiers are unique within a single host's graph (per the data model's
/// invariant 1); they carry no structure readers are allowed to depend on.
#[derive(Facet, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[facet(transparent)]
pub struct Identifier(CompactString);

impl Identifier {
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, process-unique identifier.
    pub fn fresh() -> Self {
        Self(next_opaque_id())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Process-seeded prefix + monotonic counter, rendered as hex.
///
/// The prefix keeps identifiers from different processes apart without a
/// coordination service; the counter keeps them apart within one process.
fn next_opaque_id() -> CompactString {
    static PROCESS_PREFIX: OnceLock<u16> = OnceLock::new();
    static COUNTER: AtomicU64 = AtomicU64::new(1);

    let prefix = *PROCESS_PREFIX.get_or_init(|| {
        let pid = std::process::id() as u64;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        ((seed ^ pid) & 0xFFFF) as u16
    });

    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix:04x}{counter:012x}").to_compact_string()
}

#[cfg(test)]
mod tests {
    use super::Identifier;

    #[test]
    fn fresh_identifiers_are_distinct() {
        let a = Identifier::fresh();
        let b = Identifier::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn from_str_round_trips() {
        let id = Identifier::new("host-0");
        assert_eq!(id.as_str(), "host-0");
        assert_eq!(id.to_string(), "host-0");
    }
}
