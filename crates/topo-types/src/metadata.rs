use compact_str::CompactString;
use facet::Facet;
use std::collections::BTreeMap;

/// A metadata attribute value.
///
/// Kept as a small closed set of variants (rather than reusing a fully
/// generic JSON value type) so graph readers never have to guess whether,
/// say, `IfIndex` round-trips as a number or a numeric string.
#[derive(Facet, Clone, Debug, PartialEq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(CompactString),
    StrList(Vec<CompactString>),
    Map(Metadata),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(CompactString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(CompactString::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An open-keyed attribute map.
///
/// `BTreeMap` rather than `HashMap`: snapshot serialization and tests get a
/// deterministic key order for free, and the maps involved are small.
#[derive(Facet, Clone, Debug, Default, PartialEq)]
#[facet(transparent)]
pub struct Metadata(BTreeMap<CompactString, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn set(&mut self, key: impl Into<CompactString>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` over `self`: present keys are overwritten, keys not
    /// mentioned in `other` are untouched (invariant 5 in the data model).
    pub fn merge(&mut self, other: &Metadata) {
        for (k, v) in other.0.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// The subset of `self.merge(other)` that would actually change a value;
    /// used by the netlink probe to avoid emitting a `SetMetadata` call (and
    /// therefore a `NodeUpdated` event) when nothing changed.
    pub fn delta(&self, other: &Metadata) -> Metadata {
        let mut delta = Metadata::new();
        for (k, v) in other.0.iter() {
            if self.0.get(k) != Some(v) {
                delta.0.insert(k.clone(), v.clone());
            }
        }
        delta
    }

    /// Does this map satisfy a lookup filter? An empty filter matches
    /// everything; otherwise every filter entry must equal the corresponding
    /// attribute here.
    pub fn matches(&self, filter: &MetadataFilter) -> bool {
        filter
            .0
            .iter()
            .all(|(k, v)| self.0.get(k.as_str()) == Some(v))
    }
}

impl FromIterator<(CompactString, Value)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (CompactString, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A lookup predicate over node/edge metadata: every entry must equal the
/// candidate's attribute (§4.A "Metadata filter semantics").
#[derive(Clone, Debug, Default)]
pub struct MetadataFilter(BTreeMap<CompactString, Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_unmentioned_keys() {
        let mut base = Metadata::new().with("Name", "eth0").with("MTU", 1500i64);
        let update = Metadata::new().with("MTU", 9000i64);
        base.merge(&update);
        assert_eq!(base.get_str("Name"), Some("eth0"));
        assert_eq!(base.get_int("MTU"), Some(9000));
    }

    #[test]
    fn delta_only_contains_changed_keys() {
        let base = Metadata::new().with("Name", "eth0").with("MTU", 1500i64);
        let incoming = Metadata::new().with("Name", "eth0").with("MTU", 9000i64);
        let delta = base.delta(&incoming);
        assert_eq!(delta.get_int("MTU"), Some(9000));
        assert!(delta.get_str("Name").is_none());
    }

    #[test]
    fn empty_filter_matches_everything() {
        let md = Metadata::new().with("Type", "bridge");
        assert!(md.matches(&MetadataFilter::new()));
    }

    #[test]
    fn filter_requires_every_entry_to_match() {
        let md = Metadata::new().with("Type", "bridge").with("IfIndex", 3i64);
        let filter = MetadataFilter::new().with("Type", "bridge").with("IfIndex", 3i64);
        assert!(md.matches(&filter));

        let mismatched = MetadataFilter::new().with("Type", "veth");
        assert!(!md.matches(&mismatched));
    }
}
