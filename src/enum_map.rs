//! Bidirectional mapping between raw enum values and their wire integers.
//!
//! Mappings are strict: a raw value without a wire number cannot be written
//! and an unknown wire number cannot be read. There is no passthrough.

use crate::FastHashMap;
use crate::error::ErrorKind;

/// Raw value ↔ wire value table of one enum type.
#[derive(Debug, Clone, Default)]
pub struct EnumMap {
    name: String,
    to_wire: FastHashMap<i64, i64>,
    from_wire: FastHashMap<i64, i64>,
}

impl EnumMap {
    /// Creates an empty map.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Creates a map where every raw value is written as itself.
    pub fn identity(name: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        values.into_iter().fold(Self::new(name), |map, v| map.with_mapping(v, v))
    }

    /// Fügt eine Zuordnung hinzu (Fluent API).
    pub fn with_mapping(mut self, raw: i64, wire: i64) -> Self {
        self.insert(raw, wire);
        self
    }

    /// Fügt eine Zuordnung hinzu. Eine bestehende Zuordnung für `raw` wird ersetzt.
    pub fn insert(&mut self, raw: i64, wire: i64) {
        self.to_wire.insert(raw, wire);
        self.from_wire.insert(wire, raw);
    }

    /// Enum type name, used in model validation messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of raw values.
    pub fn len(&self) -> usize {
        self.to_wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_wire.is_empty()
    }

    /// True when no two raw values share a wire value (and vice versa).
    pub fn is_bijective(&self) -> bool {
        self.to_wire.len() == self.from_wire.len()
            && self.to_wire.iter().all(|(raw, wire)| self.from_wire.get(wire) == Some(raw))
    }

    /// Wire value for `raw`.
    pub fn to_wire(&self, raw: i64) -> Result<i64, ErrorKind> {
        self.to_wire.get(&raw).copied().ok_or(ErrorKind::UnmappedEnumValue(raw))
    }

    /// Raw value for `wire`.
    pub fn from_wire(&self, wire: i64) -> Result<i64, ErrorKind> {
        self.from_wire.get(&wire).copied().ok_or(ErrorKind::UnknownEnumValue(wire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn renumbering() {
        let map = EnumMap::new("Color").with_mapping(0, 10).with_mapping(1, 20).with_mapping(2, -1);
        assert_eq!(map.to_wire(1), Ok(20));
        assert_eq!(map.from_wire(-1), Ok(2));
        assert_eq!(map.len(), 3);
        assert!(map.is_bijective());
    }

    #[test]
    fn identity_mapping() {
        let map = EnumMap::identity("Level", [0, 1, 2]);
        assert_eq!(map.to_wire(2), Ok(2));
        assert_eq!(map.from_wire(0), Ok(0));
        assert_eq!(map.name(), "Level");
    }

    #[test]
    fn unmapped_values_fail_in_both_directions() {
        let map = EnumMap::identity("Level", [0, 1]);
        let write = map.to_wire(5).unwrap_err();
        assert_eq!(write, ErrorKind::UnmappedEnumValue(5));
        assert_eq!(write.category(), ErrorCategory::UnsupportedEncoding);
        let read = map.from_wire(7).unwrap_err();
        assert_eq!(read.category(), ErrorCategory::StreamCorruption);
    }

    #[test]
    fn shared_wire_value_is_not_bijective() {
        let map = EnumMap::new("Dup").with_mapping(0, 1).with_mapping(1, 1);
        assert!(!map.is_bijective());
    }

    #[test]
    fn remapping_a_raw_value_is_detected() {
        let map = EnumMap::new("Re").with_mapping(0, 1).with_mapping(0, 2);
        assert!(!map.is_bijective());
    }
}
