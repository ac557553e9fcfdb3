//! Per-slot value format decision.
//!
//! A [`ValueFormatPolicy`] is attached to each field by the schema provider and
//! resolved once when the [`TypeModel`](crate::schema::TypeModel) is built.
//! The codec only reads the resolved value.
//!
//! | Policy | Wrapper | Object keys | Reserved slot |
//! |---|---|---|---|
//! | `Compact` | no | no | no |
//! | `MinimalEnhancement` | yes | no | no |
//! | `Reference` | yes | yes | no |
//! | `LateReference` | yes | yes | yes |

use crate::error::ErrorKind;
use crate::schema::{Construction, ItemKind};

/// How a value slot is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueFormatPolicy {
    /// Bare value, plain protobuf.
    #[default]
    Compact,
    /// Deduplicated through object keys.
    Reference,
    /// Wrapped with type metadata, no identity tracking.
    MinimalEnhancement,
    /// Like `Reference`, but the object is only materialized after its
    /// payload has been read; earlier back-references see a reserved slot.
    LateReference,
}

impl ValueFormatPolicy {
    /// The slot is written inside a reference wrapper.
    #[inline]
    pub fn uses_wrapper(self) -> bool {
        self != Self::Compact
    }

    /// Object keys are assigned and back-references emitted.
    #[inline]
    pub fn tracks_identity(self) -> bool {
        matches!(self, Self::Reference | Self::LateReference)
    }

    /// The reader reserves the object's slot before constructing it.
    #[inline]
    pub fn reserves_slot(self) -> bool {
        self == Self::LateReference
    }
}

/// Resolves the declared policy of a slot holding `item`.
///
/// `construction` is the construction mode of the target type for message
/// items. Wrapping policies are only valid on messages; `Reference` on a type
/// that cannot be constructed before its payload becomes `LateReference`.
pub fn resolve(
    declared: ValueFormatPolicy,
    item: &ItemKind,
    construction: Option<Construction>,
) -> Result<ValueFormatPolicy, ErrorKind> {
    match (item, construction) {
        (ItemKind::Message(_), Some(Construction::Deferred)) if declared == ValueFormatPolicy::Reference => {
            Ok(ValueFormatPolicy::LateReference)
        }
        (ItemKind::Message(_), _) => Ok(declared),
        (_, _) if declared == ValueFormatPolicy::Compact => Ok(declared),
        (other, _) => Err(ErrorKind::InvalidModel(
            format!("value format {declared:?} requires a message item, found {}", other.name()).into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeIndex;

    #[test]
    fn predicates() {
        assert!(!ValueFormatPolicy::Compact.uses_wrapper());
        assert!(ValueFormatPolicy::MinimalEnhancement.uses_wrapper());
        assert!(!ValueFormatPolicy::MinimalEnhancement.tracks_identity());
        assert!(ValueFormatPolicy::Reference.tracks_identity());
        assert!(!ValueFormatPolicy::Reference.reserves_slot());
        assert!(ValueFormatPolicy::LateReference.tracks_identity());
        assert!(ValueFormatPolicy::LateReference.reserves_slot());
    }

    #[test]
    fn reference_on_deferred_type_becomes_late() {
        let item = ItemKind::Message(TypeIndex(0));
        let policy = resolve(ValueFormatPolicy::Reference, &item, Some(Construction::Deferred)).unwrap();
        assert_eq!(policy, ValueFormatPolicy::LateReference);
        let policy = resolve(ValueFormatPolicy::Reference, &item, Some(Construction::Default)).unwrap();
        assert_eq!(policy, ValueFormatPolicy::Reference);
    }

    #[test]
    fn minimal_enhancement_stays_on_deferred_type() {
        let item = ItemKind::Message(TypeIndex(0));
        let policy =
            resolve(ValueFormatPolicy::MinimalEnhancement, &item, Some(Construction::Deferred)).unwrap();
        assert_eq!(policy, ValueFormatPolicy::MinimalEnhancement);
    }

    #[test]
    fn wrapper_on_scalar_is_rejected() {
        let err = resolve(ValueFormatPolicy::Reference, &ItemKind::Int32, None).unwrap_err();
        assert!(err.to_string().contains("Int32"), "{err}");
        assert_eq!(resolve(ValueFormatPolicy::Compact, &ItemKind::String, None), Ok(ValueFormatPolicy::Compact));
    }
}
