// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-field meta-information.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SaveboxError;
use crate::meta_value::{MetaInfoMap, MetaValue};
use crate::type_desc::{ElementKind, TypeDescriptor};

/// Name, type descriptor, and annotations of one field.
///
/// The type descriptor is fixed at construction; annotations can only grow
/// or be updated with values of the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetaInfo {
    name: String,
    #[serde(rename = "type")]
    ty: TypeDescriptor,
    #[serde(default)]
    meta_info: MetaInfoMap,
}

impl FieldMetaInfo {
    /// Creates field meta-info without annotations.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::InvalidName`] if `name` is empty.
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Result<Self, SaveboxError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SaveboxError::InvalidName(name));
        }
        Ok(Self {
            name,
            ty,
            meta_info: MetaInfoMap::new(),
        })
    }

    /// Shorthand for `new(name, TypeDescriptor::new(kind, dims)?)`.
    pub fn with_kind(
        name: impl Into<String>,
        kind: ElementKind,
        dims: impl Into<Vec<usize>>,
    ) -> Result<Self, SaveboxError> {
        Self::new(name, TypeDescriptor::new(kind, dims)?)
    }

    /// Adds an annotation, consuming and returning `self` for chaining.
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> Result<Self, SaveboxError> {
        self.meta_info.insert(key, value)?;
        Ok(self)
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type descriptor.
    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.ty
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.ty.kind()
    }

    /// Bytes per element.
    pub fn byte_size(&self) -> usize {
        self.ty.byte_size()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.ty.rank()
    }

    /// Dimensions.
    pub fn dims(&self) -> &[usize] {
        self.ty.dims()
    }

    /// Annotations.
    pub fn meta_info(&self) -> &MetaInfoMap {
        &self.meta_info
    }

    /// Mutable annotations. Inserts keep the typed-key rule.
    pub fn meta_info_mut(&mut self) -> &mut MetaInfoMap {
        &mut self.meta_info
    }

    /// Folds the annotations of a re-registration into this entry.
    ///
    /// New keys are added. A key that exists with an equal value is a no-op;
    /// one with a different value is a conflict. The type descriptors must
    /// be identical. Nothing is modified on error.
    pub(crate) fn absorb(&mut self, other: &Self) -> Result<bool, SaveboxError> {
        if self.ty != other.ty {
            return Err(SaveboxError::FieldConflict {
                field: self.name.clone(),
                reason: format!("registered as {}, not {}", self.ty, other.ty),
            });
        }
        let mut added = MetaInfoMap::new();
        for (key, value) in other.meta_info() {
            match self.meta_info.get(key) {
                Some(existing) if existing == value => {}
                Some(existing) => {
                    return Err(SaveboxError::FieldConflict {
                        field: self.name.clone(),
                        reason: format!("annotation `{key}` is {existing}, not {value}"),
                    });
                }
                None => {
                    added.insert(key.clone(), value.clone())?;
                }
            }
        }
        let changed = !added.is_empty();
        self.meta_info.merge(&added)?;
        Ok(changed)
    }
}

impl fmt::Display for FieldMetaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.ty)?;
        if !self.meta_info.is_empty() {
            write!(f, " {}", self.meta_info)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn u_field() -> FieldMetaInfo {
        FieldMetaInfo::with_kind("u", ElementKind::Float64, [10]).unwrap()
    }

    #[test]
    fn empty_name_is_rejected() {
        let td = TypeDescriptor::new(ElementKind::Int32, [1]).unwrap();
        assert!(matches!(
            FieldMetaInfo::new("", td),
            Err(SaveboxError::InvalidName(_))
        ));
    }

    #[test]
    fn absorb_adds_new_annotations() {
        let mut field = u_field().with("units", "m/s").unwrap();
        let again = u_field().with("halo", 3_i32).unwrap();
        assert!(field.absorb(&again).unwrap());
        assert_eq!(field.meta_info().len(), 2);
        assert!(!field.absorb(&again).unwrap());
    }

    #[test]
    fn absorb_rejects_different_type() {
        let mut field = u_field();
        let other = FieldMetaInfo::with_kind("u", ElementKind::Float64, [11]).unwrap();
        assert!(matches!(
            field.absorb(&other),
            Err(SaveboxError::FieldConflict { .. })
        ));
    }

    #[test]
    fn absorb_rejects_changed_value_without_partial_update() {
        let mut field = u_field().with("halo", 3_i32).unwrap();
        let other = u_field()
            .with("halo", 4_i32)
            .unwrap()
            .with("a_new_key", true)
            .unwrap();
        assert!(field.absorb(&other).is_err());
        assert_eq!(field.meta_info().len(), 1);
    }

    #[test]
    fn display_includes_type() {
        let field = u_field();
        assert_eq!(field.to_string(), "u float64[10]");
    }
}
