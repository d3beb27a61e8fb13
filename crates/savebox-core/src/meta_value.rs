// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed annotation values and the key-ordered annotation map.
//!
//! Annotations hang off the global meta-info, each field, and each savepoint.
//! A key is typed by the first value stored under it: later inserts may
//! replace the value but not change its type. Float annotations must be
//! finite; NaN never equals itself and JSON has no spelling for either.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SaveboxError;

/// A single annotation value.
///
/// Serialized as `{"type": "<kind>", "value": <json>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
}

impl MetaValue {
    /// Stable lowercase name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
        }
    }

    /// Returns the boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer widened to `i64`, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float widened to `f64`, if this is a float value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float32(v) => Some(f64::from(*v)),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// `false` for NaN and infinite floats.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float32(v) => v.is_finite(),
            Self::Float64(v) => v.is_finite(),
            _ => true,
        }
    }

    fn same_type(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for MetaValue {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// Key-ordered map of typed annotations.
///
/// Iteration and the JSON rendering are sorted by key, so two maps holding
/// the same pairs compare and serialize identically regardless of insertion
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "BTreeMap<String, MetaValue>", try_from = "BTreeMap<String, MetaValue>")]
pub struct MetaInfoMap(BTreeMap<String, MetaValue>);

impl TryFrom<BTreeMap<String, MetaValue>> for MetaInfoMap {
    type Error = SaveboxError;

    fn try_from(entries: BTreeMap<String, MetaValue>) -> Result<Self, Self::Error> {
        for (key, value) in &entries {
            ensure_finite(key, value)?;
        }
        Ok(Self(entries))
    }
}

impl From<MetaInfoMap> for BTreeMap<String, MetaValue> {
    fn from(map: MetaInfoMap) -> Self {
        map.0
    }
}

impl MetaInfoMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of annotations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no annotations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    /// Stores `value` under `key`, returning the replaced value.
    ///
    /// # Errors
    ///
    /// [`SaveboxError::TypeMismatch`] if `key` already holds a value of a
    /// different type, [`SaveboxError::InvalidType`] for a NaN or infinite
    /// float. The map is unchanged in either case.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> Result<Option<MetaValue>, SaveboxError> {
        let key = key.into();
        let value = value.into();
        self.ensure_compatible(&key, &value)?;
        Ok(self.0.insert(key, value))
    }

    /// Inserts every entry of `other`.
    ///
    /// All keys are checked before any is written, so a type mismatch or a
    /// non-finite float leaves the map unchanged.
    pub fn merge(&mut self, other: &Self) -> Result<(), SaveboxError> {
        for (key, value) in other.iter() {
            self.ensure_compatible(key, value)?;
        }
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn ensure_compatible(&self, key: &str, value: &MetaValue) -> Result<(), SaveboxError> {
        ensure_finite(key, value)?;
        match self.0.get(key) {
            Some(existing) if !existing.same_type(value) => Err(SaveboxError::TypeMismatch {
                key: key.to_owned(),
                existing: existing.type_name(),
                requested: value.type_name(),
            }),
            _ => Ok(()),
        }
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, MetaValue> {
        self.0.iter()
    }

    /// Iterates keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.0.keys().map(String::as_str)
    }
}

fn ensure_finite(key: &str, value: &MetaValue) -> Result<(), SaveboxError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SaveboxError::InvalidType(format!(
            "annotation `{key}` is {value}; float annotations must be finite"
        )))
    }
}

impl<'a> IntoIterator for &'a MetaInfoMap {
    type Item = (&'a String, &'a MetaValue);
    type IntoIter = btree_map::Iter<'a, String, MetaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for MetaInfoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn insert_same_type_replaces() {
        let mut map = MetaInfoMap::new();
        assert!(map.insert("cycle", 1_i32).unwrap().is_none());
        let old = map.insert("cycle", 2_i32).unwrap();
        assert_eq!(old, Some(MetaValue::Int32(1)));
        assert_eq!(map.get("cycle"), Some(&MetaValue::Int32(2)));
    }

    #[test]
    fn insert_different_type_is_rejected() {
        let mut map = MetaInfoMap::new();
        map.insert("dt", 0.5_f64).unwrap();
        let err = map.insert("dt", "half").unwrap_err();
        match err {
            SaveboxError::TypeMismatch {
                key,
                existing,
                requested,
            } => {
                assert_eq!(key, "dt");
                assert_eq!(existing, "float64");
                assert_eq!(requested, "string");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(map.get("dt").and_then(MetaValue::as_f64), Some(0.5));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = MetaInfoMap::new();
        a.insert("x", 1_i64).unwrap();
        a.insert("y", true).unwrap();
        let mut b = MetaInfoMap::new();
        b.insert("y", true).unwrap();
        b.insert("x", 1_i64).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn json_shape_is_tagged() {
        let mut map = MetaInfoMap::new();
        map.insert("cycle", 3_i32).unwrap();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"cycle":{"type":"int32","value":3}}"#);
        let back: MetaInfoMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn accessors_widen() {
        assert_eq!(MetaValue::Int32(-4).as_i64(), Some(-4));
        assert_eq!(MetaValue::Float32(1.5).as_f64(), Some(1.5));
        assert_eq!(MetaValue::from("s").as_str(), Some("s"));
        assert_eq!(MetaValue::Bool(true).as_i64(), None);
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let mut base = MetaInfoMap::new();
        base.insert("a", 1_i32).unwrap();
        let mut extra = MetaInfoMap::new();
        extra.insert("a", "one").unwrap();
        extra.insert("b", 2_i32).unwrap();
        assert!(base.merge(&extra).is_err());
        assert_eq!(base.get("a"), Some(&MetaValue::Int32(1)));
        assert!(!base.contains_key("b"));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut map = MetaInfoMap::new();
        for value in [
            MetaValue::Float64(f64::NAN),
            MetaValue::Float64(f64::INFINITY),
            MetaValue::Float32(f32::NEG_INFINITY),
        ] {
            assert!(matches!(
                map.insert("t", value),
                Err(SaveboxError::InvalidType(_))
            ));
        }
        assert!(map.is_empty());

        map.insert("a", 1.0_f64).unwrap();
        let mut extra = MetaInfoMap::new();
        extra.insert("b", 2_i32).unwrap();
        extra.0.insert("c".into(), MetaValue::Float64(f64::NAN));
        assert!(map.merge(&extra).is_err());
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn json_null_float_is_rejected_on_load() {
        let json = r#"{"dt":{"type":"float64","value":null}}"#;
        assert!(serde_json::from_str::<MetaInfoMap>(json).is_err());
        let ok: MetaInfoMap =
            serde_json::from_str(r#"{"dt":{"type":"float64","value":0.5}}"#).unwrap();
        assert_eq!(ok.get("dt").and_then(MetaValue::as_f64), Some(0.5));
    }
}
