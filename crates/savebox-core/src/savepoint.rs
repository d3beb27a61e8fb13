// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Savepoints: named checkpoints that tell repeated writes of a field apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SaveboxError;
use crate::meta_value::{MetaInfoMap, MetaValue};

/// A checkpoint identity.
///
/// Two savepoints are the same savepoint only if both the name and the full
/// annotation set are equal; `step` with `{cycle: 1}` and `step` with
/// `{cycle: 2}` are distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savepoint {
    name: String,
    #[serde(default)]
    meta_info: MetaInfoMap,
}

impl Savepoint {
    /// Creates a savepoint without annotations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta_info: MetaInfoMap::new(),
        }
    }

    /// Creates a savepoint with the given annotations.
    pub fn with_meta_info(name: impl Into<String>, meta_info: MetaInfoMap) -> Self {
        Self {
            name: name.into(),
            meta_info,
        }
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

    /// Savepoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Annotations.
    pub fn meta_info(&self) -> &MetaInfoMap {
        &self.meta_info
    }

    /// Mutable annotations.
    ///
    /// Only meaningful before registration; a registered savepoint is matched
    /// by value, so editing a copy yields a different identity.
    pub fn meta_info_mut(&mut self) -> &mut MetaInfoMap {
        &mut self.meta_info
    }
}

impl fmt::Display for Savepoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.meta_info.is_empty() {
            write!(f, " {}", self.meta_info)?;
        }
        Ok(())
    }
}
