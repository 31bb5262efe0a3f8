//! The uniform column-definition model produced by the source introspector
//! and consumed by the schema manager.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A closed set of portable type tags, the DBAL-equivalent of Doctrine's
/// `Type` hierarchy. The introspector maps every engine-specific
/// information-schema type string onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Text,
    Integer,
    SmallInt,
    BigInt,
    Boolean,
    Decimal,
    Float,
    Date,
    DateTime,
    DateTimeTz,
    Time,
    Binary,
    Blob,
    Json,
    Guid,
}

/// One column's shape, as introspected from the source or as declared for a
/// table the schema manager is about to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub type_: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub unsigned: bool,
    pub fixed: bool,
    pub not_null: bool,
    pub default: Option<String>,
    pub autoincrement: bool,
    /// Engine-specific options (e.g. MySQL's `COLUMN_TYPE` string) that
    /// don't fit the portable fields above but are occasionally needed by a
    /// dialect when rendering DDL.
    pub platform_options: BTreeMap<String, String>,
    pub comment: Option<String>,
}

impl ColumnDefinition {
    /// A minimal, non-null, non-autoincrement column of the given type —
    /// the starting point for columns the engine itself owns (business-PK
    /// copies, metadata columns) rather than ones read off the source.
    #[must_use]
    pub fn new(name: impl Into<String>, type_: ColumnType) -> Self {
        Self {
            name: name.into(),
            type_,
            length: None,
            precision: None,
            scale: None,
            unsigned: false,
            fixed: false,
            not_null: false,
            default: None,
            autoincrement: false,
            platform_options: BTreeMap::new(),
            comment: None,
        }
    }

    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Clone this definition but force autoincrement off — used when the
    /// schema manager copies a source column onto the live or temp table,
    /// since only the syncer-owned id column may autoincrement (spec 4.C).
    #[must_use]
    pub fn without_autoincrement(&self) -> Self {
        let mut copy = self.clone();
        copy.autoincrement = false;
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoincrement_implies_not_null() {
        let col = ColumnDefinition::new("id", ColumnType::BigInt).autoincrement();
        assert!(col.not_null);
        assert!(col.autoincrement);
    }

    #[test]
    fn without_autoincrement_strips_flag_only() {
        let col = ColumnDefinition::new("id", ColumnType::BigInt)
            .autoincrement()
            .with_default("0");
        let copy = col.without_autoincrement();
        assert!(!copy.autoincrement);
        assert!(copy.not_null);
        assert_eq!(copy.default.as_deref(), Some("0"));
    }
}
