//! A small closed value type used to move row data between the source
//! driver's dynamic rows and parameterized binds against the target,
//! without committing to a single Rust type per SQL column family.

use chrono::{NaiveDate, NaiveDateTime};

use crate::column::ColumnType;

/// A single decoded cell. `sqlx::Any` rows don't expose a single
/// "give me the textual form" getter that works uniformly across engines,
/// so the loader decodes each cell according to the source column's
/// introspected [`ColumnType`] and carries it around as one of these until
/// it's bound to the target statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Render the value the way the engine would render it as text — used
    /// only by the application-side hash fallback (spec 4.E exception for
    /// dialects without a SQL SHA-256 function), mirroring the `CAST(c AS
    /// CHAR)` the live SQL expression would otherwise perform.
    #[must_use]
    pub fn to_hash_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => i32::from(*b).to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => hex::encode(b),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Whether this value counts as "null or whitespace-only" for the
    /// purposes of datetime sanitization (spec 4.D.a).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Null) || matches!(self, Self::Text(s) if s.trim().is_empty())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether a source column value, given its declared [`ColumnType`],
    /// should be left untouched with a warning by the datetime sanitizer
    /// because it is neither a recognizable datetime-ish type.
    #[must_use]
    pub fn is_datetime_like(type_: ColumnType) -> bool {
        matches!(
            type_,
            ColumnType::Date | ColumnType::DateTime | ColumnType::DateTimeTz | ColumnType::Time
        )
    }
}
