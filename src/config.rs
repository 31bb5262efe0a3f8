//! `SyncConfig`: the immutable, per-run configuration for a sync.
//!
//! There is no file or environment discovery here — that stays an external
//! collaborator's job (spec 1). `SyncConfigBuilder::build` enforces every
//! invariant spec.md lists in section 3 and rejects anything that violates
//! them with [`SyncError::Configuration`] rather than panicking.

use indexmap::IndexMap;
use sqlx::any::AnyPool;

use crate::column::ColumnType;
use crate::error::{SyncError, SyncResult};

/// The six syncer-owned metadata column names. All overridable; defaults
/// match spec.md section 3.
#[derive(Debug, Clone)]
pub struct MetadataColumnNames {
    pub id: String,
    pub content_hash: String,
    pub created_at: String,
    pub updated_at: String,
    pub created_revision_id: String,
    pub last_modified_revision_id: String,
}

impl Default for MetadataColumnNames {
    fn default() -> Self {
        Self {
            id: "_syncer_id".to_string(),
            content_hash: "_syncer_content_hash".to_string(),
            created_at: "_syncer_created_at".to_string(),
            updated_at: "_syncer_updated_at".to_string(),
            created_revision_id: "_syncer_created_revision_id".to_string(),
            last_modified_revision_id: "_syncer_last_modified_revision_id".to_string(),
        }
    }
}

/// Immutable per-run configuration. Constructed via [`SyncConfigBuilder`].
pub struct SyncConfig {
    pub source: AnyPool,
    pub target: AnyPool,
    pub source_object_name: String,
    pub live_table_name: String,
    pub temp_table_name: String,
    /// Ordered source column name -> target column name, the business
    /// primary key. At least one entry (enforced at build time).
    pub primary_key_map: IndexMap<String, String>,
    /// Ordered source -> target data column map. Superset of
    /// `primary_key_map`'s keys (enforced at build time).
    pub data_column_map: IndexMap<String, String>,
    /// Source column names used for content hashing; subset of
    /// `data_column_map`'s keys, in hashing order.
    pub hash_columns: Vec<String>,
    /// Source column names sanitized per spec 4.D.a before load.
    pub non_nullable_datetime_columns: Vec<String>,
    pub metadata_column_names: MetadataColumnNames,
    pub placeholder_datetime: String,
    pub id_column_type: ColumnType,
    pub hash_column_type: ColumnType,
    pub hash_column_length: u32,
    pub enable_deletion_logging: bool,
    pub deletion_log_table_name: String,
    pub should_create_view: bool,
    pub view_definition: String,
    pub view_dependencies: Vec<String>,
}

impl SyncConfig {
    /// Start building a config for the given source/target pools, source
    /// object name, and live table name.
    #[must_use]
    pub fn builder(
        source: AnyPool,
        target: AnyPool,
        source_object_name: impl Into<String>,
        live_table_name: impl Into<String>,
    ) -> SyncConfigBuilder {
        SyncConfigBuilder::new(source, target, source_object_name, live_table_name)
    }

    /// Reverse lookup: given a target data-column name, the source column
    /// that feeds it. Built fresh each call since config is small and
    /// constructed once per run; callers needing this in a hot loop should
    /// cache it themselves.
    #[must_use]
    pub fn source_column_for_target(&self, target_col: &str) -> Option<&str> {
        self.data_column_map
            .iter()
            .find(|(_, t)| t.as_str() == target_col)
            .map(|(s, _)| s.as_str())
    }
}

/// Builder for [`SyncConfig`]. Every `*_column`/`*_map` setter preserves
/// insertion order, matching the "ordered bidirectional mapping" design
/// note (spec 9).
pub struct SyncConfigBuilder {
    source: AnyPool,
    target: AnyPool,
    source_object_name: String,
    live_table_name: String,
    temp_table_name: Option<String>,
    primary_key_map: IndexMap<String, String>,
    data_column_map: IndexMap<String, String>,
    hash_columns: Vec<String>,
    non_nullable_datetime_columns: Vec<String>,
    metadata_column_names: MetadataColumnNames,
    placeholder_datetime: String,
    id_column_type: ColumnType,
    hash_column_type: ColumnType,
    hash_column_length: u32,
    enable_deletion_logging: bool,
    deletion_log_table_name: Option<String>,
    should_create_view: bool,
    view_definition: String,
    view_dependencies: Vec<String>,
}

impl SyncConfigBuilder {
    #[must_use]
    pub fn new(
        source: AnyPool,
        target: AnyPool,
        source_object_name: impl Into<String>,
        live_table_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            source_object_name: source_object_name.into(),
            live_table_name: live_table_name.into(),
            temp_table_name: None,
            primary_key_map: IndexMap::new(),
            data_column_map: IndexMap::new(),
            hash_columns: Vec::new(),
            non_nullable_datetime_columns: Vec::new(),
            metadata_column_names: MetadataColumnNames::default(),
            placeholder_datetime: "2222-02-22 00:00:00".to_string(),
            id_column_type: ColumnType::BigInt,
            hash_column_type: ColumnType::String,
            hash_column_length: 64,
            enable_deletion_logging: false,
            deletion_log_table_name: None,
            should_create_view: false,
            view_definition: String::new(),
            view_dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn temp_table_name(mut self, name: impl Into<String>) -> Self {
        self.temp_table_name = Some(name.into());
        self
    }

    /// Add one business-PK column mapping. Also implicitly participates in
    /// `data_column_map` per spec's invariant; callers must still add it to
    /// the data column map explicitly (kept separate so ordering within
    /// each map is under the caller's control).
    #[must_use]
    pub fn primary_key_column(
        mut self,
        source_col: impl Into<String>,
        target_col: impl Into<String>,
    ) -> Self {
        self.primary_key_map.insert(source_col.into(), target_col.into());
        self
    }

    #[must_use]
    pub fn data_column(
        mut self,
        source_col: impl Into<String>,
        target_col: impl Into<String>,
    ) -> Self {
        self.data_column_map.insert(source_col.into(), target_col.into());
        self
    }

    #[must_use]
    pub fn hash_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        self.hash_columns = columns.into_iter().collect();
        self
    }

    #[must_use]
    pub fn non_nullable_datetime_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        self.non_nullable_datetime_columns = columns.into_iter().collect();
        self
    }

    #[must_use]
    pub fn metadata_column_names(mut self, names: MetadataColumnNames) -> Self {
        self.metadata_column_names = names;
        self
    }

    #[must_use]
    pub fn placeholder_datetime(mut self, value: impl Into<String>) -> Self {
        self.placeholder_datetime = value.into();
        self
    }

    #[must_use]
    pub fn enable_deletion_logging(mut self, enabled: bool) -> Self {
        self.enable_deletion_logging = enabled;
        self
    }

    #[must_use]
    pub fn deletion_log_table_name(mut self, name: impl Into<String>) -> Self {
        self.deletion_log_table_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn view(
        mut self,
        definition: impl Into<String>,
        dependencies: impl IntoIterator<Item = String>,
    ) -> Self {
        self.should_create_view = true;
        self.view_definition = definition.into();
        self.view_dependencies = dependencies.into_iter().collect();
        self
    }

    /// Validate every invariant from spec.md section 3 and produce the
    /// final, immutable [`SyncConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if any invariant is violated.
    pub fn build(self) -> SyncResult<SyncConfig> {
        if self.primary_key_map.is_empty() {
            return Err(SyncError::configuration(
                "primary_key_map must have at least one entry",
            ));
        }
        for key in self.primary_key_map.keys() {
            if !self.data_column_map.contains_key(key) {
                return Err(SyncError::configuration(format!(
                    "primary key column `{key}` is missing from data_column_map"
                )));
            }
        }
        if self.hash_columns.is_empty() {
            return Err(SyncError::configuration(
                "hash_columns must be a non-empty subset of data_column_map's keys",
            ));
        }
        for col in &self.hash_columns {
            if !self.data_column_map.contains_key(col) {
                return Err(SyncError::configuration(format!(
                    "hash column `{col}` is not present in data_column_map"
                )));
            }
        }
        for col in &self.non_nullable_datetime_columns {
            if !self.data_column_map.contains_key(col) {
                return Err(SyncError::configuration(format!(
                    "non-nullable datetime column `{col}` is not present in data_column_map"
                )));
            }
        }
        if self.should_create_view
            && (self.view_definition.trim().is_empty() || self.source_object_name.trim().is_empty())
        {
            return Err(SyncError::configuration(
                "should_create_view requires a non-empty view_definition and source object name",
            ));
        }
        if self.enable_deletion_logging
            && self.deletion_log_table_name.is_none()
            && self.live_table_name.trim().is_empty()
        {
            return Err(SyncError::configuration(
                "enable_deletion_logging requires an explicit deletion_log_table_name or a non-empty live_table_name to default from",
            ));
        }

        let temp_table_name = self
            .temp_table_name
            .unwrap_or_else(|| format!("{}_temp", self.live_table_name));
        let deletion_log_table_name = self
            .deletion_log_table_name
            .unwrap_or_else(|| format!("{}_deleted_log", self.live_table_name));

        Ok(SyncConfig {
            source: self.source,
            target: self.target,
            source_object_name: self.source_object_name,
            live_table_name: self.live_table_name,
            temp_table_name,
            primary_key_map: self.primary_key_map,
            data_column_map: self.data_column_map,
            hash_columns: self.hash_columns,
            non_nullable_datetime_columns: self.non_nullable_datetime_columns,
            metadata_column_names: self.metadata_column_names,
            placeholder_datetime: self.placeholder_datetime,
            id_column_type: self.id_column_type,
            hash_column_type: self.hash_column_type,
            hash_column_length: self.hash_column_length,
            enable_deletion_logging: self.enable_deletion_logging,
            deletion_log_table_name,
            should_create_view: self.should_create_view,
            view_definition: self.view_definition,
            view_dependencies: self.view_dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPool::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn rejects_empty_primary_key_map() {
        let pool = memory_pool().await;
        let err = SyncConfig::builder(pool.clone(), pool, "widgets", "widgets_live")
            .data_column("id", "id")
            .hash_columns(["id".to_string()])
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[tokio::test]
    async fn rejects_hash_column_outside_data_map() {
        let pool = memory_pool().await;
        let err = SyncConfig::builder(pool.clone(), pool, "widgets", "widgets_live")
            .primary_key_column("id", "id")
            .data_column("id", "id")
            .hash_columns(["nonexistent".to_string()])
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[tokio::test]
    async fn defaults_temp_and_deletion_log_table_names() {
        let pool = memory_pool().await;
        let config = SyncConfig::builder(pool.clone(), pool, "widgets", "widgets_live")
            .primary_key_column("id", "id")
            .data_column("id", "id")
            .data_column("name", "name")
            .hash_columns(["name".to_string()])
            .enable_deletion_logging(true)
            .build()
            .unwrap();
        assert_eq!(config.temp_table_name, "widgets_live_temp");
        assert_eq!(config.deletion_log_table_name, "widgets_live_deleted_log");
    }

    #[tokio::test]
    async fn view_requires_definition_and_source_name() {
        let pool = memory_pool().await;
        let err = SyncConfig::builder(pool.clone(), pool, "widgets", "widgets_live")
            .primary_key_column("id", "id")
            .data_column("id", "id")
            .hash_columns(["id".to_string()])
            .view(String::new(), Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
