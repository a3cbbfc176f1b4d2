use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::name::{BackupName, DatabaseName, InstanceName};
use crate::operation::{Operation, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseState {
    #[default]
    StateUnspecified,
    Creating,
    Ready,
    /// Restored and readable, but a background optimization is still running.
    ReadyOptimizing,
}

impl DatabaseState {
    pub fn is_ready(self) -> bool {
        matches!(self, DatabaseState::Ready | DatabaseState::ReadyOptimizing)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupState {
    #[default]
    StateUnspecified,
    Creating,
    Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseDialect {
    #[default]
    DatabaseDialectUnspecified,
    GoogleStandardSql,
    Postgresql,
}

/// How data at rest is encrypted. Create and restore requests accept a
/// subset each; `EncryptionInfo` reports the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionType {
    #[default]
    #[serde(alias = "TYPE_UNSPECIFIED")]
    EncryptionTypeUnspecified,
    /// Backups only: reuse the source database's encryption.
    UseDatabaseEncryption,
    /// Restores only: the instance default, else the backup's encryption.
    UseConfigDefaultOrBackupEncryption,
    GoogleDefaultEncryption,
    CustomerManagedEncryption,
}

/// Encryption settings of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
    /// Multi-region instances take one key per region instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kms_key_names: Vec<String>,
}

impl EncryptionConfig {
    pub fn kms_key(kms_key_name: impl Into<String>) -> Self {
        Self {
            kms_key_name: Some(kms_key_name.into()),
            kms_key_names: Vec::new(),
        }
    }
}

/// Encryption requested when creating, copying or restoring from a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEncryptionConfig {
    pub encryption_type: EncryptionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_name: Option<String>,
}

impl BackupEncryptionConfig {
    pub fn customer_managed(kms_key_name: impl Into<String>) -> Self {
        Self {
            encryption_type: EncryptionType::CustomerManagedEncryption,
            kms_key_name: Some(kms_key_name.into()),
        }
    }

    /// A key name is required for customer-managed encryption and refused
    /// for every other type.
    pub fn validate(&self) -> Result<()> {
        match (self.encryption_type, &self.kms_key_name) {
            (EncryptionType::EncryptionTypeUnspecified, _) => Err(Error::InvalidArgument(
                "encryption type must be set".to_string(),
            )),
            (EncryptionType::CustomerManagedEncryption, None) => Err(Error::InvalidArgument(
                "customer-managed encryption needs a KMS key name".to_string(),
            )),
            (EncryptionType::CustomerManagedEncryption, Some(_)) | (_, None) => Ok(()),
            (encryption_type, Some(_)) => Err(Error::InvalidArgument(format!(
                "a KMS key name is only valid with customer-managed encryption, not {encryption_type:?}"
            ))),
        }
    }

    /// `encryptionConfig.*` query parameters, as `createBackup` takes them.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Ok(serde_json::Value::String(kind)) = serde_json::to_value(self.encryption_type) {
            query.push(("encryptionConfig.encryptionType", kind));
        }
        if let Some(key) = &self.kms_key_name {
            query.push(("encryptionConfig.kmsKeyName", key.clone()));
        }
        query
    }
}

/// Output only: the encryption actually applied to a database or backup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    #[serde(default)]
    pub encryption_type: EncryptionType,
    /// Set when the key could not be accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_version: Option<String>,
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// int64 fields travel as JSON strings; numbers are accepted too.
mod int64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Num(i64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Str(s) => s.parse().map_err(de::Error::custom),
            Repr::Num(n) => Ok(n),
        }
    }
}

/// Provenance of a backup a database was restored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub backup: BackupName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    pub source_database: DatabaseName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestoreSource {
    Backup(BackupInfo),
}

/// Set on databases created by a restore. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRestoreInfo", into = "WireRestoreInfo")]
pub struct RestoreInfo {
    pub source: RestoreSource,
}

impl RestoreInfo {
    pub fn backup_info(&self) -> Option<&BackupInfo> {
        match &self.source {
            RestoreSource::Backup(info) => Some(info),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRestoreInfo {
    #[serde(default)]
    source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_info: Option<BackupInfo>,
}

impl TryFrom<WireRestoreInfo> for RestoreInfo {
    type Error = String;

    fn try_from(wire: WireRestoreInfo) -> std::result::Result<Self, String> {
        match (wire.source_type.as_str(), wire.backup_info) {
            ("BACKUP", Some(info)) => Ok(Self {
                source: RestoreSource::Backup(info),
            }),
            (source_type, _) => Err(format!(
                "restore info with source type `{source_type}` has no matching source"
            )),
        }
    }
}

impl From<RestoreInfo> for WireRestoreInfo {
    fn from(info: RestoreInfo) -> Self {
        match info.source {
            RestoreSource::Backup(backup_info) => Self {
                source_type: "BACKUP".to_string(),
                backup_info: Some(backup_info),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: DatabaseName,
    #[serde(default)]
    pub state: DatabaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_info: Option<RestoreInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_retention_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_version_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_leader: Option<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub database_dialect: DatabaseDialect,
    #[serde(default, skip_serializing_if = "is_default")]
    pub enable_drop_protection: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<EncryptionConfig>,
    /// One entry per key version in use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encryption_info: Vec<EncryptionInfo>,
}

impl Database {
    pub fn new(name: DatabaseName) -> Self {
        Self {
            name,
            state: DatabaseState::default(),
            create_time: None,
            restore_info: None,
            version_retention_period: None,
            earliest_version_time: None,
            default_leader: None,
            database_dialect: DatabaseDialect::default(),
            enable_drop_protection: false,
            encryption_config: None,
            encryption_info: Vec::new(),
        }
    }

    /// Reasons this record breaks the database invariants. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.state == DatabaseState::ReadyOptimizing && self.restore_info.is_none() {
            reasons.push(format!(
                "{}: READY_OPTIMIZING without restore info",
                self.name
            ));
        }
        if let (Some(created), Some(earliest)) = (self.create_time, self.earliest_version_time) {
            if earliest < created {
                reasons.push(format!(
                    "{}: earliest version time precedes creation",
                    self.name
                ));
            }
        }
        reasons
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Output only; ignored on create, where the id travels separately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<BackupName>,
    /// Source database, captured by value when the backup was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseName>,
    /// Snapshot instant. Defaults to the creation time when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, with = "int64", skip_serializing_if = "is_default")]
    pub size_bytes: i64,
    #[serde(default, skip_serializing_if = "is_default")]
    pub state: BackupState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referencing_databases: Vec<DatabaseName>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub database_dialect: DatabaseDialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_info: Option<EncryptionInfo>,
}

impl Backup {
    /// The request body for a new backup of `database`.
    pub fn of(database: DatabaseName, expire_time: DateTime<Utc>) -> Self {
        Self {
            database: Some(database),
            expire_time: Some(expire_time),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let label = self
            .name
            .as_ref()
            .map_or_else(|| "backup".to_string(), ToString::to_string);
        let mut reasons = Vec::new();

        if self.state == BackupState::Creating && !self.referencing_databases.is_empty() {
            reasons.push(format!(
                "{label}: still creating but referenced by {} database(s)",
                self.referencing_databases.len()
            ));
        }
        if let (Some(created), Some(expires)) = (self.create_time, self.expire_time) {
            if expires <= created {
                reasons.push(format!("{label}: expire time is not after create time"));
            }
        }
        if let (Some(created), Some(version)) = (self.create_time, self.version_time) {
            if version > created {
                reasons.push(format!("{label}: version time is after create time"));
            }
        }
        if self.size_bytes < 0 {
            reasons.push(format!("{label}: negative size"));
        }
        reasons
    }

    /// Why the service would refuse to delete this backup, if it would.
    pub fn deletion_blocker(&self) -> Option<String> {
        if self.state == BackupState::Creating {
            return Some("backup is still being created".to_string());
        }
        if !self.referencing_databases.is_empty() {
            let names = self
                .referencing_databases
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Some(format!("backup is referenced by {names}"));
        }
        None
    }
}

/// Builds the `CREATE DATABASE` statement for `database_id` in `dialect`.
pub fn create_statement_for(dialect: DatabaseDialect, database_id: &str) -> String {
    match dialect {
        DatabaseDialect::Postgresql => format!("CREATE DATABASE \"{database_id}\""),
        _ => format!("CREATE DATABASE `{database_id}`"),
    }
}

/// Checks a `CREATE DATABASE` statement for `dialect` and returns the
/// database id it names.
pub fn parse_create_statement(statement: &str, dialect: DatabaseDialect) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidArgument(format!("{reason}: {statement}"));

    let trimmed = statement.trim().trim_end_matches(';').trim_end();
    let mut words = trimmed.splitn(3, char::is_whitespace);
    let (Some(create), Some(database), Some(rest)) = (words.next(), words.next(), words.next())
    else {
        return Err(invalid("expected CREATE DATABASE <id>"));
    };
    if !create.eq_ignore_ascii_case("CREATE") || !database.eq_ignore_ascii_case("DATABASE") {
        return Err(invalid("expected CREATE DATABASE <id>"));
    }

    let quote = match dialect {
        DatabaseDialect::Postgresql => '"',
        _ => '`',
    };
    let rest = rest.trim();
    let id = match rest.strip_prefix(quote) {
        Some(inner) => inner
            .strip_suffix(quote)
            .ok_or_else(|| invalid("unterminated quoted identifier"))?,
        None => rest,
    };
    validate_database_id(id).map_err(|reason| invalid(&reason))?;
    Ok(id.to_string())
}

/// Database ids are 2-30 characters of `[a-z0-9_-]`, start with a letter
/// and do not end with `_` or `-`.
pub fn validate_database_id(id: &str) -> std::result::Result<(), String> {
    let len = id.chars().count();
    if !(2..=30).contains(&len) {
        return Err(format!("database id `{id}` must be 2-30 characters"));
    }
    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(format!("database id `{id}` must start with a lowercase letter"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(format!("database id `{id}` contains invalid characters"));
    }
    if id.ends_with(['_', '-']) {
        return Err(format!("database id `{id}` must not end with `_` or `-`"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    #[serde(skip)]
    pub parent: InstanceName,
    pub create_statement: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_statements: Vec<String>,
    #[serde(skip_serializing_if = "is_default")]
    pub database_dialect: DatabaseDialect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<EncryptionConfig>,
}

impl CreateDatabaseRequest {
    pub fn new(parent: InstanceName, database_id: &str, dialect: DatabaseDialect) -> Self {
        Self {
            parent,
            create_statement: create_statement_for(dialect, database_id),
            extra_statements: Vec::new(),
            database_dialect: dialect,
            encryption_config: None,
        }
    }

    pub fn with_extra_statements(mut self, statements: Vec<String>) -> Self {
        self.extra_statements = statements;
        self
    }

    pub fn with_encryption(mut self, config: EncryptionConfig) -> Self {
        self.encryption_config = Some(config);
        self
    }

    /// The name the new database will have, after checking the statement.
    pub fn database_name(&self) -> Result<DatabaseName> {
        let id = parse_create_statement(&self.create_statement, self.database_dialect)?;
        self.parent.database(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatabaseDdlRequest {
    #[serde(skip)]
    pub database: DatabaseName,
    pub statements: Vec<String>,
    /// Client-chosen id; a retry carrying the same id attaches to the
    /// existing operation instead of starting a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateBackupRequest {
    pub parent: InstanceName,
    pub backup_id: String,
    pub backup: Backup,
    /// Sent as query parameters next to `backupId`.
    pub encryption_config: Option<BackupEncryptionConfig>,
}

impl CreateBackupRequest {
    pub fn backup_name(&self) -> Result<BackupName> {
        self.parent.backup(self.backup_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBackupRequest {
    #[serde(skip)]
    pub parent: InstanceName,
    pub backup_id: String,
    pub source_backup: BackupName,
    pub expire_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<BackupEncryptionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDatabaseRequest {
    #[serde(skip)]
    pub parent: InstanceName,
    pub database_id: String,
    pub backup: BackupName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<BackupEncryptionConfig>,
}

/// Filter and page window for list calls. An absent token asks for the
/// first page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub filter: Option<String>,
    pub page_size: Option<i32>,
    pub page_token: Option<String>,
}

impl ListOptions {
    pub fn filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(filter) = &self.filter {
            query.push(("filter", filter.clone()));
        }
        if let Some(size) = self.page_size {
            query.push(("pageSize", size.to_string()));
        }
        if let Some(token) = self.page_token.as_ref().filter(|t| !t.is_empty()) {
            query.push(("pageToken", token.clone()));
        }
        query
    }
}

/// A single page of a list call.
pub trait Page {
    type Item;

    /// `None` on the last page.
    fn next_page_token(&self) -> Option<&str>;

    fn into_items(self) -> Vec<Self::Item>;
}

macro_rules! page {
    ($name:ident, $field:ident, $item:ty) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(default)]
            pub $field: Vec<$item>,
            #[serde(default, skip_serializing_if = "String::is_empty")]
            pub next_page_token: String,
        }

        impl Page for $name {
            type Item = $item;

            fn next_page_token(&self) -> Option<&str> {
                Some(self.next_page_token.as_str()).filter(|t| !t.is_empty())
            }

            fn into_items(self) -> Vec<$item> {
                self.$field
            }
        }
    };
}

page!(ListDatabasesResponse, databases, Database);
page!(ListBackupsResponse, backups, Backup);
page!(ListOperationsResponse, operations, Operation);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDatabaseDdlResponse {
    #[serde(default)]
    pub statements: Vec<String>,
}
