//! Long-running operation envelope and its typed payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::BackupInfo;

/// Canonical status codes shared by the RPC and REST surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

static CODES: [(Code, &str); 17] = [
    (Code::Ok, "OK"),
    (Code::Cancelled, "CANCELLED"),
    (Code::Unknown, "UNKNOWN"),
    (Code::InvalidArgument, "INVALID_ARGUMENT"),
    (Code::DeadlineExceeded, "DEADLINE_EXCEEDED"),
    (Code::NotFound, "NOT_FOUND"),
    (Code::AlreadyExists, "ALREADY_EXISTS"),
    (Code::PermissionDenied, "PERMISSION_DENIED"),
    (Code::ResourceExhausted, "RESOURCE_EXHAUSTED"),
    (Code::FailedPrecondition, "FAILED_PRECONDITION"),
    (Code::Aborted, "ABORTED"),
    (Code::OutOfRange, "OUT_OF_RANGE"),
    (Code::Unimplemented, "UNIMPLEMENTED"),
    (Code::Internal, "INTERNAL"),
    (Code::Unavailable, "UNAVAILABLE"),
    (Code::DataLoss, "DATA_LOSS"),
    (Code::Unauthenticated, "UNAUTHENTICATED"),
];

impl Code {
    /// Numeric value as carried in `google.rpc.Status.code`.
    pub fn value(self) -> i32 {
        CODES
            .iter()
            .position(|(c, _)| *c == self)
            .map_or(2, |i| i as i32)
    }

    pub fn from_value(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|i| CODES.get(i))
            .map_or(Code::Unknown, |(c, _)| *c)
    }

    /// Parses the `status` string of a JSON error body, e.g. `NOT_FOUND`.
    pub fn from_name(name: &str) -> Option<Self> {
        CODES.iter().find(|(_, n)| *n == name).map(|(c, _)| *c)
    }

    /// Best-effort mapping used when an error body carries no status string.
    pub fn from_http(status: u16) -> Self {
        match status {
            400 => Code::InvalidArgument,
            401 => Code::Unauthenticated,
            403 => Code::PermissionDenied,
            404 => Code::NotFound,
            409 => Code::Aborted,
            412 => Code::FailedPrecondition,
            429 => Code::ResourceExhausted,
            499 => Code::Cancelled,
            501 => Code::Unimplemented,
            503 => Code::Unavailable,
            504 => Code::DeadlineExceeded,
            s if (500..600).contains(&s) => Code::Internal,
            _ => Code::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        CODES
            .iter()
            .find(|(c, _)| *c == self)
            .map_or("UNKNOWN", |(_, n)| *n)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `google.rpc.Status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Value>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code: code.value(),
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn code(&self) -> Code {
        Code::from_value(self.code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

/// Terminal outcome of an operation. Exactly one is present once done.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Error(Status),
    Response(Value),
}

/// A long-running administrative action.
///
/// The wire form carries a `done` flag next to optional `error` and
/// `response` fields. Here the flag is derived from `result`, so a pending
/// operation cannot hold a result and a finished one cannot lack one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireOperation", into = "WireOperation")]
pub struct Operation {
    pub name: String,
    pub metadata: Option<Value>,
    pub result: Option<OperationResult>,
}

#[derive(Serialize, Deserialize)]
struct WireOperation {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    #[serde(default)]
    done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

impl TryFrom<WireOperation> for Operation {
    type Error = Error;

    fn try_from(wire: WireOperation) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedOperation {
            name: wire.name.clone(),
            reason: reason.to_string(),
        };
        let result = match (wire.done, wire.error.clone(), wire.response.clone()) {
            (false, None, None) => None,
            (false, _, _) => return Err(malformed("result present before done")),
            (true, Some(status), None) => Some(OperationResult::Error(status)),
            (true, None, Some(response)) => Some(OperationResult::Response(response)),
            (true, Some(_), Some(_)) => return Err(malformed("both error and response set")),
            (true, None, None) => return Err(malformed("done without error or response")),
        };
        Ok(Self {
            name: wire.name,
            metadata: wire.metadata,
            result,
        })
    }
}

impl From<Operation> for WireOperation {
    fn from(op: Operation) -> Self {
        let done = op.result.is_some();
        let (error, response) = match op.result {
            Some(OperationResult::Error(status)) => (Some(status), None),
            Some(OperationResult::Response(value)) => (None, Some(value)),
            None => (None, None),
        };
        Self {
            name: op.name,
            metadata: op.metadata,
            done,
            error,
            response,
        }
    }
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            result: None,
        }
    }

    pub fn succeeded(name: impl Into<String>, response: Value) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            result: Some(OperationResult::Response(response)),
        }
    }

    pub fn failed(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            result: Some(OperationResult::Error(status)),
        }
    }

    pub fn with_metadata(mut self, metadata: &OperationMetadata) -> Result<Self> {
        self.metadata = Some(serde_json::to_value(metadata)?);
        Ok(self)
    }

    pub fn done(&self) -> bool {
        self.result.is_some()
    }

    pub fn error(&self) -> Option<&Status> {
        match &self.result {
            Some(OperationResult::Error(status)) => Some(status),
            _ => None,
        }
    }

    /// The trailing id of the operation name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Decodes the metadata payload by its `@type`.
    pub fn typed_metadata(&self) -> Result<Option<OperationMetadata>> {
        self.metadata
            .as_ref()
            .map(|m| serde_json::from_value(m.clone()))
            .transpose()
            .map_err(Error::from)
    }

    /// `None` while pending, the decoded response once successful, and
    /// `Error::OperationFailed` when the operation finished with an error.
    pub fn response_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.result {
            None => Ok(None),
            Some(OperationResult::Error(status)) => Err(Error::OperationFailed {
                name: self.name.clone(),
                status: status.clone(),
            }),
            Some(OperationResult::Response(value)) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    #[serde(default)]
    pub progress_percent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseMetadata {
    #[serde(default)]
    pub database: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatabaseDdlMetadata {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub statements: Vec<String>,
    /// One entry per statement that has been applied.
    #[serde(default)]
    pub commit_timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub throttled: bool,
    #[serde(default)]
    pub progress: Vec<OperationProgress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDatabaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OperationProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OperationProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyBackupMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_backup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OperationProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDatabaseMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_info: Option<BackupInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OperationProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<DateTime<Utc>>,
    /// Background optimization started once the restore finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_database_operation_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRestoredDatabaseMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<OperationProgress>,
}

/// Metadata payloads of the database admin operations, keyed by `@type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum OperationMetadata {
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.CreateDatabaseMetadata")]
    CreateDatabase(CreateDatabaseMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.UpdateDatabaseDdlMetadata")]
    UpdateDatabaseDdl(UpdateDatabaseDdlMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.UpdateDatabaseMetadata")]
    UpdateDatabase(UpdateDatabaseMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata")]
    CreateBackup(CreateBackupMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.CopyBackupMetadata")]
    CopyBackup(CopyBackupMetadata),
    #[serde(rename = "type.googleapis.com/google.spanner.admin.database.v1.RestoreDatabaseMetadata")]
    RestoreDatabase(RestoreDatabaseMetadata),
    #[serde(
        rename = "type.googleapis.com/google.spanner.admin.database.v1.OptimizeRestoredDatabaseMetadata"
    )]
    OptimizeRestoredDatabase(OptimizeRestoredDatabaseMetadata),
}

impl OperationMetadata {
    /// Overall progress. For DDL batches this is the first statement still
    /// running, or the last one once all have committed.
    pub fn progress(&self) -> Option<&OperationProgress> {
        match self {
            OperationMetadata::CreateDatabase(_) => None,
            OperationMetadata::UpdateDatabaseDdl(m) => m
                .progress
                .iter()
                .find(|p| p.progress_percent < 100)
                .or_else(|| m.progress.last()),
            OperationMetadata::UpdateDatabase(m) => m.progress.as_ref(),
            OperationMetadata::CreateBackup(m) => m.progress.as_ref(),
            OperationMetadata::CopyBackup(m) => m.progress.as_ref(),
            OperationMetadata::RestoreDatabase(m) => m.progress.as_ref(),
            OperationMetadata::OptimizeRestoredDatabase(m) => m.progress.as_ref(),
        }
    }
}
