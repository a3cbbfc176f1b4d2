//! Hierarchical resource names.
//!
//! Every admin resource is addressed by a slash-delimited path whose
//! segments alternate between a collection keyword and an identifier:
//!
//! ```text
//! projects/{project}/instances/{instance}
//! projects/{project}/instances/{instance}/databases/{database}
//! projects/{project}/instances/{instance}/backups/{backup}
//! {any of the above}/operations/{operation}
//! ```
//!
//! A parent's string form is always a strict prefix of its children.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const PROJECTS: &str = "projects";
const INSTANCES: &str = "instances";
const DATABASES: &str = "databases";
const BACKUPS: &str = "backups";
const OPERATIONS: &str = "operations";

const COLLECTIONS: [&str; 5] = [PROJECTS, INSTANCES, DATABASES, BACKUPS, OPERATIONS];

/// Splits `path` into `(keyword, id)` pairs, rejecting empty ids, unknown
/// keywords and odd segment counts.
fn pairs(path: &str) -> Result<Vec<(&str, &str)>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 {
        return Err(Error::InvalidName(format!(
            "{path}: expected collection/id pairs"
        )));
    }

    segments
        .chunks(2)
        .map(|pair| {
            let (keyword, id) = (pair[0], pair[1]);
            if !COLLECTIONS.contains(&keyword) {
                return Err(Error::InvalidName(format!(
                    "{path}: unknown collection `{keyword}`"
                )));
            }
            validate_id(path, id)?;
            Ok((keyword, id))
        })
        .collect()
}

fn validate_id(path: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidName(format!("{path}: empty identifier")));
    }
    if id.contains(|c: char| c == '/' || c.is_whitespace()) {
        return Err(Error::InvalidName(format!(
            "{path}: identifier `{id}` contains `/` or whitespace"
        )));
    }
    Ok(())
}

fn expect_shape<'a>(path: &'a str, keywords: &[&str]) -> Result<Vec<&'a str>> {
    let parsed = pairs(path)?;
    let actual: Vec<&str> = parsed.iter().map(|(k, _)| *k).collect();
    if actual != keywords {
        return Err(Error::InvalidName(format!(
            "{path}: expected {}",
            keywords
                .iter()
                .map(|k| format!("{k}/{{id}}"))
                .collect::<Vec<_>>()
                .join("/")
        )));
    }
    Ok(parsed.into_iter().map(|(_, id)| id).collect())
}

/// `projects/{project}/instances/{instance}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceName {
    project: String,
    instance: String,
}

impl InstanceName {
    pub fn new(project: impl Into<String>, instance: impl Into<String>) -> Result<Self> {
        let name = Self {
            project: project.into(),
            instance: instance.into(),
        };
        let path = name.to_string();
        validate_id(&path, &name.project)?;
        validate_id(&path, &name.instance)?;
        Ok(name)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn database(&self, database: impl Into<String>) -> Result<DatabaseName> {
        DatabaseName::new(self.clone(), database)
    }

    pub fn backup(&self, backup: impl Into<String>) -> Result<BackupName> {
        BackupName::new(self.clone(), backup)
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROJECTS}/{}/{INSTANCES}/{}", self.project, self.instance)
    }
}

impl FromStr for InstanceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ids = expect_shape(s, &[PROJECTS, INSTANCES])?;
        Ok(Self {
            project: ids[0].to_string(),
            instance: ids[1].to_string(),
        })
    }
}

/// `projects/{project}/instances/{instance}/databases/{database}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName {
    parent: InstanceName,
    database: String,
}

impl DatabaseName {
    pub fn new(parent: InstanceName, database: impl Into<String>) -> Result<Self> {
        let name = Self {
            parent,
            database: database.into(),
        };
        validate_id(&name.to_string(), &name.database)?;
        Ok(name)
    }

    pub fn parent(&self) -> &InstanceName {
        &self.parent
    }

    pub fn project(&self) -> &str {
        self.parent.project()
    }

    pub fn instance(&self) -> &str {
        self.parent.instance()
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{DATABASES}/{}", self.parent, self.database)
    }
}

impl FromStr for DatabaseName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ids = expect_shape(s, &[PROJECTS, INSTANCES, DATABASES])?;
        Ok(Self {
            parent: InstanceName {
                project: ids[0].to_string(),
                instance: ids[1].to_string(),
            },
            database: ids[2].to_string(),
        })
    }
}

/// `projects/{project}/instances/{instance}/backups/{backup}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackupName {
    parent: InstanceName,
    backup: String,
}

impl BackupName {
    pub fn new(parent: InstanceName, backup: impl Into<String>) -> Result<Self> {
        let name = Self {
            parent,
            backup: backup.into(),
        };
        validate_id(&name.to_string(), &name.backup)?;
        Ok(name)
    }

    pub fn parent(&self) -> &InstanceName {
        &self.parent
    }

    pub fn backup(&self) -> &str {
        &self.backup
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{BACKUPS}/{}", self.parent, self.backup)
    }
}

impl FromStr for BackupName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ids = expect_shape(s, &[PROJECTS, INSTANCES, BACKUPS])?;
        Ok(Self {
            parent: InstanceName {
                project: ids[0].to_string(),
                instance: ids[1].to_string(),
            },
            backup: ids[2].to_string(),
        })
    }
}

/// `{resource}/operations/{operation}` where `{resource}` is an instance,
/// database or backup path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationName {
    resource: String,
    operation: String,
}

impl OperationName {
    /// The resource the operation acts on.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{OPERATIONS}/{}", self.resource, self.operation)
    }
}

impl FromStr for OperationName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parsed = pairs(s)?;
        let Some(((last, operation), resource)) = parsed.split_last() else {
            return Err(Error::InvalidName(format!("{s}: empty name")));
        };
        if *last != OPERATIONS {
            return Err(Error::InvalidName(format!(
                "{s}: expected {{resource}}/operations/{{id}}"
            )));
        }
        let keywords: Vec<&str> = resource.iter().map(|(k, _)| *k).collect();
        match keywords.as_slice() {
            [PROJECTS, INSTANCES] | [PROJECTS, INSTANCES, DATABASES | BACKUPS] => {}
            _ => {
                return Err(Error::InvalidName(format!(
                    "{s}: operations must live under an instance, database or backup"
                )))
            }
        }
        let resource = resource
            .iter()
            .map(|(k, id)| format!("{k}/{id}"))
            .collect::<Vec<_>>()
            .join("/");
        Ok(Self {
            resource,
            operation: operation.to_string(),
        })
    }
}

macro_rules! string_conversions {
    ($($name:ty),*) => {
        $(
            impl TryFrom<String> for $name {
                type Error = Error;

                fn try_from(value: String) -> Result<Self> {
                    value.parse()
                }
            }

            impl From<$name> for String {
                fn from(value: $name) -> String {
                    value.to_string()
                }
            }
        )*
    };
}

string_conversions!(InstanceName, DatabaseName, BackupName, OperationName);

pub fn instance_path(project: &str, instance: &str) -> String {
    format!("{PROJECTS}/{project}/{INSTANCES}/{instance}")
}

pub fn database_path(project: &str, instance: &str, database: &str) -> String {
    format!("{}/{DATABASES}/{database}", instance_path(project, instance))
}

pub fn backup_path(project: &str, instance: &str, backup: &str) -> String {
    format!("{}/{BACKUPS}/{backup}", instance_path(project, instance))
}
