use std::future::Future;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use crate::config::{ClientConfig, Credentials};
use crate::error::{Error, Result};
use crate::iam::{Policy, TestIamPermissionsResponse};
use crate::name::{BackupName, DatabaseName, InstanceName, OperationName};
use crate::operation::{Code, Operation};
use crate::types::{
    validate_database_id, Backup, CopyBackupRequest, CreateBackupRequest, CreateDatabaseRequest,
    Database, GetDatabaseDdlResponse, ListBackupsResponse, ListDatabasesResponse,
    ListOperationsResponse, ListOptions, Page, RestoreDatabaseRequest, UpdateDatabaseDdlRequest,
};

/// The database admin surface. Every method issues exactly one request;
/// mutating calls that run long return an [`Operation`] to be awaited with
/// the [`OperationPoller`](crate::poller::OperationPoller).
#[mockall::automock]
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn list_databases(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListDatabasesResponse>;
    async fn create_database(&self, request: &CreateDatabaseRequest) -> Result<Operation>;
    async fn get_database(&self, name: &DatabaseName) -> Result<Database>;
    /// Updates the fields of `database` named in `update_mask`
    /// (comma-separated camelCase paths, e.g. `enableDropProtection`).
    async fn update_database(&self, database: &Database, update_mask: &str) -> Result<Operation>;
    async fn update_database_ddl(&self, request: &UpdateDatabaseDdlRequest) -> Result<Operation>;
    /// Irreversible. Fails with `NOT_FOUND` if the database is already gone.
    async fn drop_database(&self, name: &DatabaseName) -> Result<()>;
    async fn get_database_ddl(&self, name: &DatabaseName) -> Result<Vec<String>>;

    async fn create_backup(&self, request: &CreateBackupRequest) -> Result<Operation>;
    async fn copy_backup(&self, request: &CopyBackupRequest) -> Result<Operation>;
    async fn get_backup(&self, name: &BackupName) -> Result<Backup>;
    async fn update_backup(&self, backup: &Backup, update_mask: &str) -> Result<Backup>;
    async fn delete_backup(&self, name: &BackupName) -> Result<()>;
    async fn list_backups(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListBackupsResponse>;
    async fn restore_database(&self, request: &RestoreDatabaseRequest) -> Result<Operation>;

    async fn list_database_operations(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListOperationsResponse>;
    async fn list_backup_operations(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListOperationsResponse>;
    async fn get_operation(&self, name: &str) -> Result<Operation>;
    /// Best effort: the operation may still complete before the
    /// cancellation is observed.
    async fn cancel_operation(&self, name: &str) -> Result<()>;

    async fn get_iam_policy(&self, resource: &str) -> Result<Policy>;
    async fn set_iam_policy(&self, resource: &str, policy: &Policy) -> Result<Policy>;
    async fn test_iam_permissions(&self, resource: &str, permissions: &[String])
        -> Result<Vec<String>>;
}

/// Follows `nextPageToken` from the page `options` points at until the
/// last page, concatenating the items.
pub async fn collect_pages<P, F, Fut>(options: ListOptions, mut fetch: F) -> Result<Vec<P::Item>>
where
    P: Page,
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    let mut options = options;
    let mut items = Vec::new();
    loop {
        let page = fetch(options.clone()).await?;
        let next = page.next_page_token().map(str::to_string);
        items.extend(page.into_items());
        match next {
            Some(token) if options.page_token.as_deref() != Some(token.as_str()) => {
                options.page_token = Some(token);
            }
            Some(token) => {
                warn!(token = %token, "server repeated a page token, stopping");
                return Ok(items);
            }
            None => return Ok(items),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// REST implementation of [`DatabaseAdmin`].
pub struct AdminClient {
    client: Client,
    config: ClientConfig,
}

impl AdminClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn access_token(&self) -> Result<Option<String>> {
        match &self.config.credentials {
            Credentials::None => Ok(None),
            Credentials::Token(token) => Ok(Some(token.clone())),
            Credentials::Gcloud => {
                let output = AsyncCommand::new("gcloud")
                    .args(["auth", "print-access-token"])
                    .output()
                    .await
                    .map_err(|e| Error::Auth(format!("could not run gcloud: {e}")))?;

                if !output.status.success() {
                    return Err(Error::Auth(
                        String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    ));
                }

                String::from_utf8(output.stdout)
                    .map(|token| Some(token.trim().to_string()))
                    .map_err(|e| Error::Auth(format!("token is not UTF-8: {e}")))
            }
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}/{}", self.config.base_url(), path);
        debug!(%method, %url, "admin request");
        let builder = self.client.request(method, url);
        Ok(match self.access_token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// For calls answering with `google.protobuf.Empty`; the body is ignored.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let builder = self.request(Method::GET, path).await?.query(query);
        self.send(builder).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<T> {
        let builder = self.request(Method::POST, path).await?.query(query).json(body);
        self.send(builder).await
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<T> {
        let builder = self.request(Method::PATCH, path).await?.query(query).json(body);
        self.send(builder).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let builder = self.request(Method::DELETE, path).await?;
        self.send_empty(builder).await
    }
}

async fn api_error(response: Response) -> Error {
    let http = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => Error::Api {
            code: envelope
                .error
                .status
                .as_deref()
                .and_then(Code::from_name)
                .unwrap_or_else(|| Code::from_http(http.as_u16())),
            message: envelope.error.message,
        },
        Err(_) => Error::Api {
            code: Code::from_http(http.as_u16()),
            message: if text.is_empty() {
                http.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            },
        },
    }
}

fn operation_path(name: &str) -> Result<String> {
    name.parse::<OperationName>().map(|n| n.to_string())
}

/// IAM calls accept databases and backups.
fn iam_resource(resource: &str) -> Result<String> {
    if resource.parse::<DatabaseName>().is_ok() || resource.parse::<BackupName>().is_ok() {
        Ok(resource.to_string())
    } else {
        Err(Error::InvalidName(format!(
            "{resource}: IAM calls take a database or backup name"
        )))
    }
}

#[async_trait]
impl DatabaseAdmin for AdminClient {
    async fn list_databases(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListDatabasesResponse> {
        self.get(&format!("{parent}/databases"), &options.query()).await
    }

    async fn create_database(&self, request: &CreateDatabaseRequest) -> Result<Operation> {
        let name = request.database_name()?;
        debug!(database = %name, "creating database");
        self.post(
            &format!("{}/databases", request.parent),
            &[],
            &serde_json::to_value(request)?,
        )
        .await
    }

    async fn get_database(&self, name: &DatabaseName) -> Result<Database> {
        self.get(&name.to_string(), &[]).await
    }

    async fn update_database(&self, database: &Database, update_mask: &str) -> Result<Operation> {
        if update_mask.is_empty() {
            return Err(Error::InvalidArgument("update mask is empty".to_string()));
        }
        self.patch(
            &database.name.to_string(),
            &[("updateMask", update_mask.to_string())],
            &serde_json::to_value(database)?,
        )
        .await
    }

    async fn update_database_ddl(&self, request: &UpdateDatabaseDdlRequest) -> Result<Operation> {
        if request.statements.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one DDL statement is required".to_string(),
            ));
        }
        self.patch(
            &format!("{}/ddl", request.database),
            &[],
            &serde_json::to_value(request)?,
        )
        .await
    }

    async fn drop_database(&self, name: &DatabaseName) -> Result<()> {
        self.delete(&name.to_string()).await
    }

    async fn get_database_ddl(&self, name: &DatabaseName) -> Result<Vec<String>> {
        let response: GetDatabaseDdlResponse = self.get(&format!("{name}/ddl"), &[]).await?;
        Ok(response.statements)
    }

    async fn create_backup(&self, request: &CreateBackupRequest) -> Result<Operation> {
        request.backup_name()?;
        if request.backup.database.is_none() {
            return Err(Error::InvalidArgument(
                "backup.database is required".to_string(),
            ));
        }
        if request.backup.expire_time.is_none() {
            return Err(Error::InvalidArgument(
                "backup.expire_time is required".to_string(),
            ));
        }
        let mut query = vec![("backupId", request.backup_id.clone())];
        if let Some(encryption) = &request.encryption_config {
            encryption.validate()?;
            query.extend(encryption.query());
        }
        self.post(
            &format!("{}/backups", request.parent),
            &query,
            &serde_json::to_value(&request.backup)?,
        )
        .await
    }

    async fn copy_backup(&self, request: &CopyBackupRequest) -> Result<Operation> {
        request.parent.backup(request.backup_id.clone())?;
        if let Some(encryption) = &request.encryption_config {
            encryption.validate()?;
        }
        self.post(
            &format!("{}/backups:copy", request.parent),
            &[],
            &serde_json::to_value(request)?,
        )
        .await
    }

    async fn get_backup(&self, name: &BackupName) -> Result<Backup> {
        self.get(&name.to_string(), &[]).await
    }

    async fn update_backup(&self, backup: &Backup, update_mask: &str) -> Result<Backup> {
        let Some(name) = &backup.name else {
            return Err(Error::InvalidArgument("backup.name is required".to_string()));
        };
        self.patch(
            &name.to_string(),
            &[("updateMask", update_mask.to_string())],
            &serde_json::to_value(backup)?,
        )
        .await
    }

    async fn delete_backup(&self, name: &BackupName) -> Result<()> {
        self.delete(&name.to_string()).await
    }

    async fn list_backups(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListBackupsResponse> {
        self.get(&format!("{parent}/backups"), &options.query()).await
    }

    async fn restore_database(&self, request: &RestoreDatabaseRequest) -> Result<Operation> {
        validate_database_id(&request.database_id).map_err(Error::InvalidArgument)?;
        if let Some(encryption) = &request.encryption_config {
            encryption.validate()?;
        }
        self.post(
            &format!("{}/databases:restore", request.parent),
            &[],
            &serde_json::to_value(request)?,
        )
        .await
    }

    async fn list_database_operations(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListOperationsResponse> {
        self.get(&format!("{parent}/databaseOperations"), &options.query())
            .await
    }

    async fn list_backup_operations(
        &self,
        parent: &InstanceName,
        options: &ListOptions,
    ) -> Result<ListOperationsResponse> {
        self.get(&format!("{parent}/backupOperations"), &options.query())
            .await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation> {
        self.get(&operation_path(name)?, &[]).await
    }

    async fn cancel_operation(&self, name: &str) -> Result<()> {
        let builder = self
            .request(Method::POST, &format!("{}:cancel", operation_path(name)?))
            .await?
            .json(&json!({}));
        self.send_empty(builder).await
    }

    async fn get_iam_policy(&self, resource: &str) -> Result<Policy> {
        self.post(
            &format!("{}:getIamPolicy", iam_resource(resource)?),
            &[],
            &json!({}),
        )
        .await
    }

    async fn set_iam_policy(&self, resource: &str, policy: &Policy) -> Result<Policy> {
        self.post(
            &format!("{}:setIamPolicy", iam_resource(resource)?),
            &[],
            &json!({ "policy": policy }),
        )
        .await
    }

    async fn test_iam_permissions(
        &self,
        resource: &str,
        permissions: &[String],
    ) -> Result<Vec<String>> {
        let response: TestIamPermissionsResponse = self
            .post(
                &format!("{}:testIamPermissions", iam_resource(resource)?),
                &[],
                &json!({ "permissions": permissions }),
            )
            .await?;
        Ok(response.permissions)
    }
}
