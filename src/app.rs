use std::io::{self, Stdout, Write};

use anyhow::{anyhow, bail, Result};
use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::client::{collect_pages, DatabaseAdmin};
use crate::config::PollConfig;
use crate::iam::Policy;
use crate::logger::DatabaseLogger;
use crate::name::{BackupName, InstanceName};
use crate::operation::{Code, OperationMetadata};
use crate::poller::{OperationPoller, ProgressEvent};
use crate::types::{
    Backup, BackupEncryptionConfig, BackupState, CopyBackupRequest, CreateBackupRequest,
    CreateDatabaseRequest, Database, DatabaseDialect, EncryptionConfig, ListOptions,
    RestoreDatabaseRequest, UpdateDatabaseDdlRequest,
};

const CREATE_SINGERS_TABLE: &str = "CREATE TABLE Singers (
  SingerId    INT64 NOT NULL,
  FirstName   STRING(1024),
  LastName    STRING(1024),
  SingerInfo  BYTES(MAX),
  FullName    STRING(2048) AS (ARRAY_TO_STRING([FirstName, LastName], \" \")) STORED,
) PRIMARY KEY (SingerId)";

const CREATE_ALBUMS_TABLE: &str = "CREATE TABLE Albums (
  SingerId    INT64 NOT NULL,
  AlbumId     INT64 NOT NULL,
  AlbumTitle  STRING(MAX)
) PRIMARY KEY (SingerId, AlbumId),
  INTERLEAVE IN PARENT Singers ON DELETE CASCADE";

const CREATE_PG_SINGERS_TABLE: &str = "CREATE TABLE Singers (
  SingerId   bigint NOT NULL,
  FirstName  varchar(1024),
  LastName   varchar(1024),
  SingerInfo bytea,
  FullName   character varying(2048) GENERATED ALWAYS AS (FirstName || ' ' || LastName) STORED,
  PRIMARY KEY (SingerId)
)";

const BACKUP_LIFETIME_DAYS: i64 = 14;

const DATABASE_PERMISSIONS: [&str; 3] = [
    "spanner.databases.read",
    "spanner.databases.write",
    "spanner.databases.updateDdl",
];

fn timestamp(t: chrono::DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Runs the admin samples against a [`DatabaseAdmin`], writing their
/// human-readable progress to `out`.
pub struct App<W: Write = Stdout> {
    pub admin: Box<dyn DatabaseAdmin>,
    pub dry_run_mode: bool,
    pub poll: PollConfig,
    out: W,
}

impl App<Stdout> {
    pub fn new(admin: Box<dyn DatabaseAdmin>, dry_run_mode: bool) -> Self {
        Self::with_output(admin, dry_run_mode, io::stdout())
    }
}

impl<W: Write> App<W> {
    pub fn with_output(admin: Box<dyn DatabaseAdmin>, dry_run_mode: bool, out: W) -> Self {
        Self {
            admin,
            dry_run_mode,
            poll: PollConfig::default(),
            out,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn say(&mut self, line: impl AsRef<str>) -> Result<()> {
        writeln!(self.out, "{}", line.as_ref())?;
        Ok(())
    }

    fn poller(&self) -> OperationPoller<'_> {
        OperationPoller::new(self.admin.as_ref(), self.poll.clone()).on_progress(Box::new(
            |event: ProgressEvent| {
                if let ProgressEvent::Polling {
                    name,
                    progress_percent: Some(percent),
                    ..
                } = event
                {
                    info!(operation = %name, percent, "operation progress");
                }
            },
        ))
    }

    /// In dry-run mode prints the request that would be sent and returns
    /// true; the caller then skips the real call.
    fn dry_run(&mut self, action: &str, request: &impl Serialize) -> Result<bool> {
        if !self.dry_run_mode {
            return Ok(false);
        }
        let body = serde_json::to_string_pretty(request)?;
        let operation_id = format!("dry-run-operation-{}", Utc::now().timestamp());
        self.say(format!("[dry-run] {action}:"))?;
        self.say(body)?;
        self.say(format!("[dry-run] operation {operation_id} was not submitted."))?;
        Ok(true)
    }

    /// With `kms_key` set the database is encrypted with that
    /// customer-managed key.
    pub async fn create_database(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        kms_key: Option<&str>,
    ) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;
        let mut request =
            CreateDatabaseRequest::new(parent, database_id, DatabaseDialect::GoogleStandardSql)
                .with_extra_statements(vec![
                    CREATE_SINGERS_TABLE.to_string(),
                    CREATE_ALBUMS_TABLE.to_string(),
                ]);
        if let Some(key) = kms_key {
            request = request.with_encryption(EncryptionConfig::kms_key(key));
        }
        let log = DatabaseLogger::new(request.database_name()?);
        if self.dry_run("create database", &request)? {
            return Ok(());
        }

        let operation = self.admin.create_database(&request).await?;
        log.info(&format!("create submitted as {}", operation.name));
        self.say(format!("Waiting for creation of {database_id} to complete..."))?;
        let database: Database = self.poller().until_done(operation).await?;
        log.debug(&format!("database is {:?}", database.state));
        self.say(format!(
            "Created database {database_id} on instance {instance_id}."
        ))?;
        if let Some(key) = database
            .encryption_config
            .as_ref()
            .and_then(|c| c.kms_key_name.as_deref())
        {
            self.say(format!("Database encrypted with key {key}."))?;
        }
        Ok(())
    }

    /// PostgreSQL databases are created empty; their schema follows in a
    /// separate DDL update.
    pub async fn create_pg_database(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
    ) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;
        let request = CreateDatabaseRequest::new(parent, database_id, DatabaseDialect::Postgresql);
        let name = request.database_name()?;
        if self.dry_run("create database", &request)? {
            return Ok(());
        }

        let operation = self.admin.create_database(&request).await?;
        self.say(format!("Waiting for operation on {database_id} to complete..."))?;
        let database: Database = self.poller().until_done(operation).await?;
        self.say(format!(
            "Created database {database_id} on instance {instance_id} with dialect {:?}.",
            database.database_dialect
        ))?;

        let ddl = UpdateDatabaseDdlRequest {
            database: name,
            statements: vec![CREATE_PG_SINGERS_TABLE.to_string()],
            operation_id: None,
        };
        let operation = self.admin.update_database_ddl(&ddl).await?;
        self.poller().until_done::<serde_json::Value>(operation).await?;
        self.say(format!("Created table Singers in database {database_id}."))
    }

    pub async fn get_database_ddl(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        let statements = self.admin.get_database_ddl(&name).await?;
        self.say(format!("Retrieved database DDL for {name}:"))?;
        for statement in statements {
            self.say(format!("{statement};\n"))?;
        }
        Ok(())
    }

    pub async fn update_database_ddl(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        statements: Vec<String>,
        operation_id: Option<String>,
    ) -> Result<()> {
        let database = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        let request = UpdateDatabaseDdlRequest {
            database,
            statements,
            operation_id,
        };
        if self.dry_run("update database ddl", &request)? {
            return Ok(());
        }

        let operation = self.admin.update_database_ddl(&request).await?;
        self.say("Waiting for operation to complete...")?;
        let done = self.poller().wait(&operation.name, None).await?;
        if let Some(status) = done.error() {
            bail!("schema update failed: {status}");
        }
        if let Ok(Some(OperationMetadata::UpdateDatabaseDdl(metadata))) = done.typed_metadata() {
            for (statement, committed) in metadata.statements.iter().zip(&metadata.commit_timestamps) {
                self.say(format!("Committed at {}: {statement}", timestamp(*committed)))?;
            }
        }
        self.say(format!("Updated schema of database {database_id}."))
    }

    pub async fn update_database(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        enable_drop_protection: bool,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        let mut database = Database::new(name);
        database.enable_drop_protection = enable_drop_protection;
        if self.dry_run("update database", &database)? {
            return Ok(());
        }

        self.say(format!("Updating database {database_id}."))?;
        let operation = self
            .admin
            .update_database(&database, "enableDropProtection")
            .await?;
        self.say(format!(
            "Waiting for update operation for {database_id} to complete..."
        ))?;
        let _: Database = self.poller().until_done(operation).await?;
        self.say(format!("Updated database {database_id}."))
    }

    pub async fn list_databases(&mut self, project_id: &str, instance_id: &str) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;
        let admin = self.admin.as_ref();
        let databases = collect_pages(ListOptions::default(), |options| {
            let parent = &parent;
            async move { admin.list_databases(parent, &options).await }
        })
        .await?;

        self.say(format!("Databases for {parent}:"))?;
        for database in databases {
            let leader = database
                .default_leader
                .as_deref()
                .map(|l| format!(" (default leader = {l})"))
                .unwrap_or_default();
            self.say(format!("\t{}{leader}", database.name.database()))?;
        }
        Ok(())
    }

    pub async fn drop_database(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        if self.dry_run("drop database", &json!({ "database": name }))? {
            return Ok(());
        }
        let log = DatabaseLogger::new(name.clone());
        if let Err(e) = self.admin.drop_database(&name).await {
            log.error(&format!("drop failed: {e}"));
            return Err(e.into());
        }
        log.warn("database dropped");
        self.say(format!("Dropped database {name}."))
    }

    pub async fn create_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        backup_id: &str,
        kms_key: Option<&str>,
    ) -> Result<()> {
        let instance = InstanceName::new(project_id, instance_id)?;
        let database = instance.database(database_id)?;
        let backup_name = instance.backup(backup_id)?;
        let expire_time = Utc::now() + Duration::days(BACKUP_LIFETIME_DAYS);
        let request = CreateBackupRequest {
            parent: instance,
            backup_id: backup_id.to_string(),
            backup: Backup::of(database.clone(), expire_time),
            encryption_config: kms_key.map(BackupEncryptionConfig::customer_managed),
        };
        if self.dry_run(
            "create backup",
            &json!({
                "backupId": request.backup_id,
                "backup": request.backup,
                "encryptionConfig": request.encryption_config,
            }),
        )? {
            return Ok(());
        }

        self.say(format!("Creating backup of database {database}."))?;
        let operation = self.admin.create_backup(&request).await?;

        self.say(format!("Waiting for backup {backup_name} to complete..."))?;
        let _: Backup = self.poller().until_done(operation).await?;

        let backup = self.admin.get_backup(&backup_name).await?;
        self.report_ready_backup("Backup", &backup)
    }

    fn report_ready_backup(&mut self, label: &str, backup: &Backup) -> Result<()> {
        if backup.state != BackupState::Ready {
            bail!("{label} is not ready.");
        }
        let name = backup
            .name
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let created = backup.create_time.map(timestamp).unwrap_or_default();
        let key = backup
            .encryption_info
            .as_ref()
            .and_then(|info| info.kms_key_version.as_deref())
            .map(|version| format!(" using encryption key {version}"))
            .unwrap_or_default();
        self.say(format!(
            "{label} {name} of size {} bytes was created at {created}{key}",
            backup.size_bytes
        ))
    }

    /// Starts a backup, cancels it, waits for the operation to settle and
    /// removes the backup should it have completed anyway.
    pub async fn cancel_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        backup_id: &str,
    ) -> Result<()> {
        let instance = InstanceName::new(project_id, instance_id)?;
        let database = instance.database(database_id)?;
        let backup_name = instance.backup(backup_id)?;
        let request = CreateBackupRequest {
            parent: instance,
            backup_id: backup_id.to_string(),
            backup: Backup::of(database.clone(), Utc::now() + Duration::days(1)),
            encryption_config: None,
        };
        if self.dry_run(
            "create and cancel backup",
            &json!({ "backupId": request.backup_id, "backup": request.backup }),
        )? {
            return Ok(());
        }

        self.say(format!("Creating backup of database {database}."))?;
        let outcome = self.start_and_cancel(&request).await;
        let cleanup = self.delete_if_exists(&backup_name).await;
        outcome?;
        cleanup
    }

    async fn start_and_cancel(&mut self, request: &CreateBackupRequest) -> Result<()> {
        let operation = self.admin.create_backup(request).await?;
        self.admin.cancel_operation(&operation.name).await?;

        // cancellation is asynchronous; cleanup needs a settled backup
        let latest = self.poller().wait(&operation.name, None).await?;
        match latest.error() {
            Some(status) if status.code() == Code::Cancelled => self.say("Backup cancelled."),
            Some(status) => bail!("backup failed: {status}"),
            None => self.say("Backup completed before it could be cancelled."),
        }
    }

    async fn delete_if_exists(&mut self, name: &BackupName) -> Result<()> {
        match self.admin.get_backup(name).await {
            Ok(backup) => {
                if let Some(reason) = backup.deletion_blocker() {
                    return self.say(format!("Leaving backup {name} in place: {reason}."));
                }
                self.admin.delete_backup(name).await?;
                self.say(format!("Deleted leftover backup {name}."))
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn copy_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        backup_id: &str,
        source_backup_id: &str,
    ) -> Result<()> {
        let instance = InstanceName::new(project_id, instance_id)?;
        let source_backup = instance.backup(source_backup_id)?;
        let copy_name = instance.backup(backup_id)?;
        let request = CopyBackupRequest {
            parent: instance,
            backup_id: backup_id.to_string(),
            source_backup: source_backup.clone(),
            expire_time: Utc::now() + Duration::days(BACKUP_LIFETIME_DAYS),
            encryption_config: None,
        };
        if self.dry_run("copy backup", &request)? {
            return Ok(());
        }

        self.say(format!(
            "Creating copy of the source backup {source_backup}."
        ))?;
        let operation = self.admin.copy_backup(&request).await?;
        self.say(format!(
            "Waiting for copy backup {copy_name} to complete..."
        ))?;
        let _: Backup = self.poller().until_done(operation).await?;

        let copy = self.admin.get_backup(&copy_name).await?;
        self.report_ready_backup("Copy backup", &copy)
    }

    pub async fn get_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        backup_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.backup(backup_id)?;
        let backup = self.admin.get_backup(&name).await?;
        let source = backup
            .database
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.say(format!("Backup {name} of database {source}:"))?;
        self.say(format!("\tstate: {:?}", backup.state))?;
        self.say(format!("\tsize: {} bytes", backup.size_bytes))?;
        if let Some(version_time) = backup.version_time {
            self.say(format!("\tversion time: {}", timestamp(version_time)))?;
        }
        if let Some(expire_time) = backup.expire_time {
            self.say(format!("\texpire time: {}", timestamp(expire_time)))?;
        }
        for database in &backup.referencing_databases {
            self.say(format!("\trestored into: {database}"))?;
        }
        for reason in backup.validate() {
            self.say(format!("\twarning: {reason}"))?;
        }
        Ok(())
    }

    pub async fn list_backups(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: Option<&str>,
    ) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;

        let mut listings = vec![("All backups:".to_string(), ListOptions::default())];
        if let Some(database_id) = database_id {
            listings.push((
                "Backups matching database name:".to_string(),
                ListOptions::filter(format!("database:{database_id}")),
            ));
        }
        let week_ago = Utc::now() - Duration::days(7);
        listings.push((
            "Ready backups filtered by create time:".to_string(),
            ListOptions::filter(format!(
                "(state:READY) AND (create_time >= \"{}\")",
                timestamp(week_ago)
            )),
        ));

        for (title, options) in listings {
            let admin = self.admin.as_ref();
            let backups = collect_pages(options, |options| {
                let parent = &parent;
                async move { admin.list_backups(parent, &options).await }
            })
            .await?;
            self.say(title)?;
            for backup in backups {
                if let Some(name) = &backup.name {
                    self.say(name.backup())?;
                }
            }
        }

        self.say("Get backups paginated:")?;
        let mut options = ListOptions {
            page_size: Some(3),
            ..ListOptions::default()
        };
        loop {
            let page = self.admin.list_backups(&parent, &options).await?;
            for name in page.backups.iter().filter_map(|b| b.name.as_ref()) {
                self.say(name.backup())?;
            }
            if page.next_page_token.is_empty() {
                break;
            }
            options.page_token = Some(page.next_page_token);
        }
        Ok(())
    }

    pub async fn update_backup_expire_time(
        &mut self,
        project_id: &str,
        instance_id: &str,
        backup_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.backup(backup_id)?;
        let backup = self.admin.get_backup(&name).await?;
        let current = backup
            .expire_time
            .ok_or_else(|| anyhow!("backup {backup_id} has no expire time"))?;
        let new_expire_time = current.max(Utc::now()) + Duration::days(1);

        self.say(format!(
            "Backup {backup_id} current expire time: {}",
            timestamp(current)
        ))?;
        self.say(format!("Updating expire time to {}", timestamp(new_expire_time)))?;

        let update = Backup {
            name: Some(name),
            expire_time: Some(new_expire_time),
            ..Backup::default()
        };
        if self.dry_run("update backup", &update)? {
            return Ok(());
        }
        self.admin.update_backup(&update, "expireTime").await?;
        self.say("Expire time updated.")
    }

    pub async fn restore_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        backup_id: &str,
        kms_key: Option<&str>,
    ) -> Result<()> {
        let instance = InstanceName::new(project_id, instance_id)?;
        let database = instance.database(database_id)?;
        let backup = instance.backup(backup_id)?;
        let request = RestoreDatabaseRequest {
            parent: instance,
            database_id: database_id.to_string(),
            backup: backup.clone(),
            encryption_config: kms_key.map(BackupEncryptionConfig::customer_managed),
        };
        if self.dry_run("restore database", &request)? {
            return Ok(());
        }

        self.say(format!(
            "Restoring database {database} from backup {backup_id}."
        ))?;
        let operation = self.admin.restore_database(&request).await?;

        let log = DatabaseLogger::new(database.clone());
        log.info(&format!("restore from {backup} submitted as {}", operation.name));
        self.say("Waiting for database restore to complete...")?;
        let done = self.poller().wait(&operation.name, None).await?;
        let _: Option<Database> = done.response_as()?;
        self.say("Database restored from backup.")?;
        log.info("restore finished");

        let restored = self.admin.get_database(&database).await?;
        let info = restored
            .restore_info
            .as_ref()
            .and_then(|r| r.backup_info())
            .ok_or_else(|| anyhow!("database {database} carries no restore info"))?;
        let key = restored
            .encryption_config
            .as_ref()
            .and_then(|c| c.kms_key_name.as_deref())
            .map(|key| format!(" using encryption key {key}"))
            .unwrap_or_default();
        self.say(format!(
            "Database {} was restored to {database_id} from backup {}{key}.",
            info.source_database, info.backup
        ))?;

        if let Ok(Some(OperationMetadata::RestoreDatabase(metadata))) = done.typed_metadata() {
            if let Some(optimize) = metadata.optimize_database_operation_name {
                self.say(format!("Optimization continues in operation {optimize}."))?;
            }
        }
        Ok(())
    }

    pub async fn delete_backup(
        &mut self,
        project_id: &str,
        instance_id: &str,
        backup_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.backup(backup_id)?;
        let backup = match self.admin.get_backup(&name).await {
            Ok(backup) => backup,
            Err(e) if e.is_not_found() => {
                bail!("Backup {backup_id} not found.");
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(reason) = backup.deletion_blocker() {
            bail!("cannot delete backup {backup_id}: {reason}");
        }
        if self.dry_run("delete backup", &json!({ "name": name }))? {
            return Ok(());
        }

        self.say(format!("Deleting backup {backup_id}."))?;
        self.admin.delete_backup(&name).await?;

        match self.admin.get_backup(&name).await {
            Err(e) if e.is_not_found() => self.say("Backup deleted."),
            Err(e) => Err(e.into()),
            Ok(_) => bail!("backup {backup_id} still exists"),
        }
    }

    pub async fn list_backup_operations(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
    ) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;
        let options = ListOptions::filter(format!(
            "(metadata.database:{database_id}) AND \
             (metadata.@type:type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata)"
        ));
        let admin = self.admin.as_ref();
        let operations = collect_pages(options, |options| {
            let parent = &parent;
            async move { admin.list_backup_operations(parent, &options).await }
        })
        .await?;

        self.say("Create Backup Operations:")?;
        for operation in operations {
            if let Some(OperationMetadata::CreateBackup(metadata)) = operation.typed_metadata()? {
                let percent = metadata.progress.map_or(0, |p| p.progress_percent);
                self.say(format!(
                    "Backup {} on database {} is {percent}% complete.",
                    metadata.name, metadata.database
                ))?;
            }
        }
        Ok(())
    }

    pub async fn list_database_operations(
        &mut self,
        project_id: &str,
        instance_id: &str,
    ) -> Result<()> {
        let parent = InstanceName::new(project_id, instance_id)?;
        let admin = self.admin.as_ref();
        let operations = collect_pages(ListOptions::default(), |options| {
            let parent = &parent;
            async move { admin.list_database_operations(parent, &options).await }
        })
        .await?;

        self.say("Database Operations:")?;
        for operation in operations {
            let state = if operation.done() {
                "completed"
            } else {
                "in progress"
            };
            self.say(format!("{} ({state})", operation.name))?;
        }
        Ok(())
    }

    pub async fn get_iam_policy(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        let policy = self.admin.get_iam_policy(&name.to_string()).await?;
        self.say(format!("IAM policy for {name} (version {}):", policy.version))?;
        for binding in &policy.bindings {
            self.say(format!("\t{}: {}", binding.role, binding.members.join(", ")))?;
        }

        let wanted: Vec<String> = DATABASE_PERMISSIONS.iter().map(ToString::to_string).collect();
        let held = self
            .admin
            .test_iam_permissions(&name.to_string(), &wanted)
            .await?;
        self.say(format!("Caller holds: {}", held.join(", ")))
    }

    /// Read-modify-write of the database policy. A concurrent writer makes
    /// the write fail with `ABORTED`; the policy must then be re-read.
    pub async fn add_iam_member(
        &mut self,
        project_id: &str,
        instance_id: &str,
        database_id: &str,
        role: &str,
        member: &str,
    ) -> Result<()> {
        let name = InstanceName::new(project_id, instance_id)?.database(database_id)?;
        let resource = name.to_string();
        let mut policy: Policy = self.admin.get_iam_policy(&resource).await?;
        if !policy.add_member(role, member) {
            return self.say(format!("{member} already has {role} on {name}."));
        }
        if self.dry_run("set iam policy", &json!({ "policy": policy }))? {
            return Ok(());
        }

        match self.admin.set_iam_policy(&resource, &policy).await {
            Ok(_) => self.say(format!("Granted {role} to {member} on {name}.")),
            Err(e) if e.code() == Some(Code::Aborted) => {
                bail!("policy for {name} changed concurrently; re-read it and retry")
            }
            Err(e) => Err(e.into()),
        }
    }
}
