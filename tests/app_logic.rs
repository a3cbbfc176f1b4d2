use chrono::{TimeZone, Utc};
use serde_json::json;
use spanner_admin::app::App;
use spanner_admin::client::MockDatabaseAdmin;
use spanner_admin::iam::{Binding, Policy};
use spanner_admin::operation::{
    CreateBackupMetadata, Code, Operation, OperationMetadata, OperationProgress,
    RestoreDatabaseMetadata, Status, UpdateDatabaseDdlMetadata,
};
use spanner_admin::types::{
    Backup, BackupState, DatabaseDialect, EncryptionInfo, EncryptionType, ListBackupsResponse,
    ListDatabasesResponse, ListOperationsResponse,
};
use spanner_admin::Error;

const BACKUP: &str = "projects/test-project/instances/test-instance/backups/b1";
const DATABASE: &str = "projects/test-project/instances/test-instance/databases/example-db";

fn app_with(mock: MockDatabaseAdmin) -> App<Vec<u8>> {
    App::with_output(Box::new(mock), false, Vec::new())
}

fn output(app: &App<Vec<u8>>) -> String {
    String::from_utf8(app.output().clone()).unwrap()
}

fn not_found() -> Error {
    Error::Api {
        code: Code::NotFound,
        message: "Backup not found".to_string(),
    }
}

fn ready_backup() -> Backup {
    Backup {
        name: Some(BACKUP.parse().unwrap()),
        database: Some(DATABASE.parse().unwrap()),
        state: BackupState::Ready,
        size_bytes: 1024,
        create_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        expire_time: Some(Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()),
        ..Backup::default()
    }
}

#[test]
fn test_app_initialization() {
    let app = App::new(Box::new(MockDatabaseAdmin::new()), false);

    assert!(!app.dry_run_mode);
    assert_eq!(app.poll.initial_interval_ms, 1_000);
}

#[tokio::test]
async fn test_create_database_with_schema() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_database()
        .withf(|req| {
            req.create_statement == "CREATE DATABASE `example-db`" && req.extra_statements.len() == 2
        })
        .times(1)
        .returning(|_| {
            Ok(Operation::succeeded(
                "projects/test-project/instances/test-instance/databases/example-db/operations/c1",
                json!({ "name": DATABASE, "state": "READY" }),
            ))
        });

    let mut app = app_with(mock);
    app.create_database("test-project", "test-instance", "example-db", None)
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        "Waiting for creation of example-db to complete...\n\
         Created database example-db on instance test-instance.\n"
    );
}

#[tokio::test]
async fn test_create_database_dry_run_sends_nothing() {
    let mut app = App::with_output(Box::new(MockDatabaseAdmin::new()), true, Vec::new());

    app.create_database("test-project", "test-instance", "example-db", None)
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.starts_with("[dry-run] create database:"));
    assert!(out.contains("\"createStatement\": \"CREATE DATABASE `example-db`\""));
    assert!(out.contains("was not submitted."));
}

#[tokio::test]
async fn test_create_database_rejects_bad_id_before_calling() {
    let mut app = app_with(MockDatabaseAdmin::new());

    let err = app
        .create_database("test-project", "test-instance", "Example", None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("lowercase"));
    assert!(output(&app).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_backup_waits_and_reports() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .withf(|req| req.backup_id == "b1" && req.backup.expire_time.is_some())
        .times(1)
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_get_operation()
        .times(1)
        .returning(|name| {
            Ok(Operation::succeeded(
                name,
                serde_json::to_value(ready_backup()).unwrap(),
            ))
        });
    mock.expect_get_backup()
        .times(1)
        .returning(|_| Ok(ready_backup()));

    let mut app = app_with(mock);
    app.create_backup("test-project", "test-instance", "example-db", "b1", None)
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains(&format!("Creating backup of database {DATABASE}.")));
    assert!(out.contains(&format!("Waiting for backup {BACKUP} to complete...")));
    assert!(out.contains(&format!(
        "Backup {BACKUP} of size 1024 bytes was created at 2024-01-01T00:00:00.000Z"
    )));
}

#[tokio::test]
async fn test_create_backup_not_ready_is_an_error() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .returning(|_| {
            Ok(Operation::succeeded(
                format!("{BACKUP}/operations/op1"),
                json!({ "name": BACKUP }),
            ))
        });
    mock.expect_get_backup().returning(|_| {
        Ok(Backup {
            state: BackupState::Creating,
            ..ready_backup()
        })
    });

    let mut app = app_with(mock);
    let err = app
        .create_backup("test-project", "test-instance", "example-db", "b1", None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Backup is not ready.");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_backup_that_was_cancelled() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .times(1)
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_cancel_operation()
        .withf(|name| name.ends_with("/operations/op1"))
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_get_operation().times(1).returning(|name| {
        Ok(Operation::failed(
            name,
            Status::new(Code::Cancelled, "cancelled by user"),
        ))
    });
    mock.expect_get_backup().times(1).returning(|_| Err(not_found()));
    mock.expect_delete_backup().times(0);

    let mut app = app_with(mock);
    app.cancel_backup("test-project", "test-instance", "example-db", "b1")
        .await
        .unwrap();

    assert!(output(&app).contains("Backup cancelled."));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_backup_cleans_up_completed_backup() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_cancel_operation().returning(|_| Ok(()));
    mock.expect_get_operation().returning(|name| {
        Ok(Operation::succeeded(
            name,
            serde_json::to_value(ready_backup()).unwrap(),
        ))
    });
    mock.expect_get_backup().returning(|_| Ok(ready_backup()));
    mock.expect_delete_backup().times(1).returning(|_| Ok(()));

    let mut app = app_with(mock);
    app.cancel_backup("test-project", "test-instance", "example-db", "b1")
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains("Backup completed before it could be cancelled."));
    assert!(out.contains(&format!("Deleted leftover backup {BACKUP}.")));
}

#[tokio::test]
async fn test_delete_backup_refuses_referenced_backup() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_backup().times(1).returning(|_| {
        Ok(Backup {
            referencing_databases: vec![
                "projects/test-project/instances/test-instance/databases/restored"
                    .parse()
                    .unwrap(),
            ],
            ..ready_backup()
        })
    });
    mock.expect_delete_backup().times(0);

    let mut app = app_with(mock);
    let err = app
        .delete_backup("test-project", "test-instance", "b1")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("referenced by"));
}

#[tokio::test]
async fn test_delete_backup_verifies_removal() {
    let mut mock = MockDatabaseAdmin::new();
    let mut reads = 0;
    mock.expect_get_backup().times(2).returning(move |_| {
        reads += 1;
        if reads == 1 {
            Ok(ready_backup())
        } else {
            Err(not_found())
        }
    });
    mock.expect_delete_backup()
        .withf(|name| name.backup() == "b1")
        .times(1)
        .returning(|_| Ok(()));

    let mut app = app_with(mock);
    app.delete_backup("test-project", "test-instance", "b1")
        .await
        .unwrap();

    assert_eq!(output(&app), "Deleting backup b1.\nBackup deleted.\n");
}

#[tokio::test]
async fn test_delete_missing_backup() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_backup().returning(|_| Err(not_found()));

    let mut app = app_with(mock);
    let err = app
        .delete_backup("test-project", "test-instance", "b1")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Backup b1 not found.");
}

#[tokio::test(start_paused = true)]
async fn test_restore_reports_source_and_optimization() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_restore_database()
        .withf(|req| req.database_id == "restored" && req.backup.backup() == "b1")
        .times(1)
        .returning(|_| {
            Ok(Operation::pending(
                "projects/test-project/instances/test-instance/databases/restored/operations/r1",
            ))
        });
    mock.expect_get_operation().times(1).returning(|name| {
        Operation::succeeded(
            name,
            json!({ "name": "projects/test-project/instances/test-instance/databases/restored" }),
        )
        .with_metadata(&OperationMetadata::RestoreDatabase(RestoreDatabaseMetadata {
            name: "projects/test-project/instances/test-instance/databases/restored".to_string(),
            optimize_database_operation_name: Some(
                "projects/test-project/instances/test-instance/databases/restored/operations/opt1"
                    .to_string(),
            ),
            ..RestoreDatabaseMetadata::default()
        }))
    });
    mock.expect_get_database().times(1).returning(|name| {
        Ok(serde_json::from_value(json!({
            "name": name.to_string(),
            "state": "READY_OPTIMIZING",
            "restoreInfo": {
                "sourceType": "BACKUP",
                "backupInfo": { "backup": BACKUP, "sourceDatabase": DATABASE }
            }
        }))
        .unwrap())
    });

    let mut app = app_with(mock);
    app.restore_backup("test-project", "test-instance", "restored", "b1", None)
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains("Database restored from backup."));
    assert!(out.contains(&format!(
        "Database {DATABASE} was restored to restored from backup {BACKUP}."
    )));
    assert!(out.contains("Optimization continues in operation"));
}

#[tokio::test(start_paused = true)]
async fn test_update_ddl_prints_commit_times() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_update_database_ddl()
        .withf(|req| req.operation_id.as_deref() == Some("add_budget"))
        .times(1)
        .returning(|_| Ok(Operation::pending(format!("{DATABASE}/operations/add_budget"))));
    mock.expect_get_operation().times(1).returning(|name| {
        Operation::succeeded(name, json!({}))
            .with_metadata(&OperationMetadata::UpdateDatabaseDdl(UpdateDatabaseDdlMetadata {
                database: DATABASE.to_string(),
                statements: vec!["ALTER TABLE Albums ADD COLUMN MarketingBudget INT64".to_string()],
                commit_timestamps: vec![Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()],
                ..UpdateDatabaseDdlMetadata::default()
            }))
    });

    let mut app = app_with(mock);
    app.update_database_ddl(
        "test-project",
        "test-instance",
        "example-db",
        vec!["ALTER TABLE Albums ADD COLUMN MarketingBudget INT64".to_string()],
        Some("add_budget".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(
        output(&app),
        "Waiting for operation to complete...\n\
         Committed at 2024-03-01T12:00:00.000Z: ALTER TABLE Albums ADD COLUMN MarketingBudget INT64\n\
         Updated schema of database example-db.\n"
    );
}

#[tokio::test]
async fn test_list_databases_walks_every_page() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_list_databases()
        .times(2)
        .returning(|_, options| {
            let page = match options.page_token.as_deref() {
                None => json!({
                    "databases": [{
                        "name": "projects/test-project/instances/test-instance/databases/db1",
                        "defaultLeader": "us-east1"
                    }],
                    "nextPageToken": "next"
                }),
                Some(_) => json!({
                    "databases": [{ "name": "projects/test-project/instances/test-instance/databases/db2" }]
                }),
            };
            Ok(serde_json::from_value::<ListDatabasesResponse>(page).unwrap())
        });

    let mut app = app_with(mock);
    app.list_databases("test-project", "test-instance")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        "Databases for projects/test-project/instances/test-instance:\n\
         \tdb1 (default leader = us-east1)\n\
         \tdb2\n"
    );
}

#[tokio::test]
async fn test_update_backup_expire_time_extends_by_a_day() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_backup().returning(|_| Ok(ready_backup()));
    mock.expect_update_backup()
        .withf(|backup, mask| {
            mask.to_string() == "expireTime"
                && backup.expire_time == Some(Utc.with_ymd_and_hms(2100, 1, 2, 0, 0, 0).unwrap())
        })
        .times(1)
        .returning(|backup, _| Ok(backup.clone()));

    let mut app = app_with(mock);
    app.update_backup_expire_time("test-project", "test-instance", "b1")
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains("Backup b1 current expire time: 2100-01-01T00:00:00.000Z"));
    assert!(out.contains("Updating expire time to 2100-01-02T00:00:00.000Z"));
    assert!(out.ends_with("Expire time updated.\n"));
}

#[tokio::test]
async fn test_add_iam_member_reports_conflict() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_iam_policy().returning(|_| {
        Ok(Policy {
            version: 1,
            etag: "BwX1".to_string(),
            ..Policy::default()
        })
    });
    mock.expect_set_iam_policy()
        .withf(|_, policy| policy.etag == "BwX1" && policy.bindings.len() == 1)
        .times(1)
        .returning(|_, _| {
            Err(Error::Api {
                code: Code::Aborted,
                message: "etag mismatch".to_string(),
            })
        });

    let mut app = app_with(mock);
    let err = app
        .add_iam_member(
            "test-project",
            "test-instance",
            "example-db",
            "roles/spanner.databaseReader",
            "user:alice@example.com",
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("changed concurrently"));
}

#[tokio::test]
async fn test_add_existing_iam_member_skips_write() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_iam_policy().returning(|_| {
        Ok(Policy {
            version: 1,
            bindings: vec![Binding {
                role: "roles/spanner.databaseReader".to_string(),
                members: vec!["user:alice@example.com".to_string()],
                condition: None,
            }],
            etag: "BwX1".to_string(),
        })
    });
    mock.expect_set_iam_policy().times(0);

    let mut app = app_with(mock);
    app.add_iam_member(
        "test-project",
        "test-instance",
        "example-db",
        "roles/spanner.databaseReader",
        "user:alice@example.com",
    )
    .await
    .unwrap();

    assert!(output(&app).contains("already has roles/spanner.databaseReader"));
}

#[tokio::test]
async fn test_get_database_ddl_prints_statements() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_database_ddl()
        .returning(|_| Ok(vec!["CREATE TABLE Singers (SingerId INT64) PRIMARY KEY (SingerId)".to_string()]));

    let mut app = app_with(mock);
    app.get_database_ddl("test-project", "test-instance", "example-db")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        format!(
            "Retrieved database DDL for {DATABASE}:\n\
             CREATE TABLE Singers (SingerId INT64) PRIMARY KEY (SingerId);\n\n"
        )
    );
}

#[tokio::test]
async fn test_drop_database_in_dry_run_keeps_database() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_drop_database().times(0);

    let mut app = App::with_output(Box::new(mock), true, Vec::new());
    app.drop_database("test-project", "test-instance", "example-db")
        .await
        .unwrap();

    assert!(output(&app).contains("[dry-run] drop database:"));
}

#[tokio::test]
async fn test_get_backup_lists_details() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_backup()
        .withf(|name| name.backup() == "b1")
        .returning(|_| Ok(ready_backup()));

    let mut app = app_with(mock);
    app.get_backup("test-project", "test-instance", "b1")
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.starts_with(&format!("Backup {BACKUP} of database {DATABASE}:\n")));
    assert!(out.contains("\tstate: Ready\n"));
    assert!(out.contains("\tsize: 1024 bytes\n"));
    assert!(out.contains("\texpire time: 2100-01-01T00:00:00.000Z\n"));
    assert!(!out.contains("warning"));
}

#[tokio::test]
async fn test_get_iam_policy_prints_bindings_and_permissions() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_get_iam_policy()
        .withf(|resource| resource.ends_with("/databases/example-db"))
        .returning(|_| {
            Ok(Policy {
                version: 3,
                bindings: vec![Binding {
                    role: "roles/spanner.databaseUser".to_string(),
                    members: vec![
                        "user:alice@example.com".to_string(),
                        "group:ops@example.com".to_string(),
                    ],
                    condition: None,
                }],
                etag: "BwX1".to_string(),
            })
        });
    mock.expect_test_iam_permissions()
        .withf(|_, permissions| permissions.len() == 3)
        .times(1)
        .returning(|_, permissions| Ok(permissions[..1].to_vec()));

    let mut app = app_with(mock);
    app.get_iam_policy("test-project", "test-instance", "example-db")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        format!(
            "IAM policy for {DATABASE} (version 3):\n\
             \troles/spanner.databaseUser: user:alice@example.com, group:ops@example.com\n\
             Caller holds: spanner.databases.read\n"
        )
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_backup_waits_for_cancellation_to_settle() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .times(1)
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_cancel_operation().times(1).returning(|_| Ok(()));
    let mut polls = 0;
    mock.expect_get_operation().times(3).returning(move |name| {
        polls += 1;
        if polls < 3 {
            Ok(Operation::pending(name))
        } else {
            Ok(Operation::failed(
                name,
                Status::new(Code::Cancelled, "cancelled by user"),
            ))
        }
    });
    mock.expect_get_backup().times(1).returning(|_| Err(not_found()));
    mock.expect_delete_backup().times(0);

    let mut app = app_with(mock);
    app.cancel_backup("test-project", "test-instance", "example-db", "b1")
        .await
        .unwrap();

    assert!(output(&app).contains("Backup cancelled."));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_backup_leaves_creating_backup_alone() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_cancel_operation().returning(|_| Ok(()));
    mock.expect_get_operation().returning(|name| {
        Ok(Operation::failed(
            name,
            Status::new(Code::Cancelled, "cancelled by user"),
        ))
    });
    mock.expect_get_backup().times(1).returning(|_| {
        Ok(Backup {
            state: BackupState::Creating,
            ..ready_backup()
        })
    });
    mock.expect_delete_backup().times(0);

    let mut app = app_with(mock);
    app.cancel_backup("test-project", "test-instance", "example-db", "b1")
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains("Backup cancelled."));
    assert!(out.contains(&format!(
        "Leaving backup {BACKUP} in place: backup is still being created."
    )));
}

#[tokio::test(start_paused = true)]
async fn test_create_backup_with_customer_managed_key() {
    let key = "projects/test-project/locations/us-central1/keyRings/r/cryptoKeys/k";
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_backup()
        .withf(|req| {
            req.encryption_config.as_ref().is_some_and(|c| {
                c.encryption_type == EncryptionType::CustomerManagedEncryption
                    && c.kms_key_name.as_deref()
                        == Some("projects/test-project/locations/us-central1/keyRings/r/cryptoKeys/k")
            })
        })
        .times(1)
        .returning(|_| Ok(Operation::pending(format!("{BACKUP}/operations/op1"))));
    mock.expect_get_operation().returning(|name| {
        Ok(Operation::succeeded(
            name,
            serde_json::to_value(ready_backup()).unwrap(),
        ))
    });
    mock.expect_get_backup().times(1).returning(move |_| {
        Ok(Backup {
            encryption_info: Some(EncryptionInfo {
                encryption_type: EncryptionType::CustomerManagedEncryption,
                kms_key_version: Some(format!("{key}/cryptoKeyVersions/1")),
                ..EncryptionInfo::default()
            }),
            ..ready_backup()
        })
    });

    let mut app = app_with(mock);
    app.create_backup("test-project", "test-instance", "example-db", "b1", Some(key))
        .await
        .unwrap();

    assert!(output(&app).contains(&format!(
        "was created at 2024-01-01T00:00:00.000Z using encryption key {key}/cryptoKeyVersions/1"
    )));
}

#[tokio::test]
async fn test_create_database_with_customer_managed_key() {
    let key = "projects/test-project/locations/us-central1/keyRings/r/cryptoKeys/k";
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_database()
        .withf(|req| {
            req.encryption_config.as_ref().and_then(|c| c.kms_key_name.as_deref())
                == Some("projects/test-project/locations/us-central1/keyRings/r/cryptoKeys/k")
        })
        .times(1)
        .returning(move |_| {
            Ok(Operation::succeeded(
                format!("{DATABASE}/operations/c1"),
                json!({
                    "name": DATABASE,
                    "state": "READY",
                    "encryptionConfig": { "kmsKeyName": key }
                }),
            ))
        });

    let mut app = app_with(mock);
    app.create_database("test-project", "test-instance", "example-db", Some(key))
        .await
        .unwrap();

    assert!(output(&app).ends_with(&format!("Database encrypted with key {key}.\n")));
}

#[tokio::test(start_paused = true)]
async fn test_restore_with_customer_managed_key() {
    let key = "projects/test-project/locations/us-central1/keyRings/r/cryptoKeys/k";
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_restore_database()
        .withf(|req| {
            req.encryption_config
                .as_ref()
                .is_some_and(|c| c.encryption_type == EncryptionType::CustomerManagedEncryption)
        })
        .times(1)
        .returning(|_| {
            Ok(Operation::succeeded(
                "projects/test-project/instances/test-instance/databases/restored/operations/r1",
                json!({ "name": "projects/test-project/instances/test-instance/databases/restored" }),
            ))
        });
    mock.expect_get_operation().times(1).returning(|name| {
        Ok(Operation::succeeded(
            name,
            json!({ "name": "projects/test-project/instances/test-instance/databases/restored" }),
        ))
    });
    mock.expect_get_database().times(1).returning(move |name| {
        Ok(serde_json::from_value(json!({
            "name": name.to_string(),
            "state": "READY",
            "encryptionConfig": { "kmsKeyName": key },
            "restoreInfo": {
                "sourceType": "BACKUP",
                "backupInfo": { "backup": BACKUP, "sourceDatabase": DATABASE }
            }
        }))
        .unwrap())
    });

    let mut app = app_with(mock);
    app.restore_backup("test-project", "test-instance", "restored", "b1", Some(key))
        .await
        .unwrap();

    assert!(output(&app).contains(&format!(
        "Database {DATABASE} was restored to restored from backup {BACKUP} using encryption key {key}."
    )));
}

#[tokio::test]
async fn test_create_pg_database_then_singers_table() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_create_database()
        .withf(|req| {
            req.create_statement == "CREATE DATABASE \"example-db\""
                && req.database_dialect == DatabaseDialect::Postgresql
                && req.extra_statements.is_empty()
        })
        .times(1)
        .returning(|_| {
            Ok(Operation::succeeded(
                format!("{DATABASE}/operations/c1"),
                json!({ "name": DATABASE, "state": "READY", "databaseDialect": "POSTGRESQL" }),
            ))
        });
    mock.expect_update_database_ddl()
        .withf(|req| {
            req.database.database() == "example-db"
                && req.statements.len() == 1
                && req.statements[0].contains("SingerId   bigint NOT NULL")
        })
        .times(1)
        .returning(|_| {
            Ok(Operation::succeeded(
                format!("{DATABASE}/operations/ddl1"),
                json!({}),
            ))
        });

    let mut app = app_with(mock);
    app.create_pg_database("test-project", "test-instance", "example-db")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        "Waiting for operation on example-db to complete...\n\
         Created database example-db on instance test-instance with dialect Postgresql.\n\
         Created table Singers in database example-db.\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_update_database_sets_drop_protection() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_update_database()
        .withf(|database, mask| {
            database.enable_drop_protection && mask.to_string() == "enableDropProtection"
        })
        .times(1)
        .returning(|_, _| Ok(Operation::pending(format!("{DATABASE}/operations/u1"))));
    mock.expect_get_operation().times(1).returning(|name| {
        Ok(Operation::succeeded(
            name,
            json!({ "name": DATABASE, "state": "READY", "enableDropProtection": true }),
        ))
    });

    let mut app = app_with(mock);
    app.update_database("test-project", "test-instance", "example-db", true)
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        "Updating database example-db.\n\
         Waiting for update operation for example-db to complete...\n\
         Updated database example-db.\n"
    );
}

#[tokio::test(start_paused = true)]
async fn test_copy_backup_reports_copy() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_copy_backup()
        .withf(|req| {
            req.backup_id == "b1-copy"
                && req.source_backup.backup() == "b1"
                && req.expire_time > Utc::now()
        })
        .times(1)
        .returning(|_| {
            Ok(Operation::pending(
                "projects/test-project/instances/test-instance/backups/b1-copy/operations/cp1",
            ))
        });
    mock.expect_get_operation().times(1).returning(|name| {
        Ok(Operation::succeeded(
            name,
            serde_json::to_value(ready_backup()).unwrap(),
        ))
    });
    mock.expect_get_backup()
        .withf(|name| name.backup() == "b1-copy")
        .times(1)
        .returning(|name| {
            Ok(Backup {
                name: Some(name.clone()),
                ..ready_backup()
            })
        });

    let mut app = app_with(mock);
    app.copy_backup("test-project", "test-instance", "b1-copy", "b1")
        .await
        .unwrap();

    let out = output(&app);
    assert!(out.contains(&format!("Creating copy of the source backup {BACKUP}.")));
    assert!(out.contains(&format!(
        "Copy backup {BACKUP}-copy of size 1024 bytes was created at 2024-01-01T00:00:00.000Z"
    )));
}

#[tokio::test]
async fn test_list_backups_runs_each_listing() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_list_backups()
        .times(4)
        .returning(|_, options| {
            let id = match options.filter.as_deref() {
                None if options.page_size == Some(3) => "paged",
                None => "all",
                Some("database:example-db") => "by-database",
                Some(filter) if filter.starts_with("(state:READY) AND (create_time >= ") => {
                    "recent"
                }
                Some(other) => panic!("unexpected filter {other}"),
            };
            Ok(ListBackupsResponse {
                backups: vec![Backup {
                    name: Some(
                        format!("projects/test-project/instances/test-instance/backups/{id}")
                            .parse()
                            .unwrap(),
                    ),
                    ..Backup::default()
                }],
                next_page_token: String::new(),
            })
        });

    let mut app = app_with(mock);
    app.list_backups("test-project", "test-instance", Some("example-db"))
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        "All backups:\nall\n\
         Backups matching database name:\nby-database\n\
         Ready backups filtered by create time:\nrecent\n\
         Get backups paginated:\npaged\n"
    );
}

#[tokio::test]
async fn test_list_backup_operations_filters_create_backups() {
    let mut mock = MockDatabaseAdmin::new();
    mock.expect_list_backup_operations()
        .withf(|parent, options| {
            parent.to_string() == "projects/test-project/instances/test-instance"
                && options.filter.as_deref()
                    == Some(
                        "(metadata.database:example-db) AND \
                         (metadata.@type:type.googleapis.com/google.spanner.admin.database.v1.CreateBackupMetadata)",
                    )
        })
        .times(1)
        .returning(|_, _| {
            let operation = Operation::pending(format!("{BACKUP}/operations/op1")).with_metadata(
                &OperationMetadata::CreateBackup(CreateBackupMetadata {
                    name: BACKUP.to_string(),
                    database: DATABASE.to_string(),
                    progress: Some(OperationProgress {
                        progress_percent: 25,
                        ..OperationProgress::default()
                    }),
                    ..CreateBackupMetadata::default()
                }),
            )?;
            Ok(ListOperationsResponse {
                operations: vec![operation],
                next_page_token: String::new(),
            })
        });

    let mut app = app_with(mock);
    app.list_backup_operations("test-project", "test-instance", "example-db")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        format!("Create Backup Operations:\nBackup {BACKUP} on database {DATABASE} is 25% complete.\n")
    );
}

#[tokio::test]
async fn test_list_database_operations_marks_state() {
    let mut mock = MockDatabaseAdmin::new();
    let mut pages = 0;
    mock.expect_list_database_operations()
        .times(2)
        .returning(move |_, options| {
            pages += 1;
            if pages == 1 {
                assert!(options.page_token.is_none());
                Ok(ListOperationsResponse {
                    operations: vec![Operation::pending(format!("{DATABASE}/operations/o1"))],
                    next_page_token: "t2".to_string(),
                })
            } else {
                assert_eq!(options.page_token.as_deref(), Some("t2"));
                Ok(ListOperationsResponse {
                    operations: vec![Operation::succeeded(
                        format!("{DATABASE}/operations/o2"),
                        json!({ "name": DATABASE }),
                    )],
                    next_page_token: String::new(),
                })
            }
        });

    let mut app = app_with(mock);
    app.list_database_operations("test-project", "test-instance")
        .await
        .unwrap();

    assert_eq!(
        output(&app),
        format!(
            "Database Operations:\n\
             {DATABASE}/operations/o1 (in progress)\n\
             {DATABASE}/operations/o2 (completed)\n"
        )
    );
}
