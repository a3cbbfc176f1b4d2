use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spanner_admin::app::App;
use spanner_admin::client::AdminClient;
use spanner_admin::config::ClientConfig;

#[derive(Parser)]
#[command(
    name = "spanner-admin",
    version,
    about = "Cloud Spanner database and backup administration samples"
)]
struct Cli {
    /// Print the requests instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Admin API endpoint, e.g. a regional or staging host. Overrides
    /// `API_ENDPOINT` but not `SPANNER_EMULATOR_HOST`.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    /// One JSON object per line, for log collectors
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates a database with the Singers and Albums tables
    CreateDatabase {
        instance: String,
        database: String,
        project_id: String,
        /// Cloud KMS key for customer-managed encryption
        #[arg(long)]
        kms_key: Option<String>,
    },
    /// Creates a PostgreSQL-dialect database
    CreatePgDatabase {
        instance: String,
        database: String,
        project_id: String,
    },
    /// Prints the DDL statements of a database
    GetDatabaseDdl {
        instance: String,
        database: String,
        project_id: String,
    },
    /// Applies DDL statements to a database
    UpdateDatabaseDdl {
        instance: String,
        database: String,
        project_id: String,
        #[arg(required = true)]
        statements: Vec<String>,
        /// Makes retries attach to the same schema change
        #[arg(long)]
        operation_id: Option<String>,
    },
    /// Turns drop protection on or off
    UpdateDatabase {
        instance: String,
        database: String,
        project_id: String,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        drop_protection: bool,
    },
    /// Lists the databases of an instance
    ListDatabases { instance: String, project_id: String },
    /// Drops a database
    DropDatabase {
        instance: String,
        database: String,
        project_id: String,
    },
    /// Creates a backup of a database
    CreateBackup {
        instance: String,
        database: String,
        backup: String,
        project_id: String,
        /// Cloud KMS key for customer-managed encryption
        #[arg(long)]
        kms_key: Option<String>,
    },
    /// Starts a backup and cancels it
    CancelBackup {
        instance: String,
        database: String,
        backup: String,
        project_id: String,
    },
    /// Copies a backup
    CopyBackup {
        instance: String,
        backup: String,
        source_backup: String,
        project_id: String,
    },
    /// Prints the details of a backup
    GetBackup {
        instance: String,
        backup: String,
        project_id: String,
    },
    /// Lists backups, optionally narrowed to a source database
    ListBackups {
        instance: String,
        project_id: String,
        #[arg(long)]
        database: Option<String>,
    },
    /// Pushes the expire time of a backup out by a day
    UpdateBackupExpireTime {
        instance: String,
        backup: String,
        project_id: String,
    },
    /// Restores a database from a backup
    RestoreBackup {
        instance: String,
        database: String,
        backup: String,
        project_id: String,
        /// Cloud KMS key for customer-managed encryption
        #[arg(long)]
        kms_key: Option<String>,
    },
    /// Deletes a backup
    DeleteBackup {
        instance: String,
        backup: String,
        project_id: String,
    },
    /// Lists create-backup operations for a database
    ListBackupOperations {
        instance: String,
        database: String,
        project_id: String,
    },
    /// Lists database operations of an instance
    ListDatabaseOperations { instance: String, project_id: String },
    /// Prints the IAM policy of a database
    GetIamPolicy {
        instance: String,
        database: String,
        project_id: String,
    },
    /// Grants a role on a database to a member
    AddIamMember {
        instance: String,
        database: String,
        project_id: String,
        role: String,
        member: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    if let Err(err) = run(cli).await {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env_with_endpoint(cli.endpoint.as_deref());
    if let Some(timeout) = cli.timeout_secs {
        config.request_timeout_secs = timeout;
    }
    debug!(endpoint = %config.endpoint, "using admin endpoint");

    let poll = config.poll.clone();
    let client = AdminClient::new(config)?;
    let mut app = App::new(Box::new(client), cli.dry_run).with_poll_config(poll);

    match cli.command {
        Commands::CreateDatabase {
            instance,
            database,
            project_id,
            kms_key,
        } => {
            app.create_database(&project_id, &instance, &database, kms_key.as_deref())
                .await
        }
        Commands::CreatePgDatabase {
            instance,
            database,
            project_id,
        } => app.create_pg_database(&project_id, &instance, &database).await,
        Commands::GetDatabaseDdl {
            instance,
            database,
            project_id,
        } => app.get_database_ddl(&project_id, &instance, &database).await,
        Commands::UpdateDatabaseDdl {
            instance,
            database,
            project_id,
            statements,
            operation_id,
        } => {
            app.update_database_ddl(&project_id, &instance, &database, statements, operation_id)
                .await
        }
        Commands::UpdateDatabase {
            instance,
            database,
            project_id,
            drop_protection,
        } => {
            app.update_database(&project_id, &instance, &database, drop_protection)
                .await
        }
        Commands::ListDatabases {
            instance,
            project_id,
        } => app.list_databases(&project_id, &instance).await,
        Commands::DropDatabase {
            instance,
            database,
            project_id,
        } => app.drop_database(&project_id, &instance, &database).await,
        Commands::CreateBackup {
            instance,
            database,
            backup,
            project_id,
            kms_key,
        } => {
            app.create_backup(&project_id, &instance, &database, &backup, kms_key.as_deref())
                .await
        }
        Commands::CancelBackup {
            instance,
            database,
            backup,
            project_id,
        } => {
            app.cancel_backup(&project_id, &instance, &database, &backup)
                .await
        }
        Commands::CopyBackup {
            instance,
            backup,
            source_backup,
            project_id,
        } => {
            app.copy_backup(&project_id, &instance, &backup, &source_backup)
                .await
        }
        Commands::GetBackup {
            instance,
            backup,
            project_id,
        } => app.get_backup(&project_id, &instance, &backup).await,
        Commands::ListBackups {
            instance,
            project_id,
            database,
        } => {
            app.list_backups(&project_id, &instance, database.as_deref())
                .await
        }
        Commands::UpdateBackupExpireTime {
            instance,
            backup,
            project_id,
        } => {
            app.update_backup_expire_time(&project_id, &instance, &backup)
                .await
        }
        Commands::RestoreBackup {
            instance,
            database,
            backup,
            project_id,
            kms_key,
        } => {
            app.restore_backup(&project_id, &instance, &database, &backup, kms_key.as_deref())
                .await
        }
        Commands::DeleteBackup {
            instance,
            backup,
            project_id,
        } => app.delete_backup(&project_id, &instance, &backup).await,
        Commands::ListBackupOperations {
            instance,
            database,
            project_id,
        } => {
            app.list_backup_operations(&project_id, &instance, &database)
                .await
        }
        Commands::ListDatabaseOperations {
            instance,
            project_id,
        } => app.list_database_operations(&project_id, &instance).await,
        Commands::GetIamPolicy {
            instance,
            database,
            project_id,
        } => app.get_iam_policy(&project_id, &instance, &database).await,
        Commands::AddIamMember {
            instance,
            database,
            project_id,
            role,
            member,
        } => {
            app.add_iam_member(&project_id, &instance, &database, &role, &member)
                .await
        }
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    // RUST_LOG wins over the verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(match verbose {
            0 => "spanner_admin=warn",
            1 => "spanner_admin=info",
            2 => "spanner_admin=debug",
            _ => "spanner_admin=trace",
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
