use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hasura_migrate::migration::MigrationDirection;
use hasura_migrate::version::detect_capability;
use hasura_migrate::{
    apply_migrations, apply_seeds, create_migration, create_seed, migration_status, read_config,
    ApplyOptions, ApplyResult, CreateMigrationOptions, Driver, FileSource, HttpTransport,
    MetadataClient, MigrationTarget, ProjectConfig, SeedTarget, ServerCapability, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Migration, seed and metadata client for a GraphQL engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory holding config.yaml
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// GraphQL engine endpoint
    #[arg(long, global = true, env = "HASURA_GRAPHQL_ENDPOINT")]
    endpoint: Option<String>,

    /// Admin secret sent as X-Hasura-Admin-Secret
    #[arg(long, global = true, env = "HASURA_GRAPHQL_ADMIN_SECRET", hide_env_values = true)]
    admin_secret: Option<String>,

    /// Skip server version detection
    #[arg(long, global = true, env = "HASURA_SERVER_CAPABILITY")]
    server_capability: Option<ServerCapability>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage migrations
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Manage seed data
    #[command(subcommand)]
    Seed(SeedCommand),
    /// Manage metadata
    #[command(subcommand)]
    Metadata(MetadataCommand),
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply or roll back migrations
    Apply(ApplyArgs),
    /// Show which migrations are present locally and applied on the server
    Status,
    /// Create a new migration
    Create {
        name: String,
        #[arg(long, default_value = "")]
        up_sql: String,
        #[arg(long)]
        down_sql: Option<String>,
    },
    /// Read a migration setting
    GetSetting { name: String },
    /// Change a migration setting
    SetSetting { name: String, value: String },
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Apply all pending migrations, or the next N
    #[arg(long, value_name = "N|all", conflicts_with_all = ["down", "goto", "version"])]
    up: Option<String>,

    /// Roll back all applied migrations, or the last N
    #[arg(long, value_name = "N|all", conflicts_with_all = ["goto", "version"])]
    down: Option<String>,

    /// Migrate up or down until this version
    #[arg(long, conflicts_with = "version")]
    goto: Option<u64>,

    /// Apply or roll back only this version
    #[arg(long)]
    version: Option<u64>,

    /// Direction for --version: up (default) or down
    #[arg(long = "type")]
    direction: Option<String>,

    /// Only record the versions, do not run the files
    #[arg(long)]
    skip_execution: bool,

    /// Print what would be applied
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum SeedCommand {
    /// Apply all seed files, or a single one
    Apply {
        #[arg(long)]
        file: Option<String>,
    },
    /// Create a new seed file
    Create {
        name: String,
        #[arg(long, default_value = "")]
        content: String,
    },
}

#[derive(Subcommand, Debug)]
enum MetadataCommand {
    /// Export server metadata to the metadata directory
    Export,
    /// Replace server metadata with the exported file
    Apply,
    /// Reload metadata on the server
    Reload,
    /// List inconsistent metadata objects
    Inconsistency,
}

fn parse_count(value: &str) -> Result<Option<usize>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    let count = value
        .parse::<usize>()
        .with_context(|| format!("expected a number or 'all', got {}", value))?;
    Ok(Some(count))
}

fn target(args: &ApplyArgs) -> Result<MigrationTarget> {
    if let Some(up) = &args.up {
        return Ok(MigrationTarget::Up(parse_count(up)?));
    }
    if let Some(down) = &args.down {
        return Ok(MigrationTarget::Down(parse_count(down)?));
    }
    if let Some(goto) = args.goto {
        return Ok(MigrationTarget::Goto(goto));
    }
    if let Some(version) = args.version {
        let direction = match args.direction.as_deref().unwrap_or("up") {
            "up" => MigrationDirection::Up,
            "down" => MigrationDirection::Down,
            other => bail!("--type must be up or down, got {}", other),
        };
        return Ok(MigrationTarget::Version(version, direction));
    }
    Ok(MigrationTarget::Up(None))
}

async fn load_config(cli: &Cli) -> Result<ProjectConfig> {
    let mut config = read_config(&cli.project)
        .await
        .context("failed to read config.yaml")?
        .unwrap_or_default();

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(secret) = &cli.admin_secret {
        config.admin_secret = Some(secret.clone());
    }
    if cli.timeout_secs.is_some() {
        config.timeout_secs = cli.timeout_secs;
    }

    config.validate()?;
    Ok(config)
}

fn print_migrations(result: &ApplyResult) {
    if result.migrations.is_empty() {
        println!("Nothing to apply");
        return;
    }
    println!("{:<16} {:<40} {}", "VERSION", "NAME", "DIRECTION");
    for migration in &result.migrations {
        println!(
            "{:<16} {:<40} {}",
            migration.version,
            migration.name.as_deref().unwrap_or("-"),
            migration.direction
        );
    }
}

async fn run_migrate(
    command: &MigrateCommand,
    cli: &Cli,
    config: &ProjectConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let migrations_dir = config.migrations_path(&cli.project);

    match command {
        MigrateCommand::Create {
            name,
            up_sql,
            down_sql,
        } => {
            let result = create_migration(
                &migrations_dir,
                CreateMigrationOptions {
                    name: name.clone(),
                    up_sql: up_sql.clone(),
                    down_sql: down_sql.clone(),
                    version: None,
                },
            )
            .await?;
            println!("{}", result.version);
        }
        MigrateCommand::Apply(args) => {
            let target = target(args)?;
            let source = FileSource::open(&migrations_dir).await?;
            let mut driver = Driver::open(transport, config, cli.server_capability).await?;

            let result = apply_migrations(
                &mut driver,
                &source,
                target,
                ApplyOptions {
                    dry_run: args.dry_run,
                    skip_execution: args.skip_execution,
                },
            )
            .await?;

            if result.dry_run {
                print_migrations(&result);
            } else {
                info!(count = result.migrations.len(), "Done");
            }
        }
        MigrateCommand::Status => {
            let source = FileSource::open(&migrations_dir).await?;
            let driver = Driver::open(transport, config, cli.server_capability).await?;

            println!(
                "{:<16} {:<40} {:<16} {}",
                "VERSION", "NAME", "SOURCE STATUS", "DATABASE STATUS"
            );
            for row in migration_status(&source, driver.applied()) {
                println!(
                    "{:<16} {:<40} {:<16} {}",
                    row.version,
                    row.name.as_deref().unwrap_or("-"),
                    if row.source_present { "Present" } else { "Not Present" },
                    if row.database_present { "Present" } else { "Not Present" },
                );
            }
        }
        MigrateCommand::GetSetting { name } => {
            let mut driver = Driver::open(transport, config, cli.server_capability).await?;
            println!("{}", driver.get_setting(name).await?);
        }
        MigrateCommand::SetSetting { name, value } => {
            let mut driver = Driver::open(transport, config, cli.server_capability).await?;
            driver.update_setting(name, value).await?;
        }
    }
    Ok(())
}

async fn run_seed(
    command: &SeedCommand,
    cli: &Cli,
    config: &ProjectConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let seeds_dir = config.seeds_path(&cli.project);

    match command {
        SeedCommand::Create { name, content } => {
            let path = create_seed(&seeds_dir, name, content).await?;
            println!("{}", path.display());
        }
        SeedCommand::Apply { file } => {
            let capability = detect_capability(
                transport.as_ref(),
                &config.api_paths.version,
                cli.server_capability,
            )
            .await?;
            let target = SeedTarget::new(capability, config);
            let result = apply_seeds(transport.as_ref(), &target, &seeds_dir, file.as_deref()).await?;
            info!(count = result.files.len(), "Seeds applied");
        }
    }
    Ok(())
}

async fn run_metadata(
    command: &MetadataCommand,
    cli: &Cli,
    config: &ProjectConfig,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let client = MetadataClient::new(transport, config.api_paths.metadata.clone());
    let metadata_dir = config.metadata_path(&cli.project);

    match command {
        MetadataCommand::Export => {
            let path = client.export_to_dir(&metadata_dir).await?;
            println!("{}", path.display());
        }
        MetadataCommand::Apply => client.apply_from_dir(&metadata_dir).await?,
        MetadataCommand::Reload => client.reload_metadata().await?,
        MetadataCommand::Inconsistency => {
            let result = client.inconsistent_metadata().await?;
            if result.is_consistent {
                println!("Metadata is consistent");
            } else {
                println!("{}", serde_json::to_string_pretty(&result.inconsistent_objects)?);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli).await?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(&config)?);

    match &cli.command {
        Command::Migrate(command) => run_migrate(command, &cli, &config, transport).await,
        Command::Seed(command) => run_seed(command, &cli, &config, transport).await,
        Command::Metadata(command) => run_metadata(command, &cli, &config, transport).await,
    }
}
