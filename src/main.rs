use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::validator::Validation;
use rand::RngCore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use calshare::auth::{TokenGenerator, hash_password, issue_token_with};
use calshare::config::ServerConfig;
use calshare::server::validation::{validate_email, validate_password};
use calshare::server::{AppState, create_router};
use calshare::store::{SqliteStore, Store};
use calshare::types::{ROLE_ADMIN, ROLE_USER, User};

const DEFAULT_ADMIN_EMAIL: &str = "admin@calshare.local";
const NOT_INITIALIZED: &str =
    "Server not initialized. Run 'calshare admin init' first to create the database and admin account.";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "calshare")]
#[command(about = "A calendar sharing server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// TOML config file. Flags override its values.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database, admin account and admin token)
    Init {
        /// Data directory for the database
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Email of the admin account
        #[arg(long)]
        email: Option<String>,

        /// Skip interactive prompts. A random password is generated.
        #[arg(long)]
        non_interactive: bool,
    },
}

fn generate_password() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn prompt_credentials(email: Option<String>) -> anyhow::Result<(String, String)> {
    let email = match email {
        Some(email) => email,
        None => inquire::Text::new("Admin email:")
            .with_default(DEFAULT_ADMIN_EMAIL)
            .with_validator(|input: &str| {
                Ok(match validate_email(input) {
                    Ok(()) => Validation::Valid,
                    Err(e) => Validation::Invalid(e.message.into()),
                })
            })
            .prompt()?,
    };

    let password = inquire::Password::new("Admin password:")
        .with_validator(|input: &str| {
            Ok(match validate_password(input) {
                Ok(()) => Validation::Valid,
                Err(e) => Validation::Invalid(e.message.into()),
            })
        })
        .prompt()?;

    Ok((email, password))
}

fn run_init(data_dir: PathBuf, email: Option<String>, non_interactive: bool) -> anyhow::Result<()> {
    fs::create_dir_all(&data_dir)?;

    let config = ServerConfig {
        data_dir,
        ..ServerConfig::default()
    };

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = config.admin_token_path();

    if store.has_user_with_role(ROLE_ADMIN)? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let (email, password, generated) = if non_interactive {
        let email = email.unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());
        (email, generate_password(), true)
    } else {
        let (email, password) = prompt_credentials(email)?;
        (email, password, false)
    };

    if let Err(e) = validate_email(&email) {
        bail!("{}", e.message);
    }

    let now = Utc::now();
    let admin = User {
        id: Uuid::new_v4().to_string(),
        email,
        name: "Administrator".to_string(),
        password_hash: hash_password(&password)?,
        active: true,
        roles: BTreeSet::from([ROLE_USER.to_string(), ROLE_ADMIN.to_string()]),
        created_at: now,
        updated_at: now,
    };
    store.create_user(&admin)?;

    let generator = TokenGenerator::new();
    let (_token, raw_token) = issue_token_with(&store, &generator, &admin.id, None)?;

    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin account: {}", admin.email);
    if generated {
        println!("Generated password: {password}");
    }
    println!();
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }

    if !config.db_path().exists() {
        bail!(NOT_INITIALIZED);
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_user_with_role(ROLE_ADMIN)? {
        bail!(NOT_INITIALIZED);
    }

    let token_file = config.admin_token_path();
    if token_file.exists() {
        info!("Admin token available at {}", token_file.display());
    }

    let state = Arc::new(AppState::new(Arc::new(store), &config));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("calshare=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                email,
                non_interactive,
            } => {
                run_init(data_dir, email, non_interactive)?;
            }
        },
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            run_serve(config, host, port, data_dir).await?;
        }
    }

    Ok(())
}
