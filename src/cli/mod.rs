//! Command-line interface for Vand.
//!
//! With no subcommand (or `serve`) the HTTP server starts. The remaining
//! subcommands work directly against the configured database:
//! - `account create <username>` - Provision a login account
//! - `account reactivate <username> [--staff]` - Lift an OTP lockout
//! - `catalog add-category <name>` - Add a menu category
//! - `catalog add-product <category> <name>` - Add a product to a category
//! - `catalog remove-category <slug>` - Remove an empty category
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::api::validation::{validate_email, validate_new_username, validate_password};
use crate::auth::hash_password;
use crate::catalog::{Catalog, CatalogRules, IconUpload};
use crate::config::Config;
use crate::db::{self, Account, NewAccount};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "vand")]
#[command(author, version, about = "Cafe menu and staff login service", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vand.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Whether this invocation should start the HTTP server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,

    /// Account provisioning
    #[command(subcommand)]
    Account(AccountCommands),

    /// Menu catalog management
    #[command(subcommand)]
    Catalog(CatalogCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Create a login account
    Create {
        username: String,
        #[arg(long)]
        email: Option<String>,
        /// Password (can also be set via VAND_ACCOUNT_PASSWORD env var)
        #[arg(long, env = "VAND_ACCOUNT_PASSWORD", hide_env_values = true)]
        password: String,
        /// Require an emailed login code
        #[arg(long)]
        staff: bool,
        /// Receive admin security alerts
        #[arg(long)]
        superuser: bool,
    },
    /// Re-enable an account locked out by failed login codes
    Reactivate {
        username: String,
        /// Give back the staff flag the lockout revoked
        #[arg(long)]
        staff: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    AddCategory {
        name: String,
        #[arg(long)]
        slug: Option<String>,
        /// Icon image file
        #[arg(long)]
        icon: Option<PathBuf>,
    },
    AddProduct {
        /// Slug of the category the product belongs to
        category: String,
        name: String,
        #[arg(long)]
        slug: Option<String>,
    },
    /// Remove a category that has no products
    RemoveCategory { slug: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Account(AccountCommands::Create {
            username,
            email,
            password,
            staff,
            superuser,
        })) => {
            cmd_account_create(
                config,
                username,
                email.as_deref(),
                password,
                *staff,
                *superuser,
            )
            .await
        }
        Some(Commands::Account(AccountCommands::Reactivate { username, staff })) => {
            cmd_account_reactivate(config, username, *staff).await
        }
        Some(Commands::Catalog(CatalogCommands::AddCategory { name, slug, icon })) => {
            cmd_add_category(config, name, slug.as_deref(), icon.as_deref()).await
        }
        Some(Commands::Catalog(CatalogCommands::AddProduct {
            category,
            name,
            slug,
        })) => cmd_add_product(config, category, name, slug.as_deref()).await,
        Some(Commands::Catalog(CatalogCommands::RemoveCategory { slug })) => {
            cmd_remove_category(config, slug).await
        }
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli, config),
        // Server startup is handled in main.rs
        Some(Commands::Serve) | None => Ok(()),
    }
}

async fn open_catalog(config: &Config) -> Result<Catalog> {
    let db = db::init(&config.server.database_path).await?;
    Ok(Catalog::new(db, CatalogRules::from(&config.catalog)))
}

async fn cmd_account_create(
    config: &Config,
    username: &str,
    email: Option<&str>,
    password: &str,
    staff: bool,
    superuser: bool,
) -> Result<()> {
    validate_new_username(username).map_err(anyhow::Error::msg)?;
    validate_password(password).map_err(anyhow::Error::msg)?;
    if let Some(email) = email {
        validate_email(email).map_err(anyhow::Error::msg)?;
    }
    if staff && email.is_none() {
        anyhow::bail!("Staff accounts need an email address to receive login codes");
    }

    let password_hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    let db = db::init(&config.server.database_path).await?;
    if Account::get_by_username(&db, username).await?.is_some() {
        anyhow::bail!("Account '{}' already exists", username);
    }

    let account = Account::create(
        &db,
        &NewAccount {
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash,
            is_staff: staff || superuser,
            is_superuser: superuser,
        },
    )
    .await
    .context("Failed to create account")?;

    println!("Created account {} ({})", account.username, account.id);
    Ok(())
}

async fn cmd_account_reactivate(config: &Config, username: &str, staff: bool) -> Result<()> {
    let db = db::init(&config.server.database_path).await?;
    if !Account::reactivate(&db, username, staff).await? {
        anyhow::bail!("Account '{}' not found or not locked", username);
    }
    if staff {
        println!("Reactivated account {} with staff access", username);
    } else {
        println!("Reactivated account {}", username);
    }
    Ok(())
}

async fn cmd_add_category(
    config: &Config,
    name: &str,
    slug: Option<&str>,
    icon: Option<&Path>,
) -> Result<()> {
    let upload = match icon {
        Some(path) => {
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to read icon {}", path.display()))?;
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("Icon path has no file name")?;
            Some(IconUpload {
                file_name: file_name.to_string(),
                size_bytes: metadata.len(),
            })
        }
        None => None,
    };

    let catalog = open_catalog(config).await?;
    let category = catalog
        .create_category(name, slug, upload.as_ref())
        .await?;
    println!("Created category {} ({})", category.name, category.slug);
    Ok(())
}

async fn cmd_add_product(
    config: &Config,
    category: &str,
    name: &str,
    slug: Option<&str>,
) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let product = catalog.create_product(category, name, slug).await?;
    println!("Created product {} ({})", product.name, product.slug);
    Ok(())
}

async fn cmd_remove_category(config: &Config, slug: &str) -> Result<()> {
    let catalog = open_catalog(config).await?;
    catalog.delete_category(slug).await?;
    println!("Removed category {}", slug);
    Ok(())
}

fn cmd_config_check(cli: &Cli, config: &Config) -> Result<()> {
    config.validate()?;
    println!("Configuration OK: {}", cli.config.display());
    println!("  Database:      {}", config.server.database_path.display());
    println!(
        "  Email:         {}",
        if config.email.is_configured() {
            "SMTP"
        } else {
            "log only"
        }
    );
    println!(
        "  Rate limiting: {}",
        if config.rate_limit.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}
