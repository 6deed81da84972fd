//! Command-line interface for the zgate Z-Wave gateway.
//!
//! Offline maintenance of the gateway state: postfix rules, the SmartStart
//! provisioning list and the configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use zgate_core::GatewayConfig;
use zgate_storage::{ObjectStore, RedbObjectStore};
use zgate_zwave::postfix::{Directive, PreInterviewCall};
use zgate_zwave::{DeviceIdentity, DskCollection, FixRecord, PostfixStore, QrCode};

/// zgate - Z-Wave command classes as virtual devices.
#[derive(Parser, Debug)]
#[command(name = "zgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Postfix rule management.
    Postfix {
        #[command(subcommand)]
        cmd: PostfixCommand,
    },
    /// SmartStart provisioning list.
    Dsk {
        #[command(subcommand)]
        cmd: DskCommand,
    },
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PostfixCommand {
    /// List the merged fixes (built-in plus custom).
    List {
        /// Only the custom overlay.
        #[arg(long)]
        custom: bool,
    },
    /// Show the fixes applied to a product, least specific first.
    Lookup {
        manufacturer_id: i64,
        product_type: i64,
        product_id: i64,
        /// Application major version.
        #[arg(long, default_value_t = 0)]
        major: i64,
        /// Application minor version.
        #[arg(long, default_value_t = 0)]
        minor: i64,
    },
    /// Add or extend a custom fix.
    Add {
        /// `manufacturer[.productType.productId[.major[.minor]]]`
        p_id: String,
        /// Pre-interview call, may be repeated.
        #[arg(long = "pre")]
        pre_interview: Vec<String>,
        /// Post-interview directive, may be repeated.
        #[arg(long = "post")]
        post_interview: Vec<String>,
    },
    /// Remove a custom fix.
    Remove { p_id: String },
    /// Parse a post-interview directive and print it.
    Check { entry: String },
}

#[derive(Subcommand, Debug)]
enum DskCommand {
    /// Decode a QR code without storing it.
    Parse { qr: String },
    /// Provision a node from a QR code or DSK.
    Add {
        input: String,
        /// Name given to the node once included.
        #[arg(long)]
        name: Option<String>,
    },
    /// List provisioning entries.
    List,
    /// Remove a provisioning entry.
    Remove { id: u32 },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration and print the effective values.
    Check,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let json_logging = std::env::var("ZGATE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if args.verbose { "zgate=debug" } else { "zgate=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }

    let config = GatewayConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    match args.command {
        Command::Postfix { cmd } => run_postfix_cmd(&config, cmd),
        Command::Dsk { cmd } => run_dsk_cmd(&config, cmd),
        Command::Config { cmd } => run_config_cmd(&config, cmd),
    }
}

fn open_store(config: &GatewayConfig) -> Result<Arc<dyn ObjectStore>> {
    let path = config.store_path();
    let store = RedbObjectStore::open(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_postfix_cmd(config: &GatewayConfig, cmd: PostfixCommand) -> Result<()> {
    let open = || -> Result<PostfixStore> {
        Ok(PostfixStore::open(config.postfix_file.as_deref(), open_store(config)?)?)
    };
    match cmd {
        PostfixCommand::Check { entry } => {
            let directive = Directive::parse(&entry)?;
            println!("{:?}", directive);
        }
        PostfixCommand::List { custom } => {
            let store = open()?;
            let fixes = if custom {
                store.custom().fixes
            } else {
                store.fixes()
            };
            for fix in &fixes {
                println!(
                    "{:<24} pre={} post={}",
                    fix.p_id,
                    fix.pre_interview().len(),
                    fix.post_interview().len()
                );
            }
            eprintln!("{} fixes", fixes.len());
        }
        PostfixCommand::Lookup {
            manufacturer_id,
            product_type,
            product_id,
            major,
            minor,
        } => {
            let identity = DeviceIdentity {
                manufacturer_id,
                product_type,
                product_id,
                app_major: major,
                app_minor: minor,
            };
            print_json(&open()?.lookup(&identity))?;
        }
        PostfixCommand::Add {
            p_id,
            pre_interview,
            post_interview,
        } => {
            for entry in &pre_interview {
                PreInterviewCall::parse(entry)?;
            }
            for entry in &post_interview {
                Directive::parse(entry)?;
            }
            let mut fix = FixRecord::new(p_id);
            if !pre_interview.is_empty() {
                fix = fix.with_pre_interview(pre_interview);
            }
            if !post_interview.is_empty() {
                fix = fix.with_post_interview(post_interview);
            }
            print_json(&open()?.add(fix)?)?;
        }
        PostfixCommand::Remove { p_id } => {
            let removed = open()?.remove(&p_id)?;
            println!("Removed postfix {}", removed.p_id);
        }
    }
    Ok(())
}

fn run_dsk_cmd(config: &GatewayConfig, cmd: DskCommand) -> Result<()> {
    let open = || -> Result<DskCollection> { Ok(DskCollection::open(open_store(config)?, None)?) };
    match cmd {
        DskCommand::Parse { qr } => print_json(&QrCode::parse(&qr)?)?,
        DskCommand::Add { input, name } => {
            let collection = open()?;
            let mut entry = collection.add(&input)?;
            if name.is_some() {
                entry.given_name = name;
                entry = collection.update(entry)?;
            }
            print_json(&entry)?;
        }
        DskCommand::List => {
            for entry in open()?.list() {
                println!(
                    "{:>3}  {:<8} {}  {}",
                    entry.id,
                    entry.state.as_str(),
                    entry.dsk,
                    entry.given_name.as_deref().unwrap_or("-")
                );
            }
        }
        DskCommand::Remove { id } => {
            let removed = open()?.remove(id)?;
            println!("Removed DSK {}", removed.dsk);
        }
    }
    Ok(())
}

fn run_config_cmd(config: &GatewayConfig, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Check => {
            config.validate()?;
            print!("{}", toml::to_string_pretty(config)?);
            describe_store(&config.store_path());
        }
    }
    Ok(())
}

fn describe_store(path: &Path) {
    if path.exists() {
        eprintln!("Store: {}", path.display());
    } else {
        eprintln!("Store: {} (not created yet)", path.display());
    }
}
