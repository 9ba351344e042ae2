use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kvsession_core::backend;
use kvsession_core::codec::generate_random_key;
use kvsession_core::config::{self, Config, KeyPairConfig};
use kvsession_core::session::KvStore;

#[derive(Parser)]
#[command(
    name = "kvsession",
    about = "Cookie-identified sessions persisted in a key-value backend",
    version = kvsession_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.kvsession/config.json)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo session endpoints (/incr, /logout, /health)
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default config with freshly generated keys
    Init {
        /// Also generate a block key so cookies are encrypted
        #[arg(long)]
        encrypt: bool,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Probe the configured backend
    Ping,
    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kvsession=info".parse()?)
                .add_directive("kvsession_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(load(&cli.config), host, port).await?,
        Commands::Init { encrypt, force } => cmd_init(cli.config.as_deref(), encrypt, force)?,
        Commands::Ping => cmd_ping(load(&cli.config)).await?,
        Commands::Status => cmd_status(cli.config.as_deref(), load(&cli.config)),
    }

    Ok(())
}

/// An explicit config file wins; otherwise the environment overlays the default file.
fn load(path: &Option<std::path::PathBuf>) -> Config {
    match path {
        Some(path) => config::load_config(Some(path)),
        None => config::load_config_from_env(),
    }
}

async fn build_store(cfg: &Config) -> Result<KvStore> {
    let key_pairs = cfg.key_pairs()?;
    let backend = backend::connect(&cfg.backend).await?;
    let store = KvStore::from_config(backend, &cfg.store, &key_pairs).await?;
    Ok(store)
}

// ====== Commands ======

#[cfg(feature = "http-api")]
async fn cmd_serve(cfg: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    use std::sync::Arc;

    use kvsession_core::service::http::{serve, AppState};

    let addr = format!(
        "{}:{}",
        host.as_deref().unwrap_or(&cfg.server.host),
        port.unwrap_or(cfg.server.port)
    );
    let store = build_store(&cfg).await?;
    tracing::info!(
        "Sessions in {} backend with prefix {:?}",
        cfg.backend.kind,
        store.key_prefix()
    );
    serve(&addr, Arc::new(AppState::new(store, cfg))).await
}

#[cfg(not(feature = "http-api"))]
async fn cmd_serve(_cfg: Config, _host: Option<String>, _port: Option<u16>) -> Result<()> {
    anyhow::bail!("this build does not include the HTTP API (enable the `http-api` feature)")
}

fn cmd_init(path: Option<&std::path::Path>, encrypt: bool, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let mut cfg = Config::default();
    cfg.keys.push(KeyPairConfig {
        hash_key: hex::encode(generate_random_key(64)),
        block_key: encrypt.then(|| hex::encode(generate_random_key(32))),
    });
    config::save_config(&cfg, Some(&config_path))?;

    println!("Created config at {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Pick a backend in {}", config_path.display());
    println!("  2. Check it: kvsession ping");
    println!("  3. Run the demo: kvsession serve");
    Ok(())
}

async fn cmd_ping(cfg: Config) -> Result<()> {
    let backend = backend::connect(&cfg.backend).await?;
    let started = Instant::now();
    let reply = backend.ping().await?;
    println!(
        "{} backend replied {:?} in {:?}",
        cfg.backend.kind,
        reply,
        started.elapsed()
    );
    if reply != backend::PONG {
        anyhow::bail!("unexpected ping reply: {reply:?}");
    }
    Ok(())
}

fn cmd_status(path: Option<&std::path::Path>, cfg: Config) {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(config::get_config_path);

    println!("kvsession Status\n");
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Backend: {}", cfg.backend.kind);
    match cfg.backend.kind {
        config::BackendKind::Redis => println!("Redis URL: {}", cfg.backend.redis_url),
        config::BackendKind::Dynamodb => println!("DynamoDB table: {}", cfg.backend.table_name),
        config::BackendKind::Memory => {}
    }
    println!("Key prefix: {:?}", cfg.store.key_prefix);
    println!("Serializer: {}", cfg.store.serializer);
    println!("Cookie max age: {}s", cfg.store.max_age);
    println!("Default record TTL: {}s", cfg.store.default_max_age);
    println!(
        "Max payload: {}",
        if cfg.store.max_length == 0 {
            "unlimited".to_string()
        } else {
            format!("{} bytes", cfg.store.max_length)
        }
    );
    match cfg.key_pairs() {
        Ok(pairs) => println!(
            "Keys: {} ({} encrypted)",
            pairs.len(),
            pairs.iter().filter(|p| p.block_key.is_some()).count()
        ),
        Err(e) => println!("Keys: ✗ {}", e),
    }
}
