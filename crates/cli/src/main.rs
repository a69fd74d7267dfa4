use clap::{Parser, Subcommand};
use lib::bridge::Bridge;
use lib::channels::{TelegramChannel, ZulipClient};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "telezulip")]
#[command(about = "Forward matching Zulip messages to a Telegram chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write an example config file (Zulip and Telegram credentials, filter patterns).
    Init {
        /// Config path (default: TELEZULIP_CONFIG_PATH, ./config.json, or ~/.telezulip/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Load and validate the config, then print the filter summary.
    Check {
        /// Config path (default: TELEZULIP_CONFIG_PATH, ./config.json, or ~/.telezulip/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the forwarder until the process is stopped.
    Run {
        /// Config path (default: TELEZULIP_CONFIG_PATH, ./config.json, or ~/.telezulip/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("telezulip {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_bridge(config).await {
                log::error!("forwarder failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    lib::init::init_config(&path)?;
    println!("config at {}; fill in the credentials before `telezulip run`", path.display());
    Ok(())
}

fn run_check(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let creds = config.validate()?;
    println!("config OK: {}", path.display());
    println!("zulip: {} on {}", creds.zulip_email, creds.zulip_site);
    println!("telegram chat: {}", creds.telegram_chat_id);
    let filter = &config.message_filter;
    if filter.enabled {
        println!("message filtering is enabled ({} pattern(s))", filter.patterns.len());
        for p in &filter.patterns {
            println!("- '{}' => {}", p.match_text, p.template());
        }
    } else {
        println!("message filtering is disabled; nothing will be forwarded");
    }
    Ok(())
}

async fn run_bridge(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let creds = config.validate()?;
    log::info!("loaded config from {}", path.display());

    let zulip = ZulipClient::new(creds.zulip_email, creds.zulip_api_key, &creds.zulip_site);
    let parse_mode = lib::config::resolve_parse_mode(&config);
    let escape_html = parse_mode
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("HTML"));
    let telegram = TelegramChannel::new(creds.telegram_token, creds.telegram_chat_id, parse_mode);
    let mut bridge = Bridge::new(
        Arc::new(zulip),
        Arc::new(telegram),
        config.message_filter,
    )
    .with_html_escaping(escape_html);
    bridge.run().await;
    Ok(())
}
