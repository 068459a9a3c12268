use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use poster_core::client::PostDraft;
use poster_core::config::Config;
use poster_core::feed::{self, PostView};
use poster_core::ledger::BlockTag;
use poster_core::logging::{init_logging_with, LogConfig, LogFormat, LogLevel};
use poster_core::metrics::init_metrics;
use poster_core::primitives::{format_chain_id, parse_chain_id, ChainId};
use poster_core::tag::hash_tag;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod dev_env;

use dev_env::DevEnv;

#[derive(Parser, Debug)]
#[command(name = "poster")]
#[command(author, version, about = "Tagged posts on an append-only ledger", long_about = None)]
struct Cli {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file; environment variables are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the development ledger journal
    #[arg(long, default_value = "./poster-data")]
    data_dir: PathBuf,

    /// Development account to act as
    #[arg(short, long, default_value = "alice")]
    account: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a post
    Post {
        content: String,
        tag: String,
        /// Network the wallet starts on (hex or decimal); defaults to the required one
        #[arg(long, value_parser = parse_chain_arg)]
        wallet_chain: Option<ChainId>,
    },
    /// Show the feed, newest first
    Feed {
        /// Only posts with this tag
        #[arg(short, long)]
        tag: Option<String>,
        /// Print posts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the topic a tag is indexed under
    HashTag { tag: String },
    /// Show the development account, its balance and nonce
    Accounts,
    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "poster.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_chain_arg(s: &str) -> Result<ChainId, String> {
    parse_chain_id(s).map_err(|e| e.to_string())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::from_env().context("failed to load configuration from environment")?,
    };
    Ok(config)
}

fn log_config(cli: &Cli, config: &Config) -> LogConfig {
    let mut log_config = config.logging;
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if cli.json_logs {
        log_config.format = LogFormat::Json;
    }
    log_config
}

fn render_post(post: &PostView) -> String {
    format!(
        "#{} {} by {}\n    tag {}\n    {}",
        post.block_number, post.transaction_hash, post.author, post.tag_hash, post.content
    )
}

async fn run_post(env: &DevEnv, content: String, tag: String, wallet_chain: Option<ChainId>) -> Result<String> {
    let wallet = env.wallet(wallet_chain.unwrap_or(env.config.network.chain_id));
    let (client, task) = env.client(wallet);

    let session = client.connect().await?;
    if !session.can_write() {
        let _ = client.connection().shutdown().await;
        bail!(
            "cannot post: wallet is {} (on {:?}, need {})",
            session.state,
            session.active_chain.map(format_chain_id),
            format_chain_id(session.required_chain)
        );
    }

    client.set_draft(PostDraft::new(content, tag)).await;
    let result = client.submit_post().await;
    let _ = client.connection().shutdown().await;
    let _ = task.await;

    let receipt = result?;
    Ok(format!(
        "posted in block {} (tx {}, fee {})",
        receipt.block_number, receipt.transaction_hash, receipt.fee
    ))
}

async fn run_feed(env: &DevEnv, tag: Option<&str>) -> Result<Vec<PostView>> {
    let entries = env.query().query_posts(BlockTag::Earliest, BlockTag::Latest).await?;
    let posts = feed::assemble(&entries);
    Ok(feed::filter(&posts, tag, &env.tag_index()))
}

async fn run_accounts(env: &DevEnv) -> String {
    format!(
        "{}  balance {}  nonce {}  on {}",
        env.account,
        env.ledger.balance(&env.account).await,
        env.ledger.nonce(&env.account).await,
        env.config.network.chain_id_hex()
    )
}

fn run_hash_tag(config: &Config, tag: &str) -> String {
    let index = poster_core::tag::TagIndex::new(config.client.tag_policy);
    let indexed = index.hash(tag);
    let raw = hash_tag(tag);
    if indexed == raw {
        format!("{}", indexed)
    } else {
        format!("{} ({} policy; verbatim text hashes to {})", indexed, index.policy(), raw)
    }
}

fn run_init_config(path: &Path, force: bool) -> Result<String> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to_file(path)?;
    Ok(format!("wrote default configuration to {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::InitConfig { path, force } = &cli.command {
        println!("{}", run_init_config(path, *force)?);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging_with(&log_config(&cli, &config))?;
    init_metrics();

    info!(chain = %config.network.chain_id_hex(), contract = %config.contract.address, "Poster CLI started");

    match cli.command {
        Command::Post { content, tag, wallet_chain } => {
            let env = DevEnv::open(config, &cli.data_dir, &cli.account).await?;
            println!("{}", run_post(&env, content, tag, wallet_chain).await?);
        }
        Command::Feed { tag, json } => {
            let env = DevEnv::open(config, &cli.data_dir, &cli.account).await?;
            let posts = run_feed(&env, tag.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else if posts.is_empty() {
                warn!("No posts found");
                println!("no posts");
            } else {
                for post in &posts {
                    println!("{}", render_post(post));
                }
            }
        }
        Command::HashTag { tag } => println!("{}", run_hash_tag(&config, &tag)),
        Command::Accounts => {
            let env = DevEnv::open(config, &cli.data_dir, &cli.account).await?;
            println!("{}", run_accounts(&env).await);
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
