use crate::api::rest::RestApi;
use crate::cli::mining_cli::MiningCli;
use crate::cli::wallet_cli::WalletCli;
use crate::config::Config;
use crate::core::{Chain, Ledger};
use crate::crypto::hash::Hash160;
use crate::crypto::keys::{encode_address, parse_owner};
use crate::crypto::signatures::Secp256k1Verifier;
use crate::mining::{Miner, ProofOfWork};
use crate::storage::{BlobStore, Database};
use crate::wallet::WalletStore;
use crate::{LedgerError, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "ledgerd")]
#[command(about = "Single-node proof-of-work ledger")]
#[command(version)]
#[command(long_about = "
⛓️  pow-ledger node

A single-node ledger of hash-linked blocks:
- SHA-256 proof of work at a fixed difficulty
- UTXO-based transactions signed with secp256k1
- Incrementally maintained, rebuildable UTXO index
- REST API for chain queries, mining and transfers
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Data directory")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "REST API port")]
    pub port: Option<u16>,

    #[arg(long, help = "Proof-of-work difficulty in leading zero bits")]
    pub difficulty: Option<u32>,

    #[arg(long, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory and the genesis block
    Init,

    /// Run the node with its REST API
    Start {
        #[arg(long, help = "Mine continuously, paying rewards to this owner hash or address")]
        mine_to: Option<String>,
    },

    /// Blockchain information commands
    #[command(subcommand)]
    Chain(ChainCommands),

    /// Mine blocks
    Mine {
        #[arg(long, help = "Owner hash or address paid the block reward (empty blocks if omitted)")]
        reward_to: Option<String>,
        #[arg(long, default_value_t = 1, help = "Number of blocks to mine")]
        count: u32,
    },

    /// Show the balance of an owner hash or address
    Balance { owner: String },

    /// List unspent outputs of an owner hash or address
    Utxos { owner: String },

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Database maintenance commands
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand)]
pub enum ChainCommands {
    /// Show blockchain information
    Info,

    /// Show one block
    Block {
        height: u64,
        #[arg(long, help = "Show transaction details")]
        verbose: bool,
    },

    /// List recent blocks
    Blocks {
        #[arg(long, help = "Number of blocks to show")]
        count: Option<usize>,
        #[arg(long, help = "Starting from height")]
        from: Option<u64>,
    },

    /// Verify the persisted chain block by block
    Validate,

    /// Rebuild the UTXO index from the chain
    Rebuild,
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create { name: String },

    /// Import a wallet from a private key (WIF format)
    Import {
        name: String,
        #[arg(long, help = "Private key in WIF format")]
        wif: String,
    },

    /// List all wallets
    List,

    /// Delete a wallet and its private key
    Delete { name: String },

    /// Show wallet information
    Show {
        name: String,
        #[arg(long, help = "Also print the private key")]
        export: bool,
    },

    /// Get wallet balance
    Balance {
        name: String,
        #[arg(long, help = "Show detailed UTXO breakdown")]
        detailed: bool,
    },

    /// Spend outputs owned by a wallet and mine the transaction into a block
    Send {
        wallet: String,
        #[arg(long = "input", required = true, value_name = "TXID:INDEX", help = "Output to spend (repeatable)")]
        inputs: Vec<String>,
        #[arg(long = "to", required = true, value_name = "OWNER:AMOUNT", help = "Recipient and amount (repeatable)")]
        outputs: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Show database statistics
    Stats,
}

/// An opened node: the database plus the ledger service over it.
pub struct Node {
    pub db: Arc<Database>,
    pub ledger: Arc<Ledger>,
}

impl Node {
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let db = open_database(config)?;
        let pow = ProofOfWork::new(config.mining.difficulty_bits)?;

        let store: Arc<dyn BlobStore> = db.clone();
        let chain = Chain::open(store, pow, &config.genesis_config()?, Arc::new(Secp256k1Verifier::new()))?;
        let miner = Miner::new(pow, config.mining.threads);
        let ledger = Arc::new(Ledger::new(chain, miner, config.mining.block_reward));

        Ok(Self { db, ledger })
    }

    pub fn wallets(&self) -> WalletStore {
        WalletStore::new(self.db.clone())
    }

    pub fn close(&self) -> Result<()> {
        self.ledger.close()?;
        self.db.flush()
    }
}

fn open_database(config: &Config) -> anyhow::Result<Arc<Database>> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    Ok(Arc::new(Database::new(config.database_path())?))
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging once
    let filter = if cli.debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).try_init();

    // Override config with CLI arguments
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(port) = cli.port {
        config.api.rest_port = port;
    }
    if let Some(bits) = cli.difficulty {
        config.mining.difficulty_bits = bits;
    }

    match &cli.command {
        Commands::Chain(ChainCommands::Validate) => return validate_stored(&config),
        Commands::Db(db_cmd) => return handle_db_command(&config, db_cmd),
        _ => {}
    }

    let node = Node::open(&config)?;

    let outcome = match cli.command {
        Commands::Init => init_node(&node),
        Commands::Start { mine_to } => start_node(&config, &node, mine_to).await,
        Commands::Chain(chain_cmd) => handle_chain_command(&node, chain_cmd),
        Commands::Mine { reward_to, count } => MiningCli::new(node.ledger.clone()).mine(reward_to, count).await,
        Commands::Balance { owner } => show_balance(&node, &owner),
        Commands::Utxos { owner } => show_utxos(&node, &owner),
        Commands::Wallet(wallet_cmd) => {
            WalletCli::new(node.wallets(), node.ledger.clone())
                .handle_command(wallet_cmd)
                .await
        }
        Commands::Db(_) => Ok(()),
    };

    node.close()?;
    Ok(outcome?)
}

fn init_node(node: &Node) -> Result<()> {
    let info = node.ledger.info()?;

    println!("✅ Ledger initialized");
    println!("📦 Genesis block: {}", node.ledger.get_block(0)?.map(|b| b.hash).unwrap_or_default());
    println!("⛓️  Height: {}", info.height);
    println!("🎯 Difficulty: {} bits", info.difficulty_bits);
    println!("💰 Supply: {}", info.total_supply);
    println!();
    println!("🚀 Use 'ledgerd start' to run the node.");
    Ok(())
}

async fn start_node(config: &Config, node: &Node, mine_to: Option<String>) -> Result<()> {
    println!("🚀 Starting pow-ledger node...");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    if config.api.enable_rest {
        let rest_api = RestApi::new(node.ledger.clone(), Some(node.wallets()), config.api.clone());
        let mut shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            let signal = async move {
                let _ = shutdown.changed().await;
            };
            if let Err(e) = rest_api.start(signal).await {
                log::error!("REST API error: {}", e);
            }
        }));
        println!("🔗 REST API: http://localhost:{}", config.api.rest_port);
    }

    if let Some(owner) = mine_to {
        let owner = parse_owner(&owner)?;
        let ledger = node.ledger.clone();
        println!("⛏️  Mining to {}", style(encode_address(&owner)).bold().cyan());
        handles.push(tokio::task::spawn_blocking(move || mine_continuously(&ledger, owner)));
    }

    println!("✅ Node started. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;

    println!("\n🛑 Shutting down...");
    node.ledger.cancel_mining();
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("Node task failed: {}", e);
        }
    }

    println!("✅ Node stopped gracefully.");
    Ok(())
}

/// Mines reward blocks until mining is cancelled.
fn mine_continuously(ledger: &Ledger, owner: Hash160) {
    loop {
        match ledger.mine_block(owner.as_bytes()) {
            Ok(block) => log::info!("⛏️ Mined block {} ({})", block.height, block.hash),
            Err(LedgerError::MiningCancelled) => break,
            Err(e) => {
                log::error!("Mining stopped: {}", e);
                break;
            }
        }
    }
}

fn handle_chain_command(node: &Node, cmd: ChainCommands) -> Result<()> {
    let ledger = &node.ledger;

    match cmd {
        ChainCommands::Info => {
            let info = ledger.info()?;
            println!("⛓️  Blockchain Information:");
            println!("Height: {}", info.height);
            println!("Tip hash: {}", info.tip);
            println!("Blocks: {}", info.block_count);
            println!("Unspent outputs: {}", info.utxo_count);
            println!("Total supply: {}", info.total_supply);
            println!("Difficulty: {} bits", info.difficulty_bits);
            if info.degraded {
                println!("{}", style("Persistence degraded: changes are held in memory only").bold().red());
            }
        }

        ChainCommands::Block { height, verbose } => match ledger.get_block(height)? {
            Some(block) => {
                println!("📦 Block Information:");
                println!("Hash: {}", block.hash);
                println!("Height: {}", block.height);
                println!("Previous hash: {}", block.prev_hash);
                println!("Timestamp: {}", block.timestamp);
                println!("Nonce: {}", block.nonce);
                println!("Merkle root: {}", block.merkle_root());
                println!("Transactions: {}", block.transaction_count());
                println!("Size: {} bytes", block.size());

                if verbose {
                    for (i, tx) in block.transactions.iter().enumerate() {
                        println!("  Transaction {}: {}", i, tx.id().unwrap_or("<unassigned>"));
                        for output in &tx.outputs {
                            println!("    -> {} {}", hex::encode(&output.owner_hash), output.value);
                        }
                    }
                }
            }
            None => println!("❌ Block not found"),
        },

        ChainCommands::Blocks { count, from } => {
            let blocks = ledger.get_chain()?;
            let count = count.unwrap_or(10);
            let start = from.unwrap_or_else(|| (blocks.len() as u64).saturating_sub(count as u64));

            println!("📦 Blocks:");
            for block in blocks.iter().skip(start as usize).take(count) {
                println!("  {}: {} (txs: {})", block.height, block.hash, block.transaction_count());
            }
        }

        ChainCommands::Validate => {
            // Handled before the chain is opened.
        }

        ChainCommands::Rebuild => {
            println!("🔄 Rebuilding UTXO index...");
            let count = ledger.rebuild_utxo()?;
            println!("✅ UTXO index rebuilt: {} unspent outputs", count);
        }
    }

    Ok(())
}

fn validate_stored(config: &Config) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let pow = ProofOfWork::new(config.mining.difficulty_bits)?;

    println!("🔍 Validating persisted chain...");
    match Chain::verify_stored(db.as_ref(), &pow) {
        Ok(blocks) => println!("✅ Chain is valid ({} blocks)", blocks),
        Err(LedgerError::ConsensusViolation { height, reason }) => {
            println!("{} Invalid block at height {}: {}", style("❌").red(), height, reason);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn show_balance(node: &Node, owner: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let balance = node.ledger.balance(owner.as_bytes())?;

    println!("Address: {}", style(encode_address(&owner)).bold().green());
    println!("Owner hash: {}", owner);
    println!("Balance: {}", style(balance).bold());
    Ok(())
}

fn show_utxos(node: &Node, owner: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let utxos = node.ledger.utxos(owner.as_bytes())?;

    println!("Unspent outputs of {}:", style(encode_address(&owner)).bold().green());
    if utxos.is_empty() {
        println!("  (none)");
    }
    for record in utxos {
        println!("  {}:{}  {}", record.txid, record.index, record.value);
    }
    Ok(())
}

fn handle_db_command(config: &Config, cmd: &DbCommands) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Stats => {
            let db = open_database(config)?;
            let stats = db.get_database_stats()?;

            println!("📊 Database Statistics:");
            println!("Chain size: {} KB", stats.chain_size / 1024);
            println!("UTXO snapshot size: {} KB", stats.utxo_size / 1024);
            println!("Wallets count: {}", stats.wallet_count);
            println!("Total size: {} KB", stats.total_size / 1024);
        }
    }

    Ok(())
}
