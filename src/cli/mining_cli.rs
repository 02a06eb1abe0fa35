use crate::core::{Block, Ledger};
use crate::crypto::keys::{encode_address, parse_owner};
use crate::{LedgerError, Result};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};

static PICKAXE: Emoji<'_, '_> = Emoji("⛏️ ", "");
static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "");

pub struct MiningCli {
    ledger: Arc<Ledger>,
}

impl MiningCli {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Mines `count` blocks one after another, each paying the reward to
    /// `reward_to` when given.
    pub async fn mine(&self, reward_to: Option<String>, count: u32) -> Result<()> {
        let reward_owner = reward_to.as_deref().map(parse_owner).transpose()?;
        let stats = self.ledger.mining_stats();

        println!("{}{}", PICKAXE, style("Mining").bold().green());
        match &reward_owner {
            Some(owner) => println!(
                "Reward: {} to {}",
                style(self.ledger.block_reward()).bold(),
                style(encode_address(owner)).bold().cyan()
            ),
            None => println!("Reward: none (empty blocks)"),
        }
        println!("Difficulty: {} bits", style(stats.difficulty_bits).bold());
        println!("Threads: {}", style(stats.threads).bold());

        for _ in 0..count {
            let ledger = self.ledger.clone();
            let owner = reward_owner;
            let block = with_spinner("Mining block...", move || match owner {
                Some(owner) => ledger.mine_block(owner.as_bytes()),
                None => ledger.mine_empty_block(),
            })
            .await?;

            println!(
                "{}Block {} mined: {} (nonce {})",
                CHECK,
                style(block.height).bold(),
                style(&block.hash).green(),
                block.nonce
            );
        }

        let stats = self.ledger.mining_stats();
        println!("{}Total hashes: {}", CHART, stats.total_hashes);
        println!("{}Last hashrate: {:.0} H/s", CHART, stats.last_hashrate);
        Ok(())
    }
}

/// Runs a blocking ledger operation behind a spinner.
pub(crate) async fn with_spinner<F>(message: &'static str, work: F) -> Result<Block>
where
    F: FnOnce() -> Result<Block> + Send + 'static,
{
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(spinner_style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LedgerError::Internal(format!("Mining task failed: {}", e)))?;

    pb.finish_and_clear();
    log::debug!("Block operation took {:.2}s", started.elapsed().as_secs_f64());
    result
}
