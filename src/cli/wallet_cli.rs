use crate::cli::commands::WalletCommands;
use crate::cli::mining_cli::with_spinner;
use crate::core::{Amount, Ledger, OutPoint};
use crate::crypto::hash::Hash160;
use crate::crypto::keys::parse_owner;
use crate::wallet::WalletStore;
use crate::{LedgerError, Result};
use console::{style, Emoji};
use std::sync::Arc;

static WALLET: Emoji<'_, '_> = Emoji("💼 ", "");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "");
static COIN: Emoji<'_, '_> = Emoji("🪙 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "");

pub struct WalletCli {
    wallets: WalletStore,
    ledger: Arc<Ledger>,
}

impl WalletCli {
    pub fn new(wallets: WalletStore, ledger: Arc<Ledger>) -> Self {
        Self { wallets, ledger }
    }

    pub async fn handle_command(&self, command: WalletCommands) -> Result<()> {
        match command {
            WalletCommands::Create { name } => {
                let wallet = self.wallets.create(&name)?;
                println!("{}Created wallet {}", WALLET, style(&name).bold());
                println!("Address: {}", style(wallet.address()).bold().green());
                println!("Owner hash: {}", wallet.owner_hash());
            }

            WalletCommands::Import { name, wif } => {
                let wallet = self.wallets.import(&name, &wif)?;
                println!("{}Imported wallet {}", WALLET, style(&name).bold());
                println!("Address: {}", style(wallet.address()).bold().green());
            }

            WalletCommands::List => {
                let wallets = self.wallets.list()?;
                if wallets.is_empty() {
                    println!("No wallets found. Create one with 'ledgerd wallet create <name>'.");
                }
                for info in wallets {
                    println!("{}{:<20} {}", WALLET, style(&info.name).bold(), info.address);
                }
            }

            WalletCommands::Delete { name } => {
                self.wallets.delete(&name)?;
                println!("{}Deleted wallet {}", CHECK, style(&name).bold());
            }

            WalletCommands::Show { name, export } => {
                let wallet = self.wallets.load(&name)?;
                let created = chrono::DateTime::from_timestamp(wallet.info.created_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| wallet.info.created_at.to_string());

                println!("{}{}", WALLET, style(&wallet.info.name).bold().cyan());
                println!("Address: {}", style(wallet.address()).bold().green());
                println!("Owner hash: {}", wallet.info.owner_hash);
                println!("Public key: {}", wallet.info.public_key);
                println!("Created: {}", created);
                if export {
                    println!("{}Private key (WIF): {}", KEY, style(wallet.export_private_key()).yellow());
                    println!("{}", style("Anyone holding this key can spend the wallet's outputs.").bold().red());
                }
            }

            WalletCommands::Balance { name, detailed } => {
                let wallet = self.wallets.load(&name)?;
                let owner = wallet.owner_hash();
                let balance = self.ledger.balance(owner.as_bytes())?;

                println!("{}{}: {}", COIN, style(&name).bold(), style(balance).bold().green());
                if detailed {
                    for record in self.ledger.utxos(owner.as_bytes())? {
                        println!("  {}:{}  {}", record.txid, record.index, record.value);
                    }
                }
            }

            WalletCommands::Send { wallet, inputs, outputs } => {
                let sender = self.wallets.load(&wallet)?;
                let inputs = inputs.iter().map(|s| parse_outpoint(s)).collect::<Result<Vec<_>>>()?;
                let outputs = outputs.iter().map(|s| parse_payment(s)).collect::<Result<Vec<_>>>()?;

                let tx = sender.build_transfer(inputs, outputs)?;
                let txid = tx.id().unwrap_or_default().to_string();

                let ledger = self.ledger.clone();
                let block = with_spinner("Mining transaction...", move || {
                    ledger.submit_transaction(tx)?;
                    ledger.get_block(ledger.info()?.height)?
                        .ok_or_else(|| LedgerError::Internal("Tip block missing after append".to_string()))
                })
                .await?;

                println!("{}Transaction {} included in block {}", CHECK, style(&txid).green(), block.height);
            }
        }

        Ok(())
    }
}

/// `TXID:INDEX`
fn parse_outpoint(s: &str) -> Result<OutPoint> {
    let (txid, index) = s
        .rsplit_once(':')
        .ok_or_else(|| LedgerError::InvalidInput(format!("Expected TXID:INDEX, got {:?}", s)))?;
    let index = index
        .parse()
        .map_err(|_| LedgerError::InvalidInput(format!("Invalid output index in {:?}", s)))?;
    Ok(OutPoint::new(txid, index))
}

/// `OWNER:AMOUNT`, owner given as a hex owner hash or an address.
fn parse_payment(s: &str) -> Result<(Hash160, Amount)> {
    let (owner, amount) = s
        .rsplit_once(':')
        .ok_or_else(|| LedgerError::InvalidInput(format!("Expected OWNER:AMOUNT, got {:?}", s)))?;
    Ok((parse_owner(owner)?, amount.parse()?))
}
