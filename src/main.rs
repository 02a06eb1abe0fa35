use pow_ledger::cli::commands::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration and logging are set up by the CLI from its flags
    run_cli().await
}
