use clap::Parser;
use onboarding_engine::cli::{init_logging, run, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up ONBOARDING_* variables from a local .env
    dotenv::dotenv().ok();

    let args = Args::parse();
    let config = args.load_config()?;
    init_logging(&config.log_level)?;

    run(args, config).await
}
