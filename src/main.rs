// src/main.rs

use cmdstream::{cli, logging, resolve_config, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("cmdstream error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = resolve_config(&args)?;
    logging::init_logging(args.log_level, cfg.log_level(), &cfg.logging)?;
    run(args, cfg).await
}
