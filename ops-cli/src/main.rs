use anyhow::Result;
use clap::Parser;
use config_engine::AppConfig;
use ops_cli::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config = AppConfig::load(cli.app_config.as_deref())?;
    telemetry::init_tracing(&app_config.log)?;

    let output = run(&cli)?;
    println!("{}", output);
    Ok(())
}
