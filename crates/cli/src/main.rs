//! CLI entry point for routectl.

use clap::Parser;
use routectl::CliConfig;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::parse();
    let result = config.run()?;
    for line in result.lines {
        println!("{line}");
    }
    Ok(())
}
