use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    soap_log_cli::init_tracing();
    let cli = soap_log_cli::Cli::parse();
    soap_log_cli::run_cli(cli)
}
