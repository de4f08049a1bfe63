use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = aio_usage::app::cli::Cli::parse();
    aio_usage::app::cli::run(cli).await
}
