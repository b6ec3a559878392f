use clap::{Parser, Subcommand};

use common::telemetry::init_telemetry;

use coord::command::serve::{ServeArgs, serve};
use coord::command::stats::{StatsArgs, stats};
use coord::command::verify::{VerifyArgs, verify};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Check one file's replicas against each other
    Verify(VerifyArgs),
    /// Print cluster capacity and health
    Stats(StatsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("coord");

    let args = Args::parse();

    match args.cmd {
        Cmd::Serve(serve_args) => {
            serve(serve_args).await?;
        }
        Cmd::Verify(verify_args) => {
            verify(verify_args).await?;
        }
        Cmd::Stats(stats_args) => {
            stats(stats_args).await?;
        }
    }

    Ok(())
}
