use clap::Parser;

use crate::command::common::{NodeArgs, build_coordinator};

#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    cluster: NodeArgs,

    /// Print the statistics as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

pub async fn stats(args: StatsArgs) -> anyhow::Result<()> {
    let coordinator = build_coordinator(&args.cluster)?;
    let stats = coordinator.get_system_statistics().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", stats);
    }

    Ok(())
}
