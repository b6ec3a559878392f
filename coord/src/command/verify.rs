use anyhow::bail;
use clap::Parser;

use common::node_api::FileId;

use crate::command::common::{NodeArgs, build_coordinator};

#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    #[command(flatten)]
    cluster: NodeArgs,

    /// File to check across every reachable node
    #[arg(long)]
    file_id: FileId,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Exit with an error unless every copy matches
    #[arg(long, default_value_t = false)]
    strict: bool,
}

pub async fn verify(args: VerifyArgs) -> anyhow::Result<()> {
    let coordinator = build_coordinator(&args.cluster)?;
    let report = coordinator.verify_file_integrity(args.file_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    if args.strict && !report.is_valid {
        bail!(
            "file {} failed verification: {} corrupted, {} unavailable",
            report.file_id,
            report.corrupted_nodes.len(),
            report.unavailable_nodes.len()
        );
    }

    Ok(())
}
