//! Starts one remote stress run from a JSON launch event and returns at once.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

use ddb_stress::launcher::{dispatch, EcsLauncher, EcsTarget};
use ddb_stress::logging::init_tracing;

/// Launch a ddb_stress container run on ECS Fargate.
#[derive(Debug, Parser)]
#[command(name = "launch", version, about, long_about = None)]
struct Args {
    /// Launch event JSON file; reads stdin when omitted
    #[arg(short, long)]
    event: Option<PathBuf>,

    /// Region of the ECS cluster (defaults to the SDK's region chain)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    #[arg(long, env = "ECS_CLUSTER", default_value = "default")]
    cluster: String,

    #[arg(long, env = "TASK_DEFINITION")]
    task_definition: String,

    #[arg(long, env = "CONTAINER_NAME", default_value = "ddb-stress-test")]
    container_name: String,

    /// Comma-separated subnet ids
    #[arg(long, env = "TASK_SUBNETS", value_delimiter = ',', required = true)]
    subnets: Vec<String>,

    /// Comma-separated security group ids
    #[arg(long, env = "TASK_SECURITY_GROUPS", value_delimiter = ',')]
    security_groups: Vec<String>,

    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_tracing(args.verbose, false);

    let raw = match &args.event {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let event: serde_json::Value = serde_json::from_str(&raw)?;

    let launcher = EcsLauncher::connect(
        args.region.as_deref(),
        EcsTarget {
            cluster: args.cluster,
            task_definition: args.task_definition,
            container_name: args.container_name,
            subnets: args.subnets,
            security_groups: args.security_groups,
        },
    )
    .await;

    let response = dispatch(&event, &launcher).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
