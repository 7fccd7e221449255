/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use cloudai_master::config::Config;
use cloudai_master::dispatch::InMemorySink;
use cloudai_master::master::Master;
use cloudai_master::params::ParamStore;

/// CloudAI master: scheduling and resource-management core.
///
/// Starts the queue processor, parameter-file watcher, worker sweep, and
/// penalty recompute loops. The gRPC/HTTP front door that would accept
/// submissions, heartbeats, and outcome reports over the wire is an
/// external collaborator (§1) not implemented here.
#[derive(Parser, Debug)]
#[command(name = "cloudai-master", version, about)]
struct Args {
    /// Path to the hot-reloaded scheduling parameter file (§4.4).
    #[arg(long, env = "CLOUDAI_PARAMETER_FILE", default_value = "params.yaml")]
    parameter_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    config.parameter_file = args.parameter_file.to_string_lossy().into_owned();

    info!(parameter_file = %config.parameter_file, "loading scheduling parameters");
    let params = Arc::new(ParamStore::load(&config.parameter_file)?);

    let sink = Arc::new(InMemorySink::new());
    let (master, _success, penalty, scheduler) = Master::new(config, params, sink);
    let dispatcher = Arc::new(cloudai_master::dispatch::LoggingDispatcher);

    let mut handles = master.spawn_background_tasks(scheduler, dispatcher, penalty);
    info!("CloudAI master started");

    // The queue processor is the loop whose exit means the master can no
    // longer place work; the rest (param reload, sweep, penalty recompute)
    // keep running alongside it for as long as the process lives.
    handles.remove(0).await?;
    Ok(())
}
