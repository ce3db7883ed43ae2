//! `chainagent run <mode>`

use std::sync::Arc;

use anyhow::{Context, Result};

use chainagent_core::{
    ChainSourceFactory, ConsoleSink, FanoutSink, HandlerRegistry, JsonlSink,
    ResultSink, Runner, RunnerBuilder, RunnerConfig, RunnerParts, Settings, SourceMode,
    StaticDirectory,
};
use chainagent_evm::EvmClientBuilder;
use chainagent_rpc::RpcAgentTransport;
use tokio_util::sync::CancellationToken;

use crate::RunArgs;

pub fn runner_config(settings: &Settings, args: &RunArgs) -> RunnerConfig {
    let mut builder = RunnerBuilder::from_config(settings.runner.clone());
    if let Some(ms) = args.timeout_ms {
        builder = builder.invocation_timeout_ms(ms);
    }
    if let Some(k) = args.max_in_flight {
        builder = builder.max_in_flight(k);
    }
    if let Some(window) = args.reorder_window {
        builder = builder.live_reorder_window(window);
    }
    builder.build_config()
}

pub async fn run(settings: &Settings, args: &RunArgs, mode: SourceMode) -> Result<()> {
    let config = runner_config(settings, args);

    // Replaying a file needs no node.
    let sources = match &mode {
        SourceMode::File(_) => ChainSourceFactory::offline(&config),
        _ => {
            let client = EvmClientBuilder::new(settings.json_rpc_url()?)
                .runner_config(&config)
                .build()?;
            ChainSourceFactory::new(Arc::new(client), &config)
        }
    };

    if settings.agents.is_empty() {
        tracing::warn!("no agents configured; events will be read but not evaluated");
    }

    let mut sinks: Vec<Arc<dyn ResultSink>> = vec![Arc::new(ConsoleSink {
        verbose: args.verbose,
    })];
    if let Some(path) = &args.output {
        let jsonl = JsonlSink::create(path)
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        sinks.push(Arc::new(jsonl));
    }

    let runner = Runner::new(
        config,
        RunnerParts {
            sources: Arc::new(sources),
            registry: Arc::new(HandlerRegistry::new()),
            transport: Arc::new(RpcAgentTransport::new()?),
            sink: Arc::new(FanoutSink::new(sinks)),
            directory: Some(Arc::new(StaticDirectory::new(settings.agents.clone()))),
        },
    )?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing in-flight events");
            interrupt.cancel();
        }
    });

    let summary = runner.run(&mode, cancel).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
