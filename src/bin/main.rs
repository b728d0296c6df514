use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use portia_router::dispatch::{Dispatcher, LinePublisher, Record, RecordKind};
use portia_router::load_settings;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader, Stdout, stdin, stdout};
use tokio::task::JoinSet;

/// Route bus records between transports and an application using Portia
#[derive(Parser)]
#[command(name = "portia-router")]
#[command(version)]
#[command(about = "Route bus records between transports and an application using Portia")]
struct Cli {
    /// Settings file (TOML) with the Portia endpoint and routing section
    #[arg(long, short)]
    config: PathBuf,
}

/// One record delivered on stdin.
#[derive(Deserialize)]
struct BusMessage {
    kind: RecordKind,
    /// Connector the record arrived on; taken from `transport_name` when absent.
    #[serde(default)]
    connector: Option<String>,
    record: Record,
}

type StdoutDispatcher = Dispatcher<LinePublisher<Stdout>>;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!(target: "portia_router", "{}", e);
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = match Dispatcher::from_settings(&settings, LinePublisher::new(stdout())) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(e) => {
            error!(target: "portia_router", "Invalid routing configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let failed = run(&dispatcher).await;
    dispatcher.shutdown().await;

    if failed > 0 {
        warn!(target: "portia_router", "{} records could not be routed", failed);
    }
    ExitCode::SUCCESS
}

/// Dispatch every stdin line concurrently until EOF. Returns the number of
/// records that failed.
async fn run(dispatcher: &Arc<StdoutDispatcher>) -> usize {
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(stdin()).lines();
    let mut failed = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(target: "portia_router", "Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: BusMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "portia_router", "Skipping malformed bus line: {}", e);
                failed += 1;
                continue;
            }
        };

        let dispatcher = Arc::clone(dispatcher);
        tasks.spawn(async move { dispatch_one(&dispatcher, message).await });

        while let Some(joined) = tasks.try_join_next() {
            failed += usize::from(!joined.unwrap_or(false));
        }
    }

    info!(target: "portia_router", "Input closed; waiting for {} in-flight records", tasks.len());
    while let Some(joined) = tasks.join_next().await {
        failed += usize::from(!joined.unwrap_or(false));
    }
    failed
}

async fn dispatch_one(dispatcher: &StdoutDispatcher, message: BusMessage) -> bool {
    let connector = message
        .connector
        .or_else(|| message.record.transport_name().map(str::to_owned))
        .unwrap_or_default();

    match dispatcher
        .dispatch(message.kind, &connector, message.record)
        .await
    {
        Ok(_) => true,
        Err(e) => {
            if let Err(io) = dispatcher
                .publisher()
                .report_failure(message.kind, &connector, &e)
                .await
            {
                error!(target: "portia_router", "Failed to write to stdout: {}", io);
            }
            false
        }
    }
}
