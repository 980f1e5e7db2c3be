//! rpcpulse CLI
//!
//! Replays an INVOKE/ERROR/NOTHING event script against a JSON-RPC endpoint
//! and reports per-call results plus rolling latency statistics.

use clap::{Parser, Subcommand};
use rpcpulse_client::config::{
    default_params, parse_event_script, ConfigError, DEFAULT_ENDPOINT, DEFAULT_METHOD,
};
use rpcpulse_client::{
    init_tracing, render_metrics, wait_for_ready, JsonRpcClient, RunConfig, Runner,
    TelemetryConfig,
};
use rpcpulse_core::RemoteCall;
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "rpcpulse")]
#[command(about = "Event-driven JSON-RPC load driver with rolling latency statistics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an event script through the worker pool
    Run {
        /// JSON-RPC endpoint URL
        #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Method performed by every INVOKE
        #[arg(short, long, default_value = DEFAULT_METHOD)]
        method: String,

        /// Params as a JSON value (defaults to the demo account for getBalance)
        #[arg(short, long)]
        params: Option<String>,

        /// Number of worker threads
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Comma-separated event script (invoke, error, nothing)
        #[arg(long, default_value = "invoke,error,nothing,invoke")]
        events: String,

        /// Times the script is replayed
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Pause between events (e.g., "0s", "50ms")
        #[arg(long, default_value = "0s")]
        interval: humantime::Duration,

        /// Rolling latency window (e.g., "30s", "5m")
        #[arg(long, default_value = "30s")]
        window: humantime::Duration,

        /// Per-request timeout
        #[arg(long, default_value = "10s")]
        timeout: humantime::Duration,

        /// Wait for the endpoint to answer getHealth before starting
        #[arg(long)]
        wait_ready: bool,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Print Prometheus metrics after the report
        #[arg(long)]
        print_metrics: bool,
    },

    /// Perform a single call and print the response (smoke test)
    Call {
        /// JSON-RPC endpoint URL
        #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Method to call
        #[arg(short, long, default_value = DEFAULT_METHOD)]
        method: String,

        /// Params as a JSON value
        #[arg(short, long)]
        params: Option<String>,

        /// Request timeout
        #[arg(long, default_value = "10s")]
        timeout: humantime::Duration,
    },
}

fn parse_params(params: Option<&str>) -> Result<Value, ConfigError> {
    match params {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(default_params()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&TelemetryConfig::default())?;

    match cli.command {
        Commands::Run {
            endpoint,
            method,
            params,
            workers,
            events,
            repeat,
            interval,
            window,
            timeout,
            wait_ready,
            json,
            print_metrics,
        } => {
            let call = RemoteCall::new(method, parse_params(params.as_deref())?);
            let config = RunConfig::new(endpoint)
                .with_call(call)
                .with_workers(workers)
                .with_events(parse_event_script(&events)?)
                .with_repeat(repeat)
                .with_event_interval(*interval)
                .with_latency_window(*window)
                .with_request_timeout(*timeout);
            config.validate()?;

            let client = JsonRpcClient::new(config.endpoint.clone(), config.request_timeout)?;
            if wait_ready {
                eprintln!("Waiting for {} to be ready...", client.endpoint());
                wait_for_ready(&client, Duration::from_secs(60))?;
                eprintln!("Endpoint ready.");
            }

            let report = Runner::new(config, client)?.run();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print();
            }

            if print_metrics {
                println!("\n{}", render_metrics()?);
            }
        }

        Commands::Call {
            endpoint,
            method,
            params,
            timeout,
        } => {
            let params = parse_params(params.as_deref())?;
            let client = JsonRpcClient::new(endpoint, *timeout)?;

            let start = Instant::now();
            let outcome = client.call(&method, &params);
            let latency = start.elapsed();

            match outcome {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    println!("Latency (ms): {:.2}", latency.as_secs_f64() * 1000.0);
                }
                Err(e) => {
                    eprintln!("ERROR: {} after {:.2}ms", e, latency.as_secs_f64() * 1000.0);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
