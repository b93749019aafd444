//! Greeter worker
//!
//! Serves `greet` tasks: reads `name` from the task input and answers with
//! `{"greetings": "Hello, <name>"}`. Runs until interrupted.

use anyhow::Result;
use baton_worker::{RunnerConfig, TaskContext, TaskRunner, TypedWorker, WorkerOption};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Deserialize)]
struct GreetInput {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct Greeting {
    greetings: String,
}

async fn greet(ctx: TaskContext, input: GreetInput) -> Result<Greeting, Infallible> {
    ctx.log(format!("greeting {}", input.name));
    Ok(Greeting {
        greetings: format!("Hello, {}", input.name),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "baton_worker=info,greeter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting greeter worker");

    let config = load_config()?;
    info!(
        "Loaded configuration: worker_id={}, server_url={}",
        config.worker_id, config.server_url
    );

    let runner = TaskRunner::new(config)?;
    runner.register_worker(
        TypedWorker::new("greet", greet)
            .with([WorkerOption::poll_interval(Duration::from_millis(100))]),
    )?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    runner.shutdown().await;
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<RunnerConfig> {
    match RunnerConfig::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = RunnerConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
