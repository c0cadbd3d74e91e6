//! CLI for dlqsub
//!
//! Subcommands:
//! - `demo`: run a scenario against an in-process broker and print the
//!   per-topic summary and dead letters
//! - `config`: print the effective configuration

use std::process::ExitCode;

use clap::Parser;
use dlqsub::broker::{
    Broker, BrokerEvent, HandlerError, StrategyKind, Subscriber, flusher, run_flush_loop,
};
use dlqsub::client::Publisher;
use dlqsub::config::{Settings, load_config};
use dlqsub::utils::logging;
use serde_json::json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dlqsub")]
enum Command {
    /// Publish a run of messages to a topic with one reliable and one flaky subscriber
    Demo {
        /// Delivery strategy (defaults to the configured one)
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Number of messages to publish
        #[arg(long, default_value_t = 5)]
        messages: usize,
        /// Delivery passes the flaky subscriber fails before succeeding
        #[arg(long, default_value_t = 2)]
        fail_first: u32,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("error");
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Demo {
            strategy,
            messages,
            fail_first,
        } => run_demo(settings, strategy, messages, fail_first).await,
        Command::Config => print_json(&settings),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_demo(
    mut settings: Settings,
    strategy: Option<StrategyKind>,
    messages: usize,
    fail_first: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(strategy) = strategy {
        settings.broker.strategy = strategy;
    }

    let mut broker = Broker::from_settings(&settings.broker)?;
    broker.add_listener(|event: &BrokerEvent| {
        info!("{} {}", event.name(), event.payload());
    });
    broker.add_subscriber("orders", Subscriber::from_fn("audit", |_| Ok(())));
    broker.add_subscriber(
        "orders",
        Subscriber::from_fn("billing", move |msg| {
            if msg.attempts <= fail_first {
                Err(HandlerError::new(format!(
                    "billing unavailable (attempt {})",
                    msg.attempts
                )))
            } else {
                Ok(())
            }
        }),
    );

    let shared = flusher::shared(broker);
    let flush_task = tokio::spawn(run_flush_loop(
        shared.clone(),
        settings.broker.flush_interval(),
    ));

    let publisher = Publisher::new(shared.clone());
    for n in 1..=messages {
        let msg = publisher.publish("orders", json!({ "order": n }));
        info!(id = msg.id, status = %msg.status, attempts = msg.attempts, "published");
    }

    // give the flusher a chance to drain a partial batch
    if settings.broker.strategy == StrategyKind::Batched {
        tokio::time::sleep(settings.broker.flush_interval() * 2).await;
    }
    flush_task.abort();

    let broker = flusher::lock(&shared);
    print_json(&json!({
        "strategy": broker.strategy_name(),
        "topics": broker.summarize(),
        "dead_letters": broker.dead_letters().iter().collect::<Vec<_>>(),
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
