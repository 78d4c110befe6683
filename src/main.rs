use anyhow::Context;
use clap::Parser;
use pulsar_template::pulsar_client::PulsarWireClient;
use pulsar_template::{Config, ProducerFactory, PulsarTemplate, SendFuture};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "pulsar-publish")]
#[command(about = "Publish messages to Pulsar topics", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Topic to publish to (defaults to template.default_topic)")]
    topic: Option<String>,

    #[arg(long = "async", help = "Pipeline sends instead of waiting for each receipt")]
    pipelined: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(help = "Messages to publish; read from stdin, one per line, when omitted")]
    messages: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    info!(
        service_url = %config.client.service_url,
        schema = ?config.producer.schema.schema_type,
        default_topic = ?config.template.default_topic,
        "Configuration summary"
    );

    let client = PulsarWireClient::connect(&config.client, &config.producer)
        .await
        .context("Failed to connect to Pulsar")?;
    let factory = Arc::new(ProducerFactory::from_config(Arc::new(client), &config.producer));
    let template = PulsarTemplate::from_config(factory.clone(), &config.template);

    let outcome = tokio::select! {
        result = publish(&template, &args) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    factory.shutdown().await;
    outcome
}

async fn publish(template: &PulsarTemplate, args: &Args) -> anyhow::Result<()> {
    let messages = if args.messages.is_empty() {
        read_stdin().await?
    } else {
        args.messages.clone()
    };

    let mut pending: Vec<SendFuture> = Vec::new();
    for message in messages {
        if args.pipelined {
            let future = match &args.topic {
                Some(topic) => template.send_async(topic, message).await?,
                None => template.send_default_async(message).await?,
            };
            pending.push(future);
        } else {
            let id = match &args.topic {
                Some(topic) => template.send(topic, message).await?,
                None => template.send_default(message).await?,
            };
            println!("{}", id);
        }
    }

    let mut failures = 0;
    for future in pending {
        match future.await {
            Ok(id) => println!("{}", id),
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} messages failed", failures);
    }
    Ok(())
}

async fn read_stdin() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if !line.is_empty() {
            messages.push(line);
        }
    }
    Ok(messages)
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("pulsar_template=debug,pulsar_publish=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pulsar_template=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
