use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use meshbridge::{EventBus, MqttConnection, MqttTransport, PublishEvent, Registry};
use meshbridge_hass::{Discovery, DiscoveryConfig, Dispatcher, Event};
use tokio::sync::mpsc;

#[derive(Parser)]
struct Args {
    /// MQTT broker address
    mqtt_addr: String,

    /// Entity registry, as JSON
    #[arg(long)]
    registry: PathBuf,

    /// Discovery settings, as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "meshbridge")]
    client_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    meshbridge::log::init();

    let args = Args::parse();

    let registry = std::fs::read_to_string(&args.registry)
        .with_context(|| format!("failed to read {}", args.registry.display()))?;
    let registry = Arc::new(Registry::from_json(&registry).context("invalid registry")?);

    let config = match &args.config {
        Some(path) => {
            let config = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&config).context("invalid discovery config")?
        }
        None => DiscoveryConfig::default(),
    };

    let conn = MqttConnection::connect(&args.client_id, &args.mqtt_addr)
        .await
        .context("failed to connect to mqtt broker")?;

    tokio::spawn({
        let conn = conn.clone();
        async move {
            if let Err(err) = conn.handle().await {
                tracing::error!("MQTT connection failed: {err}");
            }
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<PublishEvent>();
    let transport = Arc::new(MqttTransport::new(conn, tx));

    let bus = EventBus::<Event>::new();
    tokio::spawn({
        let bus = bus.clone();
        async move {
            while let Some(event) = rx.recv().await {
                let Some(payload) = event.payload_str() else {
                    tracing::debug!("Ignoring non-UTF-8 payload on {}", event.topic);
                    continue;
                };

                let payload = payload.to_owned();
                bus.emit(Event::TransportMessage { topic: event.topic, payload });
            }
        }
    });

    let discovery = Arc::new(Discovery::new(config, transport, registry)?);
    let dispatcher = Dispatcher::new(discovery, bus.subscribe());
    dispatcher.start().await?;

    tracing::info!("Discovery running");
    dispatcher.run().await;

    Ok(())
}
