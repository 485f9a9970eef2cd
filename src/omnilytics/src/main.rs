//! Omnilytics demo driver — wires the SDK against a simulated page and a
//! real ingestion endpoint, then walks through a short browsing session.

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use omni_core::storage::FileStore;
use omni_core::SdkConfig;
use omni_dom::{Element, Window};
use omni_sdk::Sdk;

#[derive(Parser, Debug)]
#[command(name = "omnilytics")]
#[command(about = "Simulates a page session against an Omnilytics ingestion endpoint")]
#[command(version)]
struct Cli {
    /// Ingestion endpoint receiving event batches
    #[arg(long, env = "OMNILYTICS_ENDPOINT")]
    endpoint: String,

    /// Tenant project id
    #[arg(long, env = "OMNILYTICS_PROJECT_ID", default_value = "demo")]
    project_id: String,

    /// Number of simulated click/navigation rounds
    #[arg(long, default_value_t = 5)]
    rounds: u32,

    /// Identity store file (client and session ids survive reruns)
    #[arg(long, default_value = "omnilytics-identity.json")]
    store_path: String,

    /// Capture DOM snapshots as well
    #[arg(long, default_value_t = false)]
    snapshots: bool,
}

fn demo_document() -> Element {
    Element::new("html").with_size(1440, 3200).with_child(
        Element::new("body")
            .with_size(1440, 3200)
            .with_child(
                Element::new("nav").with_id("nav").with_size(1440, 64).with_child(
                    Element::new("a").with_attr("href", "/pricing").with_text("Pricing"),
                ),
            )
            .with_child(
                Element::new("main")
                    .with_id("content")
                    .with_size(1440, 2800)
                    .with_child(
                        Element::new("button")
                            .with_classes("cta")
                            .with_size(240, 56)
                            .with_text("Start free trial"),
                    )
                    .with_child(
                        Element::new("input")
                            .with_attr("type", "password")
                            .with_attr("name", "password")
                            .with_value("hunter2"),
                    ),
            ),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnilytics=info,omni_sdk=debug,omni_transport=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    info!(endpoint = %cli.endpoint, project_id = %cli.project_id, "omnilytics demo starting");

    let window = Arc::new(Window::new("https://demo.example.com/", demo_document())?);
    window.set_title("Omnilytics Demo");
    window.set_referrer("https://search.example.net/");
    window.set_viewport(1440, 900);

    let mut config = SdkConfig::new(cli.project_id, cli.endpoint);
    config.debug = true;
    config.batch_size = 10;
    config.batch_timeout = 2_000;
    config.snapshot.enabled = cli.snapshots;

    let sdk = Sdk::builder(config)
        .window(window.clone())
        .store(Arc::new(FileStore::open(&cli.store_path)?))
        .initialize()
        .await?;

    let tracker = sdk.tracker();
    info!(session_id = %tracker.session_id(), "session started");

    for round in 0..cli.rounds {
        // Click the call-to-action button, then navigate like an SPA would.
        window.click(vec![0, 1, 0], 320.0, 540.0);
        window.push_state(&format!("/pricing?round={round}"));

        let mut properties = HashMap::new();
        properties.insert("round".to_string(), serde_json::json!(round));
        tracker.track_custom("demo_round", Some(properties));

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }

    tracker.flush().await;

    let session_id = tracker.session_id();
    if let Some(counters) = tracker.session_counters(&session_id) {
        info!(
            page_views = counters.page_views,
            clicks = counters.clicks,
            custom_events = counters.custom_events,
            snapshots = counters.snapshots,
            total = counters.total_events,
            "session summary"
        );
    }

    sdk.destroy().await;
    info!("omnilytics demo finished");
    Ok(())
}
