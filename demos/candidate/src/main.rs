//! Candidate example binary
//!
//! Fetches one candidate from a running API and prints the resulting slice.
//! Set `RUST_LOG=candidate=debug` to also log the Prometheus metrics snapshot.
//!
//! ```bash
//! SLATE_API_URL=http://localhost:5000 SLATE_API_TOKEN=... cargo run -p candidate -- ZTF21aaqjmps
//! ```

use anyhow::Context;
use candidate::{CandidateState, SLICE};
use slate_core::LifecycleMessage;
use slate_runtime::http::HttpTransport;
use slate_runtime::metrics::MetricsServer;
use slate_runtime::retry::{RetryPolicy, RetryingTransport};
use slate_runtime::{Dispatcher, Store};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candidate=info,slate_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new(std::net::SocketAddr::from(([127, 0, 0, 1], 9090)));
    metrics.start()?;

    let id = std::env::args()
        .nth(1)
        .context("usage: candidate <candidate-id>")?;

    let store = Store::new();
    candidate::register(&store)?;

    let _subscription = store.subscribe(|event| {
        tracing::info!(
            revision = event.revision,
            message = %event.message.type_name(),
            changed = ?event.changed,
            "Store updated"
        );
    });

    let transport = RetryingTransport::new(
        HttpTransport::from_env().context("configuring the HTTP transport")?,
        RetryPolicy::default(),
    );
    let dispatcher = Dispatcher::new(store.clone(), transport);

    let terminal = dispatcher
        .dispatch_and_wait(candidate::fetch_candidate(&id))
        .await?;
    dispatcher.drain(Duration::from_secs(5)).await?;

    if let Some(snapshot) = metrics.render() {
        tracing::debug!(metrics = %snapshot, "Metrics snapshot");
    }

    let state = store
        .get_state::<CandidateState>(SLICE)?
        .or_initial(CandidateState::default());

    match terminal {
        LifecycleMessage::Succeeded { .. } => {
            println!("{}", serde_json::to_string_pretty(state.as_ref())?);
            Ok(())
        }
        _ => anyhow::bail!("failed to load candidate {id}: {}", state.load_error),
    }
}
