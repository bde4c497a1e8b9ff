use crmsync_cli::args::parse_args;
use crmsync_cli::launcher::run;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable JSON.
    // Default to INFO level, can be overridden with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // W3C traceparent headers on outgoing HubSpot calls
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let args = parse_args(std::env::args().skip(1))?;
    run(args).await
}
