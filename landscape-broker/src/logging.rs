//! `tracing-subscriber` initialization. Deliberately lighter than
//! `blockscout-service-launcher::tracing::init_logs`: no Jaeger/OTLP
//! exporter, just a formatter chosen from config and an `EnvFilter` so
//! `RUST_LOG` still works for ad-hoc debugging.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::settings::{TracingFormat, TracingSettings};

pub fn init(settings: &TracingSettings) {
    if !settings.enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match settings.format {
        TracingFormat::Json => registry.with(fmt::layer().json()).init(),
        TracingFormat::Default => registry.with(fmt::layer()).init(),
    }
}
