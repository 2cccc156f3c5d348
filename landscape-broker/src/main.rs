use clap::Parser;
use landscape_broker::{run, Args, BrokerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(config_path) = &args.config_path {
        // SAFETY: set once, before `BrokerSettings::build` reads it, and
        // before any other task has started.
        unsafe { std::env::set_var("LANDSCAPE__CONFIG", config_path) };
    }

    let settings = BrokerSettings::build()?;
    landscape_broker::init_logging(&settings);

    run(settings).await
}
