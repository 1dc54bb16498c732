use pipeshell::{Args, Config, Interpreter};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    let config = Config::from(args);

    // RUST_LOG wins over --log.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Interpreter::new(config).repl()
}
