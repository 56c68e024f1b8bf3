use clap::Parser;
use docker_engine_client::cli::{Args, Runner};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runner = Runner::new(args);
    match runner.run() {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            runner.output().error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
