//! OCI Build CLI entry point.

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use oci_build_cli::commands::{dispatch, Cli};
use oci_build_core::BuildError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // --debug wins over RUST_LOG
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(config.effective_level()).into())
            .from_env_lossy()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli.command, config).await {
        eprintln!("Error: {e}");
        if let Some(BuildError::DaemonSetup {
            hint: Some(hint), ..
        }) = e.downcast_ref::<BuildError>()
        {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(1);
    }
}
