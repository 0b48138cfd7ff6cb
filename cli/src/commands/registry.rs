//! `oci-build registry` command.

use std::path::PathBuf;

use clap::Args;
use oci_build_core::TaskConfig;
use oci_build_runtime::LocalRegistry;

#[derive(Args)]
pub struct RegistryArgs {
    /// Image archive to serve (NAME=PATH, repeatable)
    #[arg(long = "image", value_name = "NAME=PATH", value_parser = super::parse_image)]
    pub images: Vec<(String, PathBuf)>,

    /// Listen address (default from config: 0.0.0.0:0)
    #[arg(long)]
    pub listen: Option<String>,
}

pub async fn execute(
    args: RegistryArgs,
    mut config: TaskConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    config.registry.images.extend(args.images);
    if let Some(listen) = args.listen {
        config.registry.listen_addr = listen;
    }
    if config.registry.images.is_empty() {
        return Err("no images to serve; pass --image NAME=PATH".into());
    }

    let registry = LocalRegistry::from_config(&config.registry)?;
    let port = registry.serve().await?;
    println!("REGISTRY_PORT {}", port);
    super::print_build_args(&registry.build_args(port));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, stopping local registry");
    Ok(())
}
