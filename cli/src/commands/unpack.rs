//! `oci-build unpack` command.

use std::path::PathBuf;

use clap::Args;
use oci_build_core::TaskConfig;

#[derive(Args)]
pub struct UnpackArgs {
    /// OCI image archive (layout directory or tarball)
    #[arg(long)]
    pub archive: PathBuf,

    /// Destination; receives rootfs/ and manifest.json
    #[arg(long)]
    pub dest: PathBuf,

    /// Tag to select (default from config: "latest")
    #[arg(long)]
    pub tag: Option<String>,
}

pub async fn execute(
    args: UnpackArgs,
    mut config: TaskConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(tag) = args.tag {
        config.unpack.tag = tag;
    }

    let debug = config.debug;
    let dest = args.dest;
    let archive = args.archive;
    let unpack = config.unpack;
    let metadata = tokio::task::spawn_blocking(move || {
        oci_build_runtime::unpack_rootfs(&dest, &archive, &unpack, debug)
    })
    .await??;

    tracing::info!(
        user = %metadata.user,
        env = metadata.env.len(),
        "Unpacked image"
    );
    Ok(())
}
