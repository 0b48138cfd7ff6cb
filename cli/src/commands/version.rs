//! `oci-build version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("oci-build version {}", oci_build_core::VERSION);
    Ok(())
}
