//! Background HTTP listener for the local registry.

use oci_build_core::error::{BuildError, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use super::handlers::router;
use super::store::LocalRegistry;

impl LocalRegistry {
    /// Serve on the configured listen address. See [`LocalRegistry::serve_on`].
    pub async fn serve(&self) -> Result<u16> {
        let addr = self.listen_addr().to_string();
        self.serve_on(&addr).await
    }

    /// Bind `addr` and handle requests on a background task.
    ///
    /// Returns the bound port once the listener is accepting. The server
    /// runs until the process exits.
    pub async fn serve_on(&self, addr: &str) -> Result<u16> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BuildError::RegistryError {
                name: addr.to_string(),
                message: format!("failed to bind: {}", e),
            })?;
        let local: SocketAddr = listener.local_addr()?;

        let app = router(self.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Local registry stopped");
            }
        });

        tracing::info!(
            addr = %local,
            images = self.len(),
            "Local registry listening"
        );

        Ok(local.port())
    }
}
