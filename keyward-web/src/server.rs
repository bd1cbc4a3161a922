//! keyward web server

use crate::AppBuilder;
use axum::{serve, Router};
use keyward_auth::{User, UserLoader};
use keyward_core::{KeywardResult, Settings};
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct KeywardServer {
    address: String,
    router: Router,
}

impl KeywardServer {
    pub fn new(address: impl Into<String>, router: Router) -> Self {
        Self {
            address: address.into(),
            router,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Serve until Ctrl-C
    pub async fn start(self) -> KeywardResult<()> {
        let listener = TcpListener::bind(&self.address).await?;
        info!("Server listening on http://{}", self.address);

        if let Err(e) = serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Server error: {}", e);
            return Err(e.into());
        }

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Builder for [`KeywardServer`]
#[derive(Debug, Default)]
pub struct KeywardServerBuilder {
    config: Option<PathBuf>,
    settings: Option<Settings>,
    host: Option<String>,
    port: Option<u16>,
}

impl KeywardServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// TOML settings file; `KEYWARD_*` variables still apply on top
    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    /// Use these settings as they are instead of loading them
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Resolve settings, taking explicit host and port over everything else
    pub fn resolve_settings(&self) -> KeywardResult<Settings> {
        let mut settings = match &self.settings {
            Some(settings) => settings.clone(),
            None => Settings::load(self.config.as_deref())?,
        };
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub async fn build<U: User>(self, loader: Arc<dyn UserLoader<U>>) -> KeywardResult<KeywardServer> {
        let settings = self.resolve_settings()?;
        let address = settings.server.address();
        let app = AppBuilder::new(settings, loader).build().await?;
        Ok(KeywardServer::new(address, app.router))
    }
}
