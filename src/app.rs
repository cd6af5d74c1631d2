//! Server assembly and serving.

use crate::cli::Cli;
use arc_swap::ArcSwap;
use forum_core::config::{Config, ConfigWatcher};
use forum_core::lifecycle::signal::SignalHandler;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

pub struct Application {
    config: Arc<ArcSwap<Config>>,
    app_router: axum::Router,
    config_path: String,
    overrides: Overrides,
    shutdown_timeout: u64,
}

/// CLI values that win over the config file, including after reloads.
#[derive(Clone)]
struct Overrides {
    host: Option<String>,
    port: Option<u16>,
}

impl Overrides {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

impl Application {
    pub fn build(cli: &Cli) -> anyhow::Result<Self> {
        let config = Config::load(&cli.config).unwrap_or_else(|e| {
            tracing::warn!(
                "Failed to load config from '{}': {e}, using defaults",
                cli.config
            );
            Config::default()
        });

        let overrides = Overrides {
            host: cli.host.clone(),
            port: cli.port,
        };
        let config = overrides.apply(config);

        if config.security.resolve_jwt_secret().is_none() {
            tracing::warn!("No JWT secret configured; every request will be anonymous");
        }
        tracing::info!("Loaded {} users", config.security.users.len());

        let config = Arc::new(ArcSwap::from_pointee(config));
        let state = forum_server::AppState::new(config.clone());
        let app_router = forum_server::build_router(state);

        Ok(Self {
            config,
            app_router,
            config_path: cli.config.clone(),
            overrides,
            shutdown_timeout: cli.shutdown_timeout,
        })
    }

    /// Serve HTTP until a shutdown signal, reloading config on change or SIGHUP.
    /// After the signal, in-flight requests get `shutdown_timeout` seconds.
    pub async fn serve(self) -> anyhow::Result<()> {
        let Self {
            config,
            app_router,
            config_path,
            overrides,
            shutdown_timeout,
        } = self;

        // Re-apply CLI overrides on top of whatever the file now says.
        let watcher_overrides = overrides.clone();
        let _watcher = match ConfigWatcher::start(config_path.clone(), config.clone(), move |new_cfg| {
            tracing::info!("Config reloaded: {} users", new_cfg.security.users.len());
            watcher_overrides.apply(new_cfg)
        }) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!("Config watcher disabled: {e}");
                None
            }
        };

        let (signal_handler, mut shutdown_rx) = SignalHandler::new();

        let reload_config = config.clone();
        let reload_path = config_path.clone();
        let reload_fn = move || match Config::load(&reload_path) {
            Ok(new_cfg) => {
                tracing::info!("SIGHUP reload: {} users", new_cfg.security.users.len());
                reload_config.store(Arc::new(overrides.apply(new_cfg)));
            }
            Err(e) => tracing::error!("SIGHUP config reload failed: {e}"),
        };
        tokio::spawn(signal_handler.run(reload_fn));

        let addr = {
            let cfg = config.load();
            format!("{}:{}", cfg.host, cfg.port)
        };

        tracing::info!("Starting HTTP server on {addr}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        let mut drain_rx = shutdown_rx.clone();
        let shutdown = async move {
            let _ = shutdown_rx.wait_for(|v| *v).await;
        };

        let serve = axum::serve(listener, app_router)
            .with_graceful_shutdown(shutdown)
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            _ = async { let _ = drain_rx.wait_for(|v| *v).await; } => {
                tracing::info!("Draining connections (up to {shutdown_timeout}s)...");
                match tokio::time::timeout(Duration::from_secs(shutdown_timeout), &mut serve).await {
                    Ok(result) => result?,
                    Err(_) => tracing::warn!("Shutdown timeout elapsed, dropping open connections"),
                }
            }
        }

        tracing::info!("Server shut down.");
        Ok(())
    }
}
