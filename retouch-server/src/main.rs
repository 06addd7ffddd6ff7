use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use retouch_server::{
    config::{Config, TLSConfig},
    routes::{router, AppState},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Read all settings from this JSON file instead of the flags below
    #[clap(long)]
    config: Option<String>,

    /// The address and optionally port to bind to
    #[clap(long, default_value = "0.0.0.0:5000")]
    address: String,

    /// PEM certificate chain; serving HTTPS needs this and --tls-key
    #[clap(long, requires = "tls_key")]
    tls_cert: Option<String>,

    /// PEM private key for --tls-cert
    #[clap(long, requires = "tls_cert")]
    tls_key: Option<String>,

    /// Where uploaded files are kept
    #[clap(long, default_value = "data/uploads")]
    storage_dir: PathBuf,

    /// Write JSON logs to daily files in this directory rather than stdout
    #[clap(long)]
    log_dir: Option<PathBuf>,

    /// Largest accepted request body, in bytes
    #[clap(long, default_value_t = 20_000_000)]
    max_body_bytes: usize,

    /// OpenAI-compatible API base used to interpret commands
    #[clap(long, default_value = "https://api.openai.com/v1")]
    llm_api_base: String,

    /// Chat model used to interpret commands
    #[clap(long, default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Image generation endpoint for the `generate` action
    #[clap(long, default_value = "https://api.openai.com/v1/images/generations")]
    image_endpoint: String,

    /// Model used for the `generate` action
    #[clap(long, default_value = "dall-e-3")]
    image_model: String,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        if let Some(path) = &self.config {
            return Config::load(path).with_context(|| format!("Loading config from {path}"));
        }
        let mut config = Config::default();
        config.server.address = self.address;
        config.server.tls = self
            .tls_cert
            .zip(self.tls_key)
            .map(|(cert_path, key_path)| TLSConfig {
                cert_path,
                key_path,
            });
        config.server.max_body_bytes = self.max_body_bytes;
        config.server.log_dir = self.log_dir;
        config.storage.path = self.storage_dir;
        config.interpreter.api_base = self.llm_api_base;
        config.interpreter.model = self.llm_model;
        config.generator.endpoint = self.image_endpoint;
        config.generator.model = self.image_model;
        Ok(config)
    }
}

/// JSON logs, filtered by `RUST_LOG` (default `info`), to stdout or a daily rolling file.
///
/// Hold on to the returned guard: dropping it stops the background log writer.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().json().with_env_filter(env_filter);
    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "access.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            builder.with_writer(non_blocking).init();
            Some(guard)
        }
        None => {
            builder.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut config = Args::parse().into_config()?;
    config.fill_credentials_from_env();
    let _guard = init_tracing(config.server.log_dir.as_deref());

    let state = AppState::from_config(&config)
        .await
        .context("Building application state")?;
    tracing::info!(
        language_model = state.interpreter.has_language_model(),
        image_generation = state.dispatcher.can_generate(),
        storage = %state.storage.root().display(),
        "Application state ready"
    );
    let app = router(state, config.server.max_body_bytes);

    // Without a certificate, serve plain HTTP
    if let Some(tls) = &config.server.tls {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context("Loading TLS certificate")?;

        let addr = config.server.address.parse()?;
        tracing::info!("Listening on https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .context("Starting TLS server")?;
    } else {
        let listener = tokio::net::TcpListener::bind(&config.server.address)
            .await
            .with_context(|| format!("Binding {}", config.server.address))?;
        tracing::info!("Listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
