//! HTTP service: `POST /tts` and `GET /health`.

pub mod error;
pub mod routes;
pub mod types;

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::config::ServerConfig;
use crate::device::{self, Device};
use crate::handle::ModelHandle;
use crate::BoxError;

pub use error::ApiError;

/// State shared by every handler.
pub struct AppState {
    model: OnceLock<Mutex<ModelHandle>>,
    device: Device,
    cuda_available: bool,
    admission: Arc<Semaphore>,
    strict_language: bool,
}

impl AppState {
    pub fn new(device: Device, cuda_available: bool) -> Self {
        Self {
            model: OnceLock::new(),
            device,
            cuda_available,
            admission: Arc::new(Semaphore::new(4)),
            strict_language: false,
        }
    }

    /// Bound the number of synthesis requests admitted at once.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.admission = Arc::new(Semaphore::new(max_pending.max(1)));
        self
    }

    pub fn with_strict_language(mut self, strict: bool) -> Self {
        self.strict_language = strict;
        self
    }

    /// Publish the loaded model. Returns `false` if one was already installed.
    pub fn install_model(&self, handle: ModelHandle) -> bool {
        self.model.set(Mutex::new(handle)).is_ok()
    }

    pub fn model_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tts", post(routes::tts))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Start listening, load the model in the background and serve until a
/// shutdown signal arrives.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let cuda_available = device::cuda_available();
    let device = Device::select(config.device, cuda_available);

    let state = Arc::new(
        AppState::new(device, cuda_available)
            .with_max_pending(config.max_pending)
            .with_strict_language(config.strict_language),
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    let loader_state = state.clone();
    tokio::task::spawn_blocking(move || {
        log::info!("Loading NeuTTS-Air model on {device}...");
        let load_start = Instant::now();
        match load_model_handle(&config, device) {
            Ok(handle) => {
                loader_state.install_model(handle);
                log::info!(
                    "Model loaded successfully in {:.2}s",
                    load_start.elapsed().as_secs_f32()
                );
            }
            // The service keeps running; /tts answers 503 until restart.
            Err(e) => log::error!("Error loading model: {}", error::error_chain(e.as_ref())),
        }
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("Server stopped");
    Ok(())
}

#[cfg(feature = "neutts")]
fn load_model_handle(config: &ServerConfig, device: Device) -> Result<ModelHandle, BoxError> {
    use crate::engines::neutts::{GenerationParams, NeuTtsModel, NeuTtsModelParams};
    use crate::language::Language;
    use crate::phonemizer::{EspeakProvider, PhonemizerProvider};

    let phonemizers: Arc<dyn PhonemizerProvider> = Arc::new(EspeakProvider::new(config.espeak()));
    let phonemizer = phonemizers.build(Language::INITIAL)?;

    let params = NeuTtsModelParams {
        backbone_dir: config.backbone.clone(),
        codec_dir: config.codec.clone(),
        device,
        num_threads: config.threads,
        generation: GenerationParams::default(),
    };
    let model = NeuTtsModel::load(&params, phonemizer)?;

    Ok(ModelHandle::new(Box::new(model), Language::INITIAL, phonemizers))
}

#[cfg(not(feature = "neutts"))]
fn load_model_handle(_config: &ServerConfig, _device: Device) -> Result<ModelHandle, BoxError> {
    Err("built without the `neutts` feature, no synthesis engine is available".into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received");
}
