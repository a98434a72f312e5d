//! Service configuration: command-line flags with environment fallbacks.

use std::path::PathBuf;

use clap::Parser;

use crate::device::DevicePreference;
use crate::phonemizer::EspeakConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "neutts-server", about = "Voice-cloning text-to-speech over HTTP")]
pub struct ServerConfig {
    /// Interface to listen on
    #[arg(long, env = "NEUTTS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "NEUTTS_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Backbone model directory
    #[arg(long, env = "NEUTTS_BACKBONE", default_value = "models/neutts-air")]
    pub backbone: PathBuf,

    /// Codec model directory
    #[arg(long, env = "NEUTTS_CODEC", default_value = "models/neucodec")]
    pub codec: PathBuf,

    /// Compute device: auto, cuda or cpu
    #[arg(long, env = "NEUTTS_DEVICE", default_value = "auto")]
    pub device: DevicePreference,

    /// Synthesis requests admitted at once (running plus waiting)
    #[arg(long, env = "NEUTTS_MAX_PENDING", default_value_t = 4)]
    pub max_pending: usize,

    /// CPU threads per inference session
    #[arg(long, env = "NEUTTS_THREADS")]
    pub threads: Option<usize>,

    /// Reject language tags other than "zh" and "en" instead of using English
    #[arg(long, env = "NEUTTS_STRICT_LANGUAGE")]
    pub strict_language: bool,

    /// espeak-ng binary (default: from PATH)
    #[arg(long, env = "ESPEAK_NG_PATH")]
    pub espeak_bin: Option<PathBuf>,

    /// espeak-ng data directory
    #[arg(long, env = "ESPEAK_DATA_PATH")]
    pub espeak_data: Option<PathBuf>,
}

impl ServerConfig {
    pub fn espeak(&self) -> EspeakConfig {
        EspeakConfig {
            bin_path: self.espeak_bin.clone(),
            data_path: self.espeak_data.clone(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
