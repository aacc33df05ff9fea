// Main entry point for the enhancer-server application.
// Loads the enhancement models, reports which capabilities are available,
// configures the Axum router, and starts the HTTP server.

mod capability;
mod error;
mod image_codec;
mod inference;
mod models;
mod pipeline;
mod shutdown_signal;
mod web;

use capability::{Capability, CapabilityRegistry, CapabilityStatus, WeightCache, load_all};
use clap::Parser;
use inference::{
    DEFAULT_DETECTOR_URL, DEFAULT_FACE_RESTORATION_URL, DEFAULT_SUPER_RESOLUTION_URL,
    GfpganSource, RealEsrganSource, TileConfig,
};
use pipeline::Pipeline;
use shutdown_signal::shutdown_signal;
use std::sync::Arc;
use tracing::Level;

/// Command line arguments for enhancer-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*",
    /// meaning the server will listen on all interfaces.
    #[arg(
        long,
        env = "ENHANCER_SERVER_HOST",
        default_value = "localhost",
        num_args = 0..=1,
        default_missing_value = "*"
    )]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "ENHANCER_SERVER_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory where model weights are cached.
    #[arg(long, env = "ENHANCER_WEIGHTS_DIR", default_value = "weights")]
    weights_dir: String,

    /// Download URL of the Real-ESRGAN x4plus ONNX weights, used when they are not cached.
    /// An empty value disables the download.
    #[arg(
        long,
        env = "ENHANCER_SUPER_RESOLUTION_URL",
        default_value = DEFAULT_SUPER_RESOLUTION_URL
    )]
    super_resolution_url: String,

    /// Expected BLAKE3 digest (hex) of the Real-ESRGAN weights.
    #[arg(long, env = "ENHANCER_SUPER_RESOLUTION_BLAKE3")]
    super_resolution_blake3: Option<String>,

    /// Download URL of the GFPGAN v1.4 ONNX weights, used when they are not cached.
    /// An empty value disables the download.
    #[arg(
        long,
        env = "ENHANCER_FACE_RESTORATION_URL",
        default_value = DEFAULT_FACE_RESTORATION_URL
    )]
    face_restoration_url: String,

    /// Expected BLAKE3 digest (hex) of the GFPGAN weights.
    #[arg(long, env = "ENHANCER_FACE_RESTORATION_BLAKE3")]
    face_restoration_blake3: Option<String>,

    /// Download URL of the UltraFace RFB-320 face detector, used when it is not cached.
    /// An empty value disables the download.
    #[arg(long, env = "ENHANCER_FACE_DETECTOR_URL", default_value = DEFAULT_DETECTOR_URL)]
    face_detector_url: String,

    /// Tile size for super-resolution. 0 processes the whole image at once.
    #[arg(long, env = "ENHANCER_TILE", default_value_t = 0)]
    tile: u32,

    /// Padding around each tile, in input pixels.
    #[arg(long, env = "ENHANCER_TILE_PAD", default_value_t = 10)]
    tile_pad: u32,

    /// Background upscale factor applied by face restoration.
    #[arg(
        long,
        env = "ENHANCER_FACE_UPSCALE",
        default_value_t = 4,
        value_parser = clap::value_parser!(u32).range(1..=4)
    )]
    face_upscale: u32,

    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, env = "ENHANCER_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true) // Include module path in logs
        .with_file(true) // Include source file name
        .with_line_number(true) // Include line numbers
        .init();

    tracing::info!("Starting enhancer-server...");

    // --- Load capabilities ---
    // Must finish before the listener is bound; failures leave the capability unavailable.
    let registry = load_capabilities(&config).await;
    log_availability(&registry);

    let pipeline = Arc::new(Pipeline::new(Arc::new(registry)));
    let app = web::create_app(pipeline);
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("enhancer-server has shut down.");
}

async fn load_capabilities(config: &AppConfig) -> CapabilityRegistry {
    let cache = match WeightCache::new(&config.weights_dir) {
        Ok(cache) => {
            tracing::info!("Weights directory set to: {:?}", cache.dir());
            Arc::new(cache)
        }
        Err(e) => {
            tracing::error!("Failed to prepare weight cache: {}", e);
            tracing::warn!("Starting without any enhancement capability.");
            return CapabilityRegistry::new();
        }
    };

    let super_resolution = RealEsrganSource::new(
        cache.clone(),
        download_url(&config.super_resolution_url),
        config.super_resolution_blake3.clone(),
        TileConfig {
            tile: config.tile,
            tile_pad: config.tile_pad,
        },
    );
    let face_restoration = GfpganSource::new(
        cache,
        (
            download_url(&config.face_restoration_url),
            config.face_restoration_blake3.clone(),
        ),
        download_url(&config.face_detector_url),
        config.face_upscale,
    );

    load_all(&super_resolution, &face_restoration).await
}

fn download_url(configured: &str) -> Option<String> {
    let url = configured.trim();
    (!url.is_empty()).then(|| url.to_string())
}

fn log_availability(registry: &CapabilityRegistry) {
    for capability in [Capability::SuperResolution, Capability::FaceRestoration] {
        match registry.status(capability) {
            CapabilityStatus::Available => tracing::info!("  - {}: available", capability),
            CapabilityStatus::Unavailable(reason) => {
                tracing::warn!("  - {}: unavailable ({})", capability, reason)
            }
            CapabilityStatus::Unloaded => tracing::warn!("  - {}: not loaded", capability),
        }
    }

    if !registry.is_available(Capability::SuperResolution)
        && !registry.is_available(Capability::FaceRestoration)
    {
        tracing::warn!(
            "No models were loaded. The server will run but /process only passes images through."
        );
    }
}
