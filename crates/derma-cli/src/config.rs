use derma_core::{AnalyzerOptions, FaceSelection, ScanParams, FRONTAL_FACE_CASCADE};
use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the cascade model files.
    pub model_dir: PathBuf,
    /// Explicit cascade path; overrides `model_dir`.
    pub cascade_path: Option<PathBuf>,
    /// Number of analysis worker threads.
    pub workers: usize,
    /// Requests that may wait for a worker before admission blocks.
    pub queue_depth: usize,
    /// Fail fast instead of waiting when the queue is full.
    pub reject_when_full: bool,
    pub face_selection: FaceSelection,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_face_size: u32,
    pub jpeg_quality: u8,
}

impl Config {
    /// Load configuration from `DERMA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("DERMA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| derma_core::default_model_dir());

        let workers = env_usize("DERMA_WORKERS", default_workers()).max(1);

        let face_selection = match std::env::var("DERMA_FACE_SELECTION") {
            Ok(v) => v.parse().unwrap_or_else(|err: String| {
                tracing::warn!(error = %err, "ignoring DERMA_FACE_SELECTION");
                FaceSelection::default()
            }),
            Err(_) => FaceSelection::default(),
        };

        let scan = ScanParams::default();

        Self {
            model_dir,
            cascade_path: std::env::var("DERMA_CASCADE_PATH").ok().map(PathBuf::from),
            workers,
            queue_depth: env_usize("DERMA_QUEUE_DEPTH", workers * 2).max(1),
            reject_when_full: std::env::var("DERMA_REJECT_WHEN_FULL")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(false),
            face_selection,
            scale_factor: env_f32("DERMA_SCALE_FACTOR", scan.scale_factor),
            min_neighbors: env_u32("DERMA_MIN_NEIGHBORS", scan.min_neighbors),
            min_face_size: env_u32("DERMA_MIN_FACE_SIZE", scan.min_face_size),
            jpeg_quality: env_u8("DERMA_JPEG_QUALITY", derma_core::codec::DEFAULT_JPEG_QUALITY)
                .clamp(1, 100),
        }
    }

    /// Path to the frontal face cascade.
    pub fn cascade_path(&self) -> PathBuf {
        self.cascade_path
            .clone()
            .unwrap_or_else(|| self.model_dir.join(FRONTAL_FACE_CASCADE))
    }

    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_face_size: self.min_face_size,
            ..ScanParams::default()
        }
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            face_selection: self.face_selection,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
