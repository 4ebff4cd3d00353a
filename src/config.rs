use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub output_dir: PathBuf,
    pub models_dir: PathBuf,
    pub sweep_interval: Duration,
    pub onnx_threads: usize,
}

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_ONNX_THREADS: usize = 4;

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            host: string("HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            output_dir: string("OUTPUT_DIR", "generated_audio").into(),
            models_dir: string("MODELS_DIR", "./models").into(),
            sweep_interval: Duration::from_secs(
                parse_or(&lookup, "SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1),
            ),
            onnx_threads: parse_or(&lookup, "ONNX_THREADS", DEFAULT_ONNX_THREADS).max(1),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {}='{}', falling back to {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}
