pub mod handlers;
pub mod routes;

use serde::Serialize;

use crate::service::BatchOutcome;

pub const SERVICE_NAME: &str = "Speech File Server";

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub device: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub device: String,
    pub english_model_loaded: bool,
    pub multilingual_model_loaded: bool,
    pub voice_prompts_supported: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchOutcome>,
}
