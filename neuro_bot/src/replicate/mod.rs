pub mod client;
pub mod dto;

pub use client::ReplicateClient;

pub const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com/v1";
pub const DEFAULT_TRAINER_OWNER: &str = "ostris";
pub const DEFAULT_TRAINER_MODEL: &str = "flux-dev-lora-trainer";
pub const DEFAULT_TRAINER_VERSION: &str =
    "e440909d3512c31646ee2e0c7d6f6f4923224863a6a10c494606e79fb5844497";

pub const REPLICATE_MAX_RETRIES: u32 = 3;
pub const REPLICATE_RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Clone, Debug)]
pub struct ReplicateConfig {
    pub api_url: String,
    pub api_token: String,
    /// Account that owns the trained destination models.
    pub username: String,
    pub trainer_owner: String,
    pub trainer_model: String,
    pub trainer_version: String,
    pub webhook_url: String,
}
