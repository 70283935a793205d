use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct CreateModelRequest {
    pub owner: String,
    pub name: String,
    pub visibility: String,
    pub hardware: String,
    pub description: String,
}

impl CreateModelRequest {
    pub fn lora(owner: &str, name: &str, trigger_word: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            visibility: "public".to_string(),
            hardware: "gpu-t4".to_string(),
            description: format!("LoRA: {}", trigger_word),
        }
    }
}

/// Inputs of the flux LoRA trainer. Everything except the archive, trigger
/// word and steps is fixed.
#[derive(Debug, Clone, Serialize)]
pub struct TrainerInput {
    pub input_images: String,
    pub trigger_word: String,
    pub steps: u32,
    pub lora_rank: u32,
    pub optimizer: String,
    pub batch_size: u32,
    pub resolution: String,
    pub learning_rate: f64,
    pub wandb_project: String,
}

impl TrainerInput {
    pub fn new(input_images: String, trigger_word: String, steps: u32) -> Self {
        Self {
            input_images,
            trigger_word,
            steps,
            lora_rank: 128,
            optimizer: "adamw8bit".to_string(),
            batch_size: 1,
            resolution: "512,768,1024".to_string(),
            learning_rate: 0.0001,
            wandb_project: "flux_train_replicate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTrainingRequest {
    pub destination: String,
    pub input: TrainerInput,
    pub webhook: String,
    pub webhook_events_filter: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingUrls {
    pub cancel: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingResponse {
    pub id: String,
    pub status: String,
    pub urls: Option<TrainingUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: Option<String>,
    pub title: Option<String>,
}
