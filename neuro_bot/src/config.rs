use std::env;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use neuro_core::pricing::{DEFAULT_STEP_RATE, Pricing};
use neuro_core::training::OrchestratorConfig;

use crate::replicate::{
    DEFAULT_REPLICATE_API_URL, DEFAULT_TRAINER_MODEL, DEFAULT_TRAINER_OWNER,
    DEFAULT_TRAINER_VERSION, ReplicateConfig,
};

const DEFAULT_SLED_PATH: &str = "neuro_db";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_TRAINING_CONCURRENCY: usize = 2;
const DEFAULT_STALE_PENDING_MINUTES: i64 = 30;
const DEFAULT_WEBHOOK_BIND_ADDR: &str = "0.0.0.0:2999";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotToken {
    pub name: String,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub bots: Vec<BotToken>,
    pub api_url: String,
    pub replicate: ReplicateConfig,
    pub sled_path: String,
    pub step_rate: f64,
    pub cache_ttl_secs: u64,
    pub training_concurrency: usize,
    pub stale_pending_minutes: i64,
    pub webhook_bind_addr: String,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let bots = parse_bot_tokens(&required("BOT_TOKENS")?)?;
        let api_url = required("API_URL")?.trim_end_matches('/').to_string();

        let replicate = ReplicateConfig {
            api_url: env::var("REPLICATE_API_URL")
                .unwrap_or_else(|_| DEFAULT_REPLICATE_API_URL.to_string()),
            api_token: required("REPLICATE_API_TOKEN")?,
            username: required("REPLICATE_USERNAME")?,
            trainer_owner: env::var("REPLICATE_TRAINER_OWNER")
                .unwrap_or_else(|_| DEFAULT_TRAINER_OWNER.to_string()),
            trainer_model: env::var("REPLICATE_TRAINER_MODEL")
                .unwrap_or_else(|_| DEFAULT_TRAINER_MODEL.to_string()),
            trainer_version: env::var("REPLICATE_TRAINER_VERSION")
                .unwrap_or_else(|_| DEFAULT_TRAINER_VERSION.to_string()),
            webhook_url: format!("{}/webhooks/replicate", api_url),
        };

        Ok(Self {
            bots,
            replicate,
            sled_path: env::var("SLED_PATH").unwrap_or_else(|_| DEFAULT_SLED_PATH.to_string()),
            step_rate: parse_or("TRAINING_STEP_RATE", DEFAULT_STEP_RATE)?,
            cache_ttl_secs: parse_or("TRAINING_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            training_concurrency: parse_or("TRAINING_CONCURRENCY", DEFAULT_TRAINING_CONCURRENCY)?,
            stale_pending_minutes: parse_or("STALE_PENDING_MINUTES", DEFAULT_STALE_PENDING_MINUTES)?,
            webhook_bind_addr: env::var("WEBHOOK_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_WEBHOOK_BIND_ADDR.to_string()),
            api_url,
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            pricing: Pricing::new(self.step_rate),
            cache_ttl_ms: (self.cache_ttl_secs as i64) * 1000,
            stale_pending_after: chrono::Duration::minutes(self.stale_pending_minutes),
            api_base_url: self.api_url.clone(),
        }
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow!("{} not set", name)),
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid {} value {:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Parses `name:token` pairs separated by commas. Telegram tokens contain a
/// colon themselves, so only the first one separates the name.
pub fn parse_bot_tokens(raw: &str) -> Result<Vec<BotToken>> {
    let mut bots = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (name, token) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("BOT_TOKENS entry {:?} is not name:token", pair))?;
        if name.is_empty() || token.is_empty() {
            return Err(anyhow!("BOT_TOKENS entry {:?} is not name:token", pair));
        }
        bots.push(BotToken {
            name: name.to_string(),
            token: token.to_string(),
        });
    }
    if bots.is_empty() {
        return Err(anyhow!("BOT_TOKENS has no bots"));
    }
    Ok(bots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_bots_with_colon_tokens() {
        let bots =
            parse_bot_tokens("neuro_blogger_bot:123:AAA, ai_koshey_bot:456:BBB").unwrap();
        assert_eq!(
            bots,
            vec![
                BotToken {
                    name: "neuro_blogger_bot".into(),
                    token: "123:AAA".into()
                },
                BotToken {
                    name: "ai_koshey_bot".into(),
                    token: "456:BBB".into()
                },
            ]
        );
    }

    #[test]
    fn rejects_entry_without_name() {
        assert!(parse_bot_tokens("justatoken").is_err());
        assert!(parse_bot_tokens(":123:AAA").is_err());
        assert!(parse_bot_tokens(" , ").is_err());
    }
}
