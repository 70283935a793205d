use url::Url;

use crate::error::ValidationError;
use crate::training::dto::{StepsInput, TrainingEvent, TrainingRequest};

/// Turns a raw event into a request, or says why it cannot be one.
/// Pure: no I/O happens here.
pub fn validate_event(event: &TrainingEvent, api_base_url: &str) -> Result<TrainingRequest, ValidationError> {
    let steps = parse_steps(&event.steps)?;
    let telegram_id = event
        .telegram_id
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidTelegramId(event.telegram_id.clone()))?;

    let model_name = event.model_name.trim();
    if model_name.is_empty() {
        return Err(ValidationError::MissingField("modelName"));
    }
    let trigger_word = event.trigger_word.trim();
    if trigger_word.is_empty() {
        return Err(ValidationError::MissingField("triggerWord"));
    }
    if event.zip_url.trim().is_empty() {
        return Err(ValidationError::MissingField("zipUrl"));
    }
    let archive_url = resolve_archive_url(&event.zip_url, api_base_url)?;

    Ok(TrainingRequest {
        bot_name: event.bot_name.clone(),
        telegram_id,
        model_name: model_name.to_string(),
        steps,
        trigger_word: trigger_word.to_string(),
        archive_url,
        language: event.language(),
    })
}

pub fn parse_steps(raw: &StepsInput) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidSteps(describe_steps(raw));
    let value = match raw {
        StepsInput::Int(value) => *value,
        StepsInput::Float(value) => integral(*value).ok_or_else(invalid)?,
        StepsInput::Text(text) => {
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(value) => value,
                Err(_) => text
                    .parse::<f64>()
                    .ok()
                    .and_then(integral)
                    .ok_or_else(invalid)?,
            }
        }
    };
    if value <= 0 {
        return Err(invalid());
    }
    u32::try_from(value).map_err(|_| invalid())
}

fn integral(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn describe_steps(raw: &StepsInput) -> String {
    match raw {
        StepsInput::Int(value) => value.to_string(),
        StepsInput::Float(value) => value.to_string(),
        StepsInput::Text(text) => text.clone(),
    }
}

/// Relative archive paths (as produced by the upload endpoint) are served
/// from the API host; the provider only accepts absolute http(s) URLs.
pub fn resolve_archive_url(raw: &str, api_base_url: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let normalized = trimmed.strip_prefix('/').unwrap_or(trimmed);

    let candidate = if normalized.starts_with("http://") || normalized.starts_with("https://") {
        normalized.to_string()
    } else if normalized.contains("://") {
        return Err(ValidationError::InvalidArchiveUrl(format!(
            "{} is not a valid URL scheme",
            trimmed
        )));
    } else {
        format!("{}/{}", api_base_url.trim_end_matches('/'), normalized)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ValidationError::InvalidArchiveUrl(format!("{}: {}", candidate, e)))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ValidationError::InvalidArchiveUrl(candidate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Language;
    use crate::training::dto::LanguageFlag;

    const API: &str = "https://api.neuro.example";

    fn event(steps: StepsInput, zip_url: &str) -> TrainingEvent {
        TrainingEvent {
            bot_name: "neuro_blogger_bot".to_string(),
            telegram_id: "144022504".to_string(),
            model_name: "test_lora_model".to_string(),
            steps,
            trigger_word: "person1".to_string(),
            zip_url: zip_url.to_string(),
            is_ru: LanguageFlag::Bool(true),
        }
    }

    #[test]
    fn accepts_well_formed_event() {
        let request = validate_event(
            &event(StepsInput::Text("1500".into()), "https://example.com/training-images.zip"),
            API,
        )
        .unwrap();
        assert_eq!(request.telegram_id, 144022504);
        assert_eq!(request.steps, 1500);
        assert_eq!(request.language, Language::Ru);
        assert_eq!(request.archive_url.as_str(), "https://example.com/training-images.zip");
    }

    #[test]
    fn rejects_non_positive_and_non_numeric_steps() {
        for steps in [
            StepsInput::Int(0),
            StepsInput::Int(-10),
            StepsInput::Float(12.5),
            StepsInput::Text("abc".into()),
            StepsInput::Text("".into()),
            StepsInput::Text("-1".into()),
        ] {
            let err = validate_event(&event(steps.clone(), "https://x.io/a.zip"), API).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidSteps(_)),
                "{:?} should be invalid",
                steps
            );
        }
    }

    #[test]
    fn integral_float_steps_are_accepted() {
        assert_eq!(parse_steps(&StepsInput::Float(1000.0)).unwrap(), 1000);
        assert_eq!(parse_steps(&StepsInput::Text("1000.0".into())).unwrap(), 1000);
    }

    #[test]
    fn relative_url_resolves_against_api_base() {
        let url = resolve_archive_url("/uploads/abc.zip", "https://api.neuro.example/").unwrap();
        assert_eq!(url.as_str(), "https://api.neuro.example/uploads/abc.zip");
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        let err = resolve_archive_url("ftp://files.example/a.zip", API).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidArchiveUrl(_)));
    }

    #[test]
    fn relative_url_with_unusable_base_is_rejected() {
        assert!(resolve_archive_url("uploads/a.zip", "not a base").is_err());
    }

    #[test]
    fn empty_trigger_word_is_rejected() {
        let mut ev = event(StepsInput::Int(10), "https://x.io/a.zip");
        ev.trigger_word = "  ".into();
        assert_eq!(
            validate_event(&ev, API).unwrap_err(),
            ValidationError::MissingField("triggerWord")
        );
    }
}
