use neuro_core::messages::{CANCEL_TRAINING_CALLBACK_PREFIX, Language};
use neuro_core::notify::MessageAction;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainArgs {
    pub model_name: String,
    pub trigger_word: String,
    pub steps: String,
    pub zip_url: String,
}

/// `/train <model> <trigger> <steps> <zip url>`. Steps stay raw text; the
/// orchestrator owns their validation.
pub fn parse_train_args(raw: &str) -> Option<TrainArgs> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    match parts.as_slice() {
        [model, trigger, steps, zip_url] => Some(TrainArgs {
            model_name: model.to_string(),
            trigger_word: trigger.to_string(),
            steps: steps.to_string(),
            zip_url: zip_url.to_string(),
        }),
        _ => None,
    }
}

pub fn train_usage(lang: Language) -> String {
    if lang.is_ru() {
        "ℹ️ Использование: /train <модель> <триггер> <шаги> <ссылка на zip>\nПример: /train my_lora person1 1500 https://example.com/images.zip".to_string()
    } else {
        "ℹ️ Usage: /train <model> <trigger> <steps> <zip url>\nExample: /train my_lora person1 1500 https://example.com/images.zip".to_string()
    }
}

pub fn training_queued(lang: Language, model_name: &str) -> String {
    if lang.is_ru() {
        format!("📥 Запрос на обучение модели {} принят.", model_name)
    } else {
        format!("📥 Training request for {} accepted.", model_name)
    }
}

pub fn queue_unavailable(lang: Language) -> String {
    if lang.is_ru() {
        "❌ Очередь обучения недоступна. Попробуйте позже.".to_string()
    } else {
        "❌ The training queue is unavailable. Please try again later.".to_string()
    }
}

pub fn cancel_record_id(data: &str) -> Option<&str> {
    data.strip_prefix(CANCEL_TRAINING_CALLBACK_PREFIX)
        .filter(|id| !id.is_empty())
}

pub fn action_keyboard(action: MessageAction) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        action.label,
        action.callback_data,
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_arguments() {
        let args =
            parse_train_args(" my_lora  person1 1500 https://example.com/images.zip ").unwrap();
        assert_eq!(args.model_name, "my_lora");
        assert_eq!(args.trigger_word, "person1");
        assert_eq!(args.steps, "1500");
        assert_eq!(args.zip_url, "https://example.com/images.zip");
    }

    #[test]
    fn rejects_wrong_argument_count() {
        assert!(parse_train_args("").is_none());
        assert!(parse_train_args("my_lora person1 1500").is_none());
        assert!(parse_train_args("a b c d e").is_none());
    }

    #[test]
    fn extracts_record_id_from_callback() {
        assert_eq!(cancel_record_id("cancel_train:abc"), Some("abc"));
        assert_eq!(cancel_record_id("cancel_train:"), None);
        assert_eq!(cancel_record_id("sched_back"), None);
    }
}
