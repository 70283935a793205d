//! User-facing texts for the training flow, in the two supported languages.

use serde::{Deserialize, Serialize};

use crate::balance::Stars;
use crate::error::{TrainingError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ru,
    #[default]
    En,
}

impl Language {
    pub fn is_ru(self) -> bool {
        matches!(self, Language::Ru)
    }

    /// Maps a Telegram `language_code` to one of the supported languages.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(code) if code.to_lowercase().starts_with("ru") => Language::Ru,
            _ => Language::En,
        }
    }

    fn pick(self, ru: &str, en: &str) -> String {
        if self.is_ru() { ru.to_string() } else { en.to_string() }
    }
}

pub const CANCEL_TRAINING_CALLBACK_PREFIX: &str = "cancel_train:";

pub fn training_starting(lang: Language) -> String {
    lang.pick("🔍 Начинаем обучение модели...", "🔍 Starting model training...")
}

pub fn training_submitted(lang: Language) -> String {
    lang.pick(
        "🔄 Запрос на обучение модели отправлен!\n\nЭто может занять несколько часов. Я отправлю уведомление, когда модель будет готова.",
        "🔄 Model training request sent!\n\nThis may take several hours. I will send a notification when the model is ready.",
    )
}

pub fn training_unconfirmed(lang: Language) -> String {
    lang.pick(
        "⏳ Сервис обучения не подтвердил запуск. Звезды пока не возвращены: мы проверим тренировку вручную.",
        "⏳ The training service did not confirm the start. Stars are not returned yet: we will check the training manually.",
    )
}

pub fn training_ready(lang: Language, model_name: &str) -> String {
    if lang.is_ru() {
        format!("🎉 Модель {} готова!", model_name)
    } else {
        format!("🎉 Model {} ready!", model_name)
    }
}

pub fn training_canceled(lang: Language, model_name: &str) -> String {
    if lang.is_ru() {
        format!("🛑 Обучение модели {} отменено.", model_name)
    } else {
        format!("🛑 Training of model {} was canceled.", model_name)
    }
}

pub fn training_error(lang: Language, reason: &str) -> String {
    if lang.is_ru() {
        format!("❌ Ошибка: {}", reason)
    } else {
        format!("❌ Error: {}", reason)
    }
}

pub fn duplicate_request(lang: Language) -> String {
    lang.pick(
        "⚠️ Запрос на обучение этой модели уже обрабатывается. Пожалуйста, подождите...",
        "⚠️ Your training request is already processing. Please wait...",
    )
}

pub fn cancel_offer(lang: Language) -> String {
    lang.pick(
        "Вы можете отменить текущую тренировку, если хотите начать новую.",
        "You can cancel the current training if you want to start a new one.",
    )
}

pub fn cancel_button_label(lang: Language) -> String {
    lang.pick("❌ Отменить текущую тренировку", "❌ Cancel current training")
}

pub fn cancel_callback_data(record_id: &str) -> String {
    format!("{}{}", CANCEL_TRAINING_CALLBACK_PREFIX, record_id)
}

pub fn insufficient_balance(lang: Language, required: Stars, available: Stars) -> String {
    if lang.is_ru() {
        format!(
            "💸 Недостаточно звезд для обучения.\nНужно: {}\nВаш баланс: {}\n\nПополните баланс, чтобы продолжить.",
            required, available
        )
    } else {
        format!(
            "💸 Not enough stars for training.\nRequired: {}\nYour balance: {}\n\nPlease top up your balance to continue.",
            required, available
        )
    }
}

pub fn stars_refunded(lang: Language, amount: Stars) -> String {
    if lang.is_ru() {
        format!("💰 Звезды возвращены на баланс: {}", amount)
    } else {
        format!("💰 Stars returned to your balance: {}", amount)
    }
}

pub fn nothing_to_cancel(lang: Language) -> String {
    lang.pick("🤷 Нет активной тренировки для отмены.", "🤷 There is no running training to cancel.")
}

pub fn cancel_requested(lang: Language) -> String {
    lang.pick(
        "🛑 Отмена тренировки запрошена. Звезды вернутся после подтверждения отмены.",
        "🛑 Training cancellation requested. Stars are returned once the cancellation is confirmed.",
    )
}

pub fn current_balance(lang: Language, balance: Stars) -> String {
    if lang.is_ru() {
        format!("💰 Ваш баланс: {}", balance)
    } else {
        format!("💰 Your balance: {}", balance)
    }
}

pub fn top_up_credited(lang: Language, amount: Stars, balance: Stars) -> String {
    if lang.is_ru() {
        format!("✅ Баланс пополнен на {}. Текущий баланс: {}", amount, balance)
    } else {
        format!("✅ Added {} to your balance. Current balance: {}", amount, balance)
    }
}

pub fn balance_unavailable(lang: Language) -> String {
    lang.pick(
        "❌ Баланс временно недоступен. Попробуйте позже.",
        "❌ Balance is temporarily unavailable. Please try again later.",
    )
}

pub fn stars_only(lang: Language) -> String {
    lang.pick(
        "Принимаются только Telegram Stars.",
        "Only Telegram Stars are accepted.",
    )
}

pub fn payment_credit_failed(lang: Language) -> String {
    lang.pick(
        "❌ Платеж получен, но баланс не обновился. Поддержка уже уведомлена.",
        "❌ Payment received but the balance update failed. Support has been notified.",
    )
}

/// Reason shown to the user for a failed submission. Details are only echoed
/// for errors whose text is known to be safe and meaningful.
pub fn failure_reason(lang: Language, error: &TrainingError) -> String {
    match error {
        TrainingError::Validation(ValidationError::InvalidSteps(_)) => {
            lang.pick("Некорректное количество шагов", "Invalid steps count")
        }
        TrainingError::Validation(ValidationError::InvalidArchiveUrl(_)) => lang.pick(
            "Ошибка URL изображений. Проверьте доступность архива.",
            "Invalid image URL. Please check archive accessibility.",
        ),
        TrainingError::Validation(ValidationError::MissingField(field)) => {
            if lang.is_ru() {
                format!("Отсутствует обязательный параметр: {}", field)
            } else {
                format!("Missing required parameter: {}", field)
            }
        }
        TrainingError::Validation(ValidationError::InvalidTelegramId(_)) => {
            lang.pick("Некорректный идентификатор пользователя", "Invalid user id")
        }
        TrainingError::InsufficientBalance { .. } => {
            lang.pick("Недостаточно средств", "Insufficient balance")
        }
        TrainingError::DuplicateActive { .. } => duplicate_request(lang),
        TrainingError::Provider(provider) => {
            let message = provider.message.as_str();
            if message.contains("is not a valid URL scheme") {
                lang.pick(
                    "Ошибка URL изображений. Проверьте, что загруженный архив доступен по HTTPS.",
                    "Invalid image URL. Please ensure the uploaded ZIP file is accessible via HTTPS.",
                )
            } else if message.to_lowercase().contains("validation") {
                lang.pick(
                    "Ошибка валидации данных. Проверьте формат и содержимое архива.",
                    "Data validation error. Please check the format and content of your ZIP archive.",
                )
            } else {
                generic_failure(lang)
            }
        }
        TrainingError::Persistence { .. } | TrainingError::Ledger(_) => generic_failure(lang),
    }
}

fn generic_failure(lang: Language) -> String {
    lang.pick(
        "Не удалось запустить обучение. Попробуйте позже.",
        "Could not start the training. Please try again later.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ProviderErrorKind};

    #[test]
    fn language_from_telegram_code() {
        assert_eq!(Language::from_code(Some("ru")), Language::Ru);
        assert_eq!(Language::from_code(Some("ru-RU")), Language::Ru);
        assert_eq!(Language::from_code(Some("en")), Language::En);
        assert_eq!(Language::from_code(None), Language::En);
    }

    #[test]
    fn provider_url_scheme_error_is_explained() {
        let err = TrainingError::Provider(ProviderError::new(
            ProviderErrorKind::Validation,
            "input_images: ftp://x is not a valid URL scheme",
        ));
        assert!(failure_reason(Language::En, &err).contains("HTTPS"));
    }

    #[test]
    fn opaque_provider_error_is_not_echoed() {
        let err = TrainingError::Provider(ProviderError::new(
            ProviderErrorKind::Api,
            "internal stack trace at 0xdeadbeef",
        ));
        let reason = failure_reason(Language::Ru, &err);
        assert!(!reason.contains("0xdeadbeef"));
        assert_eq!(reason, generic_failure(Language::Ru));
    }

    #[test]
    fn payment_texts_follow_language() {
        assert!(stars_only(Language::Ru).contains("Telegram Stars"));
        assert_eq!(stars_only(Language::En), "Only Telegram Stars are accepted.");
        assert_ne!(balance_unavailable(Language::Ru), balance_unavailable(Language::En));
        assert!(payment_credit_failed(Language::Ru).contains("Платеж"));
        assert!(payment_credit_failed(Language::En).contains("Payment received"));
    }

    #[test]
    fn cancel_callback_round_trips_prefix() {
        let data = cancel_callback_data("abc");
        assert_eq!(data.strip_prefix(CANCEL_TRAINING_CALLBACK_PREFIX), Some("abc"));
    }
}
