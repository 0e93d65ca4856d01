//! User-facing auth messages and translation of backend validation errors.

use crate::api::FieldError;

pub const SERVER_UNAVAILABLE: &str = "Сервер не отвечает";
pub const INVALID_CREDENTIALS: &str = "Неверный логин или пароль";
pub const LOGIN_FAILED: &str = "Ошибка входа";
pub const REGISTRATION_FAILED: &str = "Ошибка регистрации";
pub const REGISTRATION_REJECTED: &str = "Не удалось зарегистрироваться";
pub const UNREADABLE_RESPONSE: &str = "Некорректный ответ сервера";

/// Ordered fragment replacements for validation text that carries no code.
/// Each fragment is replaced at its first occurrence only.
const FRAGMENTS: &[(&str, &str)] = &[
    ("String should have at least", "Минимум"),
    ("String should have at most", "Максимум"),
    ("characters", "символов"),
    ("Field required", "Обязательное поле"),
    ("Value error,", ""),
    ("Input should be a valid", "Должно быть"),
    ("integer", "целым числом"),
    ("string", "строкой"),
    ("date", "датой"),
    ("greater than 0", "больше 0"),
    ("Input should be greater than", "Значение должно быть больше"),
];

/// Validation failure kinds reported by the backend in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    Missing,
    StringTooShort,
    StringTooLong,
    NotInteger,
    NotString,
    NotDate,
    GreaterThan,
    ValueError,
}

impl ValidationCode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "missing" => Some(Self::Missing),
            "string_too_short" => Some(Self::StringTooShort),
            "string_too_long" => Some(Self::StringTooLong),
            "int_parsing" | "int_type" | "int_from_float" => Some(Self::NotInteger),
            "string_type" => Some(Self::NotString),
            "date_parsing" | "date_type" | "date_from_datetime_parsing" => Some(Self::NotDate),
            "greater_than" => Some(Self::GreaterThan),
            "value_error" => Some(Self::ValueError),
            _ => None,
        }
    }
}

/// Substring translation of a raw English validation message.
pub fn translate_message(msg: &str) -> String {
    FRAGMENTS
        .iter()
        .fold(msg.to_string(), |acc, (from, to)| acc.replacen(from, to, 1))
        .trim()
        .to_string()
}

/// Human-readable message for one validation error.
///
/// Uses the error's `type` code and context when present, and falls back
/// to fragment translation of `msg` otherwise.
pub fn translate_field_error(err: &FieldError) -> String {
    let code = err.kind.as_deref().and_then(ValidationCode::from_code);
    let structured = match code {
        Some(ValidationCode::Missing) => Some("Обязательное поле".to_string()),
        Some(ValidationCode::StringTooShort) => err
            .ctx_value("min_length")
            .map(|n| format!("Минимум {} символов", n)),
        Some(ValidationCode::StringTooLong) => err
            .ctx_value("max_length")
            .map(|n| format!("Максимум {} символов", n)),
        Some(ValidationCode::NotInteger) => Some("Должно быть целым числом".to_string()),
        Some(ValidationCode::NotString) => Some("Должно быть строкой".to_string()),
        Some(ValidationCode::NotDate) => Some("Должно быть датой".to_string()),
        Some(ValidationCode::GreaterThan) => err
            .ctx_value("gt")
            .map(|n| format!("Значение должно быть больше {}", n)),
        Some(ValidationCode::ValueError) | None => None,
    };
    structured.unwrap_or_else(|| translate_message(&err.msg))
}
