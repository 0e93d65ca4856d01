use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Access/refresh pair returned by login, registration and refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens must never end up in logs
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub login: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Body of `POST /auth/register-company`: the company plus its owner account.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterCompanyRequest {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    pub date_established: NaiveDate,

    pub login: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub salary: i64,
}

impl std::fmt::Debug for RegisterCompanyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterCompanyRequest")
            .field("company_name", &self.company_name)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Parse a salary typed into a form: everything but digits is dropped.
/// Returns `None` when no digits remain or the value overflows.
pub fn parse_salary(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Group a digit string in thousands with spaces ("1500000" -> "1 500 000").
pub fn format_salary(digits: &str) -> String {
    let len = digits.chars().count();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pair_ignores_token_type() {
        let json = r#"{"access_token":"A","refresh_token":"B","token_type":"bearer"}"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair, TokenPair::new("A", "B"));
    }

    #[test]
    fn test_token_pair_debug_is_redacted() {
        let debug = format!("{:?}", TokenPair::new("secret-a", "secret-b"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_register_request_serializes_salary_as_integer() {
        let req = RegisterCompanyRequest {
            company_name: "Acme".to_string(),
            company_description: None,
            date_established: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            login: "owner".to_string(),
            password: "StrongPass1!".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Taylor".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1992, 2, 2).unwrap(),
            salary: 150000,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["salary"], serde_json::json!(150000));
        assert_eq!(value["date_established"], "2020-05-01");
        assert!(value.get("company_description").is_none());
        assert!(!format!("{:?}", req).contains("StrongPass1!"));
    }

    #[test]
    fn test_parse_salary() {
        assert_eq!(parse_salary("150 000"), Some(150000));
        assert_eq!(parse_salary("1,200"), Some(1200));
        assert_eq!(parse_salary("abc"), None);
        assert_eq!(parse_salary(""), None);
    }

    #[test]
    fn test_format_salary() {
        assert_eq!(format_salary(""), "");
        assert_eq!(format_salary("999"), "999");
        assert_eq!(format_salary("1000"), "1 000");
        assert_eq!(format_salary("1500000"), "1 500 000");
    }
}
