use chrono::NaiveDate;

use crate::server::response::ApiError;
use crate::types::GoalPeriod;

const MAX_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 500;
const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2200;
const THEMES: &[&str] = &["light", "dark", "system"];

fn validate_name(name: &str, entity: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{entity} name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(format!("{entity} name cannot exceed {MAX_NAME_LEN} characters"));
    }
    Ok(())
}

pub fn validate_category_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Category").map_err(ApiError::bad_request)
}

pub fn validate_goal_name(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Goal").map_err(ApiError::bad_request)
}

/// `#rgb` or `#rrggbb`.
pub fn validate_color(color: &str) -> Result<(), ApiError> {
    let valid = color
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(ApiError::bad_request("Color must be a hex value like #22c55e"));
    }
    Ok(())
}

/// Strictly positive, finite.
pub fn validate_amount(amount: f64, field: &str) -> Result<(), ApiError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ApiError::bad_request(format!("{field} must be greater than zero")));
    }
    Ok(())
}

/// Zero allowed, finite.
pub fn validate_non_negative(amount: f64, field: &str) -> Result<(), ApiError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ApiError::bad_request(format!("{field} cannot be negative")));
    }
    Ok(())
}

pub fn validate_period(year: i32, month: u32) -> Result<(), ApiError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(ApiError::bad_request(format!(
            "Year must be between {MIN_YEAR} and {MAX_YEAR}"
        )));
    }
    if !(1..=12).contains(&month) {
        return Err(ApiError::bad_request("Month must be between 1 and 12"));
    }
    Ok(())
}

pub fn parse_date_field(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("Date must be formatted as YYYY-MM-DD"))
}

pub fn parse_goal_period(raw: &str) -> Result<GoalPeriod, ApiError> {
    GoalPeriod::parse(raw.trim())
        .ok_or_else(|| ApiError::bad_request("Period must be weekly, monthly or yearly"))
}

pub fn validate_description(description: &str) -> Result<(), ApiError> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

/// ISO 4217 style: three uppercase letters.
pub fn validate_currency(currency: &str) -> Result<(), ApiError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::bad_request("Currency must be a three letter code like USD"));
    }
    Ok(())
}

pub fn validate_language(language: &str) -> Result<(), ApiError> {
    let valid = (2..=5).contains(&language.len())
        && language
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '-');
    if !valid {
        return Err(ApiError::bad_request("Language must be a code like en or pt-BR"));
    }
    Ok(())
}

pub fn validate_theme(theme: &str) -> Result<(), ApiError> {
    if !THEMES.contains(&theme) {
        return Err(ApiError::bad_request("Theme must be light, dark or system"));
    }
    Ok(())
}

/// Client supplied ids end up as spreadsheet cells; keep them plain.
pub fn validate_client_id(id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::bad_request(
            "Id can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    Ok(())
}
