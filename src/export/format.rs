use chrono::{NaiveDate, NaiveDateTime};
use serde::Serializer;

use crate::models::User;

/// Locale-independent, 24-hour.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub fn date_at_midnight(value: NaiveDate) -> NaiveDateTime {
    value.and_time(chrono::NaiveTime::MIN)
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Plain decimal notation, never exponents, with a trailing `.0` on whole numbers (`70.0`, `70.5`).
pub fn format_numeric(value: f64) -> String {
    let rendered = value.to_string();
    if value.is_finite() && !rendered.contains('.') {
        format!("{}.0", rendered)
    } else {
        rendered
    }
}

/// `<user id>^<formatted name>`
pub fn format_user(user: &User) -> String {
    format!("{}^{}", user.user_id, user.formatted_name())
}

pub fn civil_status_label(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("Single"),
        2 => Some("Married"),
        3 => Some("Divorced"),
        4 => Some("Widowed"),
        _ => None,
    }
}

pub fn serialize_datetime<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_datetime(value))
}

pub fn serialize_opt_datetime<S: Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_str(&format_datetime(value)),
        None => serializer.serialize_none(),
    }
}
