use axum::http::{header, HeaderMap};

use crate::models::Locale;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseFormat {
    Xml,
    Json,
}

impl ResponseFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseFormat::Xml => "application/xml; charset=utf-8",
            ResponseFormat::Json => "application/json",
        }
    }
}

/// Records are XML unless the Accept header explicitly asks for JSON.
pub fn preferred_format(headers: &HeaderMap) -> ResponseFormat {
    if let Some(accept) = headers.get(header::ACCEPT) {
        if let Ok(accept_str) = accept.to_str() {
            if accept_str.contains("application/json") && !accept_str.contains("application/xml") {
                return ResponseFormat::Json;
            }
        }
    }

    ResponseFormat::Xml
}

/// First language range of `Accept-Language`, else `default`.
///
/// Quality values are ignored; `*` counts as absent.
pub fn request_locale(headers: &HeaderMap, default: &Locale) -> Locale {
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|range| range.split(';').next().unwrap_or_default().trim())
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .map(Locale::new)
        .unwrap_or_else(|| default.clone())
}
