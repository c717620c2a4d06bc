use chrono::NaiveDateTime;
use serde::Serialize;

use super::format::{format_bool, format_datetime, format_numeric, serialize_datetime};
use crate::models::{ConceptId, Locale, Obs};

/// The one value an observation is exported with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum TypedValue {
    Coded { concept_id: ConceptId, name: String },
    Boolean { value: bool },
    Datetime {
        #[serde(serialize_with = "serialize_datetime")]
        value: NaiveDateTime,
    },
    Numeric { value: f64 },
    Text { value: String },
}

impl TypedValue {
    /// First populated field in the order coded, boolean, datetime, numeric, text.
    ///
    /// Fails with the coded concept's id when it has no name to display.
    pub fn resolve(obs: &Obs, locale: &Locale) -> Result<Option<TypedValue>, ConceptId> {
        if let Some(coded) = &obs.value_coded {
            let name = coded.name(locale).ok_or(coded.concept_id)?;
            return Ok(Some(TypedValue::Coded {
                concept_id: coded.concept_id,
                name: name.to_string(),
            }));
        }
        if let Some(value) = obs.value_boolean {
            return Ok(Some(TypedValue::Boolean { value }));
        }
        if let Some(value) = obs.value_datetime {
            return Ok(Some(TypedValue::Datetime { value }));
        }
        if let Some(value) = obs.value_numeric {
            return Ok(Some(TypedValue::Numeric { value }));
        }
        Ok(obs.value_text.clone().map(|value| TypedValue::Text { value }))
    }

    pub fn data_type(&self) -> &'static str {
        match self {
            TypedValue::Coded { .. } => "coded",
            TypedValue::Boolean { .. } => "boolean",
            TypedValue::Datetime { .. } => "datetime",
            TypedValue::Numeric { .. } => "numeric",
            TypedValue::Text { .. } => "text",
        }
    }

    pub fn render(&self) -> String {
        match self {
            TypedValue::Coded { name, .. } => name.clone(),
            TypedValue::Boolean { value } => format_bool(*value).to_string(),
            TypedValue::Datetime { value } => format_datetime(value),
            TypedValue::Numeric { value } => format_numeric(*value),
            TypedValue::Text { value } => value.clone(),
        }
    }

    /// `value_*` attributes describing this variant.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            TypedValue::Coded { concept_id, name } => vec![
                ("value_coded_id", concept_id.to_string()),
                ("value_coded", name.clone()),
            ],
            TypedValue::Boolean { .. } => vec![("value_boolean", self.render())],
            TypedValue::Datetime { .. } => vec![("value_datetime", self.render())],
            TypedValue::Numeric { .. } => vec![("value_numeric", self.render())],
            TypedValue::Text { .. } => vec![("value_text", self.render())],
        }
    }
}

/// `"<modifier> <value>"` when a modifier is present.
pub fn render_with_modifier(value: &TypedValue, modifier: Option<&str>) -> String {
    match modifier {
        Some(modifier) => format!("{} {}", modifier, value.render()),
        None => value.render(),
    }
}
