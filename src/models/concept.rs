use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ConceptId(pub i32);

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locale tag such as `en`, `fr` or `en_GB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Locale(tag.into().trim().replace('-', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag (`en_GB` -> `en`), lower-cased.
    pub fn language(&self) -> String {
        self.0
            .split('_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale("en".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptName {
    pub locale: Locale,
    pub name: String,
}

/// A coded clinical term with its display names per locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub concept_id: ConceptId,
    pub names: Vec<ConceptName>,
}

impl Concept {
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept_id,
            names: Vec::new(),
        }
    }

    pub fn with_name(mut self, locale: &str, name: &str) -> Self {
        self.names.push(ConceptName {
            locale: Locale::new(locale),
            name: name.to_string(),
        });
        self
    }

    /// Resolves the display name: exact locale, then same language, then the first name on record.
    pub fn name(&self, locale: &Locale) -> Option<&str> {
        let language = locale.language();
        self.names
            .iter()
            .find(|n| n.locale.as_str().eq_ignore_ascii_case(locale.as_str()))
            .or_else(|| self.names.iter().find(|n| n.locale.language() == language))
            .or_else(|| self.names.first())
            .map(|n| n.name.as_str())
    }
}
