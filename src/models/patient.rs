use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct PatientId(pub i32);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tribe {
    pub tribe_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub birthdate_estimated: Option<bool>,
    pub birthplace: Option<String>,
    pub citizenship: Option<String>,
    pub tribe: Option<Tribe>,
    pub mothers_name: Option<String>,
    pub civil_status: Option<i32>,
    pub death_date: Option<NaiveDateTime>,
    pub cause_of_death: Option<String>,
    pub health_district: Option<String>,
    /// Location id of the patient's health center.
    pub health_center: Option<i32>,
    pub voided: bool,
}

impl Patient {
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            gender: None,
            race: None,
            birthdate: None,
            birthdate_estimated: None,
            birthplace: None,
            citizenship: None,
            tribe: None,
            mothers_name: None,
            civil_status: None,
            death_date: None,
            cause_of_death: None,
            health_district: None,
            health_center: None,
            voided: false,
        }
    }
}

/// The demographic columns behind a short patient description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatientSummary {
    pub patient_id: PatientId,
    pub gender: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

/// Result of a cohort query: distinct patient ids, unordered by contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientSet {
    ids: BTreeSet<PatientId>,
}

impl PatientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: PatientId) -> bool {
        self.ids.contains(&id)
    }

    pub fn insert(&mut self, id: PatientId) -> bool {
        self.ids.insert(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<PatientId> {
        self.iter().collect()
    }
}

impl FromIterator<PatientId> for PatientSet {
    fn from_iter<I: IntoIterator<Item = PatientId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PatientSet {
    type Item = PatientId;
    type IntoIter = std::collections::btree_set::IntoIter<PatientId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}
