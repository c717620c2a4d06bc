use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::concept::Concept;
use super::patient::PatientId;

/// A single recorded clinical data point.
///
/// Well-formed data carries exactly one `value_*` field, but nothing enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obs {
    pub obs_id: i32,
    pub patient_id: PatientId,
    /// Owning encounter, if any.
    pub encounter_id: Option<i32>,
    pub concept: Concept,
    pub obs_datetime: Option<NaiveDateTime>,
    pub accession_number: Option<String>,
    pub comment: Option<String>,
    pub date_started: Option<NaiveDateTime>,
    pub date_stopped: Option<NaiveDateTime>,
    pub obs_group_id: Option<i32>,
    pub value_group_id: Option<i32>,
    pub value_coded: Option<Concept>,
    pub value_boolean: Option<bool>,
    pub value_datetime: Option<NaiveDateTime>,
    pub value_numeric: Option<f64>,
    pub value_text: Option<String>,
    pub value_modifier: Option<String>,
}

impl Obs {
    pub fn new(obs_id: i32, patient_id: PatientId, concept: Concept) -> Self {
        Self {
            obs_id,
            patient_id,
            encounter_id: None,
            concept,
            obs_datetime: None,
            accession_number: None,
            comment: None,
            date_started: None,
            date_stopped: None,
            obs_group_id: None,
            value_group_id: None,
            value_coded: None,
            value_boolean: None,
            value_datetime: None,
            value_numeric: None,
            value_text: None,
            value_modifier: None,
        }
    }
}
