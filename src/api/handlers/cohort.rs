use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SharedState;
use crate::cohort::Operator;
use crate::error::{QueryError, Result};
use crate::extractors::ApiJson;
use crate::models::{ConceptId, PatientId, PatientSet};

#[derive(Debug, Deserialize)]
pub struct CharacteristicsParams {
    pub gender: Option<String>,
    pub min_birthdate: Option<NaiveDate>,
    pub max_birthdate: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct NumericObservationParams {
    pub concept_id: Option<i32>,
    pub operator: String,
    pub value: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CohortResponse {
    pub count: usize,
    pub patient_ids: PatientSet,
}

impl From<PatientSet> for CohortResponse {
    fn from(patient_ids: PatientSet) -> Self {
        Self {
            count: patient_ids.len(),
            patient_ids,
        }
    }
}

pub async fn query_by_characteristics(
    State(state): State<SharedState>,
    Query(params): Query<CharacteristicsParams>,
) -> Result<Json<CohortResponse>> {
    let patients = state
        .cohort
        .query_by_characteristics(
            params.gender.as_deref(),
            params.min_birthdate,
            params.max_birthdate,
        )
        .await?;
    Ok(Json(patients.into()))
}

pub async fn query_by_numeric_observation(
    State(state): State<SharedState>,
    Query(params): Query<NumericObservationParams>,
) -> Result<Json<CohortResponse>> {
    let operator: Operator = params
        .operator
        .parse()
        .map_err(|reason| QueryError::InvalidArgument {
            operation: "numeric observation query",
            reason,
        })?;

    let patients = state
        .cohort
        .query_by_numeric_observation(params.concept_id.map(ConceptId), operator, params.value)
        .await?;
    Ok(Json(patients.into()))
}

/// Short descriptions for the posted patient ids; unknown ids are left out.
pub async fn describe_patients(
    State(state): State<SharedState>,
    ApiJson(ids): ApiJson<Vec<PatientId>>,
) -> Result<Json<BTreeMap<PatientId, String>>> {
    let patients: PatientSet = ids.into_iter().collect();
    let today = Utc::now().date_naive();
    let descriptions = state
        .cohort
        .short_patient_descriptions(&patients, today)
        .await?;
    Ok(Json(descriptions))
}
