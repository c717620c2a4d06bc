use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{numeric_observation_query, BoundQuery, CohortQuery, Operator};
use crate::error::{QueryError, StorageError};
use crate::models::{ConceptId, Obs, PatientId, PatientSet, PatientSummary};
use crate::repository::{Session, Storage};

const DAYS_PER_YEAR: i64 = 365;

/// Runs cohort queries, one scoped session per call.
pub struct CohortService {
    storage: Arc<dyn Storage>,
}

impl CohortService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Patients with at least one observation on `concept_id` whose numeric value satisfies `operator value`.
    pub async fn query_by_numeric_observation(
        &self,
        concept_id: Option<ConceptId>,
        operator: Operator,
        value: Option<f64>,
    ) -> Result<PatientSet, QueryError> {
        let query = numeric_observation_query(concept_id, operator, value)?;
        let context = match concept_id {
            Some(id) => format!("concept {} {} {:?}", id, operator, value),
            None => String::new(),
        };

        let patients = self
            .fetch_patient_ids("numeric observation query", context, &query)
            .await?;

        tracing::info!(
            concept_id = ?concept_id.map(|c| c.0),
            operator = %operator,
            matches = patients.len(),
            "Numeric observation query completed"
        );
        Ok(patients)
    }

    /// Non-voided patients matching every present argument.
    pub async fn query_by_characteristics(
        &self,
        gender: Option<&str>,
        min_birthdate: Option<NaiveDate>,
        max_birthdate: Option<NaiveDate>,
    ) -> Result<PatientSet, QueryError> {
        let query = CohortQuery::characteristics(gender, min_birthdate, max_birthdate);
        let patients = self.query(&query).await?;

        tracing::info!(
            gender = ?gender,
            min_birthdate = ?min_birthdate,
            max_birthdate = ?max_birthdate,
            matches = patients.len(),
            "Characteristics query completed"
        );
        Ok(patients)
    }

    pub async fn query(&self, cohort: &CohortQuery) -> Result<PatientSet, QueryError> {
        let query = cohort.build()?;
        let context = format!("{} predicate(s)", cohort.predicates().len());
        self.fetch_patient_ids("cohort query", context, &query).await
    }

    /// "Male"/"Female" plus age in whole 365-day years as of `as_of`, keyed by patient.
    pub async fn short_patient_descriptions(
        &self,
        patients: &PatientSet,
        as_of: NaiveDate,
    ) -> Result<BTreeMap<PatientId, String>, QueryError> {
        const OPERATION: &str = "short patient descriptions";
        let context = format!("{} patient(s)", patients.len());
        let storage_error = |source: StorageError| QueryError::Storage {
            operation: OPERATION,
            context: context.clone(),
            source,
        };

        let mut session = self.storage.begin().await.map_err(storage_error)?;
        let summaries = session
            .patient_summaries(&patients.to_vec())
            .await
            .map_err(storage_error)?;
        session.commit().await.map_err(storage_error)?;

        Ok(summaries
            .into_iter()
            .filter(|summary| patients.contains(summary.patient_id))
            .map(|summary| (summary.patient_id, describe(&summary, as_of)))
            .collect())
    }

    /// Observations on `concept_id` for each patient, oldest first.
    pub async fn observations_by_concept(
        &self,
        patients: &PatientSet,
        concept_id: ConceptId,
    ) -> Result<BTreeMap<PatientId, Vec<Obs>>, QueryError> {
        const OPERATION: &str = "observations by concept";
        let context = format!("concept {} over {} patient(s)", concept_id, patients.len());
        let storage_error = |source: StorageError| QueryError::Storage {
            operation: OPERATION,
            context: context.clone(),
            source,
        };

        let mut session = self.storage.begin().await.map_err(storage_error)?;
        let observations = session
            .observations_by_concept(&patients.to_vec(), concept_id)
            .await
            .map_err(storage_error)?;
        session.commit().await.map_err(storage_error)?;

        let mut grouped: BTreeMap<PatientId, Vec<Obs>> = BTreeMap::new();
        for obs in observations {
            grouped.entry(obs.patient_id).or_default().push(obs);
        }
        for list in grouped.values_mut() {
            // Undated observations last; stable for equal datetimes.
            list.sort_by_key(|obs| (obs.obs_datetime.is_none(), obs.obs_datetime));
        }
        Ok(grouped)
    }

    async fn fetch_patient_ids(
        &self,
        operation: &'static str,
        context: String,
        query: &BoundQuery,
    ) -> Result<PatientSet, QueryError> {
        tracing::debug!(sql = %query.sql, params = query.params.len(), "Executing {}", operation);

        let storage_error = |source: StorageError| QueryError::Storage {
            operation,
            context: context.clone(),
            source,
        };

        let mut session: Box<dyn Session> = self.storage.begin().await.map_err(storage_error)?;
        let ids = session.patient_ids(query).await.map_err(storage_error)?;
        session.commit().await.map_err(storage_error)?;

        Ok(ids.into_iter().collect())
    }
}

fn describe(summary: &PatientSummary, as_of: NaiveDate) -> String {
    let mut description = match summary.gender.as_deref() {
        Some("M") => String::from("Male"),
        _ => String::from("Female"),
    };
    if let Some(birthdate) = summary.birthdate {
        let age = (as_of - birthdate).num_days() / DAYS_PER_YEAR;
        description.push_str(&format!(", {} years old", age));
    }
    description
}
