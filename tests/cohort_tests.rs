mod common;

use std::sync::Arc;

use common::{date, numeric_obs, patient, weight_concept, ClinicalData, MemoryStorage};
use patientset::cohort::{CohortService, Operator, SqlParam};
use patientset::error::QueryError;
use patientset::models::{Concept, ConceptId, PatientId, PatientSet};

fn ids(values: &[i32]) -> PatientSet {
    values.iter().copied().map(PatientId).collect()
}

fn weights() -> ClinicalData {
    let mut data = ClinicalData::default();
    for id in 1..=4 {
        data.patients.push(patient(id, "F", None));
    }
    data.observations.push(numeric_obs(1, 1, weight_concept(), 70.0));
    data.observations.push(numeric_obs(2, 1, weight_concept(), 82.0));
    data.observations.push(numeric_obs(3, 2, weight_concept(), 69.999));
    data.observations.push(numeric_obs(4, 3, weight_concept(), 71.0));
    // Same patient, other concept.
    let height = Concept::new(ConceptId(5090)).with_name("en", "Height");
    data.observations.push(numeric_obs(5, 4, height, 180.0));
    // A weight without numeric value.
    let mut text_only = numeric_obs(6, 4, weight_concept(), 0.0);
    text_only.value_numeric = None;
    text_only.value_text = Some("not weighed".to_string());
    data.observations.push(text_only);
    // Voided rows never match.
    data.voided_observations.push(numeric_obs(7, 4, weight_concept(), 95.0));
    data
}

fn service(storage: &Arc<MemoryStorage>) -> CohortService {
    CohortService::new(storage.clone())
}

#[tokio::test]
async fn test_greater_or_equal_includes_boundary() {
    let storage = Arc::new(MemoryStorage::new(weights()));

    let patients = service(&storage)
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::GreaterThanOrEqual, Some(70.0))
        .await
        .expect("query failed");

    // 70.0 included, 69.999 excluded, voided 95.0 ignored.
    assert_eq!(patients, ids(&[1, 3]));
}

#[tokio::test]
async fn test_multiple_matches_collapse_to_one_id() {
    let storage = Arc::new(MemoryStorage::new(weights()));

    let patients = service(&storage)
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::GreaterThan, Some(0.0))
        .await
        .expect("query failed");

    assert_eq!(patients.len(), 3);
    assert_eq!(patients, ids(&[1, 2, 3]));
}

#[tokio::test]
async fn test_exists_ignores_operand() {
    let storage = Arc::new(MemoryStorage::new(weights()));
    let cohort = service(&storage);

    let with_value = cohort
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::Exists, Some(1000.0))
        .await
        .expect("query failed");
    let without_value = cohort
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::Exists, None)
        .await
        .expect("query failed");

    // Patient 4 only has a non-numeric weight and a voided one.
    assert_eq!(with_value, ids(&[1, 2, 3]));
    assert_eq!(with_value, without_value);

    let queries = storage.stats.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].params, vec![SqlParam::Integer(5089)]);
}

#[tokio::test]
async fn test_operands_are_bound_not_interpolated() {
    let storage = Arc::new(MemoryStorage::new(weights()));

    service(&storage)
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::LessThan, Some(70.25))
        .await
        .expect("query failed");
    service(&storage)
        .query_by_characteristics(Some("f'; DROP TABLE patient; --"), None, None)
        .await
        .expect("query failed");

    let queries = storage.stats.queries();
    assert!(!queries[0].sql.contains("70.25"));
    assert!(!queries[0].sql.contains("5089"));
    assert_eq!(
        queries[0].params,
        vec![SqlParam::Integer(5089), SqlParam::Float(70.25)]
    );
    assert!(!queries[1].sql.contains("DROP"));
    assert_eq!(
        queries[1].params,
        vec![SqlParam::Text("F'; DROP TABLE PATIENT; --".to_string())]
    );
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_storage() {
    let storage = Arc::new(MemoryStorage::new(weights()));
    let cohort = service(&storage);

    let missing_concept = cohort
        .query_by_numeric_observation(None, Operator::Equal, Some(1.0))
        .await;
    let missing_value = cohort
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::GreaterThan, None)
        .await;

    assert!(matches!(missing_concept, Err(QueryError::InvalidArgument { .. })));
    assert!(matches!(missing_value, Err(QueryError::InvalidArgument { .. })));
    assert_eq!(storage.stats.opened(), 0);
}

#[tokio::test]
async fn test_no_characteristics_selects_every_non_voided_patient() {
    let mut data = ClinicalData::default();
    data.patients.push(patient(1, "M", Some(date(1980, 5, 1))));
    data.patients.push(patient(2, "F", Some(date(1990, 1, 1))));
    let mut voided = patient(3, "F", Some(date(1995, 1, 1)));
    voided.voided = true;
    data.patients.push(voided);
    let storage = Arc::new(MemoryStorage::new(data));

    let patients = service(&storage)
        .query_by_characteristics(None, None, None)
        .await
        .expect("query failed");

    assert_eq!(patients, ids(&[1, 2]));
}

#[tokio::test]
async fn test_characteristics_combine_with_and() {
    let mut data = ClinicalData::default();
    data.patients.push(patient(1, "M", Some(date(1980, 5, 1))));
    data.patients.push(patient(2, "F", Some(date(1990, 1, 1))));
    data.patients.push(patient(3, "F", Some(date(1970, 1, 1))));
    data.patients.push(patient(4, "F", None));
    let storage = Arc::new(MemoryStorage::new(data));
    let cohort = service(&storage);

    let women = cohort
        .query_by_characteristics(Some("f"), None, None)
        .await
        .expect("query failed");
    assert_eq!(women, ids(&[2, 3, 4]));

    let women_born_after_1975 = cohort
        .query_by_characteristics(Some(" F "), Some(date(1975, 1, 1)), None)
        .await
        .expect("query failed");
    assert_eq!(women_born_after_1975, ids(&[2]));

    let born_in_range = cohort
        .query_by_characteristics(None, Some(date(1970, 1, 1)), Some(date(1980, 5, 1)))
        .await
        .expect("query failed");
    assert_eq!(born_in_range, ids(&[1, 3]));
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let storage = Arc::new(MemoryStorage::new(weights()));

    let patients = service(&storage)
        .query_by_numeric_observation(Some(ConceptId(1)), Operator::Exists, None)
        .await
        .expect("query failed");

    assert!(patients.is_empty());
}

#[tokio::test]
async fn test_storage_failure_is_wrapped_and_session_released() {
    let storage = Arc::new(MemoryStorage::failing(weights(), "patient_ids"));

    let err = service(&storage)
        .query_by_numeric_observation(Some(ConceptId(5089)), Operator::Equal, Some(70.0))
        .await
        .expect_err("storage failure must surface");

    match &err {
        QueryError::Storage {
            operation, context, ..
        } => {
            assert_eq!(*operation, "numeric observation query");
            assert!(context.contains("5089"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("patient_ids unavailable"));
    assert_eq!(storage.stats.opened(), 1);
    assert_eq!(storage.stats.committed(), 0);
    assert_eq!(storage.stats.rolled_back(), 1);
}

#[tokio::test]
async fn test_each_query_uses_its_own_session() {
    let storage = Arc::new(MemoryStorage::new(weights()));
    let cohort = service(&storage);

    for _ in 0..3 {
        cohort
            .query_by_characteristics(None, None, None)
            .await
            .expect("query failed");
    }

    assert_eq!(storage.stats.opened(), 3);
    assert_eq!(storage.stats.committed(), 3);
    assert_eq!(storage.stats.rolled_back(), 0);
}

#[tokio::test]
async fn test_short_patient_descriptions() {
    let mut data = ClinicalData::default();
    data.patients.push(patient(1, "M", Some(date(1990, 1, 1))));
    data.patients.push(patient(2, "F", None));
    data.patients.push(patient(3, "U", Some(date(2019, 6, 1))));
    let storage = Arc::new(MemoryStorage::new(data));

    let descriptions = service(&storage)
        .short_patient_descriptions(&ids(&[1, 2, 3, 99]), date(2020, 1, 1))
        .await
        .expect("descriptions failed");

    assert_eq!(descriptions.len(), 3);
    assert_eq!(descriptions[&PatientId(1)], "Male, 30 years old");
    assert_eq!(descriptions[&PatientId(2)], "Female");
    assert_eq!(descriptions[&PatientId(3)], "Female, 0 years old");
    assert!(!descriptions.contains_key(&PatientId(99)));
}

#[tokio::test]
async fn test_observations_by_concept_groups_and_orders() {
    let mut data = ClinicalData::default();
    let mut late = numeric_obs(1, 1, weight_concept(), 72.0);
    late.obs_datetime = Some(common::datetime(2021, 6, 1, 9, 0, 0));
    let mut early = numeric_obs(2, 1, weight_concept(), 70.0);
    early.obs_datetime = Some(common::datetime(2020, 1, 1, 9, 0, 0));
    let other_patient = numeric_obs(3, 2, weight_concept(), 60.0);
    let not_in_cohort = numeric_obs(4, 3, weight_concept(), 90.0);
    data.observations = vec![late, early, other_patient, not_in_cohort];
    let storage = Arc::new(MemoryStorage::new(data));

    let grouped = service(&storage)
        .observations_by_concept(&ids(&[1, 2]), ConceptId(5089))
        .await
        .expect("lookup failed");

    assert_eq!(grouped.len(), 2);
    let first: Vec<i32> = grouped[&PatientId(1)].iter().map(|o| o.obs_id).collect();
    assert_eq!(first, vec![2, 1]);
    assert_eq!(grouped[&PatientId(2)].len(), 1);
    assert!(!grouped.contains_key(&PatientId(3)));
}
