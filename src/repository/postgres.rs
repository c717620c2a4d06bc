use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};

use super::{EntityLookup, Session, Storage};
use crate::cohort::{BoundQuery, SqlParam};
use crate::error::StorageError;
use crate::models::{
    Concept, ConceptId, ConceptName, Encounter, EncounterType, Form, Locale, Location, Obs, Order,
    OrderType, Patient, PatientId, PatientSummary, Tribe, User,
};

const OBS_COLUMNS: &str = r#"
    o.obs_id, o.patient_id, o.encounter_id, o.concept_id, o.obs_datetime,
    o.accession_number, o.comment, o.date_started, o.date_stopped,
    o.obs_group_id, o.value_group_id,
    o.value_coded, o.value_boolean, o.value_datetime, o.value_numeric, o.value_text,
    o.value_modifier
"#;

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> Result<Box<dyn Session>, StorageError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

/// A session backed by one PostgreSQL transaction; rolled back on drop unless committed.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct PatientRow {
    patient_id: i32,
    gender: Option<String>,
    race: Option<String>,
    birthdate: Option<NaiveDate>,
    birthdate_estimated: Option<bool>,
    birthplace: Option<String>,
    citizenship: Option<String>,
    tribe_id: Option<i32>,
    tribe_name: Option<String>,
    mothers_name: Option<String>,
    civil_status: Option<i32>,
    death_date: Option<NaiveDateTime>,
    cause_of_death: Option<String>,
    health_district: Option<String>,
    health_center: Option<i32>,
    voided: bool,
}

#[derive(sqlx::FromRow)]
struct EncounterRow {
    encounter_id: i32,
    patient_id: i32,
    encounter_datetime: Option<NaiveDateTime>,
    location_id: Option<i32>,
    location_name: Option<String>,
    encounter_type_id: Option<i32>,
    encounter_type_name: Option<String>,
    form_id: Option<i32>,
    form_name: Option<String>,
    provider_id: Option<i32>,
    provider_first_name: Option<String>,
    provider_middle_name: Option<String>,
    provider_last_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ObsRow {
    obs_id: i32,
    patient_id: i32,
    encounter_id: Option<i32>,
    concept_id: i32,
    obs_datetime: Option<NaiveDateTime>,
    accession_number: Option<String>,
    comment: Option<String>,
    date_started: Option<NaiveDateTime>,
    date_stopped: Option<NaiveDateTime>,
    obs_group_id: Option<i32>,
    value_group_id: Option<i32>,
    value_coded: Option<i32>,
    value_boolean: Option<bool>,
    value_datetime: Option<NaiveDateTime>,
    value_numeric: Option<f64>,
    value_text: Option<String>,
    value_modifier: Option<String>,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: i32,
    encounter_id: Option<i32>,
    order_type_id: i32,
    order_type_name: String,
    concept_id: i32,
    instructions: Option<String>,
    start_date: Option<NaiveDateTime>,
    auto_expire_date: Option<NaiveDateTime>,
    orderer: Option<i32>,
    orderer_first_name: Option<String>,
    orderer_middle_name: Option<String>,
    orderer_last_name: Option<String>,
    discontinued: Option<bool>,
    discontinued_date: Option<NaiveDateTime>,
    discontinued_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ConceptNameRow {
    concept_id: i32,
    locale: String,
    name: String,
}

impl PgSession {
    /// Loads every referenced concept with all of its names in one round trip.
    async fn load_concepts(
        &mut self,
        ids: BTreeSet<i32>,
    ) -> Result<HashMap<i32, Concept>, StorageError> {
        let mut concepts: HashMap<i32, Concept> = ids
            .iter()
            .map(|id| (*id, Concept::new(ConceptId(*id))))
            .collect();
        if concepts.is_empty() {
            return Ok(concepts);
        }

        let ids: Vec<i32> = ids.into_iter().collect();
        let rows = sqlx::query_as::<_, ConceptNameRow>(
            r#"
            SELECT concept_id, locale, name
            FROM concept_name
            WHERE concept_id = ANY($1)
            ORDER BY concept_id, concept_name_id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        for row in rows {
            if let Some(concept) = concepts.get_mut(&row.concept_id) {
                concept.names.push(ConceptName {
                    locale: Locale::new(row.locale),
                    name: row.name,
                });
            }
        }

        Ok(concepts)
    }

    async fn hydrate_observations(&mut self, rows: Vec<ObsRow>) -> Result<Vec<Obs>, StorageError> {
        let concept_ids: BTreeSet<i32> = rows
            .iter()
            .flat_map(|row| std::iter::once(row.concept_id).chain(row.value_coded))
            .collect();
        let concepts = self.load_concepts(concept_ids).await?;
        let concept = |id: i32| {
            concepts
                .get(&id)
                .cloned()
                .unwrap_or_else(|| Concept::new(ConceptId(id)))
        };

        Ok(rows
            .into_iter()
            .map(|row| Obs {
                obs_id: row.obs_id,
                patient_id: PatientId(row.patient_id),
                encounter_id: row.encounter_id,
                concept: concept(row.concept_id),
                obs_datetime: row.obs_datetime,
                accession_number: row.accession_number,
                comment: row.comment,
                date_started: row.date_started,
                date_stopped: row.date_stopped,
                obs_group_id: row.obs_group_id,
                value_group_id: row.value_group_id,
                value_coded: row.value_coded.map(concept),
                value_boolean: row.value_boolean,
                value_datetime: row.value_datetime,
                value_numeric: row.value_numeric,
                value_text: row.value_text,
                value_modifier: row.value_modifier,
            })
            .collect())
    }

    async fn orders_for_encounters(&mut self, encounter_ids: &[i32]) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT
                o.order_id, o.encounter_id,
                o.order_type_id, ot.name AS order_type_name,
                o.concept_id, o.instructions, o.start_date, o.auto_expire_date,
                o.orderer,
                u.first_name AS orderer_first_name,
                u.middle_name AS orderer_middle_name,
                u.last_name AS orderer_last_name,
                o.discontinued, o.discontinued_date, o.discontinued_reason
            FROM orders o
            JOIN order_type ot ON ot.order_type_id = o.order_type_id
            LEFT JOIN users u ON u.user_id = o.orderer
            WHERE o.encounter_id = ANY($1) AND o.voided = false
            ORDER BY o.order_id
            "#,
        )
        .bind(encounter_ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await?;

        let concepts = self
            .load_concepts(rows.iter().map(|row| row.concept_id).collect())
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Order {
                order_id: row.order_id,
                encounter_id: row.encounter_id,
                order_type: OrderType {
                    order_type_id: row.order_type_id,
                    name: row.order_type_name,
                },
                concept: concepts
                    .get(&row.concept_id)
                    .cloned()
                    .unwrap_or_else(|| Concept::new(ConceptId(row.concept_id))),
                instructions: row.instructions,
                start_date: row.start_date,
                auto_expire_date: row.auto_expire_date,
                orderer: row.orderer.map(|user_id| User {
                    user_id,
                    first_name: row.orderer_first_name,
                    middle_name: row.orderer_middle_name,
                    last_name: row.orderer_last_name,
                }),
                discontinued: row.discontinued,
                discontinued_date: row.discontinued_date,
                discontinued_reason: row.discontinued_reason,
            })
            .collect())
    }
}

#[async_trait]
impl EntityLookup for PgSession {
    async fn patient(&mut self, id: PatientId) -> Result<Option<Patient>, StorageError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT
                p.patient_id, p.gender, p.race, p.birthdate, p.birthdate_estimated,
                p.birthplace, p.citizenship, p.tribe_id, t.name AS tribe_name,
                p.mothers_name, p.civil_status, p.death_date, p.cause_of_death,
                p.health_district, p.health_center, p.voided
            FROM patient p
            LEFT JOIN tribe t ON t.tribe_id = p.tribe_id
            WHERE p.patient_id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| Patient {
            patient_id: PatientId(row.patient_id),
            gender: row.gender,
            race: row.race,
            birthdate: row.birthdate,
            birthdate_estimated: row.birthdate_estimated,
            birthplace: row.birthplace,
            citizenship: row.citizenship,
            tribe: row
                .tribe_id
                .zip(row.tribe_name)
                .map(|(tribe_id, name)| Tribe { tribe_id, name }),
            mothers_name: row.mothers_name,
            civil_status: row.civil_status,
            death_date: row.death_date,
            cause_of_death: row.cause_of_death,
            health_district: row.health_district,
            health_center: row.health_center,
            voided: row.voided,
        }))
    }

    async fn encounters_by_patient(
        &mut self,
        id: PatientId,
        include_voided: bool,
    ) -> Result<Vec<Encounter>, StorageError> {
        let rows = sqlx::query_as::<_, EncounterRow>(
            r#"
            SELECT
                e.encounter_id, e.patient_id, e.encounter_datetime,
                e.location_id, l.name AS location_name,
                e.encounter_type_id, et.name AS encounter_type_name,
                e.form_id, f.name AS form_name,
                e.provider_id,
                u.first_name AS provider_first_name,
                u.middle_name AS provider_middle_name,
                u.last_name AS provider_last_name
            FROM encounter e
            LEFT JOIN location l ON l.location_id = e.location_id
            LEFT JOIN encounter_type et ON et.encounter_type_id = e.encounter_type_id
            LEFT JOIN form f ON f.form_id = e.form_id
            LEFT JOIN users u ON u.user_id = e.provider_id
            WHERE e.patient_id = $1 AND ($2 OR e.voided = false)
            ORDER BY e.encounter_datetime, e.encounter_id
            "#,
        )
        .bind(id.0)
        .bind(include_voided)
        .fetch_all(&mut *self.tx)
        .await?;

        let encounter_ids: Vec<i32> = rows.iter().map(|row| row.encounter_id).collect();
        if encounter_ids.is_empty() {
            return Ok(Vec::new());
        }

        // One fetch per level, partitioned by encounter below.
        let obs_rows = sqlx::query_as::<_, ObsRow>(&format!(
            "SELECT {} FROM obs o WHERE o.encounter_id = ANY($1) AND o.voided = false \
             ORDER BY o.obs_datetime, o.obs_id",
            OBS_COLUMNS
        ))
        .bind(encounter_ids.clone())
        .fetch_all(&mut *self.tx)
        .await?;
        let observations = self.hydrate_observations(obs_rows).await?;
        let orders = self.orders_for_encounters(&encounter_ids).await?;

        let mut obs_by_encounter: HashMap<i32, Vec<Obs>> = HashMap::new();
        for obs in observations {
            if let Some(encounter_id) = obs.encounter_id {
                obs_by_encounter.entry(encounter_id).or_default().push(obs);
            }
        }
        let mut orders_by_encounter: HashMap<i32, Vec<Order>> = HashMap::new();
        for order in orders {
            if let Some(encounter_id) = order.encounter_id {
                orders_by_encounter.entry(encounter_id).or_default().push(order);
            }
        }

        tracing::debug!(
            patient_id = %id,
            encounters = rows.len(),
            "Loaded encounters"
        );

        Ok(rows
            .into_iter()
            .map(|row| Encounter {
                encounter_id: row.encounter_id,
                patient_id: PatientId(row.patient_id),
                encounter_datetime: row.encounter_datetime,
                location: row
                    .location_id
                    .zip(row.location_name)
                    .map(|(location_id, name)| Location { location_id, name }),
                encounter_type: row.encounter_type_id.zip(row.encounter_type_name).map(
                    |(encounter_type_id, name)| EncounterType {
                        encounter_type_id,
                        name,
                    },
                ),
                form: row
                    .form_id
                    .zip(row.form_name)
                    .map(|(form_id, name)| Form { form_id, name }),
                provider: row.provider_id.map(|user_id| User {
                    user_id,
                    first_name: row.provider_first_name,
                    middle_name: row.provider_middle_name,
                    last_name: row.provider_last_name,
                }),
                observations: obs_by_encounter
                    .remove(&row.encounter_id)
                    .unwrap_or_default(),
                orders: orders_by_encounter
                    .remove(&row.encounter_id)
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn observations_for_patient(&mut self, id: PatientId) -> Result<Vec<Obs>, StorageError> {
        let rows = sqlx::query_as::<_, ObsRow>(&format!(
            "SELECT {} FROM obs o WHERE o.patient_id = $1 AND o.voided = false ORDER BY o.obs_id",
            OBS_COLUMNS
        ))
        .bind(id.0)
        .fetch_all(&mut *self.tx)
        .await?;

        self.hydrate_observations(rows).await
    }

    async fn location(&mut self, id: i32) -> Result<Option<Location>, StorageError> {
        let row: Option<(i32, String)> =
            sqlx::query_as("SELECT location_id, name FROM location WHERE location_id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(|(location_id, name)| Location { location_id, name }))
    }

    async fn patient_summaries(
        &mut self,
        ids: &[PatientId],
    ) -> Result<Vec<PatientSummary>, StorageError> {
        let ids: Vec<i32> = ids.iter().map(|id| id.0).collect();
        let summaries = sqlx::query_as::<_, PatientSummary>(
            "SELECT patient_id, gender, birthdate FROM patient WHERE patient_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(summaries)
    }

    async fn observations_by_concept(
        &mut self,
        ids: &[PatientId],
        concept_id: ConceptId,
    ) -> Result<Vec<Obs>, StorageError> {
        let ids: Vec<i32> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, ObsRow>(&format!(
            "SELECT {} FROM obs o \
             WHERE o.concept_id = $1 AND o.patient_id = ANY($2) AND o.voided = false \
             ORDER BY o.obs_datetime ASC, o.obs_id",
            OBS_COLUMNS
        ))
        .bind(concept_id.0)
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        self.hydrate_observations(rows).await
    }
}

#[async_trait]
impl Session for PgSession {
    async fn patient_ids(&mut self, query: &BoundQuery) -> Result<Vec<PatientId>, StorageError> {
        let mut scalar = sqlx::query_scalar::<_, PatientId>(&query.sql);
        for param in &query.params {
            scalar = match param {
                SqlParam::Integer(value) => scalar.bind(*value),
                SqlParam::Float(value) => scalar.bind(*value),
                SqlParam::Text(value) => scalar.bind(value.clone()),
                SqlParam::Date(value) => scalar.bind(*value),
            };
        }

        Ok(scalar.fetch_all(&mut *self.tx).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }
}
