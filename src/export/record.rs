//! The clinical record tree and its assembly from loaded entities.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::format::{civil_status_label, date_at_midnight, serialize_opt_datetime};
use super::value::{render_with_modifier, TypedValue};
use super::UnattachedObservations;
use crate::error::ExportError;
use crate::models::{
    Concept, ConceptId, Encounter, Locale, Location, Obs, Order, Patient, PatientId, User,
};

/// An id plus a display name, rendered as a child element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalRecord {
    pub patient: PatientNode,
    pub encounters: Vec<EncounterNode>,
    pub unattached_observations: Vec<ObservationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientNode {
    pub patient_id: PatientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub birthdate: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate_estimated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthplace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citizenship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tribe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mothers_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub civil_status: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub death_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_of_death: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_center: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncounterMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encounter_type: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterNode {
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub datetime: Option<NaiveDateTime>,
    pub metadata: EncounterMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<ObservationNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<OrderNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationNode {
    pub obs_id: i32,
    pub concept_id: ConceptId,
    pub concept_name: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub datetime: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub date_started: Option<NaiveDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub date_stopped: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obs_group_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_group_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<TypedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_modifier: Option<String>,
}

impl ObservationNode {
    pub fn data_type(&self) -> Option<&'static str> {
        self.value.as_ref().map(TypedValue::data_type)
    }

    /// Element body: the resolved value, prefixed by the modifier when both exist.
    pub fn rendered_value(&self) -> Option<String> {
        self.value
            .as_ref()
            .map(|value| render_with_modifier(value, self.value_modifier.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderNode {
    pub order_id: i32,
    pub order_type: String,
    pub concept_id: ConceptId,
    pub concept_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub start_date: Option<NaiveDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub auto_expire_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderer: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discontinued: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_datetime"
    )]
    pub discontinued_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discontinued_reason: Option<String>,
}

impl ClinicalRecord {
    /// Patient, encounter, observation and order nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.unattached_observations.len()
            + self
                .encounters
                .iter()
                .map(|e| 1 + e.observations.len() + e.orders.len())
                .sum::<usize>()
    }
}

/// Builds the tree for one patient from entities already loaded in a session.
///
/// Encounters keep the given order and observations inside an encounter keep
/// theirs; orders and unattached observations are sorted by id.
pub fn build_record(
    patient: &Patient,
    health_center: Option<&Location>,
    encounters: &[Encounter],
    all_observations: &[Obs],
    locale: &Locale,
    unattached: UnattachedObservations,
) -> Result<ClinicalRecord, ExportError> {
    let builder = NodeBuilder {
        patient_id: patient.patient_id,
        locale,
    };

    let encounters = encounters
        .iter()
        .map(|encounter| builder.encounter(encounter))
        .collect::<Result<Vec<_>, _>>()?;

    let mut unattached_obs: Vec<&Obs> = all_observations
        .iter()
        .filter(|obs| unattached.selects(obs))
        .collect();
    unattached_obs.sort_by_key(|obs| obs.obs_id);
    let unattached_observations = unattached_obs
        .into_iter()
        .map(|obs| builder.observation(obs))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClinicalRecord {
        patient: builder.patient(patient, health_center),
        encounters,
        unattached_observations,
    })
}

struct NodeBuilder<'a> {
    patient_id: PatientId,
    locale: &'a Locale,
}

impl NodeBuilder<'_> {
    fn label(&self, concept: &Concept) -> Result<String, ExportError> {
        concept
            .name(self.locale)
            .map(str::to_string)
            .ok_or_else(|| self.unnamed(concept.concept_id))
    }

    fn unnamed(&self, concept_id: ConceptId) -> ExportError {
        ExportError::MissingReference {
            patient_id: self.patient_id,
            reason: format!("concept {} has no name for locale {}", concept_id, self.locale),
        }
    }

    fn patient(&self, patient: &Patient, health_center: Option<&Location>) -> PatientNode {
        let civil_status = patient.civil_status.and_then(|code| {
            let label = civil_status_label(code);
            if label.is_none() {
                tracing::warn!(
                    patient_id = %patient.patient_id,
                    civil_status = code,
                    "Unknown civil status code, omitting"
                );
            }
            label.map(str::to_string)
        });

        PatientNode {
            patient_id: patient.patient_id,
            gender: patient.gender.clone(),
            race: patient.race.clone(),
            birthdate: patient.birthdate.map(date_at_midnight),
            birthdate_estimated: patient.birthdate_estimated,
            birthplace: patient.birthplace.clone(),
            citizenship: patient.citizenship.clone(),
            tribe: patient.tribe.as_ref().map(|t| t.name.clone()),
            mothers_name: patient.mothers_name.clone(),
            civil_status,
            death_date: patient.death_date,
            cause_of_death: patient.cause_of_death.clone(),
            health_district: patient.health_district.clone(),
            health_center: health_center.map(|l| Reference {
                id: l.location_id,
                name: l.name.clone(),
            }),
        }
    }

    fn encounter(&self, encounter: &Encounter) -> Result<EncounterNode, ExportError> {
        let metadata = EncounterMetadata {
            location: encounter.location.as_ref().map(|l| Reference {
                id: l.location_id,
                name: l.name.clone(),
            }),
            encounter_type: encounter.encounter_type.as_ref().map(|t| Reference {
                id: t.encounter_type_id,
                name: t.name.clone(),
            }),
            form: encounter.form.as_ref().map(|f| Reference {
                id: f.form_id,
                name: f.name.clone(),
            }),
            provider: encounter.provider.as_ref().map(|u| Reference {
                id: u.user_id,
                name: u.formatted_name(),
            }),
        };

        let observations = encounter
            .observations
            .iter()
            .map(|obs| self.observation(obs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut orders: Vec<&Order> = encounter.orders.iter().collect();
        orders.sort_by_key(|order| order.order_id);
        let orders = orders
            .into_iter()
            .map(|order| self.order(order))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EncounterNode {
            datetime: encounter.encounter_datetime,
            metadata,
            observations,
            orders,
        })
    }

    fn observation(&self, obs: &Obs) -> Result<ObservationNode, ExportError> {
        let value = TypedValue::resolve(obs, self.locale).map_err(|id| self.unnamed(id))?;

        Ok(ObservationNode {
            obs_id: obs.obs_id,
            concept_id: obs.concept.concept_id,
            concept_name: self.label(&obs.concept)?,
            datetime: obs.obs_datetime,
            accession_number: obs.accession_number.clone(),
            comment: obs.comment.clone(),
            date_started: obs.date_started,
            date_stopped: obs.date_stopped,
            obs_group_id: obs.obs_group_id,
            value_group_id: obs.value_group_id,
            value,
            value_modifier: obs.value_modifier.clone(),
        })
    }

    fn order(&self, order: &Order) -> Result<OrderNode, ExportError> {
        Ok(OrderNode {
            order_id: order.order_id,
            order_type: order.order_type.name.clone(),
            concept_id: order.concept.concept_id,
            concept_name: self.label(&order.concept)?,
            instructions: order.instructions.clone(),
            start_date: order.start_date,
            auto_expire_date: order.auto_expire_date,
            orderer: order.orderer.clone(),
            discontinued: order.discontinued,
            discontinued_date: order.discontinued_date,
            discontinued_reason: order.discontinued_reason.clone(),
        })
    }
}
