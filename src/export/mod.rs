//! Clinical record export.
//!
//! `RecordAssembler` loads a patient's encounters, observations and orders
//! inside one storage session and turns them into a [`ClinicalRecord`], which
//! [`xml`] writes as a `<patient_data>` document.

pub mod format;
pub mod record;
pub mod value;
pub mod xml;

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, ExportError, Result, SerializeError, StorageError};
use crate::models::{Locale, Obs, PatientId, PatientSet};
use crate::repository::{LocaleContext, Storage};

pub use record::{
    build_record, ClinicalRecord, EncounterMetadata, EncounterNode, ObservationNode, OrderNode,
    PatientNode, Reference,
};
pub use value::TypedValue;
pub use xml::{record_to_xml, RecordWriter};

/// Which of a patient's observations are listed at patient level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnattachedObservations {
    /// Observations whose encounter id is set, even if that encounter was
    /// also exported above.
    #[default]
    PersistedEncounter,
    /// Observations without any encounter.
    WithoutEncounter,
}

impl UnattachedObservations {
    pub fn selects(&self, obs: &Obs) -> bool {
        match self {
            UnattachedObservations::PersistedEncounter => obs.encounter_id.is_some(),
            UnattachedObservations::WithoutEncounter => obs.encounter_id.is_none(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnattachedObservations::PersistedEncounter => "persisted-encounter",
            UnattachedObservations::WithoutEncounter => "without-encounter",
        }
    }
}

impl FromStr for UnattachedObservations {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persisted-encounter" => Ok(UnattachedObservations::PersistedEncounter),
            "without-encounter" => Ok(UnattachedObservations::WithoutEncounter),
            other => Err(format!(
                "unknown unattached observation rule '{}', expected persisted-encounter or without-encounter",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub unattached: UnattachedObservations,
    /// Spaces per nesting level; `None` writes the compact form.
    pub indent: Option<usize>,
}

/// Builds clinical records, one scoped session per patient.
pub struct RecordAssembler {
    storage: Arc<dyn Storage>,
    options: ExportOptions,
}

impl RecordAssembler {
    pub fn new(storage: Arc<dyn Storage>, options: ExportOptions) -> Self {
        Self { storage, options }
    }

    pub fn options(&self) -> ExportOptions {
        self.options
    }

    /// Loads and assembles the record tree for `patient_id` with labels in `locale`.
    pub async fn assemble(&self, patient_id: PatientId, locale: &Locale) -> Result<ClinicalRecord> {
        let failed = move |stage: &'static str| {
            move |source: StorageError| {
                Error::Export(ExportError::Storage {
                    patient_id,
                    stage,
                    source,
                })
            }
        };

        let mut session = self.storage.begin().await.map_err(failed("opening session"))?;

        let patient = session
            .patient(patient_id)
            .await
            .map_err(failed("loading patient"))?
            .ok_or(Error::NotFound(patient_id))?;

        let health_center = match patient.health_center {
            Some(location_id) => Some(
                session
                    .location(location_id)
                    .await
                    .map_err(failed("loading health center"))?
                    .ok_or_else(|| ExportError::MissingReference {
                        patient_id,
                        reason: format!("health center location {} does not exist", location_id),
                    })?,
            ),
            None => None,
        };

        let encounters = session
            .encounters_by_patient(patient_id, false)
            .await
            .map_err(failed("loading encounters"))?;
        let observations = session
            .observations_for_patient(patient_id)
            .await
            .map_err(failed("loading observations"))?;

        session.commit().await.map_err(failed("closing session"))?;

        tracing::debug!(
            patient_id = %patient_id,
            encounters = encounters.len(),
            observations = observations.len(),
            "Loaded patient data"
        );

        let record = build_record(
            &patient,
            health_center.as_ref(),
            &encounters,
            &observations,
            locale,
            self.options.unattached,
        )?;
        Ok(record)
    }

    /// The record tree with the locale taken from `context`.
    pub async fn export_record(
        &self,
        patient_id: PatientId,
        context: &dyn LocaleContext,
    ) -> Result<ClinicalRecord> {
        let locale = context.current_locale();
        self.assemble(patient_id, &locale).await
    }

    /// The record as a `<patient_data>` XML document.
    pub async fn export(&self, patient_id: PatientId, context: &dyn LocaleContext) -> Result<String> {
        let record = self.export_record(patient_id, context).await?;
        let xml = record_to_xml(&record, self.options.indent)
            .map_err(|source| ExportError::Serialize { patient_id, source })?;

        tracing::info!(
            patient_id = %patient_id,
            encounters = record.encounters.len(),
            nodes = record.node_count(),
            "Exported clinical record"
        );
        Ok(xml)
    }

    /// Every patient in ascending id order under one `<patientset>` root.
    ///
    /// The first failing patient aborts the whole export.
    pub async fn export_patient_set(
        &self,
        patients: &PatientSet,
        context: &dyn LocaleContext,
    ) -> Result<String> {
        let locale = context.current_locale();
        let wrapper = |source: SerializeError| Error::Export(ExportError::SerializeSet { source });

        let mut writer = RecordWriter::new(self.options.indent).map_err(wrapper)?;
        writer.open("patientset").map_err(wrapper)?;
        for patient_id in patients.iter() {
            let record = self.assemble(patient_id, &locale).await?;
            writer
                .write_record(&record)
                .map_err(|source| ExportError::Serialize { patient_id, source })?;
        }
        writer.close("patientset").map_err(wrapper)?;
        let xml = writer.finish().map_err(wrapper)?;

        tracing::info!(patients = patients.len(), "Exported patient set");
        Ok(xml)
    }
}
