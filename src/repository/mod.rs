//! Storage collaborators: scoped sessions, entity lookup and locale context.
//!
//! The cohort builder and the record assembler only talk to these traits.
//! `PgStorage` is the PostgreSQL implementation; tests supply in-memory ones.

pub mod postgres;

use async_trait::async_trait;

use crate::cohort::BoundQuery;
use crate::error::StorageError;
use crate::models::{ConceptId, Encounter, Locale, Location, Obs, Patient, PatientId, PatientSummary};

pub use postgres::PgStorage;

/// Opens scoped sessions against the clinical store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Starts a session. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn Session>, StorageError>;
}

/// Entity lookups available inside a session.
#[async_trait]
pub trait EntityLookup: Send {
    async fn patient(&mut self, id: PatientId) -> Result<Option<Patient>, StorageError>;

    /// Encounters in the store's order, each carrying its observations and orders.
    async fn encounters_by_patient(
        &mut self,
        id: PatientId,
        include_voided: bool,
    ) -> Result<Vec<Encounter>, StorageError>;

    /// Every non-voided observation of the patient, attached to an encounter or not.
    async fn observations_for_patient(&mut self, id: PatientId) -> Result<Vec<Obs>, StorageError>;

    async fn location(&mut self, id: i32) -> Result<Option<Location>, StorageError>;

    async fn patient_summaries(
        &mut self,
        ids: &[PatientId],
    ) -> Result<Vec<PatientSummary>, StorageError>;

    /// Observations on `concept_id` for the given patients, oldest first.
    async fn observations_by_concept(
        &mut self,
        ids: &[PatientId],
        concept_id: ConceptId,
    ) -> Result<Vec<Obs>, StorageError>;
}

/// One scoped transaction.
#[async_trait]
pub trait Session: EntityLookup {
    /// Executes a cohort query whose single output column is a patient id.
    async fn patient_ids(&mut self, query: &BoundQuery) -> Result<Vec<PatientId>, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

/// Source of the caller's locale.
pub trait LocaleContext: Send + Sync {
    fn current_locale(&self) -> Locale;
}

/// A locale fixed for the lifetime of the context, e.g. one HTTP request.
#[derive(Debug, Clone, Default)]
pub struct FixedLocale(pub Locale);

impl LocaleContext for FixedLocale {
    fn current_locale(&self) -> Locale {
        self.0.clone()
    }
}
