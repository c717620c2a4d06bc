pub mod cohort;
pub mod health;
pub mod record;

use std::sync::Arc;

use crate::cohort::CohortService;
use crate::export::RecordAssembler;
use crate::models::Locale;

/// Services shared by the cohort and record handlers.
pub struct AppState {
    pub cohort: CohortService,
    pub assembler: RecordAssembler,
    /// Used when a request carries no `Accept-Language`.
    pub default_locale: Locale,
}

pub type SharedState = Arc<AppState>;
