pub mod concept;
pub mod encounter;
pub mod observation;
pub mod order;
pub mod patient;

pub use concept::{Concept, ConceptId, ConceptName, Locale};
pub use encounter::{Encounter, EncounterType, Form, Location, User};
pub use observation::Obs;
pub use order::{Order, OrderType};
pub use patient::{Patient, PatientId, PatientSet, PatientSummary, Tribe};
