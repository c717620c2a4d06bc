use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::observation::Obs;
use super::order::Order;
use super::patient::PatientId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub location_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterType {
    pub encounter_type_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub form_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i32,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
}

impl User {
    /// First, middle and last name, whichever are present, separated by single spaces.
    pub fn formatted_name(&self) -> String {
        [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A clinical visit with the observations and orders recorded during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub encounter_id: i32,
    pub patient_id: PatientId,
    pub encounter_datetime: Option<NaiveDateTime>,
    pub location: Option<Location>,
    pub encounter_type: Option<EncounterType>,
    pub form: Option<Form>,
    pub provider: Option<User>,
    pub observations: Vec<Obs>,
    pub orders: Vec<Order>,
}
