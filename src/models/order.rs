use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::concept::Concept;
use super::encounter::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderType {
    pub order_type_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i32,
    pub encounter_id: Option<i32>,
    pub order_type: OrderType,
    pub concept: Concept,
    pub instructions: Option<String>,
    pub start_date: Option<NaiveDateTime>,
    pub auto_expire_date: Option<NaiveDateTime>,
    pub orderer: Option<User>,
    pub discontinued: Option<bool>,
    pub discontinued_date: Option<NaiveDateTime>,
    pub discontinued_reason: Option<String>,
}
