//! Cohort predicates and their translation into parameterized SQL.
//!
//! Only column names and operator tokens from the fixed vocabulary below ever
//! reach the SQL text; every caller-supplied value is a bound parameter.

pub mod service;

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::models::ConceptId;

pub use service::CohortService;

/// Comparison applied to an observation's numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Any numeric value recorded; the operand is ignored.
    Exists,
}

impl Operator {
    /// SQL comparison token, `None` for `Exists`.
    pub fn sql_token(self) -> Option<&'static str> {
        match self {
            Operator::Equal => Some("="),
            Operator::LessThan => Some("<"),
            Operator::LessThanOrEqual => Some("<="),
            Operator::GreaterThan => Some(">"),
            Operator::GreaterThanOrEqual => Some(">="),
            Operator::Exists => None,
        }
    }

    pub fn requires_value(self) -> bool {
        self != Operator::Exists
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "eq" => Ok(Operator::Equal),
            "<" | "lt" => Ok(Operator::LessThan),
            "<=" | "le" => Ok(Operator::LessThanOrEqual),
            ">" | "gt" => Ok(Operator::GreaterThan),
            ">=" | "ge" => Ok(Operator::GreaterThanOrEqual),
            "exists" => Ok(Operator::Exists),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_token().unwrap_or("EXISTS"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    GenderEquals(String),
    BirthdateAtLeast(NaiveDate),
    BirthdateAtMost(NaiveDate),
    ObservationValueCompares {
        concept_id: ConceptId,
        operator: Operator,
        value: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Integer(i32),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

/// SQL text with `$n` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl BoundQuery {
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

/// Validates the numeric observation arguments shared by both query shapes.
fn numeric_operand(
    operation: &'static str,
    operator: Operator,
    value: Option<f64>,
) -> Result<Option<f64>, QueryError> {
    if !operator.requires_value() {
        return Ok(None);
    }
    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        Some(v) => Err(QueryError::InvalidArgument {
            operation,
            reason: format!("operand {} is not a finite number", v),
        }),
        None => Err(QueryError::InvalidArgument {
            operation,
            reason: format!("operator {} requires a value", operator),
        }),
    }
}

/// `SELECT o.patient_id FROM obs o ... GROUP BY o.patient_id` for one concept.
pub fn numeric_observation_query(
    concept_id: Option<ConceptId>,
    operator: Operator,
    value: Option<f64>,
) -> Result<BoundQuery, QueryError> {
    const OPERATION: &str = "numeric observation query";

    let concept_id = concept_id.ok_or_else(|| QueryError::InvalidArgument {
        operation: OPERATION,
        reason: "concept id is required".to_string(),
    })?;
    let operand = numeric_operand(OPERATION, operator, value)?;

    let mut query = BoundQuery {
        sql: String::from("SELECT o.patient_id FROM obs o WHERE o.voided = false"),
        params: Vec::new(),
    };

    let concept = query.bind(SqlParam::Integer(concept_id.0));
    query.sql.push_str(&format!(" AND o.concept_id = {}", concept));

    match (operator.sql_token(), operand) {
        (Some(token), Some(v)) => {
            let placeholder = query.bind(SqlParam::Float(v));
            query
                .sql
                .push_str(&format!(" AND o.value_numeric {} {}", token, placeholder));
        }
        _ => query.sql.push_str(" AND o.value_numeric IS NOT NULL"),
    }

    query.sql.push_str(" GROUP BY o.patient_id");
    Ok(query)
}

/// AND-composition of predicates over non-voided patients.
///
/// Clauses are emitted in declaration order so the generated text is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortQuery {
    predicates: Vec<Predicate>,
}

impl CohortQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds one predicate per present argument, in the order gender, min, max.
    pub fn characteristics(
        gender: Option<&str>,
        min_birthdate: Option<NaiveDate>,
        max_birthdate: Option<NaiveDate>,
    ) -> Self {
        let mut query = Self::new();
        if let Some(gender) = gender {
            query = query.with(Predicate::GenderEquals(gender.to_string()));
        }
        if let Some(min) = min_birthdate {
            query = query.with(Predicate::BirthdateAtLeast(min));
        }
        if let Some(max) = max_birthdate {
            query = query.with(Predicate::BirthdateAtMost(max));
        }
        query
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn build(&self) -> Result<BoundQuery, QueryError> {
        const OPERATION: &str = "cohort query";

        let mut query = BoundQuery {
            sql: String::from("SELECT p.patient_id FROM patient p WHERE p.voided = false"),
            params: Vec::new(),
        };

        for predicate in &self.predicates {
            let clause = match predicate {
                Predicate::GenderEquals(gender) => {
                    let placeholder = query.bind(SqlParam::Text(gender.trim().to_uppercase()));
                    format!("p.gender = {}", placeholder)
                }
                Predicate::BirthdateAtLeast(date) => {
                    format!("p.birthdate >= {}", query.bind(SqlParam::Date(*date)))
                }
                Predicate::BirthdateAtMost(date) => {
                    format!("p.birthdate <= {}", query.bind(SqlParam::Date(*date)))
                }
                Predicate::ObservationValueCompares {
                    concept_id,
                    operator,
                    value,
                } => {
                    // Correlated EXISTS keeps one row per patient however many obs match.
                    let operand = numeric_operand(OPERATION, *operator, *value)?;
                    let concept = query.bind(SqlParam::Integer(concept_id.0));
                    let comparison = match (operator.sql_token(), operand) {
                        (Some(token), Some(v)) => {
                            format!("o.value_numeric {} {}", token, query.bind(SqlParam::Float(v)))
                        }
                        _ => "o.value_numeric IS NOT NULL".to_string(),
                    };
                    format!(
                        "EXISTS (SELECT 1 FROM obs o WHERE o.patient_id = p.patient_id \
                         AND o.voided = false AND o.concept_id = {} AND {})",
                        concept, comparison
                    )
                }
            };
            query.sql.push_str(" AND ");
            query.sql.push_str(&clause);
        }

        Ok(query)
    }
}
