//! Function-id naming conventions
//!
//! Function ids are URNs. Controlling functions issue commands, measuring
//! functions report values; the kind is encoded in a fixed URN prefix.

use serde::{Deserialize, Serialize};

pub const URN_PREFIX: &str = "urn:infai:ses:";
pub const CONTROLLING_FUNCTION_PREFIX: &str = "urn:infai:ses:controlling-function:";
pub const MEASURING_FUNCTION_PREFIX: &str = "urn:infai:ses:measuring-function:";

/// Kind of a function, derived from its id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Controlling,
    Measuring,
}

impl FunctionKind {
    pub fn of(function_id: &str) -> Option<Self> {
        if is_controlling_function(function_id) {
            Some(Self::Controlling)
        } else if is_measuring_function(function_id) {
            Some(Self::Measuring)
        } else {
            None
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Controlling => CONTROLLING_FUNCTION_PREFIX,
            Self::Measuring => MEASURING_FUNCTION_PREFIX,
        }
    }
}

impl std::str::FromStr for FunctionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "controlling" => Ok(Self::Controlling),
            "measuring" => Ok(Self::Measuring),
            other => Err(format!("unknown function kind: {}", other)),
        }
    }
}

pub fn is_controlling_function(function_id: &str) -> bool {
    function_id.starts_with(CONTROLLING_FUNCTION_PREFIX)
}

pub fn is_measuring_function(function_id: &str) -> bool {
    function_id.starts_with(MEASURING_FUNCTION_PREFIX)
}

/// Whether the id follows the URN namespace at all (legacy ids do not)
pub fn is_namespaced(function_id: &str) -> bool {
    function_id.starts_with(URN_PREFIX)
}
