use serde::{Deserialize, Serialize};

use crate::decimal::Money;

/// engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// an installment counts as settled once paid within this tolerance
    pub rounding_tolerance: Money,
    /// prefix for human-readable payment numbers
    pub payment_number_prefix: String,
    /// prefix for ledger transaction codes
    pub transaction_code_prefix: String,
    /// roles alerted when a client's mora level escalates
    pub supervisory_roles: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounding_tolerance: Money::from_minor(1),
            payment_number_prefix: "PAY".to_string(),
            transaction_code_prefix: "TRX".to_string(),
            supervisory_roles: vec!["admin".to_string(), "supervisor".to_string()],
        }
    }
}

impl EngineConfig {
    /// format a payment number from a reserved counter value
    pub fn payment_number(&self, seq: u64) -> String {
        format!("{}-{:06}", self.payment_number_prefix, seq)
    }

    /// format a transaction code from a reserved counter value
    pub fn transaction_code(&self, seq: u64) -> String {
        format!("{}-{:06}", self.transaction_code_prefix, seq)
    }
}
