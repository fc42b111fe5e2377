use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{
    ClientId, InstallmentId, LoanId, PaymentId, PaymentMethod, PaymentSplit, UserId,
};

/// immutable record of one collection event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// human-readable number reserved from the store counter
    pub number: String,
    pub loan_id: LoanId,
    pub client_id: ClientId,
    pub total_amount: Money,
    pub split: PaymentSplit,
    pub method: PaymentMethod,
    pub collector_id: UserId,
    pub collected_at: DateTime<Utc>,
    /// business date the collection belongs to
    pub reference_date: NaiveDate,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: String,
        loan_id: LoanId,
        client_id: ClientId,
        total_amount: Money,
        split: PaymentSplit,
        method: PaymentMethod,
        collector_id: UserId,
        collected_at: DateTime<Utc>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            loan_id,
            client_id,
            total_amount,
            split,
            method,
            collector_id,
            collected_at,
            reference_date,
        }
    }
}

/// the slice of a payment applied to one installment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetail {
    pub id: Uuid,
    pub payment_id: PaymentId,
    pub installment_id: InstallmentId,
    pub amount: Money,
    pub split: PaymentSplit,
}

impl PaymentDetail {
    pub fn new(
        payment_id: PaymentId,
        installment_id: InstallmentId,
        amount: Money,
        split: PaymentSplit,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            installment_id,
            amount,
            split,
        }
    }
}
