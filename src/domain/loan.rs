use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{
    AmortizationType, ApprovalState, ClientId, LoanId, LoanState, PaymentFrequency, PaymentSplit,
};

/// a microcredit loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,

    // terms
    pub amount: Money,
    pub interest_rate: Rate,
    pub term_units: u32,
    pub payment_frequency: PaymentFrequency,
    pub amortization_type: AmortizationType,
    pub start_date: NaiveDate,

    // lifecycle
    pub state: LoanState,
    pub approval_state: ApprovalState,

    // running totals; outstanding_balance = amount + total_interest - total_paid,
    // clamped at zero
    pub total_interest: Money,
    pub total_paid: Money,
    pub capital_paid: Money,
    pub interest_paid: Money,
    pub outstanding_balance: Money,

    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// create a draft loan awaiting approval
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        client_id: ClientId,
        amount: Money,
        interest_rate: Rate,
        term_units: u32,
        payment_frequency: PaymentFrequency,
        amortization_type: AmortizationType,
        start_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            amount,
            interest_rate,
            term_units,
            payment_frequency,
            amortization_type,
            start_date,
            state: LoanState::Draft,
            approval_state: ApprovalState::Pending,
            total_interest: Money::ZERO,
            total_paid: Money::ZERO,
            capital_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            outstanding_balance: Money::ZERO,
            created_at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// states in which payments may be collected
    pub fn is_collectible(&self) -> bool {
        matches!(self.state, LoanState::Active | LoanState::InArrears)
    }

    /// set the schedule totals computed by the calculator
    pub fn set_schedule_totals(&mut self, total_interest: Money) {
        self.total_interest = total_interest;
        self.outstanding_balance =
            (self.amount + self.total_interest - self.total_paid).max(Money::ZERO);
    }

    /// activate on approval
    pub fn activate(&mut self) {
        self.state = LoanState::Active;
        self.approval_state = ApprovalState::Approved;
    }

    /// fold one collection into the running totals; returns true when the
    /// balance reaches zero and the loan flips to PAID
    pub fn apply_payment(&mut self, amount: Money, split: PaymentSplit) -> bool {
        self.total_paid += amount;
        self.capital_paid += split.capital;
        self.interest_paid += split.interest;
        self.outstanding_balance = (self.outstanding_balance - amount).max(Money::ZERO);
        if self.outstanding_balance.is_zero() {
            self.state = LoanState::Paid;
            true
        } else {
            false
        }
    }

    /// the balance the running totals should reproduce
    pub fn expected_balance(&self) -> Money {
        (self.amount + self.total_interest - self.total_paid).max(Money::ZERO)
    }
}
