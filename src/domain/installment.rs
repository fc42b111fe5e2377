use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{ExtensionId, InstallmentId, InstallmentState, LoanId};

/// one scheduled repayment unit of a loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub sequence_number: u32,
    pub due_date: NaiveDate,
    /// set by an approved payment extension; wins over due_date for aging
    pub rescheduled_due_date: Option<NaiveDate>,
    pub amount: Money,
    pub capital_portion: Money,
    pub interest_portion: Money,
    pub paid_amount: Money,
    pub late_interest: Money,
    pub state: InstallmentState,
    pub extension_id: Option<ExtensionId>,
}

impl Installment {
    pub fn new(
        loan_id: LoanId,
        sequence_number: u32,
        due_date: NaiveDate,
        amount: Money,
        capital_portion: Money,
        interest_portion: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence_number,
            due_date,
            rescheduled_due_date: None,
            amount,
            capital_portion,
            interest_portion,
            paid_amount: Money::ZERO,
            late_interest: Money::ZERO,
            state: InstallmentState::Pending,
            extension_id: None,
        }
    }

    /// the date aging runs against
    pub fn effective_due_date(&self) -> NaiveDate {
        self.rescheduled_due_date.unwrap_or(self.due_date)
    }

    pub fn remaining(&self) -> Money {
        (self.amount - self.paid_amount).max(Money::ZERO)
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(
            self.state,
            InstallmentState::Pending | InstallmentState::Overdue | InstallmentState::Partial
        ) && self.remaining().is_positive()
    }

    /// absorb a slice of a payment; settles the installment once paid
    /// within the tolerance, otherwise a pending installment turns
    /// partial and an overdue one keeps its state
    pub fn apply(&mut self, amount: Money, tolerance: Money) {
        self.paid_amount += amount;
        if self.paid_amount >= self.amount - tolerance {
            self.state = InstallmentState::Paid;
        } else if self.state == InstallmentState::Pending && self.paid_amount.is_positive() {
            self.state = InstallmentState::Partial;
        }
    }

    /// overdue marking by the mora sweep
    pub fn mark_overdue(&mut self) {
        self.state = InstallmentState::Overdue;
    }

    /// record an approved extension
    pub fn reschedule(&mut self, new_due_date: NaiveDate, extension_id: ExtensionId) {
        self.rescheduled_due_date = Some(new_due_date);
        self.extension_id = Some(extension_id);
    }
}
