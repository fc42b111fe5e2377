use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    CashBoxId, ClientId, Direction, InstallmentId, LoanId, LoanState, PaymentId, RequestId,
    RiskLabel, TransactionId,
};

/// all events that can be emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // approval lifecycle
    RequestApproved {
        request_id: RequestId,
        request_type: String,
        timestamp: DateTime<Utc>,
    },
    RequestRejected {
        request_id: RequestId,
        request_type: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    LoanActivated {
        loan_id: LoanId,
        principal: Money,
        total_interest: Money,
        installments: u32,
        timestamp: DateTime<Utc>,
    },
    LoanRescheduled {
        loan_id: LoanId,
        installments: u32,
        total_interest: Money,
        timestamp: DateTime<Utc>,
    },

    // collection events
    PaymentReceived {
        payment_id: PaymentId,
        loan_id: LoanId,
        amount: Money,
        applied_to_capital: Money,
        applied_to_interest: Money,
        installments_touched: u32,
        timestamp: DateTime<Utc>,
    },
    InstallmentSettled {
        installment_id: InstallmentId,
        loan_id: LoanId,
        sequence_number: u32,
        timestamp: DateTime<Utc>,
    },
    LoanSettled {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },

    // mora events
    InstallmentOverdue {
        installment_id: InstallmentId,
        loan_id: LoanId,
        due_date: NaiveDate,
    },
    LoanStateChanged {
        loan_id: LoanId,
        old_state: LoanState,
        new_state: LoanState,
        timestamp: DateTime<Utc>,
    },
    RiskEscalated {
        client_id: ClientId,
        days_late: i64,
        label: RiskLabel,
        previous_ordinal: u8,
        timestamp: DateTime<Utc>,
    },
    RiskCleared {
        client_id: ClientId,
        timestamp: DateTime<Utc>,
    },

    // ledger events
    CashMoved {
        transaction_id: TransactionId,
        cash_box_id: CashBoxId,
        direction: Direction,
        amount: Money,
        new_balance: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
