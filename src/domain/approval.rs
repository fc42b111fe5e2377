use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::types::{
    AmortizationType, ApprovalState, CashBoxId, ExpenseId, ExtensionId, InstallmentId, LoanId,
    PaymentFrequency, RequestId, RouteId, UserId,
};

/// financial terms of a loan, as requested or as edited by the approver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub amount: Money,
    pub interest_rate: Rate,
    pub term_units: u32,
    pub payment_frequency: PaymentFrequency,
    pub amortization_type: AmortizationType,
    pub start_date: NaiveDate,
}

/// closed set of approvable request payloads; the dispatcher matches
/// exhaustively, so adding a type is a compile-time-checked change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestPayload {
    NewClient {
        name: String,
        document: String,
        phone: String,
        address: String,
        route_id: Option<RouteId>,
    },
    NewLoan {
        loan_id: LoanId,
        terms: LoanTerms,
    },
    Expense {
        category: String,
        description: String,
        amount: Money,
        cash_box_id: CashBoxId,
    },
    CashBase {
        amount: Money,
        destination_box_id: CashBoxId,
        reason: String,
    },
    PaymentExtension {
        installment_id: InstallmentId,
        new_due_date: NaiveDate,
        reason: String,
    },
}

impl RequestPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            RequestPayload::NewClient { .. } => "NEW_CLIENT",
            RequestPayload::NewLoan { .. } => "NEW_LOAN",
            RequestPayload::Expense { .. } => "EXPENSE",
            RequestPayload::CashBase { .. } => "CASH_BASE_REQUEST",
            RequestPayload::PaymentExtension { .. } => "PAYMENT_EXTENSION",
        }
    }
}

/// a pending change awaiting review; terminal once decided
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub payload: RequestPayload,
    /// reviewer-edited payload; wins over the original on approval
    pub edited: Option<RequestPayload>,
    pub state: ApprovalState,
    pub requested_by: UserId,
    pub reviewed_by: Option<UserId>,
    pub decision_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn new(payload: RequestPayload, requested_by: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            edited: None,
            state: ApprovalState::Pending,
            requested_by,
            reviewed_by: None,
            decision_notes: None,
            created_at,
            decided_at: None,
        }
    }

    /// the payload a decision acts on
    pub fn effective_payload(&self) -> &RequestPayload {
        self.edited.as_ref().unwrap_or(&self.payload)
    }

    /// guard: approve/reject are only legal from PENDING
    pub fn ensure_pending(&self) -> Result<()> {
        if self.state != ApprovalState::Pending {
            return Err(EngineError::invalid_state(
                format!("{:?}", self.state),
                "Pending",
            ));
        }
        Ok(())
    }

    pub fn mark_approved(&mut self, reviewer: UserId, decided_at: DateTime<Utc>) {
        self.state = ApprovalState::Approved;
        self.reviewed_by = Some(reviewer);
        self.decided_at = Some(decided_at);
    }

    pub fn mark_rejected(&mut self, reviewer: UserId, reason: String, decided_at: DateTime<Utc>) {
        self.state = ApprovalState::Rejected;
        self.reviewed_by = Some(reviewer);
        self.decision_notes = Some(reason);
        self.decided_at = Some(decided_at);
    }
}

/// an operational expense funded from a cash box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub category: String,
    pub description: String,
    pub amount: Money,
    pub cash_box_id: CashBoxId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        category: String,
        description: String,
        amount: Money,
        cash_box_id: CashBoxId,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            description,
            amount,
            cash_box_id,
            created_by,
            created_at,
        }
    }
}

/// an approved due-date extension for one installment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extension {
    pub id: ExtensionId,
    pub installment_id: InstallmentId,
    pub old_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
    pub reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Extension {
    pub fn new(
        installment_id: InstallmentId,
        old_due_date: NaiveDate,
        new_due_date: NaiveDate,
        reason: String,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            installment_id,
            old_due_date,
            new_due_date,
            reason,
            created_by,
            created_at,
        }
    }
}
