use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};

/// unique identifier for a client
pub type ClientId = Uuid;
/// unique identifier for a loan
pub type LoanId = Uuid;
/// unique identifier for an installment
pub type InstallmentId = Uuid;
/// unique identifier for a payment
pub type PaymentId = Uuid;
/// unique identifier for a cash box
pub type CashBoxId = Uuid;
/// unique identifier for a ledger transaction
pub type TransactionId = Uuid;
/// unique identifier for an approval request
pub type RequestId = Uuid;
/// unique identifier for a collection route
pub type RouteId = Uuid;
/// unique identifier for an expense
pub type ExpenseId = Uuid;
/// unique identifier for a payment extension
pub type ExtensionId = Uuid;
/// unique identifier for a user (collector, supervisor, approver)
pub type UserId = Uuid;

/// stored client risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
    Blacklisted,
}

/// mora sub-label derived from days late
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLabel {
    Minimum,
    Light,
    Caution,
    Moderate,
    Critical,
}

impl RiskLabel {
    /// classify days late into a sub-label
    pub fn from_days_late(days: i64) -> Self {
        match days {
            d if d <= 0 => RiskLabel::Minimum,
            1..=2 => RiskLabel::Light,
            3..=4 => RiskLabel::Caution,
            5..=7 => RiskLabel::Moderate,
            _ => RiskLabel::Critical,
        }
    }

    /// ordinal 1..5, persisted on the client to detect upgrades across sweeps
    pub fn ordinal(&self) -> u8 {
        match self {
            RiskLabel::Minimum => 1,
            RiskLabel::Light => 2,
            RiskLabel::Caution => 3,
            RiskLabel::Moderate => 4,
            RiskLabel::Critical => 5,
        }
    }

    /// the stored risk level this sub-label maps to
    pub fn storage_level(&self) -> RiskLevel {
        match self {
            RiskLabel::Minimum | RiskLabel::Light => RiskLevel::Green,
            RiskLabel::Caution | RiskLabel::Moderate => RiskLevel::Yellow,
            RiskLabel::Critical => RiskLevel::Red,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Minimum => "Minimum",
            RiskLabel::Light => "Light",
            RiskLabel::Caution => "Caution",
            RiskLabel::Moderate => "Moderate",
            RiskLabel::Critical => "Critical",
        }
    }
}

/// loan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanState {
    /// created by a pending request, not yet funded
    Draft,
    /// approved and collecting
    Active,
    /// at least one overdue installment
    InArrears,
    /// manual decision: client defaulted
    Defaulted,
    /// manual decision: written off as loss
    WrittenOff,
    /// balance cleared
    Paid,
}

/// approval state shared by loans and approval requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

/// collection frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl PaymentFrequency {
    /// how many collection periods fit in one month, for rate conversion
    pub fn periods_per_month(&self) -> u32 {
        match self {
            PaymentFrequency::Daily => 30,
            PaymentFrequency::Weekly => 4,
            PaymentFrequency::Biweekly => 2,
            PaymentFrequency::Monthly => 1,
        }
    }
}

/// amortization curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmortizationType {
    /// annuity: equal total payments, decreasing interest share
    French,
    /// flat: equal capital and equal interest shares
    Simple,
}

/// installment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentState {
    Pending,
    Partial,
    Paid,
    Overdue,
}

/// cash box kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashBoxKind {
    /// the office master box funding the routes
    Principal,
    /// a collector's field box tied to a route
    Route,
}

/// ledger movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

/// how a collection was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Other,
}

/// what a ledger transaction points back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    Payment,
    Loan,
    Expense,
    ApprovalRequest,
}

/// back-reference from a transaction to the event that moved the money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceType,
    pub id: Uuid,
}

impl Reference {
    pub fn payment(id: PaymentId) -> Self {
        Reference { kind: ReferenceType::Payment, id }
    }

    pub fn loan(id: LoanId) -> Self {
        Reference { kind: ReferenceType::Loan, id }
    }

    pub fn expense(id: ExpenseId) -> Self {
        Reference { kind: ReferenceType::Expense, id }
    }

    pub fn request(id: RequestId) -> Self {
        Reference { kind: ReferenceType::ApprovalRequest, id }
    }
}

/// capital/interest decomposition of a gross amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentSplit {
    pub capital: Money,
    pub interest: Money,
}

impl PaymentSplit {
    /// split a gross amount by the loan's nominal rate:
    /// capital = amount * 100 / (100 + rate), interest takes the rest,
    /// so capital + interest == amount exactly
    pub fn decompose(amount: Money, rate: Rate) -> Self {
        if rate.is_zero() {
            return PaymentSplit { capital: amount, interest: Money::ZERO };
        }
        let capital = Money::from_decimal(
            amount.as_decimal() / (Decimal::ONE + rate.as_decimal()),
        );
        PaymentSplit { capital, interest: amount - capital }
    }

    pub fn total(&self) -> Money {
        self.capital + self.interest
    }
}
