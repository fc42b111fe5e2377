pub mod approval;
pub mod cashbox;
pub mod client;
pub mod installment;
pub mod loan;
pub mod payment;

pub use approval::{ApprovalRequest, Expense, Extension, LoanTerms, RequestPayload};
pub use cashbox::{CashBox, Transaction};
pub use client::{Client, Route};
pub use installment::Installment;
pub use loan::Loan;
pub use payment::{Payment, PaymentDetail};
