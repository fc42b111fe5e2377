pub mod approvals;
pub mod config;
pub mod decimal;
pub mod domain;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod mora;
pub mod payments;
pub mod ports;
pub mod schedule;
pub mod store;
pub mod types;

// re-export key types
pub use config::EngineConfig;
pub use decimal::{Money, Rate};
pub use errors::{EngineError, Result};
pub use events::{Event, EventStore};
pub use approvals::{decide_loan, ApprovalOutcome, ApprovalWorkflow, LoanDecision};
pub use ledger::CashLedger;
pub use mora::{DelinquencyProcessor, SweepReport};
pub use payments::{CollectPayment, PaymentAllocator, PaymentReceipt};
pub use ports::{
    AuditPort, BroadcastPort, NotificationPort, Ports, PushPort, PushTarget, RecordingPorts,
    Severity, SideEffectChannel, SideEffectOutcome,
};
pub use schedule::{build_schedule, GeneratedSchedule, ScheduleParams};
pub use store::{MemoryStore, StoreState};
pub use types::{
    AmortizationType, ApprovalState, CashBoxKind, Direction, InstallmentState, LoanState,
    PaymentFrequency, PaymentMethod, PaymentSplit, RiskLabel, RiskLevel,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
