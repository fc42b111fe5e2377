use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::domain::Transaction;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::store::StoreState;
use crate::types::{CashBoxId, Direction, Reference, UserId};

/// invariant-preserving cash movement: exactly one transaction row and
/// exactly one signed balance increment, inside the caller's unit of
/// work. Transfers between two boxes are two calls in the same unit of
/// work; there is deliberately no multi-box primitive here.
pub struct CashLedger;

impl CashLedger {
    #[allow(clippy::too_many_arguments)]
    pub fn post(
        state: &mut StoreState,
        config: &EngineConfig,
        events: &mut EventStore,
        cash_box_id: CashBoxId,
        direction: Direction,
        amount: Money,
        reference: Reference,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(EngineError::validation("transaction amount must be positive"));
        }

        let code = config.transaction_code(state.counters.next_transaction());

        let cash_box = state.cash_box_mut(cash_box_id)?;
        if !cash_box.active {
            return Err(EngineError::validation("cash box is inactive"));
        }
        cash_box.apply(direction, amount);
        let new_balance = cash_box.balance;

        let transaction =
            Transaction::new(code, cash_box_id, direction, amount, reference, actor, at);
        state.transactions.push(transaction.clone());

        events.emit(Event::CashMoved {
            transaction_id: transaction.id,
            cash_box_id,
            direction,
            amount,
            new_balance,
            timestamp: at,
        });

        Ok(transaction)
    }

    /// reconcile a box balance against its ledger, for audits and tests
    pub fn reconciled_balance(state: &StoreState, cash_box_id: CashBoxId) -> Money {
        state
            .transactions
            .iter()
            .filter(|t| t.cash_box_id == cash_box_id)
            .map(|t| t.signed_amount())
            .sum()
    }
}
