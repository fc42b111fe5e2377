use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{CashBoxId, CashBoxKind, Direction, Reference, RouteId, TransactionId, UserId};

/// a physical or virtual cash register with a running balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashBox {
    pub id: CashBoxId,
    pub kind: CashBoxKind,
    pub name: String,
    pub balance: Money,
    pub responsible: UserId,
    pub route_id: Option<RouteId>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl CashBox {
    pub fn principal(name: String, responsible: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: CashBoxKind::Principal,
            name,
            balance: Money::ZERO,
            responsible,
            route_id: None,
            active: true,
            created_at,
        }
    }

    pub fn route(
        name: String,
        responsible: UserId,
        route_id: RouteId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: CashBoxKind::Route,
            name,
            balance: Money::ZERO,
            responsible,
            route_id: Some(route_id),
            active: true,
            created_at,
        }
    }

    /// signed balance adjustment; only the ledger calls this
    pub(crate) fn apply(&mut self, direction: Direction, amount: Money) {
        match direction {
            Direction::In => self.balance += amount,
            Direction::Out => self.balance -= amount,
        }
    }
}

/// immutable ledger entry mirroring one cash movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub code: String,
    pub cash_box_id: CashBoxId,
    pub direction: Direction,
    pub amount: Money,
    pub reference: Reference,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        code: String,
        cash_box_id: CashBoxId,
        direction: Direction,
        amount: Money,
        reference: Reference,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            cash_box_id,
            direction,
            amount,
            reference,
            created_by,
            created_at,
        }
    }

    /// the amount signed by direction, for balance reconciliation
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::In => self.amount,
            Direction::Out => Money::ZERO - self.amount,
        }
    }
}
