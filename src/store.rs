use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    ApprovalRequest, CashBox, Client, Expense, Extension, Installment, Loan, Payment,
    PaymentDetail, Route, Transaction,
};
use crate::errors::{EngineError, Result};
use crate::types::{
    CashBoxId, CashBoxKind, ClientId, ExpenseId, ExtensionId, InstallmentId, LoanId, PaymentId,
    RequestId, RouteId,
};

/// monotonic counters reserved inside the unit of work, so human-readable
/// numbers never race the way a row count would
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    payments: u64,
    transactions: u64,
}

impl Counters {
    pub fn next_payment(&mut self) -> u64 {
        self.payments += 1;
        self.payments
    }

    pub fn next_transaction(&mut self) -> u64 {
        self.transactions += 1;
        self.transactions
    }
}

/// the whole persisted world, serializable as one snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub clients: BTreeMap<ClientId, Client>,
    pub routes: BTreeMap<RouteId, Route>,
    pub loans: BTreeMap<LoanId, Loan>,
    pub installments: BTreeMap<InstallmentId, Installment>,
    pub payments: BTreeMap<PaymentId, Payment>,
    pub payment_details: Vec<PaymentDetail>,
    pub cash_boxes: BTreeMap<CashBoxId, CashBox>,
    pub transactions: Vec<Transaction>,
    pub requests: BTreeMap<RequestId, ApprovalRequest>,
    pub expenses: BTreeMap<ExpenseId, Expense>,
    pub extensions: BTreeMap<ExtensionId, Extension>,
    pub counters: Counters,
}

impl StoreState {
    pub fn client(&self, id: ClientId) -> Result<&Client> {
        self.clients.get(&id).ok_or(EngineError::not_found("client", id))
    }

    pub fn client_mut(&mut self, id: ClientId) -> Result<&mut Client> {
        self.clients.get_mut(&id).ok_or(EngineError::not_found("client", id))
    }

    pub fn loan(&self, id: LoanId) -> Result<&Loan> {
        self.loans.get(&id).ok_or(EngineError::not_found("loan", id))
    }

    pub fn loan_mut(&mut self, id: LoanId) -> Result<&mut Loan> {
        self.loans.get_mut(&id).ok_or(EngineError::not_found("loan", id))
    }

    pub fn installment(&self, id: InstallmentId) -> Result<&Installment> {
        self.installments.get(&id).ok_or(EngineError::not_found("installment", id))
    }

    pub fn installment_mut(&mut self, id: InstallmentId) -> Result<&mut Installment> {
        self.installments.get_mut(&id).ok_or(EngineError::not_found("installment", id))
    }

    pub fn cash_box(&self, id: CashBoxId) -> Result<&CashBox> {
        self.cash_boxes.get(&id).ok_or(EngineError::not_found("cash box", id))
    }

    pub fn cash_box_mut(&mut self, id: CashBoxId) -> Result<&mut CashBox> {
        self.cash_boxes.get_mut(&id).ok_or(EngineError::not_found("cash box", id))
    }

    pub fn request(&self, id: RequestId) -> Result<&ApprovalRequest> {
        self.requests.get(&id).ok_or(EngineError::not_found("approval request", id))
    }

    pub fn request_mut(&mut self, id: RequestId) -> Result<&mut ApprovalRequest> {
        self.requests.get_mut(&id).ok_or(EngineError::not_found("approval request", id))
    }

    /// all installments of a loan ordered by sequence number
    pub fn installments_for_loan(&self, loan_id: LoanId) -> Vec<InstallmentId> {
        let mut rows: Vec<&Installment> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id)
            .collect();
        rows.sort_by_key(|i| i.sequence_number);
        rows.into_iter().map(|i| i.id).collect()
    }

    /// unpaid installments of a loan in strict sequence order, the
    /// allocation queue
    pub fn outstanding_installments(&self, loan_id: LoanId) -> Vec<InstallmentId> {
        let mut rows: Vec<&Installment> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id && i.is_outstanding())
            .collect();
        rows.sort_by_key(|i| i.sequence_number);
        rows.into_iter().map(|i| i.id).collect()
    }

    /// discard and recreate a loan's schedule in one shot
    pub fn replace_schedule(&mut self, loan_id: LoanId, schedule: Vec<Installment>) {
        self.installments.retain(|_, i| i.loan_id != loan_id);
        for installment in schedule {
            self.installments.insert(installment.id, installment);
        }
    }

    /// the client's active route assignment
    pub fn active_route_for_client(&self, client_id: ClientId) -> Result<&Route> {
        let client = self.client(client_id)?;
        let route_id = client.route_id.ok_or_else(|| {
            EngineError::validation("client has no active route assignment")
        })?;
        let route = self
            .routes
            .get(&route_id)
            .ok_or(EngineError::not_found("route", route_id))?;
        if !route.active {
            return Err(EngineError::validation("client route is inactive"));
        }
        Ok(route)
    }

    /// the single active ROUTE cash box of the client's route; no
    /// fallback box is ever created
    pub fn active_route_box_for_client(&self, client_id: ClientId) -> Result<CashBoxId> {
        let route = self.active_route_for_client(client_id)?;
        self.cash_boxes
            .values()
            .find(|b| b.kind == CashBoxKind::Route && b.active && b.route_id == Some(route.id))
            .map(|b| b.id)
            .ok_or_else(|| EngineError::validation("route has no active cash box"))
    }

    /// the single active PRINCIPAL cash box funding the routes
    pub fn single_active_principal_box(&self) -> Result<CashBoxId> {
        let mut boxes = self
            .cash_boxes
            .values()
            .filter(|b| b.kind == CashBoxKind::Principal && b.active);
        let first = boxes
            .next()
            .ok_or_else(|| EngineError::validation("no active principal cash box"))?;
        if boxes.next().is_some() {
            return Err(EngineError::conflict("more than one active principal cash box"));
        }
        Ok(first.id)
    }

    /// loans of a client that are collecting or in arrears
    pub fn open_loans_for_client(&self, client_id: ClientId) -> Vec<LoanId> {
        self.loans
            .values()
            .filter(|l| l.client_id == client_id && !l.is_deleted() && l.is_collectible())
            .map(|l| l.id)
            .collect()
    }
}

/// explicit unit-of-work store: every multi-row mutation runs through
/// `with_transaction`, which restores the pre-call snapshot on error so
/// no partial state is ever observable
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// direct mutable access for fixture setup; engine operations go
    /// through `with_transaction`
    pub fn state_mut(&mut self) -> &mut StoreState {
        &mut self.state
    }

    /// run `f` atomically: an Err rolls the state back to the snapshot
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&mut StoreState) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.state.clone();
        match f(&mut self.state) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state = snapshot;
                Err(err)
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self { state: serde_json::from_str(json)? })
    }
}
