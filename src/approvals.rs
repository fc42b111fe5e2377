use hourglass_rs::SafeTimeProvider;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::domain::{ApprovalRequest, Client, Expense, Extension, LoanTerms, RequestPayload};
use crate::domain::Loan;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::CashLedger;
use crate::ports::{EntityRef, Ports, Severity, SideEffectChannel, SideEffectOutcome, SideEffects};
use crate::schedule::{build_schedule, ScheduleParams};
use crate::store::MemoryStore;
use crate::types::{
    ApprovalState, CashBoxKind, ClientId, Direction, LoanId, LoanState, Reference, RequestId,
    UserId,
};

/// what a decision produced
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub request_id: RequestId,
    pub request_type: &'static str,
    /// NEW_LOAN only: whether the principal actually left a route box
    pub disbursed: Option<bool>,
    pub side_effects: Vec<SideEffectOutcome>,
}

/// turns pending requests into committed domain changes plus ledger
/// movements; PENDING -> APPROVED | REJECTED, both terminal
pub struct ApprovalWorkflow<'a> {
    config: &'a EngineConfig,
    time: &'a SafeTimeProvider,
}

impl<'a> ApprovalWorkflow<'a> {
    pub fn new(config: &'a EngineConfig, time: &'a SafeTimeProvider) -> Self {
        Self { config, time }
    }

    /// file a request for review; NEW_LOAN goes through
    /// `submit_loan_request`, which also creates the draft loan
    pub fn submit_request(
        &self,
        store: &mut MemoryStore,
        requester: UserId,
        payload: RequestPayload,
    ) -> Result<RequestId> {
        let now = self.time.now();
        store.with_transaction(|state| {
            match &payload {
                RequestPayload::NewClient { name, document, .. } => {
                    if name.trim().is_empty() || document.trim().is_empty() {
                        return Err(EngineError::validation("client name and document required"));
                    }
                }
                RequestPayload::NewLoan { .. } => {
                    return Err(EngineError::validation(
                        "loan requests are filed through submit_loan_request",
                    ));
                }
                RequestPayload::Expense { amount, cash_box_id, .. } => {
                    if !amount.is_positive() {
                        return Err(EngineError::validation("expense amount must be positive"));
                    }
                    state.cash_box(*cash_box_id)?;
                }
                RequestPayload::CashBase { amount, destination_box_id, .. } => {
                    if !amount.is_positive() {
                        return Err(EngineError::validation("transfer amount must be positive"));
                    }
                    state.cash_box(*destination_box_id)?;
                }
                RequestPayload::PaymentExtension { installment_id, .. } => {
                    state.installment(*installment_id)?;
                }
            }
            let request = ApprovalRequest::new(payload, requester, now);
            let id = request.id;
            state.requests.insert(id, request);
            Ok(id)
        })
    }

    /// file a NEW_LOAN request: creates the draft loan and its schedule
    /// alongside the pending request
    pub fn submit_loan_request(
        &self,
        store: &mut MemoryStore,
        requester: UserId,
        client_id: ClientId,
        terms: LoanTerms,
    ) -> Result<(RequestId, LoanId)> {
        let now = self.time.now();
        store.with_transaction(|state| {
            let client = state.client(client_id)?;
            if client.is_deleted() {
                return Err(EngineError::not_found("client", client_id));
            }
            if client.blacklisted {
                return Err(EngineError::validation("client is blacklisted"));
            }
            if !terms.amount.is_positive() {
                return Err(EngineError::validation("loan amount must be positive"));
            }

            let mut loan = Loan::draft(
                client_id,
                terms.amount,
                terms.interest_rate,
                terms.term_units,
                terms.payment_frequency,
                terms.amortization_type,
                terms.start_date,
                now,
            );
            let loan_id = loan.id;
            let schedule = build_schedule(loan_id, &schedule_params(&terms))?;
            loan.set_schedule_totals(schedule.total_interest);

            state.loans.insert(loan_id, loan);
            state.replace_schedule(loan_id, schedule.installments);

            let request =
                ApprovalRequest::new(RequestPayload::NewLoan { loan_id, terms }, requester, now);
            let request_id = request.id;
            state.requests.insert(request_id, request);
            Ok((request_id, loan_id))
        })
    }

    /// approve: dispatch on the payload, all inside one unit of work
    pub fn approve(
        &self,
        store: &mut MemoryStore,
        ports: &mut Ports<'_>,
        events: &mut EventStore,
        request_id: RequestId,
        reviewer: UserId,
        edited: Option<RequestPayload>,
    ) -> Result<ApprovalOutcome> {
        let now = self.time.now();
        let config = self.config;

        let (request_type, requester, disbursed, mut tx_events) =
            store.with_transaction(|state| {
                let mut tx_events = EventStore::new();

                let request = state.request(request_id)?;
                request.ensure_pending()?;
                if let Some(edited) = &edited {
                    if edited.type_name() != request.payload.type_name() {
                        return Err(EngineError::conflict(
                            "edited payload changes the request type",
                        ));
                    }
                }
                let requester = request.requested_by;
                let payload = edited.clone().unwrap_or_else(|| request.payload.clone());
                let edited_terms = edited.is_some();

                let mut disbursed = None;
                match payload {
                    RequestPayload::NewClient { name, document, phone, address, route_id } => {
                        if let Some(route_id) = route_id {
                            let route = state
                                .routes
                                .get(&route_id)
                                .ok_or(EngineError::not_found("route", route_id))?;
                            if !route.active {
                                return Err(EngineError::validation("route is inactive"));
                            }
                        }
                        let client = Client::new(name, document, phone, address, route_id, now);
                        state.clients.insert(client.id, client);
                    }

                    RequestPayload::NewLoan { loan_id, terms } => {
                        let loan = state.loan(loan_id)?;
                        if loan.is_deleted() {
                            return Err(EngineError::not_found("loan", loan_id));
                        }
                        if loan.approval_state != ApprovalState::Pending {
                            return Err(EngineError::conflict("loan was already decided"));
                        }

                        if edited_terms {
                            // reviewer changed the financial terms: the
                            // draft schedule is discarded and rebuilt
                            let schedule = build_schedule(loan_id, &schedule_params(&terms))?;
                            let loan = state.loan_mut(loan_id)?;
                            loan.amount = terms.amount;
                            loan.interest_rate = terms.interest_rate;
                            loan.term_units = terms.term_units;
                            loan.payment_frequency = terms.payment_frequency;
                            loan.amortization_type = terms.amortization_type;
                            loan.start_date = terms.start_date;
                            loan.set_schedule_totals(schedule.total_interest);
                            let count = schedule.installments.len() as u32;
                            let total_interest = schedule.total_interest;
                            state.replace_schedule(loan_id, schedule.installments);
                            tx_events.emit(Event::LoanRescheduled {
                                loan_id,
                                installments: count,
                                total_interest,
                                timestamp: now,
                            });
                        }

                        let loan = state.loan_mut(loan_id)?;
                        loan.activate();
                        let client_id = loan.client_id;
                        let principal = loan.amount;
                        let total_interest = loan.total_interest;
                        let installments = loan.term_units;
                        tx_events.emit(Event::LoanActivated {
                            loan_id,
                            principal,
                            total_interest,
                            installments,
                            timestamp: now,
                        });

                        // disbursement is best-effort: a route without a
                        // box skips the ledger step, activation commits
                        match state.active_route_box_for_client(client_id) {
                            Ok(box_id) => {
                                CashLedger::post(
                                    state,
                                    config,
                                    &mut tx_events,
                                    box_id,
                                    Direction::Out,
                                    principal,
                                    Reference::loan(loan_id),
                                    reviewer,
                                    now,
                                )?;
                                disbursed = Some(true);
                            }
                            Err(err) => {
                                warn!(%loan_id, error = %err, "disbursement skipped");
                                disbursed = Some(false);
                            }
                        }
                    }

                    RequestPayload::Expense { category, description, amount, cash_box_id } => {
                        if !amount.is_positive() {
                            return Err(EngineError::validation(
                                "expense amount must be positive",
                            ));
                        }
                        let expense =
                            Expense::new(category, description, amount, cash_box_id, reviewer, now);
                        CashLedger::post(
                            state,
                            config,
                            &mut tx_events,
                            cash_box_id,
                            Direction::Out,
                            amount,
                            Reference::expense(expense.id),
                            reviewer,
                            now,
                        )?;
                        state.expenses.insert(expense.id, expense);
                    }

                    RequestPayload::CashBase { amount, destination_box_id, .. } => {
                        if !amount.is_positive() {
                            return Err(EngineError::validation(
                                "transfer amount must be positive",
                            ));
                        }
                        let principal_box_id = state.single_active_principal_box()?;
                        let available = state.cash_box(principal_box_id)?.balance;
                        if available < amount {
                            return Err(EngineError::InsufficientFunds {
                                available,
                                requested: amount,
                            });
                        }
                        let destination = state.cash_box(destination_box_id)?;
                        if destination.kind != CashBoxKind::Route || !destination.active {
                            return Err(EngineError::validation(
                                "destination must be an active route cash box",
                            ));
                        }
                        // paired movements commit together or not at all
                        CashLedger::post(
                            state,
                            config,
                            &mut tx_events,
                            principal_box_id,
                            Direction::Out,
                            amount,
                            Reference::request(request_id),
                            reviewer,
                            now,
                        )?;
                        CashLedger::post(
                            state,
                            config,
                            &mut tx_events,
                            destination_box_id,
                            Direction::In,
                            amount,
                            Reference::request(request_id),
                            reviewer,
                            now,
                        )?;
                    }

                    RequestPayload::PaymentExtension { installment_id, new_due_date, reason } => {
                        let cuota = state.installment(installment_id)?;
                        let old_due_date = cuota.effective_due_date();
                        let extension = Extension::new(
                            installment_id,
                            old_due_date,
                            new_due_date,
                            reason,
                            reviewer,
                            now,
                        );
                        state
                            .installment_mut(installment_id)?
                            .reschedule(new_due_date, extension.id);
                        state.extensions.insert(extension.id, extension);
                    }
                }

                let request = state.request_mut(request_id)?;
                if edited_terms {
                    request.edited = edited.clone();
                }
                request.mark_approved(reviewer, now);
                let request_type = request.payload.type_name();
                tx_events.emit(Event::RequestApproved {
                    request_id,
                    request_type: request_type.to_string(),
                    timestamp: now,
                });

                Ok((request_type, requester, disbursed, tx_events))
            })?;

        for event in tx_events.take_events() {
            events.emit(event);
        }
        info!(%request_id, request_type, "request approved");

        let mut effects = SideEffects::new();
        effects.run(
            SideEffectChannel::Audit,
            format!("approve {request_type}"),
            ports.audit.record(
                reviewer,
                "REQUEST_APPROVED",
                "approval_request",
                request_id,
                None,
                None,
            ),
        );
        effects.run(
            SideEffectChannel::UserNotification,
            format!("approval notice {request_id}"),
            ports.notifications.notify_user(
                requester,
                "Request approved",
                &format!("your {request_type} request was approved"),
                Severity::Info,
                Some(EntityRef { entity_type: "approval_request", entity_id: request_id }),
                serde_json::json!({ "reviewer": reviewer }),
            ),
        );

        Ok(ApprovalOutcome {
            request_id,
            request_type,
            disbursed,
            side_effects: effects.into_outcomes(),
        })
    }

    /// reject: terminal mark plus, for NEW_LOAN, soft-deleting the draft
    /// loan so it disappears from active listings
    pub fn reject(
        &self,
        store: &mut MemoryStore,
        ports: &mut Ports<'_>,
        events: &mut EventStore,
        request_id: RequestId,
        reviewer: UserId,
        reason: String,
    ) -> Result<ApprovalOutcome> {
        let now = self.time.now();

        let (request_type, requester, mut tx_events) = store.with_transaction(|state| {
            let mut tx_events = EventStore::new();

            let request = state.request_mut(request_id)?;
            request.ensure_pending()?;
            request.mark_rejected(reviewer, reason.clone(), now);
            let request_type = request.payload.type_name();
            let requester = request.requested_by;
            let payload = request.payload.clone();

            if let RequestPayload::NewLoan { loan_id, .. } = payload {
                let loan = state.loan_mut(loan_id)?;
                loan.deleted_at = Some(now);
                loan.approval_state = ApprovalState::Rejected;
            }

            tx_events.emit(Event::RequestRejected {
                request_id,
                request_type: request_type.to_string(),
                reason: reason.clone(),
                timestamp: now,
            });
            Ok((request_type, requester, tx_events))
        })?;

        for event in tx_events.take_events() {
            events.emit(event);
        }
        info!(%request_id, request_type, "request rejected");

        let mut effects = SideEffects::new();
        effects.run(
            SideEffectChannel::UserNotification,
            format!("rejection notice {request_id}"),
            ports.notifications.notify_user(
                requester,
                "Request rejected",
                &format!("your {request_type} request was rejected: {reason}"),
                Severity::Warning,
                Some(EntityRef { entity_type: "approval_request", entity_id: request_id }),
                serde_json::json!({ "reviewer": reviewer, "reason": reason }),
            ),
        );

        Ok(ApprovalOutcome {
            request_id,
            request_type,
            disbursed: None,
            side_effects: effects.into_outcomes(),
        })
    }
}

/// manual portfolio decision on a non-performing loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanDecision {
    Defaulted,
    WrittenOff,
}

/// record a supervisor's terminal decision on a loan; legal only while
/// the loan is active or in arrears
pub fn decide_loan(
    store: &mut MemoryStore,
    events: &mut EventStore,
    time: &SafeTimeProvider,
    loan_id: LoanId,
    decision: LoanDecision,
    actor: UserId,
) -> Result<()> {
    let now = time.now();
    let mut tx_events = store.with_transaction(|state| {
        let mut tx_events = EventStore::new();
        let loan = state.loan_mut(loan_id)?;
        if loan.is_deleted() {
            return Err(EngineError::not_found("loan", loan_id));
        }
        if !loan.is_collectible() {
            return Err(EngineError::invalid_state(
                format!("{:?}", loan.state),
                "Active or InArrears",
            ));
        }
        let old_state = loan.state;
        loan.state = match decision {
            LoanDecision::Defaulted => LoanState::Defaulted,
            LoanDecision::WrittenOff => LoanState::WrittenOff,
        };
        tx_events.emit(Event::LoanStateChanged {
            loan_id,
            old_state,
            new_state: loan.state,
            timestamp: now,
        });
        Ok(tx_events)
    })?;

    for event in tx_events.take_events() {
        events.emit(event);
    }
    info!(%loan_id, ?decision, %actor, "loan decision recorded");
    Ok(())
}

fn schedule_params(terms: &LoanTerms) -> ScheduleParams {
    ScheduleParams {
        principal: terms.amount,
        rate: terms.interest_rate,
        installments: terms.term_units,
        frequency: terms.payment_frequency,
        amortization: terms.amortization_type,
        start_date: terms.start_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::domain::{CashBox, Route};
    use crate::ports::RecordingPorts;
    use crate::types::{AmortizationType, CashBoxId, LoanState, PaymentFrequency, RouteId};
    use chrono::{NaiveDate, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    fn clock() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    struct Fixture {
        store: MemoryStore,
        client_id: ClientId,
        route_id: RouteId,
        route_box_id: CashBoxId,
        principal_box_id: CashBoxId,
        requester: UserId,
        reviewer: UserId,
    }

    fn fixture() -> Fixture {
        let mut store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let collector = Uuid::new_v4();

        let route = Route::new("ruta centro".to_string(), collector);
        let route_id = route.id;
        let client = Client::new(
            "Ana Torres".to_string(),
            "CC-778899".to_string(),
            "310".to_string(),
            "Av 3 #22-10".to_string(),
            Some(route_id),
            now,
        );
        let client_id = client.id;
        let route_box = CashBox::route("caja centro".to_string(), collector, route_id, now);
        let route_box_id = route_box.id;
        let mut principal_box =
            CashBox::principal("caja principal".to_string(), Uuid::new_v4(), now);
        principal_box.balance = Money::from_major(5_000_000);
        let principal_box_id = principal_box.id;

        let state = store.state_mut();
        state.routes.insert(route_id, route);
        state.clients.insert(client_id, client);
        state.cash_boxes.insert(route_box_id, route_box);
        state.cash_boxes.insert(principal_box_id, principal_box);

        Fixture {
            store,
            client_id,
            route_id,
            route_box_id,
            principal_box_id,
            requester: Uuid::new_v4(),
            reviewer: Uuid::new_v4(),
        }
    }

    fn terms(amount: i64, n: u32) -> LoanTerms {
        LoanTerms {
            amount: Money::from_major(amount),
            interest_rate: Rate::from_percentage(20),
            term_units: n,
            payment_frequency: PaymentFrequency::Monthly,
            amortization_type: AmortizationType::Simple,
            start_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        }
    }

    #[test]
    fn test_new_loan_approval_activates_and_disburses() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let (request_id, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(1_000_000, 10))
            .unwrap();
        assert_eq!(f.store.state().loan(loan_id).unwrap().state, LoanState::Draft);
        assert_eq!(f.store.state().installments_for_loan(loan_id).len(), 10);

        let outcome = workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        let loan = f.store.state().loan(loan_id).unwrap();
        assert_eq!(loan.state, LoanState::Active);
        assert_eq!(loan.approval_state, ApprovalState::Approved);
        assert_eq!(loan.outstanding_balance, Money::from_major(1_200_000));
        assert_eq!(outcome.disbursed, Some(true));

        // the route box funded the principal
        let caja = f.store.state().cash_box(f.route_box_id).unwrap();
        assert_eq!(caja.balance, Money::ZERO - Money::from_major(1_000_000));
        assert_eq!(f.store.state().transactions.len(), 1);
    }

    #[test]
    fn test_edited_terms_rebuild_the_schedule() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let (request_id, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(1_000_000, 10))
            .unwrap();

        let edited = RequestPayload::NewLoan { loan_id, terms: terms(600_000, 6) };
        workflow
            .approve(
                &mut f.store,
                &mut recording.ports(),
                &mut events,
                request_id,
                f.reviewer,
                Some(edited),
            )
            .unwrap();

        let loan = f.store.state().loan(loan_id).unwrap();
        assert_eq!(loan.amount, Money::from_major(600_000));
        assert_eq!(loan.total_interest, Money::from_major(120_000));
        assert_eq!(f.store.state().installments_for_loan(loan_id).len(), 6);
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::LoanRescheduled { .. })));
    }

    #[test]
    fn test_approval_is_terminal() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::Expense {
                    category: "fuel".to_string(),
                    description: "weekly fuel".to_string(),
                    amount: Money::from_major(40_000),
                    cash_box_id: f.principal_box_id,
                },
            )
            .unwrap();

        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();
        let transactions = f.store.state().transactions.len();

        let err = workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        // no duplicate side effects on the second attempt
        assert_eq!(f.store.state().transactions.len(), transactions);
        assert_eq!(f.store.state().expenses.len(), 1);

        let err = workflow
            .reject(
                &mut f.store,
                &mut recording.ports(),
                &mut events,
                request_id,
                f.reviewer,
                "late".to_string(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn test_expense_moves_cash() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::Expense {
                    category: "repairs".to_string(),
                    description: "motorcycle tire".to_string(),
                    amount: Money::from_major(90_000),
                    cash_box_id: f.principal_box_id,
                },
            )
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        let caja = f.store.state().cash_box(f.principal_box_id).unwrap();
        assert_eq!(caja.balance, Money::from_major(4_910_000));
        assert_eq!(caja.balance, CashLedger::reconciled_balance(f.store.state(), f.principal_box_id));
    }

    #[test]
    fn test_cash_base_transfer_moves_both_boxes() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::CashBase {
                    amount: Money::from_major(2_000_000),
                    destination_box_id: f.route_box_id,
                    reason: "monday base".to_string(),
                },
            )
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        assert_eq!(
            f.store.state().cash_box(f.principal_box_id).unwrap().balance,
            Money::from_major(3_000_000)
        );
        assert_eq!(
            f.store.state().cash_box(f.route_box_id).unwrap().balance,
            Money::from_major(2_000_000)
        );
        assert_eq!(f.store.state().transactions.len(), 2);
    }

    #[test]
    fn test_cash_base_insufficient_funds_leaves_both_untouched() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::CashBase {
                    amount: Money::from_major(9_000_000),
                    destination_box_id: f.route_box_id,
                    reason: "too much".to_string(),
                },
            )
            .unwrap();
        let err = workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap_err();

        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(
            f.store.state().cash_box(f.principal_box_id).unwrap().balance,
            Money::from_major(5_000_000)
        );
        assert_eq!(f.store.state().cash_box(f.route_box_id).unwrap().balance, Money::ZERO);
        assert!(f.store.state().transactions.is_empty());
        // the request is still pending: the decision rolled back whole
        assert_eq!(
            f.store.state().request(request_id).unwrap().state,
            ApprovalState::Pending
        );
    }

    #[test]
    fn test_cash_base_bad_destination_rolls_back_source() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::CashBase {
                    amount: Money::from_major(500_000),
                    destination_box_id: f.route_box_id,
                    reason: "base".to_string(),
                },
            )
            .unwrap();
        // destination deactivated between filing and review
        f.store.state_mut().cash_boxes.get_mut(&f.route_box_id).unwrap().active = false;

        let err = workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(
            f.store.state().cash_box(f.principal_box_id).unwrap().balance,
            Money::from_major(5_000_000)
        );
        assert!(f.store.state().transactions.is_empty());
    }

    #[test]
    fn test_reject_new_loan_soft_deletes_draft() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let (request_id, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(800_000, 8))
            .unwrap();
        workflow
            .reject(
                &mut f.store,
                &mut recording.ports(),
                &mut events,
                request_id,
                f.reviewer,
                "income unverified".to_string(),
            )
            .unwrap();

        let loan = f.store.state().loan(loan_id).unwrap();
        assert!(loan.is_deleted());
        assert_eq!(loan.approval_state, ApprovalState::Rejected);
        // requester heard about it with the reason
        assert!(recording
            .notifier
            .calls
            .iter()
            .any(|c| c.body.contains("income unverified")));
    }

    #[test]
    fn test_new_client_approval_creates_client() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();
        let clients_before = f.store.state().clients.len();

        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::NewClient {
                    name: "Luis Prada".to_string(),
                    document: "CC-445566".to_string(),
                    phone: "312".to_string(),
                    address: "Cll 45".to_string(),
                    route_id: Some(f.route_id),
                },
            )
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        assert_eq!(f.store.state().clients.len(), clients_before + 1);
    }

    #[test]
    fn test_extension_reschedules_installment() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let (loan_request, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(500_000, 5))
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, loan_request, f.reviewer, None)
            .unwrap();
        let installment_id = f.store.state().installments_for_loan(loan_id)[0];

        let new_due = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let request_id = workflow
            .submit_request(
                &mut f.store,
                f.requester,
                RequestPayload::PaymentExtension {
                    installment_id,
                    new_due_date: new_due,
                    reason: "client travelling".to_string(),
                },
            )
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        let cuota = f.store.state().installment(installment_id).unwrap();
        assert_eq!(cuota.effective_due_date(), new_due);
        assert!(cuota.extension_id.is_some());
        assert_eq!(f.store.state().extensions.len(), 1);
    }

    #[test]
    fn test_write_off_decision() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        let (request_id, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(200_000, 4))
            .unwrap();
        workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        decide_loan(&mut f.store, &mut events, &time, loan_id, LoanDecision::WrittenOff, f.reviewer)
            .unwrap();
        assert_eq!(f.store.state().loan(loan_id).unwrap().state, LoanState::WrittenOff);

        // terminal: a second decision is refused
        let err = decide_loan(
            &mut f.store,
            &mut events,
            &time,
            loan_id,
            LoanDecision::Defaulted,
            f.reviewer,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn test_disbursement_skipped_without_route_box() {
        let mut f = fixture();
        let config = EngineConfig::default();
        let time = clock();
        let workflow = ApprovalWorkflow::new(&config, &time);
        let mut recording = RecordingPorts::new();
        let mut events = EventStore::new();

        f.store.state_mut().cash_boxes.get_mut(&f.route_box_id).unwrap().active = false;

        let (request_id, loan_id) = workflow
            .submit_loan_request(&mut f.store, f.requester, f.client_id, terms(400_000, 4))
            .unwrap();
        let outcome = workflow
            .approve(&mut f.store, &mut recording.ports(), &mut events, request_id, f.reviewer, None)
            .unwrap();

        // activation commits even though nothing was disbursed
        assert_eq!(outcome.disbursed, Some(false));
        assert_eq!(f.store.state().loan(loan_id).unwrap().state, LoanState::Active);
        assert!(f.store.state().transactions.is_empty());
    }
}
