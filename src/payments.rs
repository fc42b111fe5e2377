use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::domain::{Payment, PaymentDetail, Transaction};
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::CashLedger;
use crate::ports::{EntityRef, Ports, Severity, SideEffectChannel, SideEffectOutcome, SideEffects};
use crate::store::MemoryStore;
use crate::types::{
    ClientId, Direction, InstallmentState, LoanId, PaymentMethod, PaymentSplit, Reference, UserId,
};

/// one collection brought in from the field
#[derive(Debug, Clone)]
pub struct CollectPayment {
    pub loan_id: LoanId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub collector_id: UserId,
    /// optional cross-check; must match the loan's client when supplied
    pub client_id: Option<ClientId>,
    /// business date; defaults to the clock's current date
    pub reference_date: Option<NaiveDate>,
}

/// everything one committed collection produced
#[derive(Debug)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub details: Vec<PaymentDetail>,
    pub transaction: Transaction,
    pub loan_settled: bool,
    pub side_effects: Vec<SideEffectOutcome>,
}

/// decomposes a collection into capital/interest and distributes it over
/// the loan's outstanding installments, strictly oldest-first
pub struct PaymentAllocator<'a> {
    config: &'a EngineConfig,
    time: &'a SafeTimeProvider,
}

impl<'a> PaymentAllocator<'a> {
    pub fn new(config: &'a EngineConfig, time: &'a SafeTimeProvider) -> Self {
        Self { config, time }
    }

    pub fn collect(
        &self,
        store: &mut MemoryStore,
        ports: &mut Ports<'_>,
        events: &mut EventStore,
        request: CollectPayment,
    ) -> Result<PaymentReceipt> {
        let now = self.time.now();
        let reference_date = request.reference_date.unwrap_or_else(|| now.date_naive());
        let config = self.config;

        let (payment, details, transaction, loan_settled, tx_events) =
            store.with_transaction(|state| {
                let mut tx_events = EventStore::new();

                if !request.amount.is_positive() {
                    return Err(EngineError::validation("payment amount must be positive"));
                }

                let loan = state.loan(request.loan_id)?;
                if loan.is_deleted() {
                    return Err(EngineError::not_found("loan", request.loan_id));
                }
                if !loan.is_collectible() {
                    return Err(EngineError::invalid_state(
                        format!("{:?}", loan.state),
                        "Active or InArrears",
                    ));
                }
                if let Some(client_id) = request.client_id {
                    if client_id != loan.client_id {
                        return Err(EngineError::validation(
                            "client does not match the loan's client",
                        ));
                    }
                }
                let client_id = loan.client_id;
                let rate = loan.interest_rate;
                let cash_box_id = state.active_route_box_for_client(client_id)?;

                let split = PaymentSplit::decompose(request.amount, rate);
                let number = config.payment_number(state.counters.next_payment());
                let payment = Payment::new(
                    number,
                    request.loan_id,
                    client_id,
                    request.amount,
                    split,
                    request.method,
                    request.collector_id,
                    now,
                    reference_date,
                );

                // strict FIFO walk over the allocation queue
                let mut details = Vec::new();
                let mut budget = request.amount;
                for installment_id in state.outstanding_installments(request.loan_id) {
                    if !budget.is_positive() {
                        break;
                    }
                    let cuota = state.installment_mut(installment_id)?;
                    let remaining = cuota.remaining();
                    if !remaining.is_positive() {
                        continue;
                    }
                    let applied = budget.min(remaining);
                    cuota.apply(applied, config.rounding_tolerance);
                    if cuota.state == InstallmentState::Paid {
                        tx_events.emit(Event::InstallmentSettled {
                            installment_id,
                            loan_id: request.loan_id,
                            sequence_number: cuota.sequence_number,
                            timestamp: now,
                        });
                    }
                    details.push(PaymentDetail::new(
                        payment.id,
                        installment_id,
                        applied,
                        PaymentSplit::decompose(applied, rate),
                    ));
                    budget -= applied;
                }

                let loan = state.loan_mut(request.loan_id)?;
                let loan_settled = loan.apply_payment(request.amount, split);
                if loan_settled {
                    tx_events.emit(Event::LoanSettled {
                        loan_id: request.loan_id,
                        total_paid: loan.total_paid,
                        timestamp: now,
                    });
                }

                let transaction = CashLedger::post(
                    state,
                    config,
                    &mut tx_events,
                    cash_box_id,
                    Direction::In,
                    request.amount,
                    Reference::payment(payment.id),
                    request.collector_id,
                    now,
                )?;

                tx_events.emit(Event::PaymentReceived {
                    payment_id: payment.id,
                    loan_id: request.loan_id,
                    amount: request.amount,
                    applied_to_capital: split.capital,
                    applied_to_interest: split.interest,
                    installments_touched: details.len() as u32,
                    timestamp: now,
                });

                state.payments.insert(payment.id, payment.clone());
                state.payment_details.extend(details.iter().cloned());

                Ok((payment, details, transaction, loan_settled, tx_events))
            })?;

        let mut tx_events = tx_events;
        for event in tx_events.take_events() {
            events.emit(event);
        }

        // side channels run after the financial commit and never undo it
        let mut effects = SideEffects::new();
        effects.run(
            SideEffectChannel::Audit,
            format!("payment {}", payment.number),
            ports.audit.record(
                request.collector_id,
                "PAYMENT_COLLECTED",
                "payment",
                payment.id,
                None,
                serde_json::to_value(&payment).ok(),
            ),
        );
        effects.run(
            SideEffectChannel::UserNotification,
            format!("receipt {}", payment.number),
            ports.notifications.notify_user(
                request.collector_id,
                "Payment recorded",
                &format!("{} for {} received", payment.number, payment.total_amount),
                Severity::Info,
                Some(EntityRef { entity_type: "payment", entity_id: payment.id }),
                serde_json::json!({ "loan_id": payment.loan_id }),
            ),
        );

        Ok(PaymentReceipt {
            payment,
            details,
            transaction,
            loan_settled,
            side_effects: effects.into_outcomes(),
        })
    }
}
