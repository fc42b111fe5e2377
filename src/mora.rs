use std::collections::BTreeSet;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::ports::{
    EntityRef, Ports, PushTarget, Severity, SideEffectChannel, SideEffectOutcome, SideEffects,
};
use crate::store::MemoryStore;
use crate::types::{ClientId, InstallmentState, LoanId, LoanState, RiskLabel, RiskLevel, UserId};

/// one recorded failure inside the sweep; never aborts the other steps
#[derive(Debug, Clone)]
pub struct SweepError {
    pub step: &'static str,
    pub entity_id: Option<Uuid>,
    pub message: String,
}

/// what one sweep changed, per step
#[derive(Debug, Default)]
pub struct SweepReport {
    pub overdue_marked: u32,
    pub loans_into_arrears: u32,
    pub loans_recovered: u32,
    pub clients_classified: u32,
    pub escalations: u32,
    pub clients_reset: u32,
    pub errors: Vec<SweepError>,
    pub side_effects: Vec<SideEffectOutcome>,
}

impl SweepReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// step-level failures; per-entity errors are reported, not fatal
    pub fn has_unrecoverable_errors(&self) -> bool {
        self.errors.iter().any(|e| e.entity_id.is_none())
    }

    /// true when the second of two back-to-back sweeps touched nothing
    pub fn is_quiet(&self) -> bool {
        self.overdue_marked == 0
            && self.loans_into_arrears == 0
            && self.loans_recovered == 0
            && self.escalations == 0
            && self.clients_reset == 0
    }
}

/// the mora engine: ages installments, reclassifies loans and clients,
/// escalates risk and pings the dashboards. Idempotent; run on demand
/// and at process start.
pub struct DelinquencyProcessor<'a> {
    config: &'a EngineConfig,
    time: &'a SafeTimeProvider,
}

impl<'a> DelinquencyProcessor<'a> {
    pub fn new(config: &'a EngineConfig, time: &'a SafeTimeProvider) -> Self {
        Self { config, time }
    }

    pub fn run_sweep(
        &self,
        store: &mut MemoryStore,
        ports: &mut Ports<'_>,
        events: &mut EventStore,
    ) -> SweepReport {
        let today = self.time.now().date_naive();
        let mut report = SweepReport::default();

        self.age_installments(store, events, today, &mut report);
        self.loans_into_arrears(store, events, &mut report);
        self.loans_back_to_active(store, events, &mut report);
        self.classify_clients(store, ports, events, today, &mut report);
        self.reset_cleared_clients(store, events, &mut report);
        self.broadcast(ports, today, &mut report);

        info!(
            overdue = report.overdue_marked,
            into_arrears = report.loans_into_arrears,
            recovered = report.loans_recovered,
            escalations = report.escalations,
            errors = report.errors.len(),
            "mora sweep finished"
        );
        report
    }

    /// step 1: past-due pending/partial installments of collectible
    /// loans turn overdue
    fn age_installments(
        &self,
        store: &mut MemoryStore,
        events: &mut EventStore,
        today: NaiveDate,
        report: &mut SweepReport,
    ) {
        let result: Result<(u32, EventStore)> = store.with_transaction(|state| {
            let mut tx_events = EventStore::new();
            let collectible: BTreeSet<LoanId> = state
                .loans
                .values()
                .filter(|l| !l.is_deleted() && l.is_collectible())
                .map(|l| l.id)
                .collect();

            let mut count = 0;
            for cuota in state.installments.values_mut() {
                let ageable = matches!(
                    cuota.state,
                    InstallmentState::Pending | InstallmentState::Partial
                );
                if ageable
                    && collectible.contains(&cuota.loan_id)
                    && cuota.effective_due_date() < today
                {
                    cuota.mark_overdue();
                    tx_events.emit(Event::InstallmentOverdue {
                        installment_id: cuota.id,
                        loan_id: cuota.loan_id,
                        due_date: cuota.effective_due_date(),
                    });
                    count += 1;
                }
            }
            Ok((count, tx_events))
        });

        match result {
            Ok((count, mut tx_events)) => {
                report.overdue_marked = count;
                for event in tx_events.take_events() {
                    events.emit(event);
                }
            }
            Err(err) => {
                warn!(error = %err, "aging step failed");
                report.errors.push(SweepError {
                    step: "age_installments",
                    entity_id: None,
                    message: err.to_string(),
                });
            }
        }
    }

    /// step 2: active loans with an overdue installment fall into arrears
    fn loans_into_arrears(
        &self,
        store: &mut MemoryStore,
        events: &mut EventStore,
        report: &mut SweepReport,
    ) {
        let now = self.time.now();
        let result: Result<(u32, EventStore)> = store.with_transaction(|state| {
            let mut tx_events = EventStore::new();
            let overdue_loans: BTreeSet<LoanId> = state
                .installments
                .values()
                .filter(|i| i.state == InstallmentState::Overdue)
                .map(|i| i.loan_id)
                .collect();

            let mut count = 0;
            for loan in state.loans.values_mut() {
                if !loan.is_deleted()
                    && loan.state == LoanState::Active
                    && overdue_loans.contains(&loan.id)
                {
                    loan.state = LoanState::InArrears;
                    tx_events.emit(Event::LoanStateChanged {
                        loan_id: loan.id,
                        old_state: LoanState::Active,
                        new_state: LoanState::InArrears,
                        timestamp: now,
                    });
                    count += 1;
                }
            }
            Ok((count, tx_events))
        });

        match result {
            Ok((count, mut tx_events)) => {
                report.loans_into_arrears = count;
                for event in tx_events.take_events() {
                    events.emit(event);
                }
            }
            Err(err) => report.errors.push(SweepError {
                step: "loans_into_arrears",
                entity_id: None,
                message: err.to_string(),
            }),
        }
    }

    /// step 3: arrears loans with nothing overdue left and a balance
    /// still open recover to active
    fn loans_back_to_active(
        &self,
        store: &mut MemoryStore,
        events: &mut EventStore,
        report: &mut SweepReport,
    ) {
        let now = self.time.now();
        let result: Result<(u32, EventStore)> = store.with_transaction(|state| {
            let mut tx_events = EventStore::new();
            let overdue_loans: BTreeSet<LoanId> = state
                .installments
                .values()
                .filter(|i| i.state == InstallmentState::Overdue)
                .map(|i| i.loan_id)
                .collect();

            let mut count = 0;
            for loan in state.loans.values_mut() {
                if !loan.is_deleted()
                    && loan.state == LoanState::InArrears
                    && !overdue_loans.contains(&loan.id)
                    && loan.outstanding_balance.is_positive()
                {
                    loan.state = LoanState::Active;
                    tx_events.emit(Event::LoanStateChanged {
                        loan_id: loan.id,
                        old_state: LoanState::InArrears,
                        new_state: LoanState::Active,
                        timestamp: now,
                    });
                    count += 1;
                }
            }
            Ok((count, tx_events))
        });

        match result {
            Ok((count, mut tx_events)) => {
                report.loans_recovered = count;
                for event in tx_events.take_events() {
                    events.emit(event);
                }
            }
            Err(err) => report.errors.push(SweepError {
                step: "loans_back_to_active",
                entity_id: None,
                message: err.to_string(),
            }),
        }
    }

    /// step 4: classify every non-blacklisted client with an open loan;
    /// a sub-label upgrade fires the escalation set
    fn classify_clients(
        &self,
        store: &mut MemoryStore,
        ports: &mut Ports<'_>,
        events: &mut EventStore,
        today: NaiveDate,
        report: &mut SweepReport,
    ) {
        let now = self.time.now();

        // read-only pass: days late and collector per client
        let mut classifications: Vec<(ClientId, i64, u8, Option<UserId>)> = Vec::new();
        {
            let state = store.state();
            for client in state.clients.values() {
                if client.blacklisted || client.is_deleted() {
                    continue;
                }
                let open_loans = state.open_loans_for_client(client.id);
                if open_loans.is_empty() {
                    continue;
                }
                let days_late = open_loans
                    .iter()
                    .filter_map(|loan_id| {
                        state
                            .installments
                            .values()
                            .filter(|i| {
                                i.loan_id == *loan_id && i.state == InstallmentState::Overdue
                            })
                            .map(|i| i.effective_due_date())
                            .min()
                            .map(|earliest| (today - earliest).num_days())
                    })
                    .max()
                    .unwrap_or(0);
                let collector = state
                    .active_route_for_client(client.id)
                    .map(|r| r.collector_id)
                    .ok();
                classifications.push((client.id, days_late, client.risk_ordinal, collector));
            }
        }

        for (client_id, days_late, previous_ordinal, collector) in classifications {
            let label = RiskLabel::from_days_late(days_late);
            let result: Result<()> = store.with_transaction(|state| {
                let client = state.client_mut(client_id)?;
                if client.risk_level != label.storage_level()
                    || client.risk_ordinal != label.ordinal()
                {
                    client.set_risk(label.storage_level(), label.ordinal());
                }
                Ok(())
            });
            if let Err(err) = result {
                report.errors.push(SweepError {
                    step: "classify_clients",
                    entity_id: Some(client_id),
                    message: err.to_string(),
                });
                continue;
            }
            report.clients_classified += 1;

            if label.ordinal() > previous_ordinal {
                report.escalations += 1;
                events.emit(Event::RiskEscalated {
                    client_id,
                    days_late,
                    label,
                    previous_ordinal,
                    timestamp: now,
                });
                self.send_escalation(ports, report, client_id, days_late, label, collector);
            }
        }
    }

    /// the escalation set: supervisors, the route collector, and a push
    /// for each; all best-effort
    fn send_escalation(
        &self,
        ports: &mut Ports<'_>,
        report: &mut SweepReport,
        client_id: ClientId,
        days_late: i64,
        label: RiskLabel,
        collector: Option<UserId>,
    ) {
        let title = format!("Mora: {}", label.as_str());
        let body = format!("client is {} day(s) late", days_late);
        let entity = EntityRef { entity_type: "client", entity_id: client_id };
        let data = serde_json::json!({ "client_id": client_id, "days_late": days_late });

        let mut effects = SideEffects::new();
        effects.run(
            SideEffectChannel::RoleNotification,
            format!("escalation {client_id}"),
            ports.notifications.notify_role(
                &self.config.supervisory_roles,
                &title,
                &body,
                Severity::Warning,
                Some(entity.clone()),
                data.clone(),
            ),
        );
        effects.run(
            SideEffectChannel::Push,
            format!("escalation push roles {client_id}"),
            ports.push.send_push(
                &title,
                &body,
                PushTarget::Roles(self.config.supervisory_roles.clone()),
                data.clone(),
            ),
        );
        match collector {
            Some(collector_id) => {
                effects.run(
                    SideEffectChannel::UserNotification,
                    format!("escalation collector {client_id}"),
                    ports.notifications.notify_user(
                        collector_id,
                        &title,
                        &body,
                        Severity::Warning,
                        Some(entity),
                        data.clone(),
                    ),
                );
                effects.run(
                    SideEffectChannel::Push,
                    format!("escalation push collector {client_id}"),
                    ports.push.send_push(&title, &body, PushTarget::User(collector_id), data),
                );
            }
            None => report.errors.push(SweepError {
                step: "classify_clients",
                entity_id: Some(client_id),
                message: "no active route collector for escalation".to_string(),
            }),
        }
        report.side_effects.extend(effects.into_outcomes());
    }

    /// step 5: clients with no loan left in arrears go back to green
    fn reset_cleared_clients(
        &self,
        store: &mut MemoryStore,
        events: &mut EventStore,
        report: &mut SweepReport,
    ) {
        let now = self.time.now();
        let result: Result<(u32, EventStore)> = store.with_transaction(|state| {
            let mut tx_events = EventStore::new();
            let arrears_clients: BTreeSet<ClientId> = state
                .loans
                .values()
                .filter(|l| !l.is_deleted() && l.state == LoanState::InArrears)
                .map(|l| l.client_id)
                .collect();

            let mut count = 0;
            for client in state.clients.values_mut() {
                if client.blacklisted || client.is_deleted() {
                    continue;
                }
                if !arrears_clients.contains(&client.id)
                    && (client.risk_ordinal != 1 || client.risk_level != RiskLevel::Green)
                {
                    client.reset_risk();
                    tx_events.emit(Event::RiskCleared { client_id: client.id, timestamp: now });
                    count += 1;
                }
            }
            Ok((count, tx_events))
        });

        match result {
            Ok((count, mut tx_events)) => {
                report.clients_reset = count;
                for event in tx_events.take_events() {
                    events.emit(event);
                }
            }
            Err(err) => report.errors.push(SweepError {
                step: "reset_cleared_clients",
                entity_id: None,
                message: err.to_string(),
            }),
        }
    }

    /// step 6: ping the dashboards, fire-and-forget
    fn broadcast(&self, ports: &mut Ports<'_>, today: NaiveDate, report: &mut SweepReport) {
        let mut effects = SideEffects::new();
        effects.run(
            SideEffectChannel::Broadcast,
            "mora sweep signal",
            ports.broadcast.signal(
                "mora.sweep",
                serde_json::json!({
                    "date": today,
                    "overdue_marked": report.overdue_marked,
                    "loans_into_arrears": report.loans_into_arrears,
                    "escalations": report.escalations,
                }),
            ),
        );
        report.side_effects.extend(effects.into_outcomes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::domain::{CashBox, Client, Loan, Route};
    use crate::ports::RecordingPorts;
    use crate::schedule::{build_schedule, ScheduleParams};
    use crate::types::{AmortizationType, PaymentFrequency, RiskLevel};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;

    fn clock(y: i32, m: u32, d: u32) -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap(),
        ))
    }

    /// daily loan starting 2026-01-01: installment 1 due jan 2, etc.
    fn fixture() -> (MemoryStore, ClientId, LoanId) {
        let mut store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let collector = Uuid::new_v4();

        let route = Route::new("ruta sur".to_string(), collector);
        let route_id = route.id;
        let client = Client::new(
            "Pedro Ruiz".to_string(),
            "CC-555".to_string(),
            "301".to_string(),
            "Cra 7".to_string(),
            Some(route_id),
            now,
        );
        let client_id = client.id;
        let caja = CashBox::route("caja sur".to_string(), collector, route_id, now);

        let mut loan = Loan::draft(
            client_id,
            Money::from_major(300_000),
            Rate::from_percentage(10),
            30,
            PaymentFrequency::Daily,
            AmortizationType::Simple,
            chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            now,
        );
        let loan_id = loan.id;
        let schedule = build_schedule(
            loan_id,
            &ScheduleParams {
                principal: loan.amount,
                rate: loan.interest_rate,
                installments: 30,
                frequency: PaymentFrequency::Daily,
                amortization: AmortizationType::Simple,
                start_date: loan.start_date,
            },
        )
        .unwrap();
        loan.set_schedule_totals(schedule.total_interest);
        loan.activate();

        let state = store.state_mut();
        state.routes.insert(route_id, route);
        state.clients.insert(client_id, client);
        state.cash_boxes.insert(caja.id, caja);
        state.loans.insert(loan_id, loan);
        for cuota in schedule.installments {
            state.installments.insert(cuota.id, cuota);
        }

        (store, client_id, loan_id)
    }

    fn sweep_on(
        store: &mut MemoryStore,
        recording: &mut RecordingPorts,
        y: i32,
        m: u32,
        d: u32,
    ) -> SweepReport {
        let config = EngineConfig::default();
        let time = clock(y, m, d);
        let processor = DelinquencyProcessor::new(&config, &time);
        let mut events = EventStore::new();
        processor.run_sweep(store, &mut recording.ports(), &mut events)
    }

    #[test]
    fn test_overdue_marking_and_arrears() {
        let (mut store, _, loan_id) = fixture();
        let mut recording = RecordingPorts::new();

        // jan 4: installments due jan 2 and jan 3 are late
        let report = sweep_on(&mut store, &mut recording, 2026, 1, 4);
        assert_eq!(report.overdue_marked, 2);
        assert_eq!(report.loans_into_arrears, 1);
        assert_eq!(store.state().loan(loan_id).unwrap().state, LoanState::InArrears);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (mut store, _, _) = fixture();
        let mut recording = RecordingPorts::new();

        let first = sweep_on(&mut store, &mut recording, 2026, 1, 4);
        assert!(!first.is_quiet());
        let notifications = recording.notifier.calls.len();
        let pushes = recording.push.calls.len();

        let second = sweep_on(&mut store, &mut recording, 2026, 1, 4);
        assert!(second.is_quiet());
        assert_eq!(second.escalations, 0);
        // only the broadcast ping repeats; no new notifications or pushes
        assert_eq!(recording.notifier.calls.len(), notifications);
        assert_eq!(recording.push.calls.len(), pushes);
    }

    #[test]
    fn test_escalation_boundaries() {
        let (mut store, client_id, _) = fixture();
        let mut recording = RecordingPorts::new();

        // jan 4: earliest overdue due jan 2 -> 2 days late -> Light/GREEN
        let report = sweep_on(&mut store, &mut recording, 2026, 1, 4);
        assert_eq!(report.escalations, 1); // Minimum -> Light crosses into mora
        let client = store.state().client(client_id).unwrap();
        assert_eq!(client.risk_level, RiskLevel::Green);
        assert_eq!(client.risk_ordinal, RiskLabel::Light.ordinal());

        // jan 5: 3 days late -> Caution/YELLOW, exactly one more set
        let notifications_before = recording.notifier.calls.len();
        let pushes_before = recording.push.calls.len();
        let report = sweep_on(&mut store, &mut recording, 2026, 1, 5);
        assert_eq!(report.escalations, 1);
        let client = store.state().client(client_id).unwrap();
        assert_eq!(client.risk_level, RiskLevel::Yellow);
        assert_eq!(client.risk_ordinal, RiskLabel::Caution.ordinal());
        assert_eq!(recording.notifier.calls.len(), notifications_before + 2);
        assert_eq!(recording.push.calls.len(), pushes_before + 2);

        // jan 10: 8 days late -> Critical/RED
        let report = sweep_on(&mut store, &mut recording, 2026, 1, 10);
        assert_eq!(report.escalations, 1);
        let client = store.state().client(client_id).unwrap();
        assert_eq!(client.risk_level, RiskLevel::Red);
        assert_eq!(client.risk_ordinal, RiskLabel::Critical.ordinal());
    }

    #[test]
    fn test_same_label_does_not_renotify() {
        let (mut store, _, _) = fixture();
        let mut recording = RecordingPorts::new();

        sweep_on(&mut store, &mut recording, 2026, 1, 5); // Caution
        let count = recording.notifier.calls.len();
        let report = sweep_on(&mut store, &mut recording, 2026, 1, 6); // Caution again (4 days)
        assert_eq!(report.escalations, 0);
        assert_eq!(recording.notifier.calls.len(), count);
    }

    #[test]
    fn test_recovery_resets_to_green() {
        let (mut store, client_id, loan_id) = fixture();
        let mut recording = RecordingPorts::new();

        sweep_on(&mut store, &mut recording, 2026, 1, 5);
        assert_eq!(store.state().loan(loan_id).unwrap().state, LoanState::InArrears);

        // field pays the overdue installments off directly
        let overdue: Vec<_> = store
            .state()
            .installments_for_loan(loan_id)
            .into_iter()
            .filter(|id| {
                store.state().installment(*id).unwrap().state == InstallmentState::Overdue
            })
            .collect();
        for id in overdue {
            let tolerance = Money::from_minor(1);
            let state = store.state_mut();
            let cuota = state.installments.get_mut(&id).unwrap();
            let remaining = cuota.remaining();
            cuota.apply(remaining, tolerance);
        }

        let report = sweep_on(&mut store, &mut recording, 2026, 1, 5);
        assert_eq!(report.loans_recovered, 1);
        assert_eq!(store.state().loan(loan_id).unwrap().state, LoanState::Active);
        let client = store.state().client(client_id).unwrap();
        assert_eq!(client.risk_level, RiskLevel::Green);
        assert_eq!(client.risk_ordinal, 1);
    }

    #[test]
    fn test_blacklisted_clients_are_skipped() {
        let (mut store, client_id, _) = fixture();
        store
            .state_mut()
            .clients
            .get_mut(&client_id)
            .unwrap()
            .blacklist("fraud".to_string());
        let mut recording = RecordingPorts::new();

        let report = sweep_on(&mut store, &mut recording, 2026, 1, 10);
        assert_eq!(report.escalations, 0);
        assert_eq!(
            store.state().client(client_id).unwrap().risk_level,
            RiskLevel::Blacklisted
        );
    }

    #[test]
    fn test_broadcast_failure_is_degraded_not_fatal() {
        let (mut store, _, _) = fixture();
        let mut recording = RecordingPorts::new();
        recording.broadcast.fail = true;

        let report = sweep_on(&mut store, &mut recording, 2026, 1, 4);
        assert!(report
            .side_effects
            .iter()
            .any(|o| o.channel == SideEffectChannel::Broadcast && !o.delivered()));
        // the sweep itself still did its work
        assert_eq!(report.overdue_marked, 2);
    }
}
