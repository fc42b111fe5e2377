//! operator entry point: run the delinquency sweep over a JSON store
//! snapshot and persist the result. Exit code 0 on a clean sweep, 1 when
//! any step recorded an unrecoverable error.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use loan_engine::ports::{
    AuditPort, BroadcastPort, EntityRef, NotificationPort, PortError, Ports, PushPort, PushTarget,
    Severity,
};
use loan_engine::{
    DelinquencyProcessor, EngineConfig, EventStore, MemoryStore, SafeTimeProvider, TimeSource,
};

#[derive(Parser, Debug)]
#[command(name = "mora-sweep", version, about = "Run the delinquency sweep now")]
struct Cli {
    /// JSON store snapshot to sweep and persist back
    #[arg(short = 's', long = "store")]
    store: PathBuf,

    /// business date to sweep against (defaults to today)
    #[arg(long = "date")]
    date: Option<NaiveDate>,

    /// report without writing the store back
    #[arg(long = "dry-run")]
    dry_run: bool,
}

/// sends become log lines; delivery belongs to the host services
struct LogPorts;

impl NotificationPort for LogPorts {
    fn notify_user(
        &mut self,
        user_id: Uuid,
        title: &str,
        message: &str,
        _severity: Severity,
        _entity: Option<EntityRef>,
        _metadata: Value,
    ) -> Result<(), PortError> {
        info!(%user_id, title, message, "user notification");
        Ok(())
    }

    fn notify_role(
        &mut self,
        roles: &[String],
        title: &str,
        message: &str,
        _severity: Severity,
        _entity: Option<EntityRef>,
        _metadata: Value,
    ) -> Result<(), PortError> {
        info!(?roles, title, message, "role notification");
        Ok(())
    }
}

impl PushPort for LogPorts {
    fn send_push(
        &mut self,
        title: &str,
        body: &str,
        target: PushTarget,
        _data: Value,
    ) -> Result<(), PortError> {
        info!(?target, title, body, "push");
        Ok(())
    }
}

impl AuditPort for LogPorts {
    fn record(
        &mut self,
        actor: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        _before: Option<Value>,
        _after: Option<Value>,
    ) -> Result<(), PortError> {
        info!(%actor, action, entity_type, %entity_id, "audit");
        Ok(())
    }
}

impl BroadcastPort for LogPorts {
    fn signal(&mut self, topic: &str, payload: Value) -> Result<(), PortError> {
        info!(topic, %payload, "broadcast");
        Ok(())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let json = match fs::read_to_string(&cli.store) {
        Ok(json) => json,
        Err(err) => {
            error!(path = %cli.store.display(), %err, "cannot read store snapshot");
            return ExitCode::FAILURE;
        }
    };
    let mut store = match MemoryStore::from_json(&json) {
        Ok(store) => store,
        Err(err) => {
            error!(path = %cli.store.display(), %err, "cannot parse store snapshot");
            return ExitCode::FAILURE;
        }
    };

    let time = match cli.date {
        Some(date) => SafeTimeProvider::new(TimeSource::Test(
            Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()),
        )),
        None => SafeTimeProvider::new(TimeSource::System),
    };

    let config = EngineConfig::default();
    let processor = DelinquencyProcessor::new(&config, &time);
    let mut notifier = LogPorts;
    let mut push = LogPorts;
    let mut audit = LogPorts;
    let mut broadcast = LogPorts;
    let mut ports = Ports {
        notifications: &mut notifier,
        push: &mut push,
        audit: &mut audit,
        broadcast: &mut broadcast,
    };
    let mut events = EventStore::new();

    let report = processor.run_sweep(&mut store, &mut ports, &mut events);

    info!(
        overdue_marked = report.overdue_marked,
        loans_into_arrears = report.loans_into_arrears,
        loans_recovered = report.loans_recovered,
        clients_classified = report.clients_classified,
        escalations = report.escalations,
        clients_reset = report.clients_reset,
        "sweep report"
    );
    for failure in &report.errors {
        error!(step = failure.step, entity = ?failure.entity_id, message = %failure.message, "sweep error");
    }

    if !cli.dry_run {
        let json = match store.to_json() {
            Ok(json) => json,
            Err(err) => {
                error!(%err, "cannot serialize store snapshot");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = fs::write(&cli.store, json) {
            error!(path = %cli.store.display(), %err, "cannot persist store snapshot");
            return ExitCode::FAILURE;
        }
    }

    if report.has_unrecoverable_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
