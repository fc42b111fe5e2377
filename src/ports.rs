use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::types::UserId;

/// failure inside a collaborator channel; never fatal to the core
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PortError(pub String);

/// notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// entity the notification is about
#[derive(Debug, Clone)]
pub struct EntityRef {
    pub entity_type: &'static str,
    pub entity_id: Uuid,
}

/// push delivery target
#[derive(Debug, Clone)]
pub enum PushTarget {
    User(UserId),
    Roles(Vec<String>),
}

/// internal alerting to users and roles
pub trait NotificationPort {
    fn notify_user(
        &mut self,
        user_id: UserId,
        title: &str,
        message: &str,
        severity: Severity,
        entity: Option<EntityRef>,
        metadata: Value,
    ) -> std::result::Result<(), PortError>;

    fn notify_role(
        &mut self,
        roles: &[String],
        title: &str,
        message: &str,
        severity: Severity,
        entity: Option<EntityRef>,
        metadata: Value,
    ) -> std::result::Result<(), PortError>;
}

/// mobile push delivery
pub trait PushPort {
    fn send_push(
        &mut self,
        title: &str,
        body: &str,
        target: PushTarget,
        data: Value,
    ) -> std::result::Result<(), PortError>;
}

/// audit trail, recorded after the financial commit
pub trait AuditPort {
    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        actor: UserId,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        before: Option<Value>,
        after: Option<Value>,
    ) -> std::result::Result<(), PortError>;
}

/// fire-and-forget fan-out to live dashboards
pub trait BroadcastPort {
    fn signal(&mut self, topic: &str, payload: Value) -> std::result::Result<(), PortError>;
}

/// the collaborator bundle handed to every engine operation
pub struct Ports<'a> {
    pub notifications: &'a mut dyn NotificationPort,
    pub push: &'a mut dyn PushPort,
    pub audit: &'a mut dyn AuditPort,
    pub broadcast: &'a mut dyn BroadcastPort,
}

/// which side channel an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectChannel {
    UserNotification,
    RoleNotification,
    Push,
    Audit,
    Broadcast,
}

/// typed record of one best-effort delivery, so callers can assert on
/// degraded-but-successful outcomes instead of silence
#[derive(Debug, Clone)]
pub struct SideEffectOutcome {
    pub channel: SideEffectChannel,
    pub detail: String,
    pub failure: Option<String>,
}

impl SideEffectOutcome {
    pub fn delivered(&self) -> bool {
        self.failure.is_none()
    }
}

/// collects side-effect outcomes; failures are logged and swallowed
#[derive(Debug, Default)]
pub struct SideEffects {
    outcomes: Vec<SideEffectOutcome>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(
        &mut self,
        channel: SideEffectChannel,
        detail: impl Into<String>,
        result: std::result::Result<(), PortError>,
    ) {
        let detail = detail.into();
        let failure = match result {
            Ok(()) => None,
            Err(err) => {
                warn!(channel = ?channel, detail = %detail, error = %err, "side effect failed");
                Some(err.to_string())
            }
        };
        self.outcomes.push(SideEffectOutcome { channel, detail, failure });
    }

    pub fn into_outcomes(self) -> Vec<SideEffectOutcome> {
        self.outcomes
    }

    pub fn outcomes(&self) -> &[SideEffectOutcome] {
        &self.outcomes
    }
}

// --- test and operator implementations -----------------------------------

/// recorded call on the recording ports
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub channel: SideEffectChannel,
    pub title: String,
    pub body: String,
}

/// notifier double that records calls and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub calls: Vec<RecordedCall>,
    pub fail: bool,
}

impl NotificationPort for RecordingNotifier {
    fn notify_user(
        &mut self,
        _user_id: UserId,
        title: &str,
        message: &str,
        _severity: Severity,
        _entity: Option<EntityRef>,
        _metadata: Value,
    ) -> std::result::Result<(), PortError> {
        if self.fail {
            return Err(PortError("notifier offline".to_string()));
        }
        self.calls.push(RecordedCall {
            channel: SideEffectChannel::UserNotification,
            title: title.to_string(),
            body: message.to_string(),
        });
        Ok(())
    }

    fn notify_role(
        &mut self,
        _roles: &[String],
        title: &str,
        message: &str,
        _severity: Severity,
        _entity: Option<EntityRef>,
        _metadata: Value,
    ) -> std::result::Result<(), PortError> {
        if self.fail {
            return Err(PortError("notifier offline".to_string()));
        }
        self.calls.push(RecordedCall {
            channel: SideEffectChannel::RoleNotification,
            title: title.to_string(),
            body: message.to_string(),
        });
        Ok(())
    }
}

/// push double
#[derive(Debug, Default)]
pub struct RecordingPush {
    pub calls: Vec<RecordedCall>,
    pub fail: bool,
}

impl PushPort for RecordingPush {
    fn send_push(
        &mut self,
        title: &str,
        body: &str,
        _target: PushTarget,
        _data: Value,
    ) -> std::result::Result<(), PortError> {
        if self.fail {
            return Err(PortError("push gateway offline".to_string()));
        }
        self.calls.push(RecordedCall {
            channel: SideEffectChannel::Push,
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// audit double
#[derive(Debug, Default)]
pub struct RecordingAudit {
    pub calls: Vec<RecordedCall>,
    pub fail: bool,
}

impl AuditPort for RecordingAudit {
    fn record(
        &mut self,
        _actor: UserId,
        action: &str,
        entity_type: &str,
        _entity_id: Uuid,
        _before: Option<Value>,
        _after: Option<Value>,
    ) -> std::result::Result<(), PortError> {
        if self.fail {
            return Err(PortError("audit log offline".to_string()));
        }
        self.calls.push(RecordedCall {
            channel: SideEffectChannel::Audit,
            title: action.to_string(),
            body: entity_type.to_string(),
        });
        Ok(())
    }
}

/// broadcast double
#[derive(Debug, Default)]
pub struct RecordingBroadcast {
    pub calls: Vec<RecordedCall>,
    pub fail: bool,
}

impl BroadcastPort for RecordingBroadcast {
    fn signal(&mut self, topic: &str, payload: Value) -> std::result::Result<(), PortError> {
        if self.fail {
            return Err(PortError("broadcast bus offline".to_string()));
        }
        self.calls.push(RecordedCall {
            channel: SideEffectChannel::Broadcast,
            title: topic.to_string(),
            body: payload.to_string(),
        });
        Ok(())
    }
}

/// one bundle of recording doubles for tests and the operator binary
#[derive(Debug, Default)]
pub struct RecordingPorts {
    pub notifier: RecordingNotifier,
    pub push: RecordingPush,
    pub audit: RecordingAudit,
    pub broadcast: RecordingBroadcast,
}

impl RecordingPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&mut self) -> Ports<'_> {
        Ports {
            notifications: &mut self.notifier,
            push: &mut self.push,
            audit: &mut self.audit,
            broadcast: &mut self.broadcast,
        }
    }

    /// total calls recorded across every channel
    pub fn total_calls(&self) -> usize {
        self.notifier.calls.len()
            + self.push.calls.len()
            + self.audit.calls.len()
            + self.broadcast.calls.len()
    }
}
