use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ClientId, RiskLevel, RouteId, UserId};

/// a borrower on a collection route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub document: String,
    pub phone: String,
    pub address: String,
    /// active route assignment; collections and disbursements flow
    /// through this route's cash box
    pub route_id: Option<RouteId>,
    pub risk_level: RiskLevel,
    /// last-known mora sub-level ordinal (1..5), persisted so escalation
    /// detection survives process restarts
    pub risk_ordinal: u8,
    pub score: u8,
    pub blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn new(
        name: String,
        document: String,
        phone: String,
        address: String,
        route_id: Option<RouteId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            document,
            phone,
            address,
            route_id,
            risk_level: RiskLevel::Green,
            risk_ordinal: 1,
            score: 100,
            blacklisted: false,
            blacklist_reason: None,
            created_at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn blacklist(&mut self, reason: String) {
        self.blacklisted = true;
        self.blacklist_reason = Some(reason);
        self.risk_level = RiskLevel::Blacklisted;
    }

    /// store the sweep's classification
    pub fn set_risk(&mut self, level: RiskLevel, ordinal: u8) {
        self.risk_level = level;
        self.risk_ordinal = ordinal;
    }

    /// back to green once no loan remains in arrears
    pub fn reset_risk(&mut self) {
        self.risk_level = RiskLevel::Green;
        self.risk_ordinal = 1;
    }
}

/// a collection route worked by one collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub collector_id: UserId,
    pub active: bool,
}

impl Route {
    pub fn new(name: String, collector_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            collector_id,
            active: true,
        }
    }
}
