// ── Call request domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::config::Configuration;

/// Kind of assistance a patient can request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CallType {
    Emergency,
    Nurse,
    General,
    Maintenance,
    Housekeeping,
}

impl CallType {
    /// Fixed priority for this call type.
    pub fn priority(self) -> Priority {
        match self {
            Self::Emergency => Priority::Critical,
            Self::Nurse => Priority::Urgent,
            Self::General => Priority::Normal,
            Self::Maintenance | Self::Housekeeping => Priority::Low,
        }
    }

    /// Wire name, e.g. `"nurse"`.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Localisation key for the host's string table.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::Emergency => "rauland_call_emergency",
            Self::Nurse => "rauland_call_nurse",
            Self::General => "rauland_call_general",
            Self::Maintenance => "rauland_call_maintenance",
            Self::Housekeeping => "rauland_call_housekeeping",
        }
    }
}

/// Call and event priority. The numeric level is what goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum Priority {
    Low,
    Normal,
    Urgent,
    Critical,
}

impl Priority {
    pub fn level(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::Urgent => 3,
            Self::Critical => 4,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Low),
            2 => Some(Self::Normal),
            3 => Some(Self::Urgent),
            4 => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn message_key(self) -> &'static str {
        match self {
            Self::Low => "priority_low",
            Self::Normal => "priority_normal",
            Self::Urgent => "priority_urgent",
            Self::Critical => "priority_critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// A single request for assistance, as persisted and sent to the backend.
///
/// `call_type` and `priority` keep their wire representation so that
/// entries written by another build (with call types this one does not
/// know) still load; use [`kind`](Self::kind) to get the typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(rename = "facilityID")]
    pub facility_id: String,
    #[serde(rename = "roomNumber", default)]
    pub room_number: Option<String>,
    #[serde(rename = "callType")]
    pub call_type: String,
    pub priority: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "patientID", default)]
    pub patient_id: Option<String>,
    #[serde(rename = "staffID", default)]
    pub staff_id: Option<String>,
}

impl CallRequest {
    /// Build a request stamped with the current time.
    pub fn new(config: &Configuration, call_type: CallType, message: Option<String>) -> Self {
        Self {
            device_id: config.device_id.clone(),
            facility_id: config.facility_id.clone(),
            room_number: config.room_number.clone(),
            call_type: call_type.as_str().to_owned(),
            priority: call_type.priority().level(),
            message,
            timestamp: Utc::now(),
            patient_id: None,
            staff_id: None,
        }
    }

    /// The typed call type, or `None` if this build does not know it.
    pub fn kind(&self) -> Option<CallType> {
        self.call_type.parse().ok()
    }

    pub fn priority_level(&self) -> Option<Priority> {
        Priority::from_level(self.priority)
    }
}
