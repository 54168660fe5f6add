use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a scan.
///
/// Transitions are monotonic along `pending -> analyzing -> analyzed`;
/// `error` is reachable from any non-terminal state. Status writes in SQL
/// are guarded so a terminal row is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Analyzing,
    Analyzed,
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Analyzing => "analyzing",
            ScanStatus::Analyzed => "analyzed",
            ScanStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Analyzed | ScanStatus::Error)
    }

    /// Human-readable action label used by the dashboard activity feed.
    pub fn activity_label(&self) -> &'static str {
        match self {
            ScanStatus::Analyzed => "Analyzed",
            ScanStatus::Analyzing => "Analyzing",
            _ => "Uploaded",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "analyzing" => Ok(ScanStatus::Analyzing),
            "analyzed" => Ok(ScanStatus::Analyzed),
            "error" => Ok(ScanStatus::Error),
            other => Err(format!("unknown scan status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
    pub timing: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub medications: Vec<Medication>,
    pub lifestyle: Vec<String>,
    pub follow_up: String,
    pub warnings: Vec<String>,
}

/// One uploaded medical image and its analysis outcome.
///
/// Result fields (diagnosis through prescription) are populated only once
/// the status reaches `analyzed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub scan_type: String,
    pub file_name: String,
    pub file_size: i64,
    pub upload_date: String,
    pub status: ScanStatus,
    pub diagnosis: Option<String>,
    pub confidence: Option<f64>,
    pub severity: Option<String>,
    pub findings: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
    pub prescription: Option<Prescription>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub medical_history: Option<Vec<String>>,
    pub allergies: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub emergency_contact: Option<EmergencyContact>,
    pub created_at: String,
    pub updated_at: String,
}

/// Authenticated identity attached to requests by the auth middleware.
/// `name` is the profile display name, falling back to the email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user_id: Uuid,
    pub needs_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfirmationRequest {
    pub email: String,
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub medical_history: Option<Vec<String>>,
    pub allergies: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub emergency_contact: Option<EmergencyContact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanResponse {
    pub id: Uuid,
    pub status: ScanStatus,
    pub upload_date: String,
}

/// Events published by a running analysis and streamed over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Started {
        scan_id: Uuid,
        scan_type: String,
    },
    Progress {
        percent: u8,
    },
    Completed {
        diagnosis: String,
        severity: String,
        confidence: f64,
    },
    Cancelled,
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub date: String,
    pub action: String,
    pub scan_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total_scans: i64,
    pub analyzed_scans: i64,
    pub pending_scans: i64,
    pub average_confidence: f64,
    pub last_scan_date: Option<String>,
    pub scans_by_type: BTreeMap<String, i64>,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Scan as it appears in the account export: binary URL fields stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportScan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub scan_type: String,
    pub file_name: String,
    pub file_size: i64,
    pub upload_date: String,
    pub status: ScanStatus,
    pub diagnosis: Option<String>,
    pub confidence: Option<f64>,
    pub severity: Option<String>,
    pub findings: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
    pub prescription: Option<Prescription>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Scan> for ExportScan {
    fn from(s: Scan) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            name: s.name,
            scan_type: s.scan_type,
            file_name: s.file_name,
            file_size: s.file_size,
            upload_date: s.upload_date,
            status: s.status,
            diagnosis: s.diagnosis,
            confidence: s.confidence,
            severity: s.severity,
            findings: s.findings,
            recommendations: s.recommendations,
            prescription: s.prescription,
            metadata: s.metadata,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub user: UserProfile,
    pub scans: Vec<ExportScan>,
}
