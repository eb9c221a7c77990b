//! Enumerated ticket attributes.
//!
//! The backend stores status, priority and category as plain text columns.
//! Known values map to dedicated variants; anything else is kept verbatim in
//! an `Unknown`/`Other` variant so a row written by a newer client still
//! round-trips and renders with the fallback style.

use serde::{Deserialize, Serialize};

// ============================================================================
// TICKET STATUS
// ============================================================================

/// Lifecycle status of a support ticket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketStatus {
    Pending,
    Open,
    InProgress,
    Resolved,
    Unknown(String),
}

impl TicketStatus {
    /// Values an administrator can pick from the status selector
    pub const OPTIONS: [TicketStatus; 4] = [
        TicketStatus::Pending,
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl From<String> for TicketStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Open" => Self::Open,
            "In Progress" => Self::InProgress,
            "Resolved" => Self::Resolved,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for TicketStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TicketStatus> for String {
    fn from(value: TicketStatus) -> Self {
        match value {
            TicketStatus::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TICKET PRIORITY
// ============================================================================

/// Rank used for tickets whose priority is missing or unrecognised
pub const UNKNOWN_PRIORITY_RANK: u8 = 99;

/// Triage priority of a support ticket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
    Unknown(String),
}

impl TicketPriority {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
            Self::Unknown(raw) => raw,
        }
    }

    /// Sort rank, most urgent first
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Unknown(_) => UNKNOWN_PRIORITY_RANK,
        }
    }
}

impl From<String> for TicketPriority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Low" => Self::Low,
            "Medium" => Self::Medium,
            "High" => Self::High,
            "Critical" => Self::Critical,
            _ => Self::Unknown(value),
        }
    }
}

impl From<&str> for TicketPriority {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TicketPriority> for String {
    fn from(value: TicketPriority) -> Self {
        match value {
            TicketPriority::Unknown(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TICKET CATEGORY
// ============================================================================

/// Category a customer files a ticket under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketCategory {
    AccountIssue,
    Payment,
    KycCompliance,
    Technical,
    GeneralInquiry,
    Other(String),
}

impl TicketCategory {
    /// Categories offered by the submission form, in display order
    pub const ALL: [TicketCategory; 5] = [
        TicketCategory::AccountIssue,
        TicketCategory::Payment,
        TicketCategory::KycCompliance,
        TicketCategory::Technical,
        TicketCategory::GeneralInquiry,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::AccountIssue => "Account Issue",
            Self::Payment => "Payment",
            Self::KycCompliance => "KYC / Compliance",
            Self::Technical => "Technical",
            Self::GeneralInquiry => "General Inquiry",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for TicketCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Account Issue" => Self::AccountIssue,
            "Payment" => Self::Payment,
            "KYC / Compliance" => Self::KycCompliance,
            "Technical" => Self::Technical,
            "General Inquiry" => Self::GeneralInquiry,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for TicketCategory {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TicketCategory> for String {
    fn from(value: TicketCategory) -> Self {
        match value {
            TicketCategory::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LIST ORDER
// ============================================================================

/// Ordering of a bulk query by creation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    Ascending,
    Descending,
}

impl ListOrder {
    pub fn is_ascending(self) -> bool {
        matches!(self, Self::Ascending)
    }
}

impl Default for ListOrder {
    fn default() -> Self {
        Self::Ascending
    }
}

impl std::str::FromStr for ListOrder {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(format!("Unknown list order: {}", s)),
        }
    }
}
