use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Donor,
    #[serde(rename = "Batch staff")]
    BatchStaff,
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Donor => "Donor",
            Role::BatchStaff => "Batch staff",
            Role::Administrator => "Administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Donor" => Some(Role::Donor),
            "Batch staff" => Some(Role::BatchStaff),
            "Administrator" => Some(Role::Administrator),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow status of a donation. The full lifecycle is
/// `pending_approval -> pending -> in_transit -> delivered -> confirmed`,
/// with `rejected` as the terminal alternative to approval. There is no
/// separate "accepted" state: approval moves the donation straight into the
/// `pending` delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    PendingApproval,
    Rejected,
    Pending,
    InTransit,
    Delivered,
    Confirmed,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::PendingApproval => "pending_approval",
            DonationStatus::Rejected => "rejected",
            DonationStatus::Pending => "pending",
            DonationStatus::InTransit => "in_transit",
            DonationStatus::Delivered => "delivered",
            DonationStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<DonationStatus> {
        match s {
            "pending_approval" => Some(DonationStatus::PendingApproval),
            "rejected" => Some(DonationStatus::Rejected),
            "pending" => Some(DonationStatus::Pending),
            "in_transit" => Some(DonationStatus::InTransit),
            "delivered" => Some(DonationStatus::Delivered),
            "confirmed" => Some(DonationStatus::Confirmed),
            _ => None,
        }
    }

    /// True once an administrator has approved the donation.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            DonationStatus::Pending
                | DonationStatus::InTransit
                | DonationStatus::Delivered
                | DonationStatus::Confirmed
        )
    }

    /// The next state in the delivery sequence, if any. `pending_approval`
    /// and `rejected` are not part of the sequence; `confirmed` is terminal.
    pub fn successor(self) -> Option<DonationStatus> {
        match self {
            DonationStatus::Pending => Some(DonationStatus::InTransit),
            DonationStatus::InTransit => Some(DonationStatus::Delivered),
            DonationStatus::Delivered => Some(DonationStatus::Confirmed),
            _ => None,
        }
    }

    /// Delivery transitions step through the sequence one state at a time;
    /// skipping is rejected.
    pub fn can_advance_to(self, next: DonationStatus) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationType {
    Food,
    Clothing,
    Funds,
    Other,
}

impl DonationType {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationType::Food => "food",
            DonationType::Clothing => "clothing",
            DonationType::Funds => "funds",
            DonationType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<DonationType> {
        match s {
            "food" => Some(DonationType::Food),
            "clothing" => Some(DonationType::Clothing),
            "funds" => Some(DonationType::Funds),
            "other" => Some(DonationType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<VerificationStatus> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "verified" => Some(VerificationStatus::Verified),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    Photo,
    Video,
}

impl ProofType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProofType::Photo => "photo",
            ProofType::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<ProofType> {
        match s {
            "photo" => Some(ProofType::Photo),
            "video" => Some(ProofType::Video),
            _ => None,
        }
    }
}

macro_rules! sql_string_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                Self::parse(s).ok_or(FromSqlError::InvalidType)
            }
        }
    )+};
}

sql_string_enum!(Role, DonationStatus, DonationType, VerificationStatus, ProofType);

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone_number: Option<String>,
    /// Public donor identifier, allocated on the donor's first approved
    /// donation. Never assigned at registration.
    pub donor_id: Option<String>,
    pub total_donations: i64,
    pub total_amount_donated: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Receiver {
    pub id: String,
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub address: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub verification_status: VerificationStatus,
    pub family_size: Option<i64>,
    pub needs_description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DonationItem {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub category: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Donation {
    pub id: String,
    pub user_id: String,
    /// Snapshot of the donor's email at submission time; historical
    /// donations keep it even if the live User record changes.
    pub donor_email: String,
    pub receiver_id: String,
    pub donation_type: DonationType,
    pub amount: Option<f64>,
    pub items: Vec<DonationItem>,
    pub status: DonationStatus,
    pub scheduled_delivery: Option<NaiveDate>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,
    pub proof_sent: bool,
    pub assigned_staff_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated submission, ready to be written to the store.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub receiver_id: String,
    pub donation_type: DonationType,
    pub amount: Option<f64>,
    pub items: Vec<DonationItem>,
    pub scheduled_delivery: Option<NaiveDate>,
    pub delivery_notes: Option<String>,
}

/// Denormalized donor fields attached to donations in admin listings.
#[derive(Serialize, Debug, Clone)]
pub struct DonorSummary {
    pub name: String,
    pub email: String,
    pub donor_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct DonationWithDonor {
    #[serde(flatten)]
    pub donation: Donation,
    pub donor: DonorSummary,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DonationProof {
    pub id: String,
    pub donation_id: String,
    pub proof_type: ProofType,
    pub file_url: String,
    pub quality_score: Option<f64>,
    pub is_selected: bool,
    pub upload_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_sequence_is_strict() {
        assert!(DonationStatus::Pending.can_advance_to(DonationStatus::InTransit));
        assert!(DonationStatus::InTransit.can_advance_to(DonationStatus::Delivered));
        assert!(DonationStatus::Delivered.can_advance_to(DonationStatus::Confirmed));

        // no skipping
        assert!(!DonationStatus::Pending.can_advance_to(DonationStatus::Delivered));
        assert!(!DonationStatus::Pending.can_advance_to(DonationStatus::Confirmed));
        assert!(!DonationStatus::InTransit.can_advance_to(DonationStatus::Confirmed));

        // no going backwards or re-entering approval states
        assert!(!DonationStatus::InTransit.can_advance_to(DonationStatus::Pending));
        assert!(!DonationStatus::Pending.can_advance_to(DonationStatus::Rejected));
        assert!(!DonationStatus::Pending.can_advance_to(DonationStatus::PendingApproval));
    }

    #[test]
    fn terminal_states_have_no_successor() {
        assert_eq!(DonationStatus::Confirmed.successor(), None);
        assert_eq!(DonationStatus::Rejected.successor(), None);
        assert_eq!(DonationStatus::PendingApproval.successor(), None);
    }

    #[test]
    fn accepted_covers_delivery_states_only() {
        assert!(!DonationStatus::PendingApproval.is_accepted());
        assert!(!DonationStatus::Rejected.is_accepted());
        assert!(DonationStatus::Pending.is_accepted());
        assert!(DonationStatus::Confirmed.is_accepted());
    }

    #[test]
    fn status_round_trips_through_storage_repr() {
        for status in [
            DonationStatus::PendingApproval,
            DonationStatus::Rejected,
            DonationStatus::Pending,
            DonationStatus::InTransit,
            DonationStatus::Delivered,
            DonationStatus::Confirmed,
        ] {
            assert_eq!(DonationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DonationStatus::parse("accepted"), None);
    }

    #[test]
    fn role_storage_repr_matches_wire_repr() {
        assert_eq!(Role::parse("Batch staff"), Some(Role::BatchStaff));
        assert_eq!(
            serde_json::to_string(&Role::BatchStaff).unwrap(),
            "\"Batch staff\""
        );
        assert_eq!(Role::parse("batch staff"), None);
    }
}
