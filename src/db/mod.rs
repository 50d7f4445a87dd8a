use chrono::{DateTime, Datelike, TimeZone, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ApiError;

pub mod models;

use models::{
    Donation, DonationProof, DonationStatus, DonationWithDonor, DonorSummary, NewDonation,
    ProofType, Receiver, Role, User, VerificationStatus,
};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Schema applied by `bin/migrate` and by tests against throwaway databases.
pub const SCHEMA: &str = include_str!("../../migrations/init.sql");

pub async fn init_pool() -> anyhow::Result<DbPool> {
    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/donations.db".to_string());
    if let Some(parent) = Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    init_pool_at(Path::new(&path))
}

pub fn init_pool_at(path: &Path) -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });
    let pool = Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(60))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), ApiError> {
    with_conn(pool, |conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    })
    .await
}

/// Runs a closure against a pooled connection on the blocking thread pool.
async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Connection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

const USER_COLS: &str = "id, name, email, role, phone_number, donor_id, \
     total_donations, total_amount_donated, created_at, updated_at";

const RECEIVER_COLS: &str = "id, full_name, phone_number, email, address, \
     location_lat, location_lng, verification_status, family_size, \
     needs_description, created_by, created_at, updated_at";

const DONATION_COLS: &str = "id, user_id, donor_email, receiver_id, donation_type, \
     amount, items, status, scheduled_delivery, actual_delivery, delivery_notes, \
     proof_sent, assigned_staff_id, assigned_at, created_at, updated_at";

const PROOF_COLS: &str =
    "id, donation_id, proof_type, file_url, quality_score, is_selected, upload_notes, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        phone_number: row.get(4)?,
        donor_id: row.get(5)?,
        total_donations: row.get(6)?,
        total_amount_donated: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn receiver_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Receiver> {
    Ok(Receiver {
        id: row.get(0)?,
        full_name: row.get(1)?,
        phone_number: row.get(2)?,
        email: row.get(3)?,
        address: row.get(4)?,
        location_lat: row.get(5)?,
        location_lng: row.get(6)?,
        verification_status: row.get(7)?,
        family_size: row.get(8)?,
        needs_description: row.get(9)?,
        created_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn donation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Donation> {
    let items_json: String = row.get(6)?;
    let items = serde_json::from_str(&items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Donation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        donor_email: row.get(2)?,
        receiver_id: row.get(3)?,
        donation_type: row.get(4)?,
        amount: row.get(5)?,
        items,
        status: row.get(7)?,
        scheduled_delivery: row.get(8)?,
        actual_delivery: row.get(9)?,
        delivery_notes: row.get(10)?,
        proof_sent: row.get(11)?,
        assigned_staff_id: row.get(12)?,
        assigned_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn proof_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DonationProof> {
    Ok(DonationProof {
        id: row.get(0)?,
        donation_id: row.get(1)?,
        proof_type: row.get(2)?,
        file_url: row.get(3)?,
        quality_score: row.get(4)?,
        is_selected: row.get(5)?,
        upload_notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn fetch_user(conn: &Connection, id: &str) -> Result<User, ApiError> {
    conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        params![id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("user profile not found"))
}

fn fetch_donation(conn: &Connection, id: &str) -> Result<Donation, ApiError> {
    conn.query_row(
        &format!("SELECT {DONATION_COLS} FROM donations WHERE id = ?1"),
        params![id],
        donation_from_row,
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("donation not found"))
}

fn next_counter(conn: &Connection, name: &str) -> Result<i64, ApiError> {
    conn.execute(
        "UPDATE counters SET value = value + 1 WHERE name = ?1",
        params![name],
    )?;
    let value = conn.query_row(
        "SELECT value FROM counters WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Users

pub async fn create_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    role: Role,
    phone_number: Option<String>,
) -> Result<User, ApiError> {
    let name = name.to_string();
    let email = email.to_string();
    with_conn(pool, move |conn| {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO users (id, name, email, role, phone_number, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, name, email, role, phone_number, now],
        );
        match inserted {
            Ok(_) => fetch_user(conn, &id),
            Err(e) if is_unique_violation(&e) => {
                Err(ApiError::conflict("email is already registered"))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
}

pub async fn get_user(pool: &DbPool, id: &str) -> Result<User, ApiError> {
    let id = id.to_string();
    with_conn(pool, move |conn| fetch_user(conn, &id)).await
}

pub async fn get_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, ApiError> {
    let email = email.to_string();
    with_conn(pool, move |conn| {
        Ok(conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?)
    })
    .await
}

// ---------------------------------------------------------------------------
// Receivers

#[allow(clippy::too_many_arguments)]
pub async fn create_receiver(
    pool: &DbPool,
    staff_id: &str,
    full_name: &str,
    phone_number: &str,
    email: &str,
    address: &str,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    family_size: Option<i64>,
    needs_description: Option<String>,
) -> Result<Receiver, ApiError> {
    let staff_id = staff_id.to_string();
    let full_name = full_name.to_string();
    let phone_number = phone_number.to_string();
    let email = email.to_string();
    let address = address.to_string();
    with_conn(pool, move |conn| {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO receivers (id, full_name, phone_number, email, address, \
             location_lat, location_lng, verification_status, family_size, \
             needs_description, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                full_name,
                phone_number,
                email,
                address,
                location_lat,
                location_lng,
                family_size,
                needs_description,
                staff_id,
                now
            ],
        )?;
        conn.query_row(
            &format!("SELECT {RECEIVER_COLS} FROM receivers WHERE id = ?1"),
            params![id],
            receiver_from_row,
        )
        .map_err(Into::into)
    })
    .await
}

pub async fn list_verified_receivers(pool: &DbPool) -> Result<Vec<Receiver>, ApiError> {
    with_conn(pool, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECEIVER_COLS} FROM receivers \
             WHERE verification_status = 'verified' ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], receiver_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .await
}

/// Decides a pending receiver. Decisions are final: a receiver that is
/// already `verified` or `rejected` cannot be re-decided.
pub async fn set_receiver_verification(
    pool: &DbPool,
    receiver_id: &str,
    decision: VerificationStatus,
) -> Result<Receiver, ApiError> {
    if decision == VerificationStatus::Pending {
        return Err(ApiError::invalid_input(
            "verification decision must be verified or rejected",
        ));
    }
    let receiver_id = receiver_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE receivers SET verification_status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND verification_status = 'pending'",
            params![decision, Utc::now(), receiver_id],
        )?;
        if updated == 0 {
            let current: Option<VerificationStatus> = tx
                .query_row(
                    "SELECT verification_status FROM receivers WHERE id = ?1",
                    params![receiver_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match current {
                None => Err(ApiError::not_found("receiver not found")),
                Some(s) => Err(ApiError::conflict(format!(
                    "receiver verification already decided ({})",
                    s.as_str()
                ))),
            };
        }
        let receiver = tx.query_row(
            &format!("SELECT {RECEIVER_COLS} FROM receivers WHERE id = ?1"),
            params![receiver_id],
            receiver_from_row,
        )?;
        tx.commit()?;
        Ok(receiver)
    })
    .await
}

// ---------------------------------------------------------------------------
// Donation lifecycle

/// Records a submitted donation with `status = pending_approval`. The donor's
/// aggregate counters are deliberately left untouched here; they only move
/// inside the approval transaction.
pub async fn create_donation(
    pool: &DbPool,
    user_id: &str,
    new: NewDonation,
) -> Result<Donation, ApiError> {
    let user_id = user_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let donor = fetch_user(&tx, &user_id)?;
        let verification: Option<VerificationStatus> = tx
            .query_row(
                "SELECT verification_status FROM receivers WHERE id = ?1",
                params![new.receiver_id],
                |row| row.get(0),
            )
            .optional()?;
        match verification {
            None => return Err(ApiError::not_found("receiver not found")),
            Some(VerificationStatus::Verified) => {}
            Some(_) => return Err(ApiError::invalid_input("receiver is not verified")),
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let items_json = serde_json::to_string(&new.items)
            .map_err(|e| ApiError::unavailable(e.to_string()))?;
        tx.execute(
            "INSERT INTO donations (id, user_id, donor_email, receiver_id, donation_type, \
             amount, items, status, scheduled_delivery, delivery_notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending_approval', ?8, ?9, ?10, ?10)",
            params![
                id,
                user_id,
                donor.email,
                new.receiver_id,
                new.donation_type,
                new.amount,
                items_json,
                new.scheduled_delivery,
                new.delivery_notes,
                now
            ],
        )?;
        let donation = fetch_donation(&tx, &id)?;
        tx.commit()?;
        Ok(donation)
    })
    .await
}

pub async fn get_donation(pool: &DbPool, id: &str) -> Result<Donation, ApiError> {
    let id = id.to_string();
    with_conn(pool, move |conn| fetch_donation(conn, &id)).await
}

pub async fn list_donations_for_donor(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<Donation>, ApiError> {
    let user_id = user_id.to_string();
    with_conn(pool, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {DONATION_COLS} FROM donations WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], donation_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .await
}

pub async fn recent_donations_for_donor(
    pool: &DbPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Donation>, ApiError> {
    let user_id = user_id.to_string();
    with_conn(pool, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {DONATION_COLS} FROM donations \
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit], donation_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .await
}

/// All donations joined with a summary of their donor, newest first. The
/// admin view groups them client-side by status.
pub async fn list_donations_with_donor(pool: &DbPool) -> Result<Vec<DonationWithDonor>, ApiError> {
    with_conn(pool, |conn| {
        let mut stmt = conn.prepare(
            "SELECT d.id, d.user_id, d.donor_email, d.receiver_id, d.donation_type, \
             d.amount, d.items, d.status, d.scheduled_delivery, d.actual_delivery, \
             d.delivery_notes, d.proof_sent, d.assigned_staff_id, d.assigned_at, \
             d.created_at, d.updated_at, u.name, u.email, u.donor_id \
             FROM donations d JOIN users u ON u.id = d.user_id \
             ORDER BY d.created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let donation = donation_from_row(row)?;
            Ok(DonationWithDonor {
                donation,
                donor: DonorSummary {
                    name: row.get(16)?,
                    email: row.get(17)?,
                    donor_id: row.get(18)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .await
}

/// Approves a pending donation. The status compare-and-set, the donor
/// aggregate increments, and the first-approval donor id allocation commit
/// as one transaction; concurrent approvals of the same donation see the
/// compare-and-set fail and surface `Conflict`.
pub async fn approve_donation(pool: &DbPool, donation_id: &str) -> Result<Donation, ApiError> {
    let donation_id = donation_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();
        let updated = tx.execute(
            "UPDATE donations SET status = 'pending', updated_at = ?1 \
             WHERE id = ?2 AND status = 'pending_approval'",
            params![now, donation_id],
        )?;
        if updated == 0 {
            return Err(approval_precondition_error(&tx, &donation_id)?);
        }
        let donation = fetch_donation(&tx, &donation_id)?;
        let changed = tx.execute(
            "UPDATE users SET total_donations = total_donations + 1, \
             total_amount_donated = total_amount_donated + ?1, updated_at = ?2 \
             WHERE id = ?3",
            params![donation.amount.unwrap_or(0.0), now, donation.user_id],
        )?;
        if changed == 0 {
            return Err(ApiError::not_found("donor profile not found"));
        }
        let donor_tag: Option<String> = tx.query_row(
            "SELECT donor_id FROM users WHERE id = ?1",
            params![donation.user_id],
            |row| row.get(0),
        )?;
        if donor_tag.is_none() {
            let serial = next_counter(&tx, "donor_id")?;
            tx.execute(
                "UPDATE users SET donor_id = ?1 WHERE id = ?2",
                params![format!("DON-{serial:04}"), donation.user_id],
            )?;
        }
        tx.commit()?;
        Ok(donation)
    })
    .await
}

/// Rejects a pending donation. No aggregate side effects: rejected donations
/// are never counted.
pub async fn reject_donation(pool: &DbPool, donation_id: &str) -> Result<Donation, ApiError> {
    let donation_id = donation_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE donations SET status = 'rejected', updated_at = ?1 \
             WHERE id = ?2 AND status = 'pending_approval'",
            params![Utc::now(), donation_id],
        )?;
        if updated == 0 {
            return Err(approval_precondition_error(&tx, &donation_id)?);
        }
        let donation = fetch_donation(&tx, &donation_id)?;
        tx.commit()?;
        Ok(donation)
    })
    .await
}

fn approval_precondition_error(
    conn: &Connection,
    donation_id: &str,
) -> Result<ApiError, ApiError> {
    let status: Option<DonationStatus> = conn
        .query_row(
            "SELECT status FROM donations WHERE id = ?1",
            params![donation_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match status {
        None => ApiError::not_found("donation not found"),
        Some(s) => ApiError::conflict(format!(
            "donation is {}, expected pending_approval",
            s.as_str()
        )),
    })
}

/// Moves an accepted donation one step along the delivery sequence. The
/// compare-and-set on the current status guards concurrent advances; entering
/// `delivered` stamps `actual_delivery`. The first staff member to advance a
/// donation becomes its assigned staff.
pub async fn advance_delivery(
    pool: &DbPool,
    staff_id: &str,
    donation_id: &str,
    next: DonationStatus,
    notes: Option<String>,
) -> Result<Donation, ApiError> {
    let staff_id = staff_id.to_string();
    let donation_id = donation_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let donation = fetch_donation(&tx, &donation_id)?;
        match donation.status {
            DonationStatus::PendingApproval => {
                return Err(ApiError::conflict("donation has not been approved yet"))
            }
            DonationStatus::Rejected => {
                return Err(ApiError::conflict("donation was rejected"))
            }
            _ => {}
        }
        if !donation.status.can_advance_to(next) {
            return Err(ApiError::InvalidTransition {
                from: donation.status,
                to: next,
            });
        }
        let now = Utc::now();
        let updated = tx.execute(
            "UPDATE donations SET status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND status = ?4",
            params![next, now, donation_id, donation.status],
        )?;
        if updated == 0 {
            return Err(ApiError::conflict("donation state changed concurrently"));
        }
        if next == DonationStatus::Delivered {
            tx.execute(
                "UPDATE donations SET actual_delivery = ?1 WHERE id = ?2",
                params![now, donation_id],
            )?;
        }
        if let Some(ref notes) = notes {
            tx.execute(
                "UPDATE donations SET delivery_notes = CASE \
                 WHEN delivery_notes IS NULL OR delivery_notes = '' THEN ?1 \
                 ELSE delivery_notes || char(10) || ?1 END \
                 WHERE id = ?2",
                params![notes, donation_id],
            )?;
        }
        if donation.assigned_staff_id.is_none() {
            tx.execute(
                "UPDATE donations SET assigned_staff_id = ?1, assigned_at = ?2 WHERE id = ?3",
                params![staff_id, now, donation_id],
            )?;
        }
        let donation = fetch_donation(&tx, &donation_id)?;
        tx.commit()?;
        Ok(donation)
    })
    .await
}

/// Flags the donation once its delivery evidence has been dispatched to the
/// donor. Requires a delivered donation with at least one uploaded proof.
pub async fn mark_proof_sent(pool: &DbPool, donation_id: &str) -> Result<Donation, ApiError> {
    let donation_id = donation_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let donation = fetch_donation(&tx, &donation_id)?;
        if !matches!(
            donation.status,
            DonationStatus::Delivered | DonationStatus::Confirmed
        ) {
            return Err(ApiError::conflict(format!(
                "donation is {}, proof can only be sent after delivery",
                donation.status
            )));
        }
        let proofs: i64 = tx.query_row(
            "SELECT COUNT(*) FROM donation_proofs WHERE donation_id = ?1",
            params![donation_id],
            |row| row.get(0),
        )?;
        if proofs == 0 {
            return Err(ApiError::conflict("no delivery proof has been uploaded"));
        }
        tx.execute(
            "UPDATE donations SET proof_sent = 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), donation_id],
        )?;
        let donation = fetch_donation(&tx, &donation_id)?;
        tx.commit()?;
        Ok(donation)
    })
    .await
}

// ---------------------------------------------------------------------------
// Delivery proofs

pub async fn add_proof(
    pool: &DbPool,
    donation_id: &str,
    proof_type: ProofType,
    file_url: &str,
    quality_score: Option<f64>,
    upload_notes: Option<String>,
) -> Result<DonationProof, ApiError> {
    let donation_id = donation_id.to_string();
    let file_url = file_url.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let donation = fetch_donation(&tx, &donation_id)?;
        if !donation.status.is_accepted() {
            return Err(ApiError::conflict(
                "proofs can only be attached to accepted donations",
            ));
        }
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO donation_proofs (id, donation_id, proof_type, file_url, \
             quality_score, upload_notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                donation_id,
                proof_type,
                file_url,
                quality_score,
                upload_notes,
                Utc::now()
            ],
        )?;
        let proof = tx.query_row(
            &format!("SELECT {PROOF_COLS} FROM donation_proofs WHERE id = ?1"),
            params![id],
            proof_from_row,
        )?;
        tx.commit()?;
        Ok(proof)
    })
    .await
}

pub async fn list_proofs(pool: &DbPool, donation_id: &str) -> Result<Vec<DonationProof>, ApiError> {
    let donation_id = donation_id.to_string();
    with_conn(pool, move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROOF_COLS} FROM donation_proofs \
             WHERE donation_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![donation_id], proof_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    })
    .await
}

/// Marks one proof as best quality. Clearing and setting happen in one
/// transaction so at most one proof per donation is ever selected.
pub async fn select_best_proof(pool: &DbPool, proof_id: &str) -> Result<DonationProof, ApiError> {
    let proof_id = proof_id.to_string();
    with_conn(pool, move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let donation_id: Option<String> = tx
            .query_row(
                "SELECT donation_id FROM donation_proofs WHERE id = ?1",
                params![proof_id],
                |row| row.get(0),
            )
            .optional()?;
        let donation_id = donation_id.ok_or_else(|| ApiError::not_found("proof not found"))?;
        tx.execute(
            "UPDATE donation_proofs SET is_selected = 0 WHERE donation_id = ?1",
            params![donation_id],
        )?;
        tx.execute(
            "UPDATE donation_proofs SET is_selected = 1 WHERE id = ?1",
            params![proof_id],
        )?;
        let proof = tx.query_row(
            &format!("SELECT {PROOF_COLS} FROM donation_proofs WHERE id = ?1"),
            params![proof_id],
            proof_from_row,
        )?;
        tx.commit()?;
        Ok(proof)
    })
    .await
}

// ---------------------------------------------------------------------------
// Statistics

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DonorStats {
    pub total_donations: i64,
    pub total_amount: f64,
    pub people_helped: i64,
    pub confirmed_deliveries: i64,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub active_donors: i64,
    pub active_batch_staff: i64,
    pub to_be_assigned: i64,
    pub delivered: i64,
    pub ongoing: i64,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchStaffStats {
    pub assigned_this_month: i64,
    pub delivered: i64,
    pub ongoing: i64,
}

fn count(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<i64, ApiError> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

/// Totals are read from the incrementally maintained User counters, not
/// recomputed by scanning donations.
pub async fn donor_stats(pool: &DbPool, user_id: &str) -> Result<DonorStats, ApiError> {
    let user_id = user_id.to_string();
    with_conn(pool, move |conn| {
        let user = fetch_user(conn, &user_id)?;
        let people_helped = count(
            conn,
            "SELECT COUNT(DISTINCT receiver_id) FROM donations \
             WHERE user_id = ?1 AND status IN ('pending', 'in_transit', 'delivered', 'confirmed')",
            &[&user_id],
        )?;
        let confirmed_deliveries = count(
            conn,
            "SELECT COUNT(*) FROM donations WHERE user_id = ?1 AND status = 'confirmed'",
            &[&user_id],
        )?;
        Ok(DonorStats {
            total_donations: user.total_donations,
            total_amount: user.total_amount_donated,
            people_helped,
            confirmed_deliveries,
        })
    })
    .await
}

pub async fn admin_stats(pool: &DbPool) -> Result<AdminStats, ApiError> {
    with_conn(pool, |conn| {
        Ok(AdminStats {
            active_donors: count(
                conn,
                "SELECT COUNT(*) FROM users WHERE role = 'Donor'",
                &[],
            )?,
            active_batch_staff: count(
                conn,
                "SELECT COUNT(*) FROM users WHERE role = 'Batch staff'",
                &[],
            )?,
            to_be_assigned: count(
                conn,
                "SELECT COUNT(*) FROM donations \
                 WHERE status = 'pending' AND assigned_staff_id IS NULL",
                &[],
            )?,
            delivered: count(
                conn,
                "SELECT COUNT(*) FROM donations WHERE status IN ('delivered', 'confirmed')",
                &[],
            )?,
            ongoing: count(
                conn,
                "SELECT COUNT(*) FROM donations WHERE status = 'in_transit' \
                 OR (status = 'pending' AND assigned_staff_id IS NOT NULL)",
                &[],
            )?,
        })
    })
    .await
}

pub async fn batch_staff_stats(pool: &DbPool, staff_id: &str) -> Result<BatchStaffStats, ApiError> {
    let staff_id = staff_id.to_string();
    with_conn(pool, move |conn| {
        let now = Utc::now();
        let month_start: DateTime<Utc> = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        Ok(BatchStaffStats {
            assigned_this_month: count(
                conn,
                "SELECT COUNT(*) FROM donations \
                 WHERE assigned_staff_id = ?1 AND assigned_at >= ?2",
                &[&staff_id, &month_start],
            )?,
            delivered: count(
                conn,
                "SELECT COUNT(*) FROM donations WHERE status IN ('delivered', 'confirmed')",
                &[],
            )?,
            ongoing: count(
                conn,
                "SELECT COUNT(*) FROM donations WHERE status = 'in_transit' \
                 OR (status = 'pending' AND assigned_staff_id IS NOT NULL)",
                &[],
            )?,
        })
    })
    .await
}
