use donation_tracker::db::{self, models::*};
use donation_tracker::error::ApiError;
use tempfile::TempDir;

async fn test_pool() -> (db::DbPool, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let pool = db::init_pool_at(&dir.path().join("donations.db")).expect("init pool");
    db::run_migrations(&pool).await.expect("run migrations");
    (pool, dir)
}

async fn register(pool: &db::DbPool, name: &str, email: &str, role: Role) -> User {
    db::create_user(pool, name, email, role, None)
        .await
        .expect("create user")
}

async fn verified_receiver(pool: &db::DbPool, staff: &User) -> Receiver {
    let receiver = db::create_receiver(
        pool,
        &staff.id,
        "Amina Yusuf",
        "0712000001",
        "amina@example.com",
        "12 Riverside Rd",
        None,
        None,
        Some(4),
        Some("food support".to_string()),
    )
    .await
    .expect("create receiver");
    db::set_receiver_verification(pool, &receiver.id, VerificationStatus::Verified)
        .await
        .expect("verify receiver")
}

fn funds_donation(receiver_id: &str, amount: f64) -> NewDonation {
    NewDonation {
        receiver_id: receiver_id.to_string(),
        donation_type: DonationType::Funds,
        amount: Some(amount),
        items: Vec::new(),
        scheduled_delivery: None,
        delivery_notes: None,
    }
}

fn food_donation(receiver_id: &str) -> NewDonation {
    NewDonation {
        receiver_id: receiver_id.to_string(),
        donation_type: DonationType::Food,
        amount: None,
        items: vec![DonationItem {
            name: "Rice Bag".to_string(),
            quantity: 2,
            category: Some("food".to_string()),
        }],
        scheduled_delivery: None,
        delivery_notes: None,
    }
}

#[tokio::test]
async fn approval_updates_donor_aggregates_exactly_once() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let donation = db::create_donation(&pool, &donor.id, funds_donation(&receiver.id, 50.0))
        .await
        .expect("submit donation");
    assert_eq!(donation.status, DonationStatus::PendingApproval);
    assert_eq!(donation.donor_email, "dana@example.com");
    assert_eq!(donation.amount, Some(50.0));
    assert!(donation.items.is_empty());

    // submission defers all aggregate updates to approval
    let before = db::get_user(&pool, &donor.id).await.expect("get donor");
    assert_eq!(before.total_donations, 0);
    assert_eq!(before.total_amount_donated, 0.0);
    assert_eq!(before.donor_id, None);

    let approved = db::approve_donation(&pool, &donation.id)
        .await
        .expect("approve donation");
    assert_eq!(approved.status, DonationStatus::Pending);

    let after = db::get_user(&pool, &donor.id).await.expect("get donor");
    assert_eq!(after.total_donations, 1);
    assert_eq!(after.total_amount_donated, 50.0);
    let donor_tag = after.donor_id.expect("donor id assigned on first approval");
    assert!(donor_tag.starts_with("DON-"));

    // re-approval is rejected, not idempotent
    let err = db::approve_donation(&pool, &donation.id)
        .await
        .expect_err("second approval must fail");
    assert!(matches!(err, ApiError::Conflict(_)), "got {err:?}");

    let unchanged = db::get_user(&pool, &donor.id).await.expect("get donor");
    assert_eq!(unchanged.total_donations, 1);
    assert_eq!(unchanged.total_amount_donated, 50.0);
    assert_eq!(unchanged.donor_id, Some(donor_tag));
}

#[tokio::test]
async fn rejection_never_touches_donor_aggregates() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let donation = db::create_donation(&pool, &donor.id, food_donation(&receiver.id))
        .await
        .expect("submit donation");
    assert_eq!(donation.amount, None);
    assert_eq!(donation.items.len(), 1);

    let rejected = db::reject_donation(&pool, &donation.id)
        .await
        .expect("reject donation");
    assert_eq!(rejected.status, DonationStatus::Rejected);

    let donor_after = db::get_user(&pool, &donor.id).await.expect("get donor");
    assert_eq!(donor_after.total_donations, 0);
    assert_eq!(donor_after.total_amount_donated, 0.0);
    assert_eq!(donor_after.donor_id, None);

    let err = db::reject_donation(&pool, &donation.id)
        .await
        .expect_err("second rejection must fail");
    assert!(matches!(err, ApiError::Conflict(_)));

    // a rejected donation is outside the delivery sequence entirely
    let err = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::InTransit,
        None,
    )
    .await
    .expect_err("advancing a rejected donation must fail");
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn delivery_advances_one_step_at_a_time() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let donation = db::create_donation(&pool, &donor.id, funds_donation(&receiver.id, 20.0))
        .await
        .expect("submit donation");

    // not yet approved
    let err = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::InTransit,
        None,
    )
    .await
    .expect_err("cannot advance before approval");
    assert!(matches!(err, ApiError::Conflict(_)));

    db::approve_donation(&pool, &donation.id)
        .await
        .expect("approve donation");

    // skipping a state is rejected
    let err = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::Delivered,
        None,
    )
    .await
    .expect_err("pending -> delivered must fail");
    assert!(matches!(
        err,
        ApiError::InvalidTransition {
            from: DonationStatus::Pending,
            to: DonationStatus::Delivered,
        }
    ));

    let in_transit = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::InTransit,
        Some("picked up".to_string()),
    )
    .await
    .expect("pending -> in_transit");
    assert_eq!(in_transit.status, DonationStatus::InTransit);
    assert_eq!(in_transit.assigned_staff_id.as_deref(), Some(staff.id.as_str()));
    assert!(in_transit.assigned_at.is_some());
    assert_eq!(in_transit.delivery_notes.as_deref(), Some("picked up"));
    assert_eq!(in_transit.actual_delivery, None);

    let delivered = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::Delivered,
        Some("left with family".to_string()),
    )
    .await
    .expect("in_transit -> delivered");
    assert_eq!(delivered.status, DonationStatus::Delivered);
    assert!(delivered.actual_delivery.is_some());
    let notes = delivered.delivery_notes.expect("notes accumulate");
    assert!(notes.contains("picked up") && notes.contains("left with family"));

    let confirmed = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::Confirmed,
        None,
    )
    .await
    .expect("delivered -> confirmed");
    assert_eq!(confirmed.status, DonationStatus::Confirmed);

    // confirmed is terminal
    let err = db::advance_delivery(
        &pool,
        &staff.id,
        &donation.id,
        DonationStatus::Confirmed,
        None,
    )
    .await
    .expect_err("confirmed has no successor");
    assert!(matches!(err, ApiError::InvalidTransition { .. }));
}

#[tokio::test]
async fn donor_ids_are_unique_and_assigned_only_on_first_approval() {
    let (pool, _dir) = test_pool().await;
    let first = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let second = register(&pool, "Omar Donor", "omar@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let a = db::create_donation(&pool, &first.id, funds_donation(&receiver.id, 10.0))
        .await
        .expect("submit a");
    let b = db::create_donation(&pool, &second.id, funds_donation(&receiver.id, 15.0))
        .await
        .expect("submit b");
    let c = db::create_donation(&pool, &first.id, funds_donation(&receiver.id, 5.0))
        .await
        .expect("submit c");

    db::approve_donation(&pool, &a.id).await.expect("approve a");
    db::approve_donation(&pool, &b.id).await.expect("approve b");

    let first_tag = db::get_user(&pool, &first.id)
        .await
        .expect("get first donor")
        .donor_id
        .expect("first donor id");
    let second_tag = db::get_user(&pool, &second.id)
        .await
        .expect("get second donor")
        .donor_id
        .expect("second donor id");
    assert_ne!(first_tag, second_tag);

    // second approval for the same donor keeps the existing id
    db::approve_donation(&pool, &c.id).await.expect("approve c");
    let first_after = db::get_user(&pool, &first.id).await.expect("get first donor");
    assert_eq!(first_after.donor_id, Some(first_tag));
    assert_eq!(first_after.total_donations, 2);
    assert_eq!(first_after.total_amount_donated, 15.0);
}

#[tokio::test]
async fn submission_requires_an_existing_verified_receiver() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;

    let err = db::create_donation(&pool, &donor.id, funds_donation("missing-receiver", 10.0))
        .await
        .expect_err("unknown receiver must fail");
    assert!(matches!(err, ApiError::NotFound(_)));

    let unverified = db::create_receiver(
        &pool,
        &staff.id,
        "Pending Person",
        "0712000002",
        "pending@example.com",
        "5 Hill St",
        None,
        None,
        None,
        None,
    )
    .await
    .expect("create receiver");
    let err = db::create_donation(&pool, &donor.id, funds_donation(&unverified.id, 10.0))
        .await
        .expect_err("unverified receiver must fail");
    assert!(matches!(err, ApiError::InvalidInput(_)));

    // receiver decisions are final
    db::set_receiver_verification(&pool, &unverified.id, VerificationStatus::Rejected)
        .await
        .expect("reject receiver");
    let err = db::set_receiver_verification(&pool, &unverified.id, VerificationStatus::Verified)
        .await
        .expect_err("re-deciding a receiver must fail");
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = db::create_donation(&pool, "missing-donor", funds_donation("any", 10.0))
        .await
        .expect_err("unknown donor must fail");
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn proof_workflow_selects_one_best_and_gates_proof_sent() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let donation = db::create_donation(&pool, &donor.id, food_donation(&receiver.id))
        .await
        .expect("submit donation");
    db::approve_donation(&pool, &donation.id)
        .await
        .expect("approve");
    db::advance_delivery(&pool, &staff.id, &donation.id, DonationStatus::InTransit, None)
        .await
        .expect("in transit");
    db::advance_delivery(&pool, &staff.id, &donation.id, DonationStatus::Delivered, None)
        .await
        .expect("delivered");

    // no proof uploaded yet
    let err = db::mark_proof_sent(&pool, &donation.id)
        .await
        .expect_err("proof_sent requires an uploaded proof");
    assert!(matches!(err, ApiError::Conflict(_)));

    let photo = db::add_proof(
        &pool,
        &donation.id,
        ProofType::Photo,
        "proofs/d/one.jpg",
        Some(0.7),
        None,
    )
    .await
    .expect("add photo proof");
    let video = db::add_proof(
        &pool,
        &donation.id,
        ProofType::Video,
        "proofs/d/two.mp4",
        Some(0.9),
        Some("handover clip".to_string()),
    )
    .await
    .expect("add video proof");

    let selected = db::select_best_proof(&pool, &video.id)
        .await
        .expect("select video");
    assert!(selected.is_selected);

    // re-selecting moves the flag rather than duplicating it
    db::select_best_proof(&pool, &photo.id)
        .await
        .expect("select photo");
    let proofs = db::list_proofs(&pool, &donation.id).await.expect("list proofs");
    assert_eq!(proofs.len(), 2);
    assert_eq!(proofs.iter().filter(|p| p.is_selected).count(), 1);
    assert!(proofs.iter().any(|p| p.id == photo.id && p.is_selected));

    let sent = db::mark_proof_sent(&pool, &donation.id)
        .await
        .expect("mark proof sent");
    assert!(sent.proof_sent);
}

#[tokio::test]
async fn dashboards_tolerate_empty_collections() {
    let (pool, _dir) = test_pool().await;

    let admin = db::admin_stats(&pool).await.expect("admin stats");
    assert_eq!(admin.active_donors, 0);
    assert_eq!(admin.active_batch_staff, 0);
    assert_eq!(admin.to_be_assigned, 0);
    assert_eq!(admin.delivered, 0);
    assert_eq!(admin.ongoing, 0);

    let batch = db::batch_staff_stats(&pool, "nobody").await.expect("batch stats");
    assert_eq!(batch.assigned_this_month, 0);
    assert_eq!(batch.delivered, 0);
    assert_eq!(batch.ongoing, 0);
}

#[tokio::test]
async fn dashboards_reflect_the_lifecycle() {
    let (pool, _dir) = test_pool().await;
    let donor = register(&pool, "Dana Donor", "dana@example.com", Role::Donor).await;
    let staff = register(&pool, "Sam Staff", "sam@example.com", Role::BatchStaff).await;
    register(&pool, "Ada Admin", "ada@example.com", Role::Administrator).await;
    let receiver = verified_receiver(&pool, &staff).await;

    let waiting = db::create_donation(&pool, &donor.id, funds_donation(&receiver.id, 30.0))
        .await
        .expect("submit waiting");
    let moving = db::create_donation(&pool, &donor.id, food_donation(&receiver.id))
        .await
        .expect("submit moving");
    let done = db::create_donation(&pool, &donor.id, funds_donation(&receiver.id, 70.0))
        .await
        .expect("submit done");

    for id in [&waiting.id, &moving.id, &done.id] {
        db::approve_donation(&pool, id).await.expect("approve");
    }
    db::advance_delivery(&pool, &staff.id, &moving.id, DonationStatus::InTransit, None)
        .await
        .expect("moving in transit");
    for next in [
        DonationStatus::InTransit,
        DonationStatus::Delivered,
        DonationStatus::Confirmed,
    ] {
        db::advance_delivery(&pool, &staff.id, &done.id, next, None)
            .await
            .expect("advance done");
    }

    let admin = db::admin_stats(&pool).await.expect("admin stats");
    assert_eq!(admin.active_donors, 1);
    assert_eq!(admin.active_batch_staff, 1);
    assert_eq!(admin.to_be_assigned, 1); // `waiting`: accepted, no staff yet
    assert_eq!(admin.ongoing, 1); // `moving`
    assert_eq!(admin.delivered, 1); // `done`

    let batch = db::batch_staff_stats(&pool, &staff.id).await.expect("batch stats");
    assert_eq!(batch.assigned_this_month, 2);
    assert_eq!(batch.delivered, 1);
    assert_eq!(batch.ongoing, 1);

    let donor_view = db::donor_stats(&pool, &donor.id).await.expect("donor stats");
    assert_eq!(donor_view.total_donations, 3);
    assert_eq!(donor_view.total_amount, 100.0);
    assert_eq!(donor_view.people_helped, 1);
    assert_eq!(donor_view.confirmed_deliveries, 1);

    let listed = db::list_donations_with_donor(&pool).await.expect("admin listing");
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|d| d.donor.email == "dana@example.com"));
}
