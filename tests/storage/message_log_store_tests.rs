//! MessageLogStore interface tests.
//!
//! These tests verify the contract of the MessageLogStore trait.
//! Each storage implementation should run these tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use herald::model::{ListFilter, MessageLog, MessageStatus, MessageType};
use herald::storage::{MessageLogStore, StorageError};
use herald::uid::Uid;

/// Fixed instant: 2024-01-`day` at `hour`:00 UTC.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

/// Create a pending record whose UID is minted at `send_at`.
pub fn make_log(namespace: &str, send_at: DateTime<Utc>, seq: u16) -> MessageLog {
    make_scheduled_log(namespace, send_at, send_at, seq)
}

/// Create a pending record minted at `minted_at` and scheduled for `send_at`.
pub fn make_scheduled_log(
    namespace: &str,
    minted_at: DateTime<Utc>,
    send_at: DateTime<Utc>,
    seq: u16,
) -> MessageLog {
    MessageLog::new(
        Uid::compose(minted_at, 5, seq),
        namespace,
        send_at,
        MessageType::Email,
        vec![0xde, 0xad, 0xbe, 0xef, seq as u8],
        br#"{"smtp":"mail.example.com"}"#.to_vec(),
    )
}

// =============================================================================
// MessageLogStore::create / get tests
// =============================================================================

pub async fn test_create_and_get_round_trip<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_round_trip";
    let mut input = make_log(namespace, at(8, 9), 0);
    input.message_type = MessageType::Webhook;

    let created = store
        .create(namespace, input.clone())
        .await
        .expect("create should succeed");
    assert!(created.id > 0, "backend should assign an id");
    assert!(created.created_at >= input.uid.timestamp());

    let fetched = store
        .get(namespace, input.uid)
        .await
        .expect("get should succeed");

    assert_eq!(fetched.uid, input.uid);
    assert_eq!(fetched.namespace, namespace);
    assert_eq!(fetched.send_at, input.send_at);
    assert_eq!(fetched.message, input.message);
    assert_eq!(fetched.config, input.config);
    assert_eq!(fetched.message_type, MessageType::Webhook);
    assert_eq!(fetched.status, MessageStatus::Pending);
    assert_eq!(fetched.retry_total, 0);
    assert_eq!(fetched.last_error, None);
    assert_eq!(fetched.id, created.id);
}

pub async fn test_empty_namespace_is_stamped<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_stamped";
    let input = make_log("", at(8, 9), 1);

    let created = store
        .create(namespace, input.clone())
        .await
        .expect("create should succeed");
    assert_eq!(created.namespace, namespace);

    let fetched = store.get(namespace, input.uid).await.unwrap();
    assert_eq!(fetched.namespace, namespace);
}

pub async fn test_get_missing_is_not_found<S: MessageLogStore + ?Sized>(store: &S) {
    // No shard has ever been written for this namespace.
    let err = store
        .get("test_never_written", Uid::compose(at(8, 9), 5, 2))
        .await
        .expect_err("get should fail");
    assert!(err.is_not_found(), "expected NotFound, got {:?}", err);

    let err = store
        .get_with_lock("test_never_written", Uid::compose(at(8, 9), 5, 2))
        .await
        .expect_err("get_with_lock should fail");
    assert!(err.is_not_found(), "expected NotFound, got {:?}", err);
}

pub async fn test_get_is_namespace_scoped<S: MessageLogStore + ?Sized>(store: &S) {
    let log = make_log("test_scope_a", at(8, 9), 3);
    store.create("test_scope_a", log.clone()).await.unwrap();

    let err = store.get("test_scope_b", log.uid).await.unwrap_err();
    assert!(err.is_not_found());
}

pub async fn test_get_with_lock_returns_record<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_locked_get";
    let log = make_log(namespace, at(8, 9), 4);
    store.create(namespace, log.clone()).await.unwrap();

    let locked = store
        .get_with_lock(namespace, log.uid)
        .await
        .expect("get_with_lock should succeed");
    assert_eq!(locked.uid, log.uid);

    // The lock is released once the read completes.
    assert!(store.claim(namespace, log.uid).await.unwrap());
}

pub async fn test_duplicate_create_rejected<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_duplicate";
    let log = make_log(namespace, at(8, 9), 5);

    store.create(namespace, log.clone()).await.unwrap();
    let result = store.create(namespace, log).await;
    assert!(
        matches!(result, Err(StorageError::AlreadyExists { .. })),
        "expected AlreadyExists, got {:?}",
        result
    );
}

pub async fn test_namespace_mismatch_rejected<S: MessageLogStore + ?Sized>(store: &S) {
    let log = make_log("test_other", at(8, 9), 6);

    let result = store.create("test_mismatch", log).await;
    assert!(matches!(result, Err(StorageError::NamespaceMismatch { .. })));
}

pub async fn test_scheduled_into_later_week<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_scheduled";
    // Minted on a Monday, sent two weeks later.
    let log = make_scheduled_log(namespace, at(8, 9), at(22, 9), 7);

    store.create(namespace, log.clone()).await.unwrap();

    let fetched = store.get(namespace, log.uid).await.unwrap();
    assert_eq!(fetched.send_at, at(22, 9));
    assert!(store.claim(namespace, log.uid).await.unwrap());
}

pub async fn test_send_at_in_week_before_uid<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_monday_midnight";
    // send_at taken on Sunday, UID minted just after Monday midnight.
    let minted = at(8, 0) + Duration::milliseconds(1);
    let send_at = at(8, 0) - Duration::milliseconds(1);
    let log = make_scheduled_log(namespace, minted, send_at, 8);

    store.create(namespace, log.clone()).await.unwrap();

    let fetched = store
        .get(namespace, log.uid)
        .await
        .expect("record should be found from its UID");
    assert_eq!(fetched.send_at, send_at);
    assert!(store.claim(namespace, log.uid).await.unwrap());
}

pub async fn test_sub_millisecond_timestamps_round_trip<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_precision";
    let send_at = at(8, 9) + Duration::nanoseconds(123_456_789);
    let log = make_scheduled_log(namespace, at(8, 9), send_at, 9);

    let created = store.create(namespace, log.clone()).await.unwrap();
    let fetched = store.get(namespace, log.uid).await.unwrap();

    assert_eq!(fetched.send_at, at(8, 9) + Duration::milliseconds(123));
    assert_eq!(created, fetched, "create should return what get returns");
}

// =============================================================================
// MessageLogStore::list tests
// =============================================================================

pub async fn test_list_spans_three_weeks<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_list_weeks";
    // Wednesday of three consecutive weeks.
    let days = [3, 10, 17];
    for (i, day) in days.into_iter().enumerate() {
        let mut log = make_log(namespace, at(day, 12), 10 + i as u16);
        if day == 10 {
            log.message_type = MessageType::Sms;
        }
        store.create(namespace, log).await.unwrap();
    }
    // Noise in another namespace, same weeks.
    store
        .create("test_list_noise", make_log("test_list_noise", at(10, 12), 13))
        .await
        .unwrap();

    let all = store
        .list(namespace, &ListFilter::between(at(1, 0), at(22, 0)))
        .await
        .expect("list should succeed");
    assert_eq!(all.items.len(), 3);
    assert_eq!(all.total, 3);
    assert!(all.items.iter().all(|log| log.namespace == namespace));
    for pair in all.items.windows(2) {
        assert!(
            (pair[0].created_at, pair[0].uid) > (pair[1].created_at, pair[1].uid),
            "items should be newest first"
        );
    }

    let sms = store
        .list(
            namespace,
            &ListFilter::between(at(1, 0), at(22, 0)).with_type(MessageType::Sms),
        )
        .await
        .unwrap();
    assert_eq!(sms.items.len(), 1);
    assert_eq!(sms.items[0].send_at, at(10, 12));

    let middle_only = store
        .list(namespace, &ListFilter::between(at(8, 0), at(15, 0)))
        .await
        .unwrap();
    assert_eq!(middle_only.items.len(), 1);

    let none = store
        .list(namespace, &ListFilter::between(at(18, 0), at(31, 0)))
        .await
        .unwrap();
    assert!(none.items.is_empty());
}

pub async fn test_list_filters_by_status<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_list_status";
    let mut uids = Vec::new();
    for i in 0..3 {
        let log = make_log(namespace, at(9, 8 + i), 20 + i as u16);
        uids.push(log.uid);
        store.create(namespace, log).await.unwrap();
    }
    store.claim(namespace, uids[1]).await.unwrap();

    let window = ListFilter::between(at(9, 0), at(10, 0));
    let sending = store
        .list(namespace, &window.clone().with_status(MessageStatus::Sending))
        .await
        .unwrap();
    assert_eq!(sending.items.len(), 1);
    assert_eq!(sending.items[0].uid, uids[1]);

    let pending = store
        .list(namespace, &window.with_status(MessageStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.items.len(), 2);
}

pub async fn test_list_pagination<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_list_pages";
    // Five records over two weeks.
    for (i, day) in [5, 6, 7, 8, 9].into_iter().enumerate() {
        store
            .create(namespace, make_log(namespace, at(day, 10), 30 + i as u16))
            .await
            .unwrap();
    }

    let window = ListFilter::between(at(1, 0), at(15, 0));
    let first = store
        .list(namespace, &window.clone().with_page(1, 2))
        .await
        .unwrap();
    let third = store
        .list(namespace, &window.clone().with_page(3, 2))
        .await
        .unwrap();
    let beyond = store
        .list(namespace, &window.with_page(4, 2))
        .await
        .unwrap();

    assert_eq!(first.total, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(third.total, 5);
    assert_eq!(third.items.len(), 1);
    assert_eq!(beyond.total, 5);
    assert!(beyond.items.is_empty());
}

pub async fn test_list_without_shards_is_empty<S: MessageLogStore + ?Sized>(store: &S) {
    let page = store
        .list(
            "test_list_empty",
            &ListFilter::between(at(1, 0), at(29, 0)).with_page(1, 10),
        )
        .await
        .expect("list over missing shards should succeed");
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
}

// =============================================================================
// MessageLogStore::update_status_if tests
// =============================================================================

/// Create M1 in `acme` on Monday 2024-01-08, claim it twice.
pub async fn test_acme_claim_scenario<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "acme";
    let m1 = make_log(namespace, at(8, 0), 40);
    store.create(namespace, m1.clone()).await.unwrap();

    let first = store
        .update_status_if(namespace, m1.uid, MessageStatus::Pending, MessageStatus::Sending)
        .await
        .expect("first claim should not error");
    let second = store
        .update_status_if(namespace, m1.uid, MessageStatus::Pending, MessageStatus::Sending)
        .await
        .expect("second claim should not error");

    assert!(first);
    assert!(!second);
    assert_eq!(
        store.get(namespace, m1.uid).await.unwrap().status,
        MessageStatus::Sending
    );
}

pub async fn test_concurrent_claims_single_winner<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_claim_race";
    let log = make_log(namespace, at(8, 9), 41);
    store.create(namespace, log.clone()).await.unwrap();

    let claims = (0..8).map(|_| store.claim(namespace, log.uid));
    let results = futures::future::join_all(claims).await;

    let winners = results
        .into_iter()
        .map(|result| result.expect("claim should not error"))
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1, "exactly one claimer should win");
}

pub async fn test_full_lifecycle<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_lifecycle";
    let log = make_log(namespace, at(8, 9), 42);
    store.create(namespace, log.clone()).await.unwrap();

    assert!(store.claim(namespace, log.uid).await.unwrap());
    let failed = store
        .record_attempt(namespace, log.uid, Some("connection refused"))
        .await
        .unwrap();
    assert_eq!(failed.retry_total, 1);
    assert_eq!(failed.last_error.as_deref(), Some("connection refused"));

    assert!(store
        .update_status_if(namespace, log.uid, MessageStatus::Sending, MessageStatus::Sent)
        .await
        .unwrap());

    let sent = store.get(namespace, log.uid).await.unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.retry_total, 1);
    assert!(sent.updated_at >= sent.created_at);
}

pub async fn test_cancel_while_sending<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_cancel";
    let log = make_log(namespace, at(8, 9), 43);
    store.create(namespace, log.clone()).await.unwrap();

    assert!(store.claim(namespace, log.uid).await.unwrap());
    assert!(store
        .update_status_if(namespace, log.uid, MessageStatus::Sending, MessageStatus::Cancelled)
        .await
        .unwrap());

    // The delivery worker loses the race and must not mark it sent.
    assert!(!store
        .update_status_if(namespace, log.uid, MessageStatus::Sending, MessageStatus::Sent)
        .await
        .unwrap());
}

pub async fn test_invalid_transition_rejected<S: MessageLogStore + ?Sized>(store: &S) {
    let namespace = "test_invalid_edge";
    let log = make_log(namespace, at(8, 9), 44);
    store.create(namespace, log.clone()).await.unwrap();

    for (old, new) in [
        (MessageStatus::Sent, MessageStatus::Pending),
        (MessageStatus::Failed, MessageStatus::Sending),
        (MessageStatus::Cancelled, MessageStatus::Pending),
        (MessageStatus::Pending, MessageStatus::Sent),
    ] {
        let result = store.update_status_if(namespace, log.uid, old, new).await;
        assert!(
            matches!(result, Err(StorageError::InvalidTransition { .. })),
            "{} -> {} should be rejected, got {:?}",
            old,
            new,
            result
        );
    }

    assert_eq!(
        store.get(namespace, log.uid).await.unwrap().status,
        MessageStatus::Pending
    );
}

pub async fn test_update_missing_is_false<S: MessageLogStore + ?Sized>(store: &S) {
    let applied = store
        .update_status_if(
            "test_update_missing",
            Uid::compose(at(8, 9), 5, 45),
            MessageStatus::Pending,
            MessageStatus::Sending,
        )
        .await
        .expect("CAS on a missing record is not an error");
    assert!(!applied);

    let err = store
        .record_attempt("test_update_missing", Uid::compose(at(8, 9), 5, 45), None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

pub async fn test_invalid_namespace_rejected<S: MessageLogStore + ?Sized>(store: &S) {
    let result = store.list("no spaces allowed", &ListFilter::default()).await;
    assert!(matches!(result, Err(StorageError::InvalidNamespace(_))));

    let result = store.get("", Uid::compose(at(8, 9), 5, 46)).await;
    assert!(matches!(result, Err(StorageError::InvalidNamespace(_))));
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all MessageLogStore tests against a store.
///
/// Records are dated January 2024 with UIDs minted at the same instants, so
/// the list windows below never depend on the current time.
#[macro_export]
macro_rules! run_message_log_store_tests {
    ($store:expr) => {
        use $crate::storage::message_log_store_tests::*;

        // create / get tests
        test_create_and_get_round_trip($store).await;
        println!("  test_create_and_get_round_trip: PASSED");

        test_empty_namespace_is_stamped($store).await;
        println!("  test_empty_namespace_is_stamped: PASSED");

        test_get_missing_is_not_found($store).await;
        println!("  test_get_missing_is_not_found: PASSED");

        test_get_is_namespace_scoped($store).await;
        println!("  test_get_is_namespace_scoped: PASSED");

        test_get_with_lock_returns_record($store).await;
        println!("  test_get_with_lock_returns_record: PASSED");

        test_duplicate_create_rejected($store).await;
        println!("  test_duplicate_create_rejected: PASSED");

        test_namespace_mismatch_rejected($store).await;
        println!("  test_namespace_mismatch_rejected: PASSED");

        test_scheduled_into_later_week($store).await;
        println!("  test_scheduled_into_later_week: PASSED");

        test_send_at_in_week_before_uid($store).await;
        println!("  test_send_at_in_week_before_uid: PASSED");

        test_sub_millisecond_timestamps_round_trip($store).await;
        println!("  test_sub_millisecond_timestamps_round_trip: PASSED");

        // list tests
        test_list_spans_three_weeks($store).await;
        println!("  test_list_spans_three_weeks: PASSED");

        test_list_filters_by_status($store).await;
        println!("  test_list_filters_by_status: PASSED");

        test_list_pagination($store).await;
        println!("  test_list_pagination: PASSED");

        test_list_without_shards_is_empty($store).await;
        println!("  test_list_without_shards_is_empty: PASSED");

        // update_status_if tests
        test_acme_claim_scenario($store).await;
        println!("  test_acme_claim_scenario: PASSED");

        test_concurrent_claims_single_winner($store).await;
        println!("  test_concurrent_claims_single_winner: PASSED");

        test_full_lifecycle($store).await;
        println!("  test_full_lifecycle: PASSED");

        test_cancel_while_sending($store).await;
        println!("  test_cancel_while_sending: PASSED");

        test_invalid_transition_rejected($store).await;
        println!("  test_invalid_transition_rejected: PASSED");

        test_update_missing_is_false($store).await;
        println!("  test_update_missing_is_false: PASSED");

        test_invalid_namespace_rejected($store).await;
        println!("  test_invalid_namespace_rejected: PASSED");
    };
}
