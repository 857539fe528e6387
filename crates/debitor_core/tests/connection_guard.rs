mod support;

use debitor_core::db::{RowError, SqlValue};
use debitor_core::{ConnectionGuard, FailureKind, GuardOutcome};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use support::{timeout_error, vendor_error, FakeDriver, FakeRow};

const CONN: &str = "fake://debitors";

#[test]
fn query_streams_rows_in_store_order_and_closes_once() {
    let driver = FakeDriver::with_rows(vec![
        FakeRow::debitor(2, "Zeta", ""),
        FakeRow::debitor(1, "Alpha", ""),
        FakeRow::debitor(2, "Zeta", ""),
    ]);
    let guard = ConnectionGuard::new(driver.clone());

    let mut names = Vec::new();
    let outcome = guard.execute_query(CONN, "SELECT name FROM debitors", |_| {}, |row| {
        names.push(row.get_text("name")?.unwrap_or_default());
        Ok(())
    });

    assert_eq!(outcome, GuardOutcome::Completed(3));
    assert_eq!(names, vec!["Zeta", "Alpha", "Zeta"]);
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert!(!guard.is_tripped());
}

#[test]
fn non_query_binds_once_and_reports_affected_rows() {
    let driver = FakeDriver::new();
    driver.script().affected = 1;
    let guard = ConnectionGuard::new(driver.clone());

    let mut binder_calls = 0;
    let outcome = guard.execute_non_query(CONN, "DELETE FROM debitors WHERE id = :id", |params| {
        binder_calls += 1;
        params.add(":id", 9_i64);
    });

    assert_eq!(outcome, GuardOutcome::Completed(1));
    assert_eq!(binder_calls, 1);
    let statements = driver.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].params.get(":id"), Some(&SqlValue::Integer(9)));
    assert_eq!(driver.closes(), 1);
}

#[test]
fn timeout_on_open_trips_latch_without_close() {
    let driver = FakeDriver::new();
    driver.fail_open(timeout_error());
    let guard = ConnectionGuard::new(driver.clone());

    let outcome = guard.execute_query(CONN, "SELECT 1", |_| {}, |_| Ok(()));

    match outcome {
        GuardOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::ConnectionTimeout);
            assert_eq!(failure.code, Some(14));
            assert!(failure.first_trip);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(guard.is_tripped());
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 0);
}

#[test]
fn vendor_error_on_execute_trips_latch_and_keeps_code() {
    let driver = FakeDriver::new();
    driver.fail_execute(vendor_error());
    let guard = ConnectionGuard::new(driver.clone());

    let outcome = guard.execute_non_query(CONN, "INSERT INTO debitors (name) VALUES (:n)", |p| {
        p.add("n", "Acme");
    });

    match outcome {
        GuardOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::StoreError);
            assert_eq!(failure.code, Some(2067));
            assert!(failure.message.contains("UNIQUE"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(guard.is_tripped());
    assert_eq!(driver.closes(), 1);
}

#[test]
fn tripped_latch_short_circuits_every_later_call_without_io() {
    let driver = FakeDriver::new();
    driver.fail_open(timeout_error());
    let guard = ConnectionGuard::new(driver.clone());
    assert!(matches!(
        guard.execute_query(CONN, "SELECT 1", |_| {}, |_| Ok(())),
        GuardOutcome::Failed(_)
    ));

    driver.script().open_error = None;
    let opens_after_trip = driver.opens();

    for _ in 0..5 {
        let mut bound = false;
        let mut handled = false;
        let query = guard.execute_query(
            CONN,
            "SELECT 1",
            |_| bound = true,
            |_| {
                handled = true;
                Ok(())
            },
        );
        assert_eq!(query, GuardOutcome::ShortCircuited);
        assert!(!bound);
        assert!(!handled);

        let write = guard.execute_non_query(CONN, "DELETE FROM debitors", |_| bound = true);
        assert_eq!(write, GuardOutcome::ShortCircuited);
        assert!(!bound);
    }

    assert_eq!(driver.opens(), opens_after_trip);
    assert!(driver.statements().is_empty());
}

#[test]
fn failing_row_handler_trips_latch_and_still_closes_once() {
    let driver = FakeDriver::with_rows(vec![
        FakeRow::debitor(1, "Acme", ""),
        FakeRow::debitor(2, "Beta", ""),
    ]);
    let guard = ConnectionGuard::new(driver.clone());

    let mut seen = 0;
    let outcome = guard.execute_query(CONN, "SELECT id FROM debitors", |_| {}, |_| {
        seen += 1;
        Err(RowError::MissingColumn("ID".to_string()))
    });

    match outcome {
        GuardOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Unclassified),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(seen, 1);
    assert!(guard.is_tripped());
    assert_eq!(driver.closes(), 1);
}

#[test]
fn panicking_row_handler_still_closes_connection_once() {
    let driver = FakeDriver::with_rows(vec![FakeRow::debitor(1, "Acme", "")]);
    let guard = ConnectionGuard::new(driver.clone());

    let result = catch_unwind(AssertUnwindSafe(|| {
        guard.execute_query(CONN, "SELECT id FROM debitors", |_| {}, |_| {
            panic!("handler blew up");
        })
    }));

    assert!(result.is_err());
    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
}

#[test]
fn unreachable_notice_is_handed_out_once() {
    let driver = FakeDriver::new();
    driver.fail_open(timeout_error());
    let guard = ConnectionGuard::new(driver);

    assert!(!guard.take_unreachable_notice());
    let first = guard.execute_query(CONN, "SELECT 1", |_| {}, |_| Ok(()));
    assert!(matches!(first, GuardOutcome::Failed(_)));
    assert!(guard.take_unreachable_notice());
    assert!(!guard.take_unreachable_notice());
}

#[test]
fn concurrent_failures_trip_exactly_once() {
    let driver = FakeDriver::new();
    driver.fail_open(timeout_error());
    let guard = Arc::new(ConnectionGuard::new(driver));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let guard = Arc::clone(&guard);
            thread::spawn(move || guard.execute_query(CONN, "SELECT 1", |_| {}, |_| Ok(())))
        })
        .collect();

    let first_trips = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|outcome| matches!(outcome, GuardOutcome::Failed(failure) if failure.first_trip))
        .count();

    assert_eq!(first_trips, 1);
    assert!(guard.is_tripped());
}
