//! Integration tests for the data source pool: eviction reports, the
//! background reaper, reconnects and control connection growth.

mod support;

use doquedb_client::{ClientError, DataSource, ResultStatus};
use doquedb_protocol::{AvailabilityTarget, Request, Value};
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use support::{wait_for, MockServer};

/// Leaves `count` idle channels in the pool by holding that many result
/// sets open at once, then draining them.
fn fill_pool(ds: &DataSource, count: usize) {
    let session = ds.create_session("db").unwrap();
    let mut open: Vec<_> = (0..count)
        .map(|_| session.execute_statement("select * from t", &[]).unwrap())
        .collect();
    for rs in &mut open {
        assert_eq!(rs.close().unwrap(), ResultStatus::Success);
    }
    drop(open);
    session.close();
}

#[test]
fn test_open_and_close() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    assert!(!ds.is_open());

    ds.open().unwrap();
    assert!(ds.is_open());
    assert_eq!(ds.connection_count(), 1);
    assert_eq!(ds.master_id(), server.config().protocol_version);

    ds.close();
    assert!(!ds.is_open());
    assert_eq!(ds.connection_count(), 0);
    assert!(server.count(Request::EndConnection) >= 1);

    // Idempotent.
    ds.close();
}

#[test]
fn test_session_before_open_is_rejected() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    assert!(matches!(ds.create_session("db"), Err(ClientError::NotOpen)));
}

#[test]
fn test_close_invalidates_sessions() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();

    let session = ds.create_session("db").unwrap();
    assert!(session.is_valid());
    assert_eq!(ds.session_count(), 1);

    ds.close();
    assert!(!session.is_valid());
    assert_eq!(session.id(), 0);
    assert_eq!(ds.session_count(), 0);
    assert_eq!(server.count(Request::EndSession), 1);
    assert!(matches!(
        session.execute_statement("select 1", &[]),
        Err(ClientError::InvalidSession)
    ));
}

#[test]
fn test_eviction_reported_once() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config().with_pool_cap(2));
    ds.open().unwrap();

    fill_pool(&ds, 5);
    assert_eq!(ds.pooled_channels(), 5);

    ds.maintain();
    assert_eq!(ds.pooled_channels(), 2);
    let reported = server.reported();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].len(), 3);

    let stats = ds.stats();
    assert_eq!(stats.reaper_cycles, 1);
    assert_eq!(stats.evicted_channels, 3);
    assert_eq!(stats.reported_ids, 3);
    assert_eq!(stats.report_failures, 0);

    // Within the cap nothing more is evicted or reported.
    ds.maintain();
    assert_eq!(ds.pooled_channels(), 2);
    assert_eq!(server.reported().len(), 1);
    assert_eq!(ds.stats().reaper_cycles, 2);
}

#[test]
fn test_reaper_trims_in_background() {
    let server = MockServer::start();
    let config = server
        .config()
        .with_pool_cap(1)
        .with_check_pool_period(Duration::from_millis(50));
    let ds = DataSource::new(config);
    ds.open().unwrap();

    fill_pool(&ds, 3);

    let trimmed = wait_for(Duration::from_secs(3), || {
        ds.pooled_channels() <= 1 && !server.reported().is_empty()
    });
    assert!(trimmed);
    assert!(ds.stats().reaper_cycles > 0);
    assert!(ds.stats().evicted_channels >= 1);
}

#[test]
fn test_reconnect_without_sessions() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();

    server.break_connections();

    let session = ds.create_session("db").unwrap();
    assert!(session.is_valid());
    assert!(ds.is_open());
    assert_eq!(ds.stats().reconnects, 1);
    assert_eq!(server.count(Request::BeginConnection), 2);
}

#[test]
fn test_reconnect_after_failed_control_exchange() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();

    server.break_connections();
    assert!(ds.is_server_available().unwrap_err().is_transport());
    // The dead control connection left the rotation.
    assert!(matches!(
        ds.is_database_available(1),
        Err(ClientError::ConnectionLost)
    ));

    let session = ds.create_session("db").unwrap();
    assert!(session.is_valid());
    assert!(ds.is_open());
    assert_eq!(ds.connection_count(), 1);
    assert_eq!(ds.stats().reconnects, 1);
    assert_eq!(server.count(Request::BeginConnection), 2);
    assert!(ds.is_server_available().unwrap());
}

#[test]
fn test_no_reconnect_with_live_sessions() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();
    let _first = ds.create_session("db").unwrap();

    server.break_connections();

    let err = ds.create_session("db").unwrap_err();
    assert!(err.is_transport());
    assert_eq!(ds.stats().reconnects, 0);
    assert_eq!(server.count(Request::BeginConnection), 1);
}

#[test]
fn test_failed_reconnect_leaves_source_reopenable() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();

    server.refuse_new(true);
    server.break_connections();

    let err = ds.create_session("db").unwrap_err();
    assert!(err.is_transport());
    assert!(!ds.is_open());
    assert_eq!(ds.stats().reconnects, 1);

    server.refuse_new(false);
    let session = ds.create_session("db").unwrap();
    assert!(session.is_valid());
    assert!(ds.is_open());
}

#[test]
fn test_control_connections_grow_with_sessions() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config().with_connection_threshold(1));
    ds.open().unwrap();

    let _a = ds.create_session("db").unwrap();
    assert_eq!(ds.connection_count(), 1);

    let _b = ds.create_session("db").unwrap();
    assert_eq!(ds.connection_count(), 2);
    assert_eq!(ds.stats().connections_spawned, 1);

    // Work keeps flowing through either connection.
    let c = ds.create_session("db").unwrap();
    let mut rs = c.execute_statement("select * from t", &[]).unwrap();
    assert_eq!(rs.close().unwrap(), ResultStatus::Success);
}

#[test]
fn test_control_connections_take_turns() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config().with_connection_threshold(2));
    ds.open().unwrap();

    let _held: Vec<_> = (0..3).map(|_| ds.create_session("db").unwrap()).collect();
    assert_eq!(ds.connection_count(), 2);

    let before = server.begin_worker_slaves().len();
    for _ in 0..6 {
        // One BEGIN_WORKER to begin the session, one to end it.
        drop(ds.create_session("db").unwrap());
    }
    assert_eq!(ds.connection_count(), 2);

    let turns = server.begin_worker_slaves().split_off(before);
    assert_eq!(turns.len(), 12);
    assert!(
        turns.windows(2).all(|pair| pair[0] != pair[1]),
        "control connections did not alternate: {:?}",
        turns
    );
    let distinct: HashSet<i32> = turns.into_iter().collect();
    assert_eq!(distinct.len(), 2);
}

#[test]
fn test_concurrent_result_sets_get_distinct_channels() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();
    let session = ds.create_session("db").unwrap();

    let streams = 4;
    let barrier = Barrier::new(streams);
    thread::scope(|scope| {
        for _ in 0..streams {
            scope.spawn(|| {
                let mut rs = session.execute_statement("select * from t", &[]).unwrap();
                let mut tuple = Value::Null;
                assert_eq!(rs.get_next_tuple(&mut tuple).unwrap(), ResultStatus::MetaData);
                // Every stream holds its channel until all have started.
                barrier.wait();
                assert_eq!(rs.close().unwrap(), ResultStatus::Success);
            });
        }
    });

    let slaves = server.execute_slaves();
    assert_eq!(slaves.len(), streams);
    let distinct: HashSet<i32> = slaves.into_iter().collect();
    assert_eq!(distinct.len(), streams);
    assert_eq!(ds.pooled_channels(), streams);
}

#[test]
fn test_close_ends_sessions_outside_lifecycle_lock() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();
    let session = ds.create_session("db").unwrap();

    server.stall_end_session(Duration::from_millis(1500));
    thread::scope(|scope| {
        let closer = scope.spawn(|| ds.close());
        assert!(wait_for(Duration::from_secs(3), || {
            server.count(Request::EndSession) == 1
        }));

        let started = Instant::now();
        assert!(!ds.is_open());
        assert!(matches!(ds.create_session("db"), Err(ClientError::NotOpen)));
        assert!(started.elapsed() < Duration::from_millis(1000));

        closer.join().unwrap();
    });

    assert!(!session.is_valid());
    assert_eq!(ds.connection_count(), 0);
    assert_eq!(ds.session_count(), 0);
}

#[test]
fn test_availability() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());
    ds.open().unwrap();

    assert!(ds.is_server_available().unwrap());
    assert!(ds
        .is_database_available(AvailabilityTarget::DATABASE_ALL)
        .unwrap());
    assert_eq!(server.count(Request::CheckAvailability), 2);
}

#[test]
fn test_shutdown_falls_back_to_plain_request() {
    let server = MockServer::start();
    let ds = DataSource::new(server.config());

    ds.shutdown_with_credentials("root", "secret").unwrap();

    let requests: Vec<Request> = server
        .requests()
        .into_iter()
        .filter(|r| matches!(r, Request::Shutdown | Request::Shutdown2))
        .collect();
    assert_eq!(requests, vec![Request::Shutdown2, Request::Shutdown]);
}
