//! Set / Delete Tests
//!
//! Mutation semantics end-to-end: CAS stamping, checked sets, deletes.

mod common;

use cachet::{CachetError, SetOptions};

use common::MockServer;

// =============================================================================
// Set
// =============================================================================

#[test]
fn test_set_stamps_fresh_cas() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    let cas1 = connection.set(b"id", b"v1").unwrap();
    let cas2 = connection.set(b"id", b"v2").unwrap();
    assert!(cas1 > 0);
    assert_ne!(cas1, cas2);

    let entry = connection.get_extended(b"id").unwrap().unwrap();
    assert_eq!(b"v2".to_vec(), entry.value);
    assert_eq!(cas2, entry.cas);
}

#[test]
fn test_checked_set_with_current_cas() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    let cas1 = connection.set(b"id", b"v1").unwrap();
    let options = SetOptions {
        cas: cas1,
        ..Default::default()
    };
    let cas2 = connection.set_with(b"id", b"v2", &options).unwrap();
    assert_ne!(cas1, cas2);

    let entry = connection.get_extended(b"id").unwrap().unwrap();
    assert_eq!(b"v2".to_vec(), entry.value);
}

#[test]
fn test_checked_set_with_stale_cas() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    let cas1 = connection.set(b"id", b"v1").unwrap();
    connection.set(b"id", b"v2").unwrap();

    let stale = SetOptions {
        cas: cas1,
        ..Default::default()
    };
    assert!(matches!(
        connection.set_with(b"id", b"v3", &stale),
        Err(CachetError::KeyExists)
    ));

    // The losing write must not have clobbered the entry.
    assert_eq!(Some(b"v2".to_vec()), connection.get(b"id").unwrap());
}

#[test]
fn test_checked_set_on_missing_key() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    // Quiet policy is a get-side concern; a failed conditional store is an
    // error even on a quiet connection.
    let options = SetOptions {
        cas: 42,
        ..Default::default()
    };
    assert!(matches!(
        connection.set_with(b"missing", b"v", &options),
        Err(CachetError::NotFound)
    ));
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn test_delete() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    connection.set(b"id", b"v").unwrap();
    assert!(connection.delete(b"id").unwrap());
    assert_eq!(None, connection.get(b"id").unwrap());

    // Already gone; quiet mode reports that without an error.
    assert!(!connection.delete(b"id").unwrap());
}

#[test]
fn test_delete_missing_in_verbose_mode() {
    let server = MockServer::start();
    let mut connection = server.client(false);

    assert!(matches!(
        connection.delete(b"missing"),
        Err(CachetError::NotFound)
    ));
}

// =============================================================================
// Mutations Inside Runs
// =============================================================================

#[test]
fn test_fire_and_forget_mutations() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    connection
        .run(|conn| {
            conn.set_discard(b"a", b"1", &SetOptions::default())?;
            conn.set_discard(b"b", b"2", &SetOptions::default())?;
            conn.delete(b"a")?;
            assert_eq!(3, conn.seqno());
            Ok(())
        })
        .unwrap();

    assert_eq!(None, connection.get(b"a").unwrap());
    assert_eq!(Some(b"2".to_vec()), connection.get(b"b").unwrap());
}

#[test]
fn test_pipelined_set_then_get() {
    let server = MockServer::start();
    let mut connection = server.client(true);

    let mut new_cas = 0;
    let mut value = None;
    connection
        .run(|conn| {
            conn.set(b"id", b"pipelined", &SetOptions::default(), |stored| {
                new_cas = stored.cas
            })?;
            conn.get(b"id", |fetched| value = fetched.value)?;
            assert_eq!(2, conn.seqno());
            Ok(())
        })
        .unwrap();

    assert!(new_cas > 0);
    assert_eq!(Some(b"pipelined".to_vec()), value);
}
