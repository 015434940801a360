use crate::lock::{BuildLock, LOCK_FILE};

#[test]
fn test_acquire_creates_lock_file() {
    let tmp = tempfile::tempdir().unwrap();
    let lock = BuildLock::acquire(tmp.path()).unwrap();
    assert_eq!(lock.path(), tmp.path().join(LOCK_FILE));
    assert!(lock.path().is_file());
}

#[test]
fn test_lock_is_exclusive_until_dropped() {
    let tmp = tempfile::tempdir().unwrap();

    let held = BuildLock::acquire(tmp.path()).unwrap();
    assert!(BuildLock::try_acquire(tmp.path()).unwrap().is_none());

    drop(held);
    assert!(BuildLock::try_acquire(tmp.path()).unwrap().is_some());
}

#[test]
fn test_acquire_in_missing_directory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let err = BuildLock::acquire(&tmp.path().join("missing")).unwrap_err();
    assert!(matches!(err, crate::Error::Lock { .. }), "unexpected error: {err}");
}
