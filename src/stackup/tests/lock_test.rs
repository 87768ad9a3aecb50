mod common;

use stackup::{BootstrapError, ProjectLock};

#[test]
fn test_lock_is_exclusive_and_released_on_drop() {
    let (_dir, root) = common::temp_project();

    let lock = ProjectLock::acquire(&root).unwrap();
    assert!(lock.path().exists());
    let pid = std::fs::read_to_string(lock.path()).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    let err = ProjectLock::acquire(&root).unwrap_err();
    assert!(matches!(err, BootstrapError::Locked(_)));

    let path = lock.path().to_path_buf();
    drop(lock);
    assert!(!path.exists());
    ProjectLock::acquire(&root).unwrap();
}

#[test]
fn test_stale_lock_is_reclaimed() {
    let (_dir, root) = common::temp_project();
    // PID beyond the kernel's pid_max: never alive
    std::fs::write(root.lock_file(), "4194305\n").unwrap();

    let lock = ProjectLock::acquire(&root).unwrap();
    let pid = std::fs::read_to_string(lock.path()).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
}

#[test]
fn test_ownerless_lock_is_held() {
    let (_dir, root) = common::temp_project();

    // A lock caught before its owner is known must not be taken over
    for content in ["", "garbage"] {
        std::fs::write(root.lock_file(), content).unwrap();
        let err = ProjectLock::acquire(&root).unwrap_err();
        assert!(matches!(err, BootstrapError::Locked(_)));
        assert_eq!(std::fs::read_to_string(root.lock_file()).unwrap(), content);
    }
}

#[test]
fn test_lock_leaves_no_temporary_files() {
    let (_dir, root) = common::temp_project();
    let lock = ProjectLock::acquire(&root).unwrap();
    assert!(ProjectLock::acquire(&root).is_err());

    let entries: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from(".stackup.lock")]);
    drop(lock);
}
