//! Tests for the locking core.
//!
//! Multi-process scenarios spawn helper processes by re-running the current
//! test binary with `--exact` on the `child_entry` dispatcher below, which
//! does nothing unless the mode environment variable is set.

use super::*;
use crate::identity;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CHILD_MODE_VAR: &str = "FILEMUTEX_CHILD_MODE";
const CHILD_PATH_VAR: &str = "FILEMUTEX_CHILD_PATH";
const CHILD_OUT_VAR: &str = "FILEMUTEX_CHILD_OUT";

fn spawn_child(mode: &str, path: &Path, out: &Path) -> Child {
    Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "mutex::tests::child_entry", "--test-threads=1"])
        .env(CHILD_MODE_VAR, mode)
        .env(CHILD_PATH_VAR, path)
        .env(CHILD_OUT_VAR, out)
        .spawn()
        .expect("failed to spawn helper process")
}

/// Wait for a child-written marker file to appear.
fn wait_for_file(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !path.exists() {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for '{}'",
            path.display()
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Dispatcher for helper child processes.
///
/// A plain test run sees no mode variable and returns immediately.
#[test]
fn child_entry() {
    let Ok(mode) = std::env::var(CHILD_MODE_VAR) else {
        return;
    };
    let path = PathBuf::from(std::env::var(CHILD_PATH_VAR).unwrap());
    let out = PathBuf::from(std::env::var(CHILD_OUT_VAR).unwrap());

    match mode.as_str() {
        // Hold the lock for a while, signalling through the marker file
        // once it is held.
        "hold" => {
            let guard = lock_guard(&path).unwrap();
            fs::write(&out, b"held").unwrap();
            std::thread::sleep(Duration::from_millis(400));
            drop(guard);
        }
        // Single non-blocking attempt; report the outcome.
        "try" => {
            let acquired = try_lock(&path).unwrap();
            if acquired {
                unlock(&path).unwrap();
            }
            fs::write(&out, if acquired { "true" } else { "false" }).unwrap();
        }
        // Block until acquired, then report the identity that was locked.
        "acquire-report" => {
            lock(&path).unwrap();
            let identity = identity::identity_of(&path).unwrap();
            fs::write(&out, format!("{}:{}", identity.device, identity.inode)).unwrap();
            unlock(&path).unwrap();
        }
        // Guard the counter's lockfile, then increment the counter.
        "increment" => {
            let lock_path = path.with_extension("lock");
            let guard = lock_guard(&lock_path).unwrap();
            let value: u64 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
            fs::write(&path, (value + 1).to_string()).unwrap();
            drop(guard);
            fs::write(&out, b"done").unwrap();
        }
        other => panic!("unknown child mode: {}", other),
    }
}

#[test]
fn reentrant_acquisitions_balance_to_zero() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("re.lock");
    let table = LockTable::new();

    let identity = table.acquire(&path, false).unwrap();
    for _ in 0..4 {
        assert_eq!(table.acquire(&path, false).unwrap(), identity);
    }
    assert_eq!(table.reference_count(identity), 5);

    // N-1 releases leave the lock held and the file in place.
    for expected in (1..=4).rev() {
        table.release_identity(identity, false).unwrap();
        assert_eq!(table.reference_count(identity), expected);
        assert!(path.exists());
    }

    table.release_identity(identity, false).unwrap();
    assert_eq!(table.reference_count(identity), 0);
    // Fully released and never written to: the lockfile is reclaimed.
    assert!(!path.exists());
}

#[test]
fn try_lock_is_reentrant_within_a_process() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("try.lock");

    assert!(try_lock(&path).unwrap());
    assert!(try_lock(&path).unwrap());
    unlock(&path).unwrap();
    assert!(path.exists());
    unlock(&path).unwrap();
    assert!(!path.exists());
}

#[test]
fn lockfile_with_content_is_never_reclaimed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.lock");

    lock(&path).unwrap();
    fs::write(&path, b"x").unwrap();
    unlock(&path).unwrap();

    assert!(path.exists());
    assert_eq!(fs::read(&path).unwrap(), b"x");
}

#[test]
fn keep_empty_preserves_the_lockfile() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("keep.lock");

    lock(&path).unwrap();
    unlock_with(&path, &LockOptions::new().with_keep_empty(true)).unwrap();

    assert!(path.exists());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    fs::remove_file(&path).unwrap();
}

#[test]
fn lock_creates_missing_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("deep").join("a.lock");

    lock(&path).unwrap();
    assert!(path.exists());
    unlock(&path).unwrap();
}

#[test]
fn lock_rejects_directories_and_malformed_paths() {
    let temp_dir = TempDir::new().unwrap();

    let result = lock(temp_dir.path());
    assert!(matches!(result, Err(FileMutexError::InvalidTarget(_))));

    let result = lock(Path::new(""));
    assert!(matches!(result, Err(FileMutexError::InvalidPath(_))));

    let trailing = format!("{}/", temp_dir.path().join("x.lock").display());
    let result = lock(Path::new(&trailing));
    assert!(matches!(result, Err(FileMutexError::InvalidPath(_))));
}

#[test]
fn unlock_of_missing_path_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let result = unlock(temp_dir.path().join("absent.lock"));
    assert!(matches!(result, Err(FileMutexError::NotFound(_))));
}

#[test]
fn unlock_of_unheld_path_is_a_noop() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("unheld.lock");
    fs::write(&path, b"content").unwrap();

    unlock(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn guard_rolls_back_on_partial_failure() {
    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("a.lock");
    let table = LockTable::new();

    // The second path is a directory, so its acquisition fails.
    let result = LockGuard::acquire_with(
        &table,
        [good.as_path(), temp_dir.path()],
        &LockOptions::default(),
    );
    assert!(matches!(result, Err(FileMutexError::InvalidTarget(_))));

    // The first path was released during rollback and its empty lockfile
    // reclaimed.
    assert!(!good.exists());
}

#[test]
fn guard_releases_all_paths_on_drop() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a.lock");
    let b = temp_dir.path().join("b.lock");

    let guard = lock_guard_all([&a, &b]).unwrap();
    assert_eq!(guard.paths().count(), 2);
    assert!(a.exists());
    assert!(b.exists());
    drop(guard);

    assert!(!a.exists());
    assert!(!b.exists());
}

#[test]
fn try_lock_guard_succeeds_reentrantly() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("g.lock");

    let first = try_lock_guard(&path).unwrap();
    assert!(first.is_some());
    // Same process: the second attempt takes the reentrancy path.
    let second = try_lock_guard(&path).unwrap();
    assert!(second.is_some());

    drop(second);
    assert!(path.exists());
    drop(first);
    assert!(!path.exists());
}

#[test]
fn threads_of_one_process_share_the_hold() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("threads.lock");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            std::thread::spawn(move || {
                lock(&path).unwrap();
                std::thread::sleep(Duration::from_millis(5));
                unlock(&path).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Balanced acquire/release across threads: nothing left held.
    assert!(!path.exists());
}

#[test]
fn explicit_table_releases_everything_on_drop() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scoped.lock");

    let table = LockTable::new();
    table.acquire(&path, false).unwrap();
    table.acquire(&path, false).unwrap();
    drop(table);

    // Teardown keeps files on disk but drops the OS lock, so the path is
    // immediately lockable again.
    assert!(path.exists());
    assert!(try_lock(&path).unwrap());
    unlock(&path).unwrap();
}

#[test]
#[serial]
fn try_lock_against_a_holder_process_fails_then_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("contended.lock");
    let marker = temp_dir.path().join("held");

    let mut holder = spawn_child("hold", &path, &marker);
    wait_for_file(&marker);

    // The holder sleeps with the lock held: a single attempt fails fast.
    let started = Instant::now();
    assert!(!try_lock(&path).unwrap());
    assert!(started.elapsed() < Duration::from_millis(200));

    assert!(holder.wait().unwrap().success());
    assert!(try_lock(&path).unwrap());
    unlock(&path).unwrap();
}

#[test]
#[serial]
fn child_try_lock_observes_parent_hold() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("parent.lock");

    let guard = lock_guard(&path).unwrap();
    let busy_out = temp_dir.path().join("busy");
    let mut child = spawn_child("try", &path, &busy_out);
    assert!(child.wait().unwrap().success());
    assert_eq!(fs::read_to_string(&busy_out).unwrap(), "false");

    drop(guard);
    let free_out = temp_dir.path().join("free");
    let mut child = spawn_child("try", &path, &free_out);
    assert!(child.wait().unwrap().success());
    assert_eq!(fs::read_to_string(&free_out).unwrap(), "true");
}

#[test]
#[serial]
fn blocked_acquire_observes_the_recreated_identity() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("swap.lock");
    let out = temp_dir.path().join("out");

    let guard = lock_guard(&path).unwrap();
    let original = identity::identity_of(&path).unwrap();

    let mut child = spawn_child("acquire-report", &path, &out);
    // Give the child time to open the original inode and block in flock.
    std::thread::sleep(Duration::from_millis(300));

    // Swap the lockfile out from under the waiting child.
    fs::remove_file(&path).unwrap();
    fs::write(&path, b"").unwrap();
    let recreated = identity::identity_of(&path).unwrap();
    assert_ne!(original, recreated);

    drop(guard);
    assert!(child.wait().unwrap().success());

    // The child must have locked the new identity, never the stale one.
    let reported = fs::read_to_string(&out).unwrap();
    assert_eq!(
        reported,
        format!("{}:{}", recreated.device, recreated.inode)
    );
}

#[test]
#[serial]
fn fifty_workers_increment_the_counter_exactly_fifty_times() {
    let temp_dir = TempDir::new().unwrap();
    let counter = temp_dir.path().join("counter");
    fs::write(&counter, "0").unwrap();

    let children: Vec<Child> = (0..50)
        .map(|i| {
            let out = temp_dir.path().join(format!("done-{}", i));
            spawn_child("increment", &counter, &out)
        })
        .collect();
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    assert_eq!(fs::read_to_string(&counter).unwrap().trim(), "50");
    // The guard path was only ever empty, so the last worker reclaimed it.
    assert!(!counter.with_extension("lock").exists());
}
