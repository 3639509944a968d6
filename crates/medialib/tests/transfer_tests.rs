//! File transfer engine: no-overwrite placement and link fallback.

mod common;

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::TestHarness;
use medialib::storage::{FileOps, FileTransferEngine, LocalFileOps, TransferRequest};

#[test]
fn test_existing_destination_gets_numbered_name() {
    let harness = TestHarness::new();
    harness.write("drop", "a.jpg", b"new pixels");
    let existing = harness.write("images", "2026/a.jpg", b"old pixels");
    harness.write("images", "2026/a_1.jpg", b"older pixels");

    let engine = FileTransferEngine::new(harness.registry.clone());
    let request = TransferRequest::new("images", "a.jpg")
        .from_endpoint("drop", "a.jpg")
        .dest_folder("2026")
        .keep_original(true);
    let outcome = engine.transfer(&request).unwrap();

    assert_eq!(outcome.relative_path, "2026/a_2.jpg");
    assert_eq!(std::fs::read(&outcome.absolute_path).unwrap(), b"new pixels");
    assert_eq!(std::fs::read(&existing).unwrap(), b"old pixels");
    assert!(harness.root("drop").join("a.jpg").exists());
}

#[test]
fn test_link_placement_does_not_overwrite() {
    let harness = TestHarness::new();
    harness.write("drop", "a.jpg", b"new pixels");
    let existing = harness.write("images", "x/a.jpg", b"old pixels");

    let engine = FileTransferEngine::new(harness.registry.clone());
    let request = TransferRequest::new("images", "a.jpg")
        .from_endpoint("drop", "a.jpg")
        .dest_folder("x")
        .link(true)
        .keep_original(true);
    let outcome = engine.transfer(&request).unwrap();

    assert!(outcome.linked);
    assert_eq!(outcome.relative_path, "x/a_1.jpg");
    assert_eq!(std::fs::read(&existing).unwrap(), b"old pixels");
}

/// Fails every hard link as if source and destination were on different
/// filesystems.
#[derive(Default)]
struct CrossDeviceOps {
    link_calls: AtomicUsize,
    copy_calls: AtomicUsize,
}

impl FileOps for CrossDeviceOps {
    fn hard_link(&self, _src: &Path, _dst: &Path) -> io::Result<()> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::from(io::ErrorKind::CrossesDevices))
    }

    fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<u64> {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        LocalFileOps.copy_new(src, dst)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        LocalFileOps.remove(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFileOps.create_dir_all(path)
    }
}

#[test]
fn test_cross_device_link_falls_back_to_copy() {
    let harness = TestHarness::new();
    harness.write("drop", "a.jpg", b"pixels");
    harness.write("images", "x/a.jpg", b"taken");
    harness.write("images", "x/a_1.jpg", b"taken");

    let ops = Arc::new(CrossDeviceOps::default());
    let engine = FileTransferEngine::with_ops(harness.registry.clone(), ops.clone());
    let request = TransferRequest::new("images", "a.jpg")
        .from_endpoint("drop", "a.jpg")
        .dest_folder("x")
        .link(true)
        .keep_original(false);
    let outcome = engine.transfer(&request).unwrap();

    assert!(!outcome.linked);
    assert!(outcome.source_removed);
    assert_eq!(outcome.relative_path, "x/a_2.jpg");
    assert_eq!(std::fs::read(&outcome.absolute_path).unwrap(), b"pixels");
    // One failed link attempt, then copies for every remaining candidate.
    assert_eq!(ops.link_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ops.copy_calls.load(Ordering::SeqCst), 3);
    assert!(!harness.root("drop").join("a.jpg").exists());
}

#[test]
fn test_remove_stored_file() {
    let harness = TestHarness::new();
    harness.write("images", "2026/a.jpg", b"pixels");
    let engine = FileTransferEngine::new(harness.registry.clone());

    assert!(engine.remove("images", "2026/a.jpg").unwrap());
    assert!(!engine.remove("images", "2026/a.jpg").unwrap());
    assert!(engine.remove("images", "../escape.jpg").is_err());
}
