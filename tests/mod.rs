//! Main test module for snapchain
//!
//! This module includes all test suites:
//! - Integration tests for whole backup chains
//! - Property-based tests for diff and snapshot invariants
//! - Edge cases around file names, empty trees and store damage

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use super::integration::{date, BackupHarness};
    use ::snapchain::*;
    use std::fs;

    #[test]
    fn test_empty_source_still_starts_chain() {
        let h = BackupHarness::new();

        let report = h.snapchain.backup(date("2024-03-01")).unwrap();
        assert!(report.is_base);
        assert_eq!(report.file_count, 0);
        assert_eq!(report.artifacts.len(), 1);

        h.write("late.txt", b"late", 1_000);
        let report = h.snapchain.backup(date("2024-03-02")).unwrap();
        assert_eq!(report.changes.added.len(), 1);

        let (target, _) = h.restore("restore", None);
        assert_eq!(fs::read(h.restored(&target, "late.txt")).unwrap(), b"late");
    }

    #[test]
    fn test_special_filenames() {
        let h = BackupHarness::new();
        let special_names = vec![
            "file with spaces.txt",
            "file,with,commas.txt",
            "file\"with\"quotes.txt",
            "file.with.dots.txt",
            "file(with)parens.txt",
            "файл.txt",
            "文件.txt",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            let path = h.source.join(name);
            if fs::write(&path, format!("Content of {}", name)).is_err() {
                // Skip if OS doesn't support this filename
                continue;
            }
            created.push(*name);
        }
        h.snapchain.backup(date("2024-03-01")).unwrap();

        for name in &created {
            h.remove(name);
        }
        let report = h.snapchain.backup(date("2024-03-02")).unwrap();
        assert_eq!(report.changes.removed.len(), created.len());

        // The first date restores every name, the second removes them all again
        let (first, _) = h.restore("first", Some(date("2024-03-01")));
        for name in &created {
            let content = fs::read_to_string(h.restored(&first, name)).unwrap();
            assert_eq!(content, format!("Content of {}", name));
        }
        let (second, report) = h.restore("second", None);
        assert_eq!(report.files_deleted, created.len());
        for name in &created {
            assert!(!h.restored(&second, name).exists());
        }
    }

    #[test]
    fn test_same_second_rewrite_is_invisible() {
        let h = BackupHarness::new();
        h.write("a.txt", b"one", 1_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();

        // Content changes but the timestamp is pinned to the old value
        h.write("a.txt", b"two", 1_000);
        let report = h.snapchain.backup(date("2024-03-02")).unwrap();

        assert!(!report.changes.has_changes());
        assert!(report.artifacts.is_empty());
    }

    #[test]
    fn test_deleted_then_recreated_file() {
        let h = BackupHarness::new();
        h.write("a.txt", b"first", 1_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();
        h.remove("a.txt");
        h.snapchain.backup(date("2024-03-02")).unwrap();
        h.write("a.txt", b"second", 3_000);
        let report = h.snapchain.backup(date("2024-03-03")).unwrap();
        assert_eq!(report.changes.added.len(), 1);

        let (gone, _) = h.restore("gone", Some(date("2024-03-02")));
        assert!(!h.restored(&gone, "a.txt").exists());

        let (back, _) = h.restore("back", None);
        assert_eq!(fs::read(h.restored(&back, "a.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_corrupt_snapshot_fails_backup() {
        let h = BackupHarness::new();
        h.write("a.txt", b"a", 1_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();

        let snapshot = h.snapchain.store().snapshot_path(date("2024-03-01"));
        fs::write(&snapshot, "\"/a\",oops\n").unwrap();

        let err = h.snapchain.backup(date("2024-03-02")).unwrap_err();
        assert!(err.is_corruption());
        assert!(!h.snapchain.store().snapshot_exists(date("2024-03-02")));
    }

    #[test]
    fn test_missing_base_fails_backup_and_restore() {
        let h = BackupHarness::new();
        h.write("a.txt", b"a", 1_000);
        let first = h.snapchain.backup(date("2024-03-01")).unwrap();
        fs::remove_file(&first.artifacts[0].path).unwrap();

        assert!(h.snapchain.backup(date("2024-03-02")).unwrap_err().is_corruption());
        let err = h
            .snapchain
            .restore(&h.target("restore"), RestoreOptions::default())
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_orphan_artifacts_are_replaced_by_rerun() {
        let h = BackupHarness::new();
        h.write("a.txt", b"a", 1_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();

        // Interrupted run: artifact written, snapshot never saved
        let orphan = h.store.join("2024-03-02.added.tar.lz4");
        fs::write(&orphan, b"garbage").unwrap();

        h.write("b.txt", b"b", 2_000);
        h.snapchain.backup(date("2024-03-02")).unwrap();

        let (target, _) = h.restore("restore", None);
        assert_eq!(fs::read(h.restored(&target, "b.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_mixed_compression_store_restores() {
        let h = BackupHarness::new();
        h.write("a.txt", b"a", 1_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();

        let plain = SnapchainBuilder::new()
            .compression(ArchiveCompression::None)
            .build(h.source.clone(), h.store.clone())
            .unwrap();
        h.write("b.txt", b"b", 2_000);
        let report = plain.backup(date("2024-03-02")).unwrap();
        assert!(report.artifacts[0].path.ends_with("2024-03-02.added.tar"));

        let (target, report) = h.restore("restore", None);
        assert_eq!(report.archives_extracted, 2);
        assert!(h.restored(&target, "a.txt").exists());
        assert!(h.restored(&target, "b.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_in_source_does_not_break_chain() {
        use std::os::unix::net::UnixListener;

        let h = BackupHarness::new();
        h.write("a.txt", b"a", 1_000);
        h.write("b.txt", b"b", 2_000);
        h.snapchain.backup(date("2024-03-01")).unwrap();

        h.remove("b.txt");
        let socket = h.source.join("agent.sock");
        let _listener = UnixListener::bind(&socket).unwrap();
        let report = h.snapchain.backup(date("2024-03-02")).unwrap();
        assert_eq!(report.changes.removed.len(), 1);
        assert!(report.changes.added.is_empty());

        let (target, _) = h.restore("restore", None);
        assert!(h.restored(&target, "a.txt").exists());
        assert!(!h.restored(&target, "b.txt").exists());
        assert!(!h.restored(&target, "agent.sock").exists());
        assert!(h.snapchain.verify().unwrap().is_valid());
    }
}
