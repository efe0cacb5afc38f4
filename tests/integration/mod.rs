//! Integration tests for snapchain
//!
//! Runs whole backup chains over a real directory tree and restores them,
//! checking the artifacts written and the restored trees.

use ::snapchain::*;
use chrono::NaiveDate;
use filetime::FileTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;
use tracing_test::traced_test;
use walkdir::WalkDir;

/// Test harness owning a source tree, a store and a Snapchain over them
pub struct BackupHarness {
    pub temp_dir: TempDir,
    pub source: PathBuf,
    pub store: PathBuf,
    pub snapchain: Snapchain,
}

impl BackupHarness {
    /// Create a harness with default settings
    pub fn new() -> Self {
        Self::with_builder(SnapchainBuilder::new())
    }

    /// Create a harness from a configured builder
    pub fn with_builder(builder: SnapchainBuilder) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = fs::canonicalize(temp_dir.path()).unwrap();
        let source = base.join("source");
        let store = base.join("store");
        fs::create_dir_all(&source).unwrap();

        let snapchain = builder.build(source.clone(), store.clone()).unwrap();
        Self {
            temp_dir,
            source,
            store,
            snapchain,
        }
    }

    /// Write a source file with a pinned modification time
    pub fn write(&self, rel: &str, content: &[u8], mtime_secs: i64) {
        let path = self.source.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    /// Remove a source file
    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.source.join(rel)).unwrap();
    }

    /// Fresh, not yet existing restore target
    pub fn target(&self, name: &str) -> PathBuf {
        fs::canonicalize(self.temp_dir.path()).unwrap().join(name)
    }

    /// Restore into a fresh target named `name`
    pub fn restore(&self, name: &str, date: Option<NaiveDate>) -> (PathBuf, RestoreReport) {
        let target = self.target(name);
        let options = RestoreOptions {
            target_date: date,
            ..RestoreOptions::default()
        };
        let report = self.snapchain.restore(&target, options).unwrap();
        (target, report)
    }

    /// Location of a source file inside a restore target
    pub fn restored(&self, target: &Path, rel: &str) -> PathBuf {
        target.join(archive_member_name(&self.source.join(rel)))
    }

    /// Contents of a restored tree, relative to the restored source root
    pub fn restored_tree(&self, target: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let root = target.join(archive_member_name(&self.source));
        read_tree(&root)
    }

    /// Contents of the source tree
    pub fn source_tree(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        read_tree(&self.source)
    }
}

impl Default for BackupHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Map of relative path to content for every file under `root`
pub fn read_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    if !root.exists() {
        return BTreeMap::new();
    }
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

pub fn date(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
}

fn kinds(report: &BackupReport) -> Vec<ArtifactKind> {
    report.artifacts.iter().map(|a| a.kind).collect()
}

#[test]
fn test_first_run_archives_everything() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.write("b.txt", b"beta", 2_000);

    let report = h.snapchain.backup(date("2024-03-01")).unwrap();

    assert!(report.is_base);
    assert_eq!(kinds(&report), vec![ArtifactKind::Base]);
    let entries = archive::ArchiveReader::list_entries(&report.artifacts[0]).unwrap();
    assert_eq!(entries.len(), 2);

    let snapshot = h.snapchain.store().load_by_date(date("2024-03-01")).unwrap().unwrap();
    assert_eq!(snapshot.get(&h.source.join("a.txt")), Some(1_000_000_000_000));
    assert_eq!(snapshot.get(&h.source.join("b.txt")), Some(2_000_000_000_000));
}

#[test]
fn test_pure_addition_writes_only_added_archive() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.write("b.txt", b"beta", 2_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();

    h.write("c.txt", b"gamma", 3_000);
    let report = h.snapchain.backup(date("2024-03-02")).unwrap();

    assert_eq!(kinds(&report), vec![ArtifactKind::Added]);
    let entries = archive::ArchiveReader::list_entries(&report.artifacts[0]).unwrap();
    assert_eq!(
        entries.into_iter().collect::<Vec<_>>(),
        vec![archive_member_name(&h.source.join("c.txt"))]
    );
    assert!(!h.store.join("2024-03-02.deleted.csv").exists());
}

#[test]
fn test_deletion_is_replayed_on_restore() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.write("b.txt", b"beta", 2_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();
    h.write("c.txt", b"gamma", 3_000);
    h.snapchain.backup(date("2024-03-02")).unwrap();

    h.remove("b.txt");
    let report = h.snapchain.backup(date("2024-03-03")).unwrap();
    assert_eq!(kinds(&report), vec![ArtifactKind::Deleted]);

    let record = archive::ArchiveReader::read_deletion_record(&report.artifacts[0].path).unwrap();
    assert_eq!(record, vec![h.source.join("b.txt")]);

    let (target, restore) = h.restore("restore", None);
    assert_eq!(restore.restored_date, date("2024-03-03"));
    assert_eq!(restore.files_deleted, 1);
    assert!(h.restored(&target, "a.txt").exists());
    assert!(!h.restored(&target, "b.txt").exists());
    assert!(h.restored(&target, "c.txt").exists());
}

#[test]
fn test_modification_is_restored_per_date() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();

    h.write("a.txt", b"alpha v2", 5_000);
    let report = h.snapchain.backup(date("2024-03-04")).unwrap();
    assert_eq!(kinds(&report), vec![ArtifactKind::Modified]);

    let (latest, _) = h.restore("latest", Some(date("2024-03-04")));
    assert_eq!(fs::read(h.restored(&latest, "a.txt")).unwrap(), b"alpha v2");

    let (earlier, report) = h.restore("earlier", Some(date("2024-03-01")));
    assert_eq!(report.dates_replayed, vec![date("2024-03-01")]);
    assert_eq!(fs::read(h.restored(&earlier, "a.txt")).unwrap(), b"alpha");
}

#[test]
fn test_duplicate_run_leaves_store_untouched() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();
    let before = read_tree(&h.store);

    h.write("b.txt", b"beta", 2_000);
    let err = h.snapchain.backup(date("2024-03-01")).unwrap_err();

    assert!(matches!(err, SnapchainError::DuplicateRun { .. }));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(read_tree(&h.store), before);
}

#[test]
fn test_restore_rejects_unknown_date() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();

    let target = h.target("never");
    let err = h
        .snapchain
        .restore(
            &target,
            RestoreOptions {
                target_date: Some(date("2024-02-28")),
                ..RestoreOptions::default()
            },
        )
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(!target.exists());
}

#[test]
fn test_lenient_restore_tolerates_missing_deletes() {
    let h = BackupHarness::with_builder(SnapchainBuilder::new().strict_deletes(false));
    h.write("a.txt", b"alpha", 1_000);
    h.write("b.txt", b"beta", 1_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();
    h.remove("b.txt");
    h.snapchain.backup(date("2024-03-02")).unwrap();

    // Record a deletion of a file no archive ever held
    let ghost = h.source.join("ghost.txt");
    let record = h.store.join("2024-03-02.deleted.csv");
    archive::ArchiveWriter::default()
        .write_deletion_record([h.source.join("b.txt").as_path(), ghost.as_path()], &record)
        .unwrap();

    let target = h.target("partial");
    let strict = h.snapchain.restore(&target, RestoreOptions::default());
    assert!(matches!(strict, Err(SnapchainError::DeleteMissing { .. })));

    let report = h
        .snapchain
        .restore(
            &target,
            RestoreOptions {
                target_date: None,
                strict_deletes: false,
            },
        )
        .unwrap();
    assert_eq!(report.files_deleted, 1);
    assert_eq!(report.missing_deletes, vec![h.restored(&target, "ghost.txt")]);
}

#[test]
fn test_replay_is_deterministic() {
    let h = BackupHarness::with_builder(SnapchainBuilder::new().compression(ArchiveCompression::None));
    let mut rng = StdRng::seed_from_u64(7);
    let names: Vec<String> = (0..20).map(|i| format!("dir{}/file{}.bin", i % 4, i)).collect();

    let mut day = date("2024-01-01");
    for round in 0..5i64 {
        for name in &names {
            match rng.random_range(0..4) {
                0 if h.source.join(name).exists() => h.remove(name),
                1 | 2 => {
                    let mut content = vec![0u8; rng.random_range(1..512)];
                    rng.fill(&mut content[..]);
                    h.write(name, &content, 10_000 + round * 100 + rng.random_range(0..50));
                }
                _ => {}
            }
        }
        h.snapchain.backup(day).unwrap();
        day = day.succ_opt().unwrap();
    }

    let (first, _) = h.restore("first", None);
    let (second, _) = h.restore("second", None);

    assert_eq!(h.restored_tree(&first), h.restored_tree(&second));
    assert_eq!(h.restored_tree(&first), h.source_tree());
}

#[test]
fn test_restore_matches_each_historical_state() {
    let h = BackupHarness::new();
    let mut expected = Vec::new();

    h.write("keep.txt", b"keep", 1_000);
    h.write("docs/old.md", b"old", 1_000);
    h.snapchain.backup(date("2024-05-01")).unwrap();
    expected.push((date("2024-05-01"), h.source_tree()));

    h.write("docs/new.md", b"new", 2_000);
    h.remove("docs/old.md");
    h.snapchain.backup(date("2024-05-03")).unwrap();
    expected.push((date("2024-05-03"), h.source_tree()));

    h.write("keep.txt", b"changed", 3_000);
    h.snapchain.backup(date("2024-05-10")).unwrap();
    expected.push((date("2024-05-10"), h.source_tree()));

    for (i, (d, tree)) in expected.iter().enumerate() {
        let (target, _) = h.restore(&format!("restore-{}", i), Some(*d));
        assert_eq!(&h.restored_tree(&target), tree, "state of {}", d);
    }
}

#[test]
#[traced_test]
fn test_backup_logs_milestones() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);

    h.snapchain.backup(date("2024-03-01")).unwrap();
    info!("backup done");

    assert!(logs_contain("Start backup for 2024-03-01"));
    assert!(logs_contain("Created archive"));
    assert!(logs_contain("Saved snapshot"));
}

#[test]
fn test_verify_after_chain() {
    let h = BackupHarness::new();
    h.write("a.txt", b"alpha", 1_000);
    h.snapchain.backup(date("2024-03-01")).unwrap();
    h.write("b.txt", b"beta", 2_000);
    h.remove("a.txt");
    h.snapchain.backup(date("2024-03-02")).unwrap();

    let report = h.snapchain.verify().unwrap();
    assert!(report.is_valid(), "{:?}", report.issues);
    assert_eq!(report.archives_checked, 2);
    assert_eq!(report.records_checked, 1);

    fs::remove_file(h.store.join("2024-03-02.deleted.csv")).unwrap();
    assert!(!h.snapchain.verify().unwrap().is_valid());
}
