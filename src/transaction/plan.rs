// src/transaction/plan.rs

//! Transaction planning
//!
//! Merges file-based targets (fetched and inspected here) with name-based
//! targets (resolved against the repository index) into one ordered plan.
//! Any fetch, inspect, or resolve failure aborts the whole invocation
//! before a single database mutation happens: a mixed batch with one bad
//! file target never partially executes.
//!
//! Each entry's action is decided exactly once, at planning time. The
//! executor never re-queries installed state to re-derive it.

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::db::models::{InstalledPackage, RepositoryPackage};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::packages::rpm::RpmPackage;
use crate::packages::{PackageFormat, PackageIdentity};
use crate::repository;
use crate::target::{Target, classify};

/// Invocation mode: plain install or forced reinstall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Install,
    Reinstall,
}

/// What a reinstall invocation does when the installed version differs
/// from the candidate. Upgrade is the default; skipping is available for
/// callers that want reinstall to touch only exact-version matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchPolicy {
    UpgradeOnMismatch,
    SkipOnMismatch,
}

/// Action for a plan entry, decided once at planning time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Reinstall,
    Skip,
}

/// Where an entry's artifact comes from at apply time
#[derive(Debug)]
pub enum EntrySource {
    /// Already fetched and parsed during planning
    File { package: RpmPackage, origin: String },
    /// Repository candidate, downloaded at apply time
    Repo(RepositoryPackage),
}

/// One entry of a transaction plan
#[derive(Debug)]
pub struct PlanEntry {
    pub identity: PackageIdentity,
    pub action: Action,
    pub source: EntrySource,
}

/// Ordered, deduplicated transaction plan
#[derive(Debug)]
pub struct TransactionPlan {
    pub mode: TxMode,
    pub entries: Vec<PlanEntry>,
}

impl TransactionPlan {
    /// True when every entry is a Skip ("nothing to do")
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.action == Action::Skip)
    }

    /// Entries planned with the given action, in plan order
    pub fn with_action(&self, action: Action) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.action == action)
    }
}

/// Builds transaction plans from raw install specifiers
pub struct Planner {
    pub mode: TxMode,
    pub mismatch_policy: MismatchPolicy,
}

impl Planner {
    pub fn new(mode: TxMode) -> Self {
        Self {
            mode,
            mismatch_policy: MismatchPolicy::UpgradeOnMismatch,
        }
    }

    /// Build a plan for the given specifiers.
    ///
    /// `cwd` anchors relative paths and the same-named-file check. File and
    /// URL targets are fetched and inspected here; bare names resolve via
    /// the repository index. Duplicates by identity merge into the first
    /// occurrence, and a fetched file artifact wins over a repository
    /// reference to the same identity.
    pub fn plan(
        &self,
        conn: &Connection,
        specs: &[String],
        cwd: &Path,
        fetcher: &Fetcher,
    ) -> Result<TransactionPlan> {
        let mut entries: Vec<PlanEntry> = Vec::new();

        for raw in specs {
            let target = classify(raw, cwd);
            debug!("Classified '{}' as {}", raw, target);

            let (identity, source) = match &target {
                Target::PackageName { name } => {
                    let candidate = repository::resolve_package(conn, name)?;
                    let identity = PackageIdentity {
                        name: candidate.name.clone(),
                        version: candidate.version.clone(),
                        architecture: candidate.architecture.clone(),
                    };
                    (identity, EntrySource::Repo(candidate))
                }
                Target::LocalFile { .. } | Target::RemoteUrl { .. } => {
                    let artifact = fetcher.fetch(&target)?;
                    let origin = artifact.origin.clone();
                    let package = RpmPackage::parse_bytes(&artifact.bytes, &origin)?;
                    (package.identity(), EntrySource::File { package, origin })
                }
            };

            if let Some(existing) = entries.iter_mut().find(|e| e.identity == identity) {
                // Merge, don't replace: first-seen order is preserved. A
                // fetched file artifact supersedes a repo reference so the
                // executor skips a redundant download.
                if matches!(existing.source, EntrySource::Repo(_))
                    && matches!(source, EntrySource::File { .. })
                {
                    existing.source = source;
                }
                continue;
            }

            let action = self.decide_action(conn, &identity)?;
            debug!("Planned {:?} for {}", action, identity);
            entries.push(PlanEntry {
                identity,
                action,
                source,
            });
        }

        Ok(TransactionPlan {
            mode: self.mode,
            entries,
        })
    }

    /// Decide an entry's action from current installed state
    fn decide_action(&self, conn: &Connection, identity: &PackageIdentity) -> Result<Action> {
        let installed = InstalledPackage::find_by_name_arch(
            conn,
            &identity.name,
            identity.architecture.as_deref(),
        )?;

        let action = match installed {
            None => Action::Install,
            Some(current) if current.version == identity.version => match self.mode {
                TxMode::Install => Action::Skip,
                TxMode::Reinstall => Action::Reinstall,
            },
            Some(_) => match self.mode {
                TxMode::Install => Action::Install,
                TxMode::Reinstall => match self.mismatch_policy {
                    MismatchPolicy::UpgradeOnMismatch => Action::Install,
                    MismatchPolicy::SkipOnMismatch => Action::Skip,
                },
            },
        };

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Repository;
    use crate::db::schema;
    use crate::error::Error;
    use crate::packages::rpm::build_test_rpm;
    use std::fs;
    use std::path::PathBuf;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn write_rpm(dir: &Path, filename: &str, name: &str, version: &str, release: &str) -> PathBuf {
        let path = dir.join(filename);
        fs::write(&path, build_test_rpm(name, version, release)).unwrap();
        path
    }

    fn install_row(conn: &Connection, name: &str, version: &str) {
        let mut pkg = InstalledPackage::new(name.to_string(), version.to_string());
        pkg.architecture = Some("x86_64".to_string());
        pkg.insert(conn).unwrap();
    }

    fn add_candidate(conn: &Connection, name: &str, version: &str) {
        let mut repo = Repository::new("test-repo".to_string(), "http://r".to_string());
        let repo_id = match Repository::find_by_name(conn, "test-repo").unwrap() {
            Some(existing) => existing.id.unwrap(),
            None => repo.insert(conn).unwrap(),
        };
        let mut candidate = RepositoryPackage::new(
            repo_id,
            name.to_string(),
            version.to_string(),
            10,
            format!("http://r/{}-{}.rpm", name, version),
        );
        candidate.architecture = Some("x86_64".to_string());
        candidate.insert(conn).unwrap();
    }

    #[test]
    fn test_fresh_file_target_plans_install() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].action, Action::Install);
        assert_eq!(plan.entries[0].identity.name, "pkg-a");
        assert!(matches!(
            plan.entries[0].source,
            EntrySource::File { .. }
        ));
    }

    #[test]
    fn test_same_version_installed_skips_in_install_mode() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");
        install_row(&conn, "pkg-a", "1.0-1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();

        assert_eq!(plan.entries[0].action, Action::Skip);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_same_version_installed_reinstalls_in_reinstall_mode() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");
        install_row(&conn, "pkg-a", "1.0-1");

        let planner = Planner::new(TxMode::Reinstall);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();

        assert_eq!(plan.entries[0].action, Action::Reinstall);
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_different_version_installed_upgrades() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "2.0", "1");
        install_row(&conn, "pkg-a", "1.0-1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();

        assert_eq!(plan.entries[0].action, Action::Install);
    }

    #[test]
    fn test_reinstall_mode_mismatch_policy() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "2.0", "1");
        install_row(&conn, "pkg-a", "1.0-1");

        let fetcher = Fetcher::new().unwrap();

        let upgrade = Planner::new(TxMode::Reinstall);
        let plan = upgrade
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();
        assert_eq!(plan.entries[0].action, Action::Install);

        let strict = Planner {
            mode: TxMode::Reinstall,
            mismatch_policy: MismatchPolicy::SkipOnMismatch,
        };
        let plan = strict
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();
        assert_eq!(plan.entries[0].action, Action::Skip);
    }

    #[test]
    fn test_reinstall_mode_installs_absent_package() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");

        let planner = Planner::new(TxMode::Reinstall);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(&conn, &["a.rpm".to_string()], dir.path(), &fetcher)
            .unwrap();

        assert_eq!(plan.entries[0].action, Action::Install);
    }

    #[test]
    fn test_alias_spellings_produce_identical_entry() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        let path = write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();

        let spellings = [
            path.display().to_string(),
            "a.rpm".to_string(),
            format!("file://{}", path.display()),
            format!("{}/sub/../a.rpm", dir.path().display()),
        ];

        let mut identities = Vec::new();
        for spelling in &spellings {
            let plan = planner
                .plan(&conn, std::slice::from_ref(spelling), dir.path(), &fetcher)
                .unwrap();
            assert_eq!(plan.entries.len(), 1);
            assert_eq!(plan.entries[0].action, Action::Install);
            identities.push(plan.entries[0].identity.clone());
        }
        identities.dedup();
        assert_eq!(identities.len(), 1, "all spellings must resolve identically");
    }

    #[test]
    fn test_duplicate_specs_merge_to_one_entry() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        let path = write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(
                &conn,
                &["a.rpm".to_string(), path.display().to_string()],
                dir.path(),
                &fetcher,
            )
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
    }

    #[test]
    fn test_file_artifact_wins_over_repo_reference() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");
        add_candidate(&conn, "pkg-a", "1.0-1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();

        // Name first, file second: the merged entry keeps first-seen order
        // but adopts the already-fetched artifact
        let plan = planner
            .plan(
                &conn,
                &["pkg-a".to_string(), "a.rpm".to_string()],
                dir.path(),
                &fetcher,
            )
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert!(matches!(plan.entries[0].source, EntrySource::File { .. }));
    }

    #[test]
    fn test_mixed_batch_plans_both_entries_in_order() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        write_rpm(dir.path(), "a.rpm", "pkg-a", "1.0", "1");
        add_candidate(&conn, "pkg-b", "2.0-1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let plan = planner
            .plan(
                &conn,
                &["a.rpm".to_string(), "pkg-b".to_string()],
                dir.path(),
                &fetcher,
            )
            .unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].identity.name, "pkg-a");
        assert_eq!(plan.entries[1].identity.name, "pkg-b");
        assert!(matches!(plan.entries[1].source, EntrySource::Repo(_)));
    }

    #[test]
    fn test_bad_file_target_fails_whole_mixed_batch() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        add_candidate(&conn, "pkg-b", "2.0-1");

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let result = planner.plan(
            &conn,
            &["./missing.rpm".to_string(), "pkg-b".to_string()],
            dir.path(),
            &fetcher,
        );

        assert!(matches!(result, Err(Error::LocalNotFound(_))));
    }

    #[test]
    fn test_corrupt_file_target_fails_planning() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("junk.rpm"), b"junk bytes").unwrap();

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let result = planner.plan(&conn, &["junk.rpm".to_string()], dir.path(), &fetcher);

        assert!(matches!(result, Err(Error::ArtifactCorrupt { .. })));
    }

    #[test]
    fn test_unknown_package_name_fails_planning() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let result = planner.plan(&conn, &["no-such-pkg".to_string()], dir.path(), &fetcher);

        assert!(matches!(result, Err(Error::NoSuchPackage(_))));
    }

    #[test]
    fn test_remote_404_fails_planning_with_remote_not_found() {
        let conn = test_conn();
        let dir = tempfile::tempdir().unwrap();

        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/doesnotexist.rpm")
            .with_status(404)
            .create();

        let planner = Planner::new(TxMode::Install);
        let fetcher = Fetcher::new().unwrap();
        let result = planner.plan(
            &conn,
            &[format!("{}/doesnotexist.rpm", server.url())],
            dir.path(),
            &fetcher,
        );

        match result {
            Err(err) => assert_eq!(err.exit_code(), 1622),
            Ok(_) => panic!("planning must fail for a missing remote artifact"),
        }
    }
}
