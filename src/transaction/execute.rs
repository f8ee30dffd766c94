// src/transaction/execute.rs

//! Transaction execution
//!
//! Applies a plan strictly in order under an exclusive database lock.
//! Each entry is atomic: its package row, file rows, and transaction
//! record commit together or not at all. Skip entries never touch the
//! database.
//!
//! Best-effort is the default: a failed entry is recorded and the rest of
//! the plan still runs. In all-or-nothing mode the whole plan shares one
//! database transaction and any failure rolls everything back.

use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{
    self,
    models::{FileRow, InstalledPackage, TxRecord, TxStatus},
};
use crate::error::{Error, Result};
use crate::packages::rpm::RpmPackage;
use crate::packages::{PackageFormat, PackageIdentity};
use crate::repository;
use crate::transaction::plan::{Action, EntrySource, PlanEntry, TransactionPlan};

/// Per-entry outcome
#[derive(Debug)]
pub enum Outcome {
    Applied,
    Skipped,
    Failed(Error),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// What happened to one plan entry
#[derive(Debug)]
pub struct EntryReport {
    pub identity: PackageIdentity,
    pub action: Action,
    pub outcome: Outcome,
}

/// Aggregate result of executing a plan
#[derive(Debug)]
pub struct TransactionResult {
    /// Reports for processed entries, in plan order. In all-or-nothing
    /// mode entries after the first failure are never attempted and have
    /// no report.
    pub entries: Vec<EntryReport>,
    /// 0 iff every entry is Applied or Skipped, else the code of the
    /// first failure
    pub exit_code: i32,
    /// All-or-nothing only: entries reported Applied were undone when the
    /// shared transaction rolled back
    pub rolled_back: bool,
}

impl TransactionResult {
    fn from_reports(entries: Vec<EntryReport>, rolled_back: bool) -> Self {
        let exit_code = entries
            .iter()
            .find_map(|report| match &report.outcome {
                Outcome::Failed(err) => Some(err.exit_code()),
                _ => None,
            })
            .unwrap_or(0);

        Self {
            entries,
            exit_code,
            rolled_back,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Applies transaction plans against the installed-package database
pub struct Executor {
    /// One shared database transaction for the whole plan; any failure
    /// rolls every entry back
    pub all_or_nothing: bool,
    /// Where repository candidates are downloaded before applying
    pub download_dir: PathBuf,
    /// Refuse repository candidates without a published checksum
    pub gpgcheck: bool,
}

impl Executor {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            all_or_nothing: false,
            download_dir,
            gpgcheck: true,
        }
    }

    /// Execute a plan. Takes the exclusive lock for the full duration so
    /// concurrent invocations cannot interleave entries.
    pub fn execute(
        &self,
        conn: &mut Connection,
        db_path: &str,
        plan: TransactionPlan,
    ) -> Result<TransactionResult> {
        let mut lock = db::lock_handle(db_path)?;
        let _guard = db::try_lock_exclusive(&mut lock, db_path)?;

        if self.all_or_nothing {
            self.execute_all_or_nothing(conn, plan)
        } else {
            self.execute_best_effort(conn, plan)
        }
    }

    fn execute_best_effort(
        &self,
        conn: &mut Connection,
        plan: TransactionPlan,
    ) -> Result<TransactionResult> {
        let mut reports = Vec::new();

        for entry in plan.entries {
            let PlanEntry {
                identity,
                action,
                source,
            } = entry;

            let outcome = match action {
                Action::Skip => {
                    debug!("Skipping {}: already installed", identity);
                    Outcome::Skipped
                }
                Action::Install | Action::Reinstall => {
                    match self.obtain(source).and_then(|package| {
                        db::transaction(conn, |tx| self.apply_package(tx, &package, action))
                            .map_err(|e| map_apply_error(&identity, e))
                    }) {
                        Ok(()) => Outcome::Applied,
                        Err(err) => Outcome::Failed(err),
                    }
                }
            };

            reports.push(EntryReport {
                identity,
                action,
                outcome,
            });
        }

        Ok(TransactionResult::from_reports(reports, false))
    }

    fn execute_all_or_nothing(
        &self,
        conn: &mut Connection,
        plan: TransactionPlan,
    ) -> Result<TransactionResult> {
        let tx = conn.transaction()?;
        let mut reports = Vec::new();
        let mut failed = false;

        for entry in plan.entries {
            let PlanEntry {
                identity,
                action,
                source,
            } = entry;

            let outcome = match action {
                Action::Skip => Outcome::Skipped,
                Action::Install | Action::Reinstall => {
                    match self.obtain(source).and_then(|package| {
                        self.apply_package(&tx, &package, action)
                            .map_err(|e| map_apply_error(&identity, e))
                    }) {
                        Ok(()) => Outcome::Applied,
                        Err(err) => {
                            failed = true;
                            Outcome::Failed(err)
                        }
                    }
                }
            };

            reports.push(EntryReport {
                identity,
                action,
                outcome,
            });

            if failed {
                break;
            }
        }

        if failed {
            tx.rollback()?;
            Ok(TransactionResult::from_reports(reports, true))
        } else {
            tx.commit()?;
            Ok(TransactionResult::from_reports(reports, false))
        }
    }

    /// Materialize the entry's package: file artifacts were parsed at
    /// planning time, repository candidates download now.
    fn obtain(&self, source: EntrySource) -> Result<RpmPackage> {
        match source {
            EntrySource::File { package, .. } => Ok(package),
            EntrySource::Repo(candidate) => {
                let path =
                    repository::download_package(&candidate, &self.download_dir, self.gpgcheck)?;
                let bytes = fs::read(&path)?;
                RpmPackage::parse_bytes(&bytes, &path.display().to_string())
            }
        }
    }

    /// Apply one package inside the given transaction: record the
    /// operation, replace any existing row for the (name, architecture)
    /// pair, insert the package and its files.
    ///
    /// The action was decided at planning time; the existing-row lookup
    /// here is mechanical replacement, not a re-decision.
    fn apply_package(&self, tx: &Connection, package: &RpmPackage, action: Action) -> Result<()> {
        let identity = package.identity();
        let verb = match action {
            Action::Install => "Install",
            Action::Reinstall => "Reinstall",
            Action::Skip => unreachable!("skip entries never reach apply"),
        };

        info!("{}ing {}", verb, identity);

        let mut record = TxRecord::new(format!("{} {}", verb, identity));
        let record_id = record.insert(tx)?;

        if let Some(existing) =
            InstalledPackage::find_by_name_arch(tx, package.name(), package.architecture())?
        {
            let existing_id = existing.id.ok_or_else(|| {
                Error::InitError("Installed package row has no ID".to_string())
            })?;
            // File rows cascade with the package row
            InstalledPackage::delete(tx, existing_id)?;
        }

        let mut row = InstalledPackage::new(
            package.name().to_string(),
            package.version().to_string(),
        );
        row.architecture = package.architecture().map(|s| s.to_string());
        row.description = package.description().map(|s| s.to_string());
        row.installed_by_tx_id = Some(record_id);
        let package_id = row.insert(tx)?;

        for file in package.files() {
            FileRow::new(
                file.path.clone(),
                file.sha256.clone(),
                file.size,
                file.mode,
                package_id,
            )
            .insert(tx)?;
        }

        record.update_status(tx, TxStatus::Applied)?;
        Ok(())
    }
}

/// Database-level failures while applying become ApplyFailed; acquisition
/// failures (download, checksum, parse) keep their own kind so exit codes
/// stay specific.
fn map_apply_error(identity: &PackageIdentity, err: Error) -> Error {
    match err {
        Error::Database(_) | Error::Io(_) => Error::ApplyFailed {
            package: identity.to_string(),
            reason: err.to_string(),
        },
        other => other,
    }
}
