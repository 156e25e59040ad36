// jogja_ingestor/src/importer.rs
// Batch importer. Rows are resolved, normalized and validated one at a time;
// valid records are written in fixed-size unordered bulk inserts, and a chunk
// that times out or hits a transient error is retried one record at a time.

use std::fmt;
use std::time::Duration;

use futures_util::{Stream, StreamExt, pin_mut};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::columns::RawRow;
use crate::destination::{DestinationRecord, FormattedRow};
use crate::error::{IngestorError, Result};
use crate::store::{CategoryStats, DestinationStore, IndexSpec};
use crate::validate::validate_destination;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size:          usize,
    pub batch_timeout:       Duration,
    /// Pause between consecutive chunks.
    pub batch_delay:         Duration,
    pub clear_existing:      bool,
    pub max_reported_errors: usize,
    pub invalid_log_limit:   usize,
    pub progress_every:      usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size:          crate::DEFAULT_BATCH_SIZE,
            batch_timeout:       Duration::from_secs(crate::DEFAULT_BATCH_TIMEOUT_SECS),
            batch_delay:         Duration::from_millis(crate::DEFAULT_BATCH_DELAY_MS),
            clear_existing:      false,
            max_reported_errors: 10,
            invalid_log_limit:   5,
            progress_every:      25,
        }
    }
}

/// What a failure entry refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureTarget {
    Record(String),
    Batch(usize),
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureTarget::Record(name) => f.write_str(name),
            FailureTarget::Batch(n) => write!(f, "Batch {n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportFailure {
    pub target:  FailureTarget,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub processed:           usize,
    pub valid:               usize,
    pub invalid:             usize,
    /// Valid rows whose coordinate fell back to `{0, 0}`.
    pub coordinate_defaults: usize,
    pub batches:             usize,
    /// Includes whole chunks that reported a duplicate key.
    pub imported:            usize,
    pub failed:              usize,
    pub errors:              Vec<ImportFailure>,
    /// Document count queried after the last chunk.
    pub stored_total:        Option<u64>,
    pub category_stats:      Vec<CategoryStats>,
    #[serde(skip)]
    max_reported_errors:     usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Import summary")?;
        writeln!(f, "  Total rows processed: {}", self.processed)?;
        writeln!(f, "  Valid destinations:   {}", self.valid)?;
        writeln!(f, "  Invalid destinations: {}", self.invalid)?;
        writeln!(f, "  Default coordinates:  {}", self.coordinate_defaults)?;
        writeln!(f, "  Imported:             {}", self.imported)?;
        writeln!(f, "  Failed:               {}", self.failed)?;
        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for failure in self.errors.iter().take(self.max_reported_errors) {
                writeln!(f, "    - {}: {}", failure.target, failure.message)?;
            }
            if self.errors.len() > self.max_reported_errors {
                writeln!(
                    f,
                    "    ... and {} more errors",
                    self.errors.len() - self.max_reported_errors
                )?;
            }
        }
        if let Some(total) = self.stored_total {
            writeln!(f, "  Total destinations in store: {total}")?;
        }
        for stat in &self.category_stats {
            writeln!(
                f,
                "  {}: {} destinations (avg rating: {:.1}, avg price: {:.0})",
                stat.category, stat.count, stat.avg_rating, stat.avg_price
            )?;
        }
        Ok(())
    }
}

/// Mutable state of one import run.
#[derive(Default)]
struct ImportRun {
    report:        ImportReport,
    pending:       Vec<DestinationRecord>,
    header_logged: bool,
    sample_logged: bool,
}

pub struct Importer<'a, S: DestinationStore + ?Sized> {
    store:  &'a S,
    config: ImportConfig,
}

impl<'a, S: DestinationStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, config: ImportConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Imports every row of `rows` and returns the run summary.
    ///
    /// Fails only when the source cannot be read, the store cannot be
    /// cleared, or no row was valid.
    pub async fn run<St>(&self, rows: St) -> Result<ImportReport>
    where
        St: Stream<Item = Result<RawRow>>,
    {
        let mut run = ImportRun::default();
        run.report.max_reported_errors = self.config.max_reported_errors;

        if self.config.clear_existing {
            let removed = self.store.delete_all().await?;
            info!("Cleared {} existing destinations", removed);
        }
        self.ensure_indexes().await;

        pin_mut!(rows);
        while let Some(row) = rows.next().await {
            run.report.processed += 1;
            match row {
                Ok(row) => self.accept_row(&mut run, &row),
                Err(IngestorError::CsvError(e)) if !e.is_io_error() => {
                    run.report.invalid += 1;
                    warn!("Row {} could not be parsed: {}", run.report.processed, e);
                },
                Err(e) => return Err(e),
            }

            if self.config.progress_every > 0 && run.report.processed % self.config.progress_every == 0 {
                info!(
                    "Processed {} rows (Valid: {}, Invalid: {})",
                    run.report.processed, run.report.valid, run.report.invalid
                );
            }

            if run.pending.len() >= self.config.batch_size.max(1) {
                self.flush(&mut run).await;
            }
        }
        if !run.pending.is_empty() {
            self.flush(&mut run).await;
        }

        if run.report.valid == 0 {
            error!(
                "No valid destinations found. Check that the CSV columns match the expected \
                 names and that rows carry place name, description and address."
            );
            return Err(IngestorError::NoValidRecords {
                processed: run.report.processed,
            });
        }

        self.verify(&mut run.report).await;
        info!(
            "Import completed: {} imported, {} failed",
            run.report.imported, run.report.failed
        );
        Ok(run.report)
    }

    /// The unique `place_id` index is what turns re-imports into duplicate
    /// key errors; missing it is not fatal.
    async fn ensure_indexes(&self) {
        for spec in [IndexSpec::unique_place_id(), IndexSpec::location_2dsphere()] {
            if let Err(e) = self.store.create_index(&spec).await {
                warn!("Could not create index {}: {}", spec.name(), e);
            }
        }
    }

    fn accept_row(&self, run: &mut ImportRun, row: &RawRow) {
        if !run.header_logged {
            info!("Available CSV columns: {:?}", row.keys().collect::<Vec<_>>());
            run.header_logged = true;
        }

        let FormattedRow { record, coordinate } = DestinationRecord::from_row(row);
        let errors = validate_destination(&record);
        if !errors.is_empty() {
            run.report.invalid += 1;
            if run.report.invalid <= self.config.invalid_log_limit {
                let reasons = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
                warn!(
                    "Row {} validation failed: {} (place: {})",
                    run.report.processed,
                    reasons.join(", "),
                    record.place_name
                );
            }
            return;
        }

        if coordinate.is_default() {
            run.report.coordinate_defaults += 1;
            warn!(
                "Row {} ({}) has no usable coordinate, storing {{0, 0}}: {:?}",
                run.report.processed, record.place_name, coordinate.source
            );
        }
        if !run.sample_logged {
            info!(
                place_name = %record.place_name,
                category = %record.category,
                city = %record.city,
                "Sample mapped data"
            );
            run.sample_logged = true;
        }

        run.report.valid += 1;
        run.pending.push(record);
    }

    async fn flush(&self, run: &mut ImportRun) {
        let batch = std::mem::take(&mut run.pending);
        if run.report.batches > 0 && !self.config.batch_delay.is_zero() {
            sleep(self.config.batch_delay).await;
        }
        run.report.batches += 1;
        let batch_num = run.report.batches;
        debug!("Inserting batch {} ({} items)", batch_num, batch.len());

        match timeout(self.config.batch_timeout, self.store.insert_many(&batch)).await {
            Ok(Ok(_)) => {
                run.report.imported += batch.len();
                info!(
                    "Batch {} completed. Total imported: {}",
                    batch_num, run.report.imported
                );
            },
            Ok(Err(e)) if e.is_duplicate_key() => {
                // The bulk error does not say which documents were new, so
                // the whole chunk counts as imported.
                run.report.imported += batch.len();
                warn!("Duplicate keys in batch {}, continuing: {}", batch_num, e);
            },
            Ok(Err(e)) if e.is_transient() => {
                warn!(
                    "Batch {} failed with a transient error, retrying items individually: {}",
                    batch_num, e
                );
                self.insert_individually(run, batch).await;
            },
            Ok(Err(e)) => {
                error!("Batch {} failed: {}", batch_num, e);
                run.report.failed += batch.len();
                run.report.errors.push(ImportFailure {
                    target:  FailureTarget::Batch(batch_num),
                    message: e.to_string(),
                });
            },
            Err(_) => {
                warn!(
                    "Batch {} timed out after {:?}, retrying items individually",
                    batch_num, self.config.batch_timeout
                );
                self.insert_individually(run, batch).await;
            },
        }
    }

    async fn insert_individually(&self, run: &mut ImportRun, batch: Vec<DestinationRecord>) {
        for record in batch {
            let outcome = match timeout(self.config.batch_timeout, self.store.insert_one(&record)).await {
                Ok(res) => res,
                Err(_) => Err(IngestorError::Timeout(format!(
                    "insert of {} exceeded {:?}",
                    record.place_name, self.config.batch_timeout
                ))),
            };
            match outcome {
                Ok(()) => {
                    run.report.imported += 1;
                    debug!("Individual import: {}", record.place_name);
                },
                Err(e) if e.is_duplicate_key() => {
                    run.report.imported += 1;
                    debug!("{} already imported", record.place_name);
                },
                Err(e) => {
                    run.report.failed += 1;
                    error!("Failed: {} - {}", record.place_name, e);
                    run.report.errors.push(ImportFailure {
                        target:  FailureTarget::Record(record.place_name.clone()),
                        message: e.to_string(),
                    });
                },
            }
        }
    }

    async fn verify(&self, report: &mut ImportReport) {
        match self.store.count().await {
            Ok(total) => report.stored_total = Some(total),
            Err(e) => warn!("Could not count stored destinations: {}", e),
        }
        if report.stored_total.unwrap_or(0) > 0 {
            match self.store.category_stats().await {
                Ok(stats) => report.category_stats = stats,
                Err(e) => warn!("Could not compute category statistics: {}", e),
            }
        }
    }
}
