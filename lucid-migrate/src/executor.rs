//! Batched migration execution.
//!
//! Migrations run in batches of equal priority, highest first. Within a batch
//! every table is migrated concurrently; a failure stops the batch and no
//! later batch starts.

use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::adapter::DatabaseAdapter;
use crate::diff::{MigrationPlan, TableMigration};
use crate::error::{MigrateResult, MigrationError};

/// Migrations sharing one priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationBatch {
    /// Shared priority.
    pub priority: i32,
    /// Migrations in dispatch order.
    pub migrations: Vec<TableMigration>,
}

/// Flatten plans into priority batches, highest first.
///
/// Within a batch removals are dispatched before creates, creates before modifies.
pub fn build_batches(plans: &[MigrationPlan]) -> Vec<MigrationBatch> {
    let mut migrations: Vec<&TableMigration> = plans.iter().flat_map(|p| p.tables.iter()).collect();
    migrations.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.kind.order().cmp(&b.kind.order()))
    });

    let mut batches: Vec<MigrationBatch> = Vec::new();
    for migration in migrations {
        match batches.last_mut() {
            Some(batch) if batch.priority == migration.priority => {
                batch.migrations.push(migration.clone());
            }
            _ => batches.push(MigrationBatch {
                priority: migration.priority,
                migrations: vec![migration.clone()],
            }),
        }
    }

    batches
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Batches executed.
    pub batches: usize,
    /// Tables migrated.
    pub tables: usize,
}

/// Executes migration batches against an adapter.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    max_concurrency: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(16)
    }
}

impl BatchExecutor {
    /// Create an executor running at most `max_concurrency` operations per batch at once.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Execute every migration of `plans`.
    ///
    /// Returns the first failing operation's error. Batches that completed
    /// before the failure stay applied.
    pub async fn build_migrations<A>(&self, adapter: &A, plans: &[MigrationPlan]) -> MigrateResult<ExecutionReport>
    where
        A: DatabaseAdapter + ?Sized,
    {
        let batches = build_batches(plans);
        let mut report = ExecutionReport::default();

        for (index, batch) in batches.iter().enumerate() {
            let start = Instant::now();
            info!(
                batch = index,
                priority = batch.priority,
                tables = batch.migrations.len(),
                "Executing migration batch"
            );

            self.execute_batch(adapter, batch).await.inspect_err(|e| {
                warn!(batch = index, priority = batch.priority, error = %e, "Migration batch failed");
            })?;

            report.batches += 1;
            report.tables += batch.migrations.len();
            debug!(
                batch = index,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Migration batch complete"
            );
        }

        Ok(report)
    }

    /// Run one batch concurrently, failing fast.
    async fn execute_batch<A>(&self, adapter: &A, batch: &MigrationBatch) -> MigrateResult<()>
    where
        A: DatabaseAdapter + ?Sized,
    {
        let semaphore = Semaphore::new(self.max_concurrency);
        let mut futures = FuturesUnordered::new();

        for migration in &batch.migrations {
            let semaphore = &semaphore;
            futures.push(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| MigrationError::other(e.to_string()))?;

                debug!(
                    table = %migration.table_name,
                    kind = migration.kind.as_str(),
                    "Applying table migration"
                );

                adapter.apply(migration).await.map_err(|e| match e {
                    MigrationError::Execution { .. } => e,
                    other => MigrationError::execution(&migration.table_name, other.to_string()),
                })
            });
        }

        while let Some(result) = futures.next().await {
            if let Err(e) = result {
                // Dropping the remaining futures cancels them.
                drop(futures);
                return Err(e);
            }
        }

        Ok(())
    }
}
