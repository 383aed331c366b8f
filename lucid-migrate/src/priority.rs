//! Priority planner.
//!
//! Higher priorities migrate first. Every table starts from a base priority
//! for its type and loses points for referencing other collection tables and
//! for repeater nesting, so referenced tables always land in earlier batches.

use std::collections::HashMap;

use tracing::warn;

use crate::diff::{MigrationKind, MigrationPlan};
use crate::naming::TableNameCodec;
use crate::schema::{CollectionSchemaTable, TableType};

/// Penalty for referencing another collection-scoped table.
pub const FOREIGN_KEY_PENALTY: i32 = 100;

/// Penalty per level of repeater nesting.
pub const DEPTH_PENALTY: i32 = 10;

/// Base priority of a table type.
pub fn base_priority(table_type: TableType) -> i32 {
    match table_type {
        TableType::Document => 1000,
        TableType::Versions => 900,
        TableType::DocumentFields => 800,
        TableType::Brick => 700,
        TableType::Repeater => 600,
    }
}

/// Priority of a declared or live table.
pub fn get_table_priority(codec: &TableNameCodec, table: &CollectionSchemaTable) -> i32 {
    let mut priority = base_priority(table.table_type);

    let references_collection_table = table
        .columns
        .iter()
        .filter_map(|c| c.foreign_key.as_ref())
        .any(|fk| codec.is_collection_table(&fk.table));
    if references_collection_table {
        priority -= FOREIGN_KEY_PENALTY;
    }

    priority - DEPTH_PENALTY * table.key.depth() as i32
}

/// Lower any create or modify migration whose foreign keys target another
/// migration of equal or lower priority, until every reference migrates first.
///
/// Returns a warning for each reference cycle that could not be ordered.
pub fn enforce_dependency_order(plans: &mut [MigrationPlan]) -> Vec<String> {
    let mut priorities: HashMap<String, i32> = plans
        .iter()
        .flat_map(|p| p.tables.iter())
        .filter(|m| m.kind != MigrationKind::Remove)
        .map(|m| (m.table_name.clone(), m.priority))
        .collect();

    let dependencies: Vec<(String, Vec<String>)> = plans
        .iter()
        .flat_map(|p| p.tables.iter())
        .filter(|m| m.kind != MigrationKind::Remove)
        .map(|m| {
            let targets = m
                .foreign_key_targets()
                .filter(|t| priorities.contains_key(*t))
                .map(str::to_string)
                .collect();
            (m.table_name.clone(), targets)
        })
        .filter(|(_, targets): &(String, Vec<String>)| !targets.is_empty())
        .collect();

    let max_passes = priorities.len() + 1;
    let mut settled = false;

    for _ in 0..max_passes {
        let mut changed = false;

        for (table, targets) in &dependencies {
            let Some(&current) = priorities.get(table) else {
                continue;
            };
            let floor = targets
                .iter()
                .filter_map(|t| priorities.get(t))
                .min()
                .copied()
                .unwrap_or(i32::MAX);

            if floor <= current {
                warn!(
                    table = %table,
                    from = current,
                    to = floor - 1,
                    "Lowering priority below referenced table"
                );
                priorities.insert(table.clone(), floor - 1);
                changed = true;
            }
        }

        if !changed {
            settled = true;
            break;
        }
    }

    for migration in plans.iter_mut().flat_map(|p| p.tables.iter_mut()) {
        if migration.kind == MigrationKind::Remove {
            continue;
        }
        if let Some(&priority) = priorities.get(&migration.table_name) {
            migration.priority = priority;
        }
    }

    for plan in plans.iter_mut() {
        plan.sort();
    }

    if settled {
        Vec::new()
    } else {
        let cyclic: Vec<&str> = dependencies.iter().map(|(t, _)| t.as_str()).collect();
        let message = format!(
            "Foreign key cycle between migrated tables, ordering is best effort: {}",
            cyclic.join(", ")
        );
        warn!("{}", message);
        vec![message]
    }
}
