//! Diffing model columns against introspected ones.

use std::collections::{HashMap, HashSet};

use crate::dialect::{is_numeric_literal, Dialect};
use crate::schema::{ColumnChange, ColumnDifference, DatabaseColumn, ModelColumn};

/// Compares the live columns of a table with the model columns.
///
/// Additions and modifications come first in model order, drops follow in
/// database order. Metadata the dialect does not report is never treated as
/// a difference.
#[must_use]
pub fn compare_columns(
    dialect: &dyn Dialect,
    db: &[DatabaseColumn],
    model: &[ModelColumn],
) -> Vec<ColumnDifference> {
    let existing: HashMap<&str, &DatabaseColumn> =
        db.iter().map(|c| (c.name.as_str(), c)).collect();
    let mut diffs = Vec::new();

    for col in model {
        match existing.get(col.name.as_str()) {
            None => diffs.push(ColumnDifference::add(col.clone())),
            Some(current) => {
                if let Some(diff) = compare_column(dialect, current, col) {
                    diffs.push(diff);
                }
            }
        }
    }

    let wanted: HashSet<&str> = model.iter().map(|c| c.name.as_str()).collect();
    diffs.extend(
        db.iter()
            .filter(|c| !wanted.contains(c.name.as_str()))
            .map(|c| ColumnDifference::drop(c.clone())),
    );

    diffs
}

fn compare_column(
    dialect: &dyn Dialect,
    db: &DatabaseColumn,
    model: &ModelColumn,
) -> Option<ColumnDifference> {
    let caps = dialect.capabilities();
    let mut changes = Vec::new();
    let mut reasons = Vec::new();

    let same_type = dialect.types_equivalent(&model.sql_type, db);
    if !same_type {
        changes.push(ColumnChange::Type);
        reasons.push(format!(
            "type changed from {} to {}",
            db.raw_type,
            dialect.render_type(&model.sql_type)
        ));
    }

    if same_type && caps.reports_length {
        if let (Some(want), Some(have)) = (model.length(), db.length) {
            if want != have {
                changes.push(ColumnChange::Length);
                reasons.push(format!("length changed from {have} to {want}"));
            }
        }
    }

    if same_type && caps.reports_precision {
        if let (Some(precision), Some(scale)) = (model.precision(), model.scale()) {
            let precision_differs = db.precision.is_some_and(|p| p != precision);
            let scale_differs = db.scale.is_some_and(|s| s != scale);
            if precision_differs || scale_differs {
                changes.push(ColumnChange::Precision);
                reasons.push(format!(
                    "precision changed from ({},{}) to ({precision},{scale})",
                    db.precision.map_or_else(|| "?".to_string(), |p| p.to_string()),
                    db.scale.map_or_else(|| "?".to_string(), |s| s.to_string()),
                ));
            }
        }
    }

    let both_keys = model.primary_key && db.primary_key;

    if !both_keys && model.not_null != db.not_null {
        changes.push(ColumnChange::NotNull);
        reasons.push(if model.not_null {
            "column became NOT NULL".to_string()
        } else {
            "column became nullable".to_string()
        });
    }

    if !both_keys && model.unique != db.unique {
        changes.push(ColumnChange::Unique);
        reasons.push(if model.unique {
            "unique constraint added".to_string()
        } else {
            "unique constraint removed".to_string()
        });
    }

    let generated = model.auto_increment || db.auto_increment;
    if caps.reports_defaults && !generated {
        let want = model
            .default
            .as_deref()
            .map(|d| dialect.normalize_db_default(&dialect.render_default(&model.sql_type, d)));
        let have = db.default.as_deref().map(|d| dialect.normalize_db_default(d));
        if !defaults_match(want.as_deref(), have.as_deref()) {
            changes.push(ColumnChange::Default);
            reasons.push(format!(
                "default changed from {} to {}",
                have.as_deref().unwrap_or("none"),
                want.as_deref().unwrap_or("none")
            ));
        }
    }

    if caps.reports_comments {
        let want = model.comment.as_deref().filter(|c| !c.is_empty());
        let have = db.comment.as_deref().filter(|c| !c.is_empty());
        if want != have {
            changes.push(ColumnChange::Comment);
            reasons.push("comment changed".to_string());
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(ColumnDifference::modify(db.clone(), model.clone(), changes, &reasons))
    }
}

fn defaults_match(want: Option<&str>, have: Option<&str>) -> bool {
    let want = want.filter(|d| !d.eq_ignore_ascii_case("NULL"));
    let have = have.filter(|d| !d.eq_ignore_ascii_case("NULL"));
    match (want, have) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if a.eq_ignore_ascii_case(b) && !a.starts_with('\'') {
                return true;
            }
            if is_numeric_literal(a) && is_numeric_literal(b) {
                return a.parse::<f64>().ok() == b.parse::<f64>().ok();
            }
            a == b
        }
        _ => false,
    }
}
