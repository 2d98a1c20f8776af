#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Service-layer and username filters over the feature table.
//!
//! Both filters are pure: they never mutate their input and always
//! return the same output for the same input. [`filter_by_users`]
//! borrows the input unchanged when no user filter applies, so the common
//! "All Users" case costs nothing.

use std::borrow::Cow;
use std::collections::BTreeSet;

use ecosystem_map_feature_models::{FeatureRow, FeatureTable};
use ecosystem_map_service_models::ServiceLayer;
use serde::{Deserialize, Serialize};

/// Selection value meaning "apply no user filter".
pub const ALL_USERS: &str = "All Users";

/// Default column holding the surveyor's name, used for the username
/// options and statistics.
pub const DEFAULT_USER_COLUMN: &str = "Your name";

/// Columns [`filter_by_users`] matches against, in this order. The
/// display column is tried only after all of them.
pub const DEFAULT_USER_FALLBACKS: [&str; 7] = [
    "Name, initials or username",
    "username",
    "user",
    "collector",
    "surveyor",
    "author",
    "created_by",
];

/// Non-fatal conditions reported by the filters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterWarning {
    /// None of the candidate user columns exist; user filtering is off.
    #[error("No user column found in data. Available columns: {}", available.join(", "))]
    NoUserColumn {
        /// The columns present in the table.
        available: Vec<String>,
    },
}

/// The columns that may hold usernames.
///
/// Options and statistics read [`Self::column`] first; the user filter
/// tries [`Self::fallback_columns`] first and [`Self::column`] last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct UserColumns {
    /// Display column.
    pub column: String,
    /// Filter columns, tried in order.
    pub fallback_columns: Vec<String>,
}

impl Default for UserColumns {
    fn default() -> Self {
        Self {
            column: DEFAULT_USER_COLUMN.to_string(),
            fallback_columns: DEFAULT_USER_FALLBACKS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl UserColumns {
    /// Candidates for options and statistics: the display column first.
    pub fn display_candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.column.as_str())
            .chain(self.fallback_columns.iter().map(String::as_str))
    }

    /// Candidates for [`filter_by_users`]: the filter columns in order,
    /// then the display column.
    pub fn filter_candidates(&self) -> impl Iterator<Item = &str> {
        self.fallback_columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.column.as_str()))
    }

    /// Resolves the column usernames are listed from.
    #[must_use]
    pub fn resolve<'a>(&'a self, table: &FeatureTable) -> Option<&'a str> {
        resolve_user_column(table.columns(), self.display_candidates())
    }

    /// Resolves the column [`filter_by_users`] matches against.
    #[must_use]
    pub fn resolve_filter<'a>(&'a self, table: &FeatureTable) -> Option<&'a str> {
        resolve_user_column(table.columns(), self.filter_candidates())
    }
}

/// Returns the first of `candidates` that appears in `columns`.
pub fn resolve_user_column<'a, I>(columns: &[String], candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .find(|candidate| columns.iter().any(|c| c == *candidate))
}

/// Returns `true` if `row`'s value in `layer.filter_col` contains the
/// layer's code.
#[must_use]
pub fn row_matches_service(table: &FeatureTable, row: &FeatureRow, layer: &ServiceLayer) -> bool {
    table
        .column_index(layer.filter_col)
        .and_then(|i| row.values[i].as_text())
        .is_some_and(|codes| codes.contains(layer.filter_val))
}

/// Selects the rows whose code column contains `layer.filter_val`.
///
/// Empty code values never match. A missing column yields an empty table.
#[must_use]
pub fn filter_by_service(table: &FeatureTable, layer: &ServiceLayer) -> FeatureTable {
    let Some(index) = table.column_index(layer.filter_col) else {
        log::debug!("Column {} absent; layer {} is empty", layer.filter_col, layer.id);
        return FeatureTable::empty(table.columns().to_vec());
    };

    table.filter(|row| {
        row.values[index]
            .as_text()
            .is_some_and(|codes| codes.contains(layer.filter_val))
    })
}

/// Result of [`filter_by_users`].
#[derive(Debug, Clone)]
pub struct UserFilter<'a> {
    /// The filtered table, borrowed when no filter applied.
    pub table: Cow<'a, FeatureTable>,
    /// Set when filtering was requested but no user column exists.
    pub warning: Option<FilterWarning>,
}

/// Returns `true` if `selected` means "no user filter".
#[must_use]
pub fn is_all_users(selected: &[String]) -> bool {
    selected.is_empty() || selected.iter().any(|user| user == ALL_USERS)
}

/// Selects the rows whose user column value is one of `selected`.
///
/// The column is the first of [`UserColumns::filter_candidates`] present
/// in the schema. An empty selection or one containing [`ALL_USERS`]
/// returns `table` unchanged. When no candidate column exists the table is also returned
/// unchanged, together with [`FilterWarning::NoUserColumn`].
#[must_use]
pub fn filter_by_users<'a>(
    table: &'a FeatureTable,
    selected: &[String],
    columns: &UserColumns,
) -> UserFilter<'a> {
    if is_all_users(selected) {
        return UserFilter {
            table: Cow::Borrowed(table),
            warning: None,
        };
    }

    let Some((column, index)) = columns
        .resolve_filter(table)
        .and_then(|c| table.column_index(c).map(|i| (c, i)))
    else {
        let warning = FilterWarning::NoUserColumn {
            available: table.columns().to_vec(),
        };
        log::warn!("{warning}");
        return UserFilter {
            table: Cow::Borrowed(table),
            warning: Some(warning),
        };
    };

    let wanted: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
    let filtered = table.filter(|row| {
        row.values[index]
            .to_text()
            .is_some_and(|user| wanted.contains(user.as_str()))
    });

    log::debug!(
        "User filter on '{column}' kept {} of {} rows",
        filtered.len(),
        table.len()
    );

    UserFilter {
        table: Cow::Owned(filtered),
        warning: None,
    }
}

/// Sorted unique non-empty usernames found in `column`.
#[must_use]
pub fn unique_users(table: &FeatureTable, column: &str) -> BTreeSet<String> {
    table
        .column_values(column)
        .filter_map(ecosystem_map_feature_models::AttributeValue::to_text)
        .filter(|user| !user.is_empty())
        .collect()
}

/// Options for the user multi-select: [`ALL_USERS`] followed by the
/// sorted unique usernames.
#[must_use]
pub fn user_options(table: &FeatureTable, column: &str) -> Vec<String> {
    std::iter::once(ALL_USERS.to_string())
        .chain(unique_users(table, column))
        .collect()
}
