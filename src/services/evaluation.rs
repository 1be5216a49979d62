//! Predicate evaluation against query row sets.

use crate::db::RowSet;
use crate::models::check::Predicate;

/// Longest observed value kept for the report.
const MAX_OBSERVED_LEN: usize = 200;

/// Verdict of one predicate against one row set.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    /// Values that decided the verdict, for display.
    pub observed: Option<String>,
}

/// Apply a predicate to a row set.
pub fn evaluate(predicate: &Predicate, rows: &RowSet) -> Verdict {
    let passed = match predicate {
        Predicate::Equals { value, ignore_case } => {
            all_values(rows, |v| text_eq(v, value, *ignore_case))
        }
        Predicate::NotEquals { value, ignore_case } => {
            all_values(rows, |v| !text_eq(v, value, *ignore_case))
        }
        Predicate::OneOf {
            values,
            ignore_case,
        } => all_values(rows, |v| values.iter().any(|e| text_eq(v, e, *ignore_case))),
        Predicate::NoneOf {
            values,
            ignore_case,
        } => all_values(rows, |v| !values.iter().any(|e| text_eq(v, e, *ignore_case))),
        Predicate::AtMost { value } => all_values(rows, |v| parse_number(v).is_some_and(|n| n <= *value)),
        Predicate::AtLeast { value } => all_values(rows, |v| parse_number(v).is_some_and(|n| n >= *value)),
        Predicate::NoRows => rows.is_empty(),
        Predicate::HasRows => !rows.is_empty(),
    };

    Verdict {
        passed,
        observed: observed(predicate, rows),
    }
}

/// Every first-column value satisfies `test`, and there is at least one row.
fn all_values(rows: &RowSet, test: impl Fn(&str) -> bool) -> bool {
    !rows.is_empty() && rows.first_column().all(|v| test(v.trim()))
}

fn text_eq(actual: &str, expected: &str, ignore_case: bool) -> bool {
    let expected = expected.trim();
    if ignore_case {
        actual.eq_ignore_ascii_case(expected)
    } else {
        actual == expected
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Row-count predicates show the offending rows; value predicates show values.
fn observed(predicate: &Predicate, rows: &RowSet) -> Option<String> {
    if rows.is_empty() {
        return match predicate {
            Predicate::NoRows | Predicate::HasRows => Some("no rows".to_string()),
            _ => None,
        };
    }

    let rendered = match predicate {
        Predicate::NoRows | Predicate::HasRows => {
            let preview: Vec<String> = rows
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|v| v.as_deref().unwrap_or("NULL"))
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect();
            format!("{} row(s): {}", rows.rows.len(), preview.join("; "))
        }
        _ => {
            let mut distinct: Vec<&str> = Vec::new();
            for v in rows.first_column().map(str::trim) {
                if !distinct.contains(&v) {
                    distinct.push(v);
                }
            }
            distinct.join(", ")
        }
    };

    Some(truncate(rendered))
}

fn truncate(mut s: String) -> String {
    if s.chars().count() > MAX_OBSERVED_LEN {
        s = s.chars().take(MAX_OBSERVED_LEN).collect();
        s.push('…');
    }
    s
}
