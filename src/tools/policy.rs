// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Read-only statement guard
//!
//! Classifies SQL text by its leading keyword once comments and literals are
//! out of the way. Only single read statements pass when the policy is
//! enforced.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Whether the executor refuses non-read statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadOnlyPolicy {
    /// Reject anything that is not a single read statement
    #[default]
    Enforce,
    /// Hand every statement to the database unchecked
    Trust,
}

impl ReadOnlyPolicy {
    pub fn is_enforced(&self) -> bool {
        matches!(self, ReadOnlyPolicy::Enforce)
    }
}

/// Leading keywords of statements that only read
const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "VALUES", "SHOW", "DESCRIBE"];

static LEADING_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\(*\s*([A-Za-z]+)").unwrap());

// REPLACE alone is a common string function, so only REPLACE INTO counts.
static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|MERGE|UPSERT|CREATE|DROP|ALTER|TRUNCATE|ATTACH|DETACH|PRAGMA|VACUUM|REINDEX|GRANT|REVOKE|REPLACE\s+INTO)\b",
    )
    .unwrap()
});

/// Replace comments with a space and quoted text with empty quotes.
///
/// Handles `'..'`, `".."`, `` `..` `` and `[..]` quoting plus `--` and
/// `/* */` comments, which is enough to find statement boundaries and
/// keywords without a full parser.
pub fn strip_comments_and_literals(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                out.push(' ');
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                out.push(' ');
            }
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                i += 1;
                loop {
                    match chars.get(i) {
                        None => break,
                        // Doubled quote is an escaped quote
                        Some(&ch) if ch == close && close != ']' && chars.get(i + 1) == Some(&close) => {
                            i += 2;
                        }
                        Some(&ch) if ch == close => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                out.push(c);
                out.push(close);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Check that `sql` is one read statement; the error is the refusal reason.
pub fn check_read_only(sql: &str) -> Result<(), String> {
    let cleaned = strip_comments_and_literals(sql);
    let body = cleaned.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    if body.is_empty() {
        return Err("the query is empty".to_string());
    }
    if body.contains(';') {
        return Err("multiple statements are not allowed; send one statement per query".to_string());
    }

    let keyword = LEADING_KEYWORD
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default();

    if !READ_KEYWORDS.contains(&keyword.as_str()) {
        let shown = if keyword.is_empty() { "this" } else { keyword.as_str() };
        return Err(format!(
            "{} statements are not allowed; only read-only queries (SELECT, WITH, EXPLAIN, VALUES, SHOW, DESCRIBE) may run",
            shown
        ));
    }

    if let Some(found) = WRITE_KEYWORD.find(body) {
        return Err(format!(
            "the statement contains {} which modifies data; only read-only queries may run",
            found.as_str().to_ascii_uppercase()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_is_enforce() {
        assert_eq!(ReadOnlyPolicy::default(), ReadOnlyPolicy::Enforce);
        assert!(ReadOnlyPolicy::Enforce.is_enforced());
        assert!(!ReadOnlyPolicy::Trust.is_enforced());
    }

    #[test]
    fn test_read_statements_pass() {
        assert!(check_read_only("SELECT * FROM film").is_ok());
        assert!(check_read_only("  select title from film;  ").is_ok());
        assert!(check_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(check_read_only("EXPLAIN QUERY PLAN SELECT 1").is_ok());
        assert!(check_read_only("VALUES (1), (2)").is_ok());
        assert!(check_read_only("(SELECT 1) UNION (SELECT 2)").is_ok());
    }

    #[test]
    fn test_comments_are_ignored() {
        assert!(check_read_only("-- count rows\nSELECT COUNT(*) FROM film").is_ok());
        assert!(check_read_only("/* DROP TABLE film; */ SELECT 1").is_ok());
        assert!(check_read_only("SELECT 1 -- ; DELETE FROM film").is_ok());
    }

    #[test]
    fn test_literals_do_not_confuse_the_guard() {
        assert!(check_read_only("SELECT 'a;b' AS s").is_ok());
        assert!(check_read_only("SELECT * FROM film WHERE title = 'DROP TABLE'").is_ok());
        assert!(check_read_only("SELECT 'it''s; fine'").is_ok());
        assert!(check_read_only("SELECT replace(title, 'A', 'B') FROM film").is_ok());
        assert!(check_read_only("SELECT * FROM update_log").is_ok());
    }

    #[test]
    fn test_write_statements_rejected() {
        let err = check_read_only("DROP TABLE film").unwrap_err();
        assert!(err.contains("DROP"));
        assert!(check_read_only("delete from film").is_err());
        assert!(check_read_only("INSERT INTO film VALUES (1)").is_err());
        assert!(check_read_only("UPDATE film SET title = 'x'").is_err());
        assert!(check_read_only("PRAGMA writable_schema = 1").is_err());
        assert!(check_read_only("ATTACH DATABASE 'x.db' AS x").is_err());
    }

    #[test]
    fn test_write_hidden_in_with_rejected() {
        let err = check_read_only("WITH t AS (SELECT 1) DELETE FROM film").unwrap_err();
        assert!(err.contains("DELETE"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = check_read_only("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.contains("multiple statements"));
        assert!(check_read_only("SELECT 1; DROP TABLE film").is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(check_read_only("").is_err());
        assert!(check_read_only("  -- nothing\n ;").is_err());
    }

    #[test]
    fn test_strip_comments_and_literals() {
        assert_eq!(
            strip_comments_and_literals("SELECT 'x' /* c */ FROM [my table] -- tail"),
            "SELECT ''   FROM []  "
        );
    }
}
