//! Lexical read-only guard for catalog statements.
//!
//! Strips comments and quoted literals, then requires a single statement that
//! starts with a query keyword, contains no data- or schema-changing keyword
//! and calls no function known to change server or session state.

use std::sync::LazyLock;

use regex::Regex;

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|merge|upsert|drop|alter|create|grant|revoke|truncate|rename|exec|execute|call|copy|into|lock|vacuum|reindex|cluster|do|begin|declare|commit|rollback|savepoint|shutdown|kill|dbcc|backup|restore|load|import|comment|audit|noaudit|purge|flashback|analyze|refresh|listen|notify|reset|set|use|sp_configure)\b",
    )
    .expect("valid regex")
});

/// Side-effecting functions of PostgreSQL, SQL Server and Oracle. Only the
/// call form is matched, so a column or view of the same name still passes.
static FORBIDDEN_FUNCTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(set_config|pg_terminate_backend|pg_cancel_backend|pg_reload_conf|pg_rotate_logfile|pg_switch_wal|pg_create_restore_point|pg_promote|pg_(?:try_)?advisory_\w+|pg_file_\w+|pg_logical_emit_message|pg_create_\w+_replication_slot|pg_drop_replication_slot|nextval|setval|lo_\w+|dblink\w*|query_to_xml\w*|openquery|openrowset|opendatasource|xp_\w+|sp_\w+|dbms_\w+(?:\.\w+)?|utl_\w+(?:\.\w+)?)\s*\(",
    )
    .expect("valid regex")
});

const ALLOWED_LEADING: [&str; 4] = ["select", "with", "show", "values"];

/// Why a statement was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("statement is empty")]
    Empty,
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    #[error("statement must start with SELECT, WITH, SHOW or VALUES (found '{0}')")]
    NotAQuery(String),
    #[error("statement contains forbidden keyword '{0}'")]
    ForbiddenKeyword(String),
    #[error("statement calls side-effecting function '{0}'")]
    ForbiddenFunction(String),
    #[error("unterminated quote or comment")]
    Unterminated,
}

/// Verify that a statement cannot modify the target database.
pub fn ensure_read_only(statement: &str) -> Result<(), GuardError> {
    let stripped = strip_literals_and_comments(statement)?;
    let trimmed = stripped.trim().trim_end_matches(';').trim_end();

    if trimmed.is_empty() {
        return Err(GuardError::Empty);
    }
    if trimmed.contains(';') {
        return Err(GuardError::MultipleStatements);
    }

    let leading = trimmed
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_lowercase();
    if !ALLOWED_LEADING.contains(&leading.as_str()) {
        return Err(GuardError::NotAQuery(leading));
    }

    // SHOW <parameter> is the only place a bare parameter name follows the keyword.
    let body = if leading == "show" {
        ""
    } else {
        trimmed
    };
    if let Some(m) = FORBIDDEN.find(body) {
        return Err(GuardError::ForbiddenKeyword(m.as_str().to_uppercase()));
    }
    if let Some(name) = FORBIDDEN_FUNCTIONS.captures(body).and_then(|c| c.get(1)) {
        return Err(GuardError::ForbiddenFunction(name.as_str().to_lowercase()));
    }

    Ok(())
}

/// Replace string literals, quoted identifiers and comments with spaces.
fn strip_literals_and_comments(sql: &str) -> Result<String, GuardError> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                let mut closed = false;
                while let Some(n) = chars.next() {
                    if n == quote {
                        // doubled quote is an escaped quote
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(GuardError::Unterminated);
                }
                out.push(' ');
            }
            '[' => {
                // T-SQL bracketed identifier
                if !chars.by_ref().any(|n| n == ']') {
                    return Err(GuardError::Unterminated);
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return Err(GuardError::Unterminated);
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_selects() {
        assert!(ensure_read_only("SELECT UPPER(VALUE) FROM V$PARAMETER WHERE NAME = 'x'").is_ok());
        assert!(ensure_read_only("select name from sys.databases;").is_ok());
        assert!(ensure_read_only("WITH r AS (SELECT 1) SELECT * FROM r").is_ok());
        assert!(ensure_read_only("SHOW log_connections").is_ok());
    }

    #[test]
    fn keywords_inside_literals_are_ignored() {
        assert!(ensure_read_only(
            "SELECT value_in_use FROM sys.configurations WHERE name = 'xp_cmdshell; DROP TABLE x'"
        )
        .is_ok());
        assert!(ensure_read_only(
            "SELECT GRANTEE FROM DBA_SYS_PRIVS WHERE PRIVILEGE = 'GRANT ANY PRIVILEGE'"
        )
        .is_ok());
        assert!(ensure_read_only("SELECT 'it''s' AS note").is_ok());
    }

    #[test]
    fn rejects_dml_and_ddl() {
        assert_eq!(
            ensure_read_only("DELETE FROM users"),
            Err(GuardError::NotAQuery("delete".to_string()))
        );
        assert_eq!(
            ensure_read_only("SELECT * INTO backup_users FROM users"),
            Err(GuardError::ForbiddenKeyword("INTO".to_string()))
        );
        assert_eq!(
            ensure_read_only("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d"),
            Err(GuardError::ForbiddenKeyword("DELETE".to_string()))
        );
    }

    #[test]
    fn rejects_side_effecting_functions() {
        let cases = [
            ("SELECT set_config('default_transaction_read_only', 'off', false)", "set_config"),
            ("SELECT pg_terminate_backend(pid) FROM pg_stat_activity", "pg_terminate_backend"),
            ("SELECT pg_cancel_backend (42)", "pg_cancel_backend"),
            ("SELECT pg_reload_conf()", "pg_reload_conf"),
            ("SELECT nextval('audit_seq')", "nextval"),
            ("SELECT lo_unlink(16400)", "lo_unlink"),
            ("SELECT * FROM dblink('host=x', 'DELETE FROM t') AS r(a int)", "dblink"),
            ("SELECT * FROM OPENQUERY(LINKED, 'DELETE FROM dbo.users')", "openquery"),
            ("SELECT * FROM OPENROWSET('SQLNCLI', 'x', 'SELECT 1')", "openrowset"),
            ("SELECT DBMS_LOCK.SLEEP(10) FROM DUAL", "dbms_lock.sleep"),
            ("SELECT UTL_HTTP.REQUEST('http://x') FROM DUAL", "utl_http.request"),
        ];
        for (sql, name) in cases {
            assert_eq!(
                ensure_read_only(sql),
                Err(GuardError::ForbiddenFunction(name.to_string())),
                "{sql}"
            );
        }
    }

    #[test]
    fn string_functions_and_same_named_columns_pass() {
        assert!(ensure_read_only("SELECT REPLACE(name, '_', ' ') FROM sys.databases").is_ok());
        assert!(ensure_read_only("SELECT name FROM pg_settings WHERE name = 'lo_compat_privileges'").is_ok());
        assert!(ensure_read_only("SELECT sp_name FROM audit_view").is_ok());
        assert!(ensure_read_only("SELECT current_setting('ssl')").is_ok());
    }

    #[test]
    fn rejects_stacked_statements() {
        assert_eq!(
            ensure_read_only("SELECT 1; DROP TABLE users"),
            Err(GuardError::MultipleStatements)
        );
    }

    #[test]
    fn comments_cannot_hide_keywords_or_smuggle_statements() {
        assert!(ensure_read_only("SELECT 1 -- DROP TABLE users").is_ok());
        assert!(ensure_read_only("SELECT /* update */ 1").is_ok());
        assert_eq!(
            ensure_read_only("/* SELECT */ UPDATE t SET a = 1"),
            Err(GuardError::NotAQuery("update".to_string()))
        );
    }

    #[test]
    fn rejects_unterminated_input() {
        assert_eq!(ensure_read_only("SELECT 'open"), Err(GuardError::Unterminated));
        assert_eq!(ensure_read_only("SELECT 1 /* open"), Err(GuardError::Unterminated));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ensure_read_only("  ;  "), Err(GuardError::Empty));
        assert_eq!(ensure_read_only("-- only a comment"), Err(GuardError::Empty));
    }
}
