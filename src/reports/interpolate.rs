//! Positional placeholder interpolation for assembled SQL.
//!
//! Report statements are built by concatenating one `UNION ALL` block per
//! selected facility, so they cannot go through a single natively-bound
//! prepared statement. This module substitutes the ordered `?` placeholders
//! of such a template with quoted, escaped literals. It is the last line of
//! defense against injection on that path: every value is escaped before
//! substitution, and a placeholder/parameter count mismatch fails loudly
//! instead of producing malformed SQL.

use thiserror::Error;

/// Errors raised during placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolateError {
    /// The template placeholder count does not match the parameter count.
    #[error("template has {placeholders} placeholders but {values} parameters were supplied")]
    PlaceholderMismatch { placeholders: usize, values: usize },
}

/// Quote a string value as a SQL literal.
///
/// Single quotes are doubled per standard-conforming string syntax.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push('\'');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Replace each `?` in `template`, in order, with the corresponding value
/// from `values`, quoted and escaped.
///
/// The number of placeholders must equal the number of values; a mismatch
/// is a programming error in the calling builder and returns
/// [`InterpolateError::PlaceholderMismatch`].
pub fn interpolate(template: &str, values: &[String]) -> Result<String, InterpolateError> {
    let placeholders = template.matches('?').count();
    if placeholders != values.len() {
        return Err(InterpolateError::PlaceholderMismatch {
            placeholders,
            values: values.len(),
        });
    }

    let mut sql = String::with_capacity(template.len() + values.len() * 24);
    let mut next = 0;
    for ch in template.chars() {
        if ch == '?' {
            sql.push_str(&quote_literal(&values[next]));
            next += 1;
        } else {
            sql.push(ch);
        }
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_in_order() {
        let sql = interpolate(
            "SELECT * FROM t WHERE stamp BETWEEN ? AND ?",
            &["2024-01-01 00:00:00".to_string(), "2024-01-02 00:00:00".to_string()],
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE stamp BETWEEN '2024-01-01 00:00:00' AND '2024-01-02 00:00:00'"
        );
    }

    #[test]
    fn test_too_few_parameters_fails() {
        let err = interpolate("? ?", &["a".to_string()]).unwrap_err();
        assert_eq!(
            err,
            InterpolateError::PlaceholderMismatch {
                placeholders: 2,
                values: 1
            }
        );
    }

    #[test]
    fn test_too_many_parameters_fails() {
        let err = interpolate("?", &["a".to_string(), "b".to_string()]).unwrap_err();
        assert_eq!(
            err,
            InterpolateError::PlaceholderMismatch {
                placeholders: 1,
                values: 2
            }
        );
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(interpolate("SELECT 1", &[]).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_escapes_single_quotes() {
        let sql = interpolate("WHERE name = ?", &["o'brien".to_string()]).unwrap();
        assert_eq!(sql, "WHERE name = 'o''brien'");
    }

    #[test]
    fn test_adversarial_values() {
        // A classic injection attempt stays inside the literal.
        let sql = interpolate("WHERE tag = ?", &["'; DROP TABLE t; --".to_string()]).unwrap();
        assert_eq!(sql, "WHERE tag = '''; DROP TABLE t; --'");

        // Backslashes are not escape characters in standard-conforming
        // strings and pass through untouched.
        let sql = interpolate("WHERE tag = ?", &["a\\'b".to_string()]).unwrap();
        assert_eq!(sql, "WHERE tag = 'a\\''b'");

        // Unicode passes through untouched.
        let sql = interpolate("WHERE tag = ?", &["stalling–日本語".to_string()]).unwrap();
        assert_eq!(sql, "WHERE tag = 'stalling–日本語'");
    }

    #[test]
    fn test_quote_literal_empty() {
        assert_eq!(quote_literal(""), "''");
    }
}
