//! COPY data model: rows, format options, and the COPY statement builder.

pub mod text;

use crate::error::{Error, Result};

/// One row of COPY data: ordered field values, `None` for NULL.
pub type Row = Vec<Option<String>>;

/// Direction of a COPY exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// `COPY ... FROM STDIN`
    FromStdin,
    /// `COPY ... TO STDOUT`
    ToStdout,
}

/// Text-format options for one COPY exchange.
///
/// The same options shape both sides: the statement sent to the server and
/// the local row codec, so the two always agree on framing.
#[derive(Debug, Clone)]
pub struct CopyFormat {
    /// Field delimiter, a single byte.
    ///
    /// Default: tab
    pub delimiter: u8,

    /// Textual NULL marker emitted/recognized unescaped.
    ///
    /// Default: `\N`
    pub null_marker: String,

    /// Explicit column list, empty for all columns in table order.
    pub columns: Vec<String>,
}

impl Default for CopyFormat {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            null_marker: "\\N".to_string(),
            columns: Vec::new(),
        }
    }
}

impl CopyFormat {
    /// Build the COPY statement matching these options.
    ///
    /// The table name and column names are interpolated as-is, like the SQL
    /// text a caller would write by hand; quoting identifiers is the
    /// caller's responsibility.
    pub fn statement(&self, table: &str, direction: CopyDirection) -> Result<String> {
        if matches!(self.delimiter, b'\\' | b'\r' | b'\n') || self.delimiter >= 0x80 {
            return Err(Error::InvalidUsage(format!(
                "invalid COPY delimiter: {:?}",
                self.delimiter as char
            )));
        }
        if self.null_marker.contains(['\r', '\n']) {
            return Err(Error::InvalidUsage(
                "COPY null marker must not contain newlines".into(),
            ));
        }

        let mut sql = String::with_capacity(64 + table.len());
        sql.push_str("COPY ");
        sql.push_str(table);
        if !self.columns.is_empty() {
            sql.push_str(" (");
            sql.push_str(&self.columns.join(", "));
            sql.push(')');
        }
        sql.push_str(match direction {
            CopyDirection::FromStdin => " FROM STDIN",
            CopyDirection::ToStdout => " TO STDOUT",
        });
        sql.push_str(" WITH DELIMITER E'");
        push_escaped_literal(&mut sql, self.delimiter as char);
        sql.push_str("' NULL AS E'");
        for c in self.null_marker.chars() {
            push_escaped_literal(&mut sql, c);
        }
        sql.push('\'');
        Ok(sql)
    }
}

/// Escape one character for inclusion in an E'...' string literal.
fn push_escaped_literal(sql: &mut String, c: char) {
    match c {
        '\\' => sql.push_str("\\\\"),
        '\'' => sql.push_str("\\'"),
        '\t' => sql.push_str("\\t"),
        _ => sql.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_defaults() {
        let format = CopyFormat::default();
        let sql = format.statement("t", CopyDirection::FromStdin).unwrap();
        assert_eq!(sql, "COPY t FROM STDIN WITH DELIMITER E'\\t' NULL AS E'\\\\N'");
    }

    #[test]
    fn test_statement_with_columns_and_custom_delimiter() {
        let format = CopyFormat {
            delimiter: b'|',
            null_marker: "NULL".to_string(),
            columns: vec!["a".to_string(), "b".to_string()],
        };
        let sql = format.statement("t", CopyDirection::ToStdout).unwrap();
        assert_eq!(sql, "COPY t (a, b) TO STDOUT WITH DELIMITER E'|' NULL AS E'NULL'");
    }

    #[test]
    fn test_backslash_delimiter_is_rejected() {
        let format = CopyFormat {
            delimiter: b'\\',
            ..CopyFormat::default()
        };
        assert!(matches!(
            format.statement("t", CopyDirection::FromStdin),
            Err(Error::InvalidUsage(_))
        ));
    }
}
