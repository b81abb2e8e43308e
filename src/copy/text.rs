//! COPY text-format row codec.
//!
//! Encoding matches what the server itself emits for `COPY ... TO STDOUT`:
//! backslash and the delimiter are backslash-escaped, and the control
//! characters BS/FF/LF/CR/TAB/VT become `\b` `\f` `\n` `\r` `\t` `\v`.
//! NULL fields are the configured marker, written unescaped; decoding
//! therefore recognizes NULL only on an exact pre-unescape match, so a data
//! field that merely unescapes to the marker text survives as data.

use crate::copy::{CopyFormat, Row};
use crate::error::{Error, Result};

/// Encode one row as a COPY text line (including the trailing newline).
pub fn encode_row(out: &mut Vec<u8>, row: &Row, format: &CopyFormat) -> Result<()> {
    for (i, field) in row.iter().enumerate() {
        if i > 0 {
            out.push(format.delimiter);
        }
        match field {
            None => out.extend_from_slice(format.null_marker.as_bytes()),
            Some(value) => encode_field(out, value, format.delimiter)?,
        }
    }
    out.push(b'\n');
    Ok(())
}

fn encode_field(out: &mut Vec<u8>, value: &str, delimiter: u8) -> Result<()> {
    for &b in value.as_bytes() {
        match b {
            0 => {
                return Err(Error::Encoding(
                    "field value contains a NUL byte, which COPY text format cannot carry".into(),
                ));
            }
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x0b => out.extend_from_slice(b"\\v"),
            _ if b == delimiter => {
                out.push(b'\\');
                out.push(b);
            }
            _ => out.push(b),
        }
    }
    Ok(())
}

/// Decode one COPY text line (without the trailing newline) into a row.
pub fn decode_row(line: &[u8], format: &CopyFormat) -> Result<Row> {
    simdutf8::basic::from_utf8(line)
        .map_err(|e| Error::Protocol(format!("COPY line is not valid UTF-8: {e}")))?;
    let mut row = Row::new();
    for raw in split_fields(line, format.delimiter) {
        if raw == format.null_marker.as_bytes() {
            row.push(None);
        } else {
            row.push(Some(decode_field(raw)?));
        }
    }
    Ok(row)
}

/// Split a line on unescaped delimiter occurrences. A backslash escapes the
/// byte after it, so escaped delimiters stay inside their field.
fn split_fields(line: &[u8], delimiter: u8) -> Vec<&[u8]> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' {
            i += 2;
        } else if line[i] == delimiter {
            fields.push(&line[start..i]);
            i += 1;
            start = i;
        } else {
            i += 1;
        }
    }
    fields.push(&line[start.min(line.len())..]);
    fields
}

fn decode_field(raw: &[u8]) -> Result<String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&escaped) = raw.get(i) else {
            return Err(Error::Protocol(
                "COPY field ends with a dangling backslash".into(),
            ));
        };
        out.push(match escaped {
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            other => other,
        });
        i += 1;
    }
    String::from_utf8(out)
        .map_err(|e| Error::Protocol(format!("COPY field is not valid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(row: Row, format: &CopyFormat) {
        let mut line = Vec::new();
        encode_row(&mut line, &row, format).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let decoded = decode_row(&line[..line.len() - 1], format).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_roundtrip_plain() {
        roundtrip(
            vec![Some("1".into()), Some("alice".into()), None],
            &CopyFormat::default(),
        );
    }

    #[test]
    fn test_roundtrip_special_characters() {
        roundtrip(
            vec![
                Some("tab\there".into()),
                Some("line\nbreak".into()),
                Some("back\\slash".into()),
                Some("cr\rhere".into()),
            ],
            &CopyFormat::default(),
        );
    }

    #[test]
    fn test_roundtrip_custom_delimiter() {
        let format = CopyFormat {
            delimiter: b'|',
            ..CopyFormat::default()
        };
        roundtrip(
            vec![Some("a|b".into()), Some("c".into()), None],
            &format,
        );
    }

    #[test]
    fn test_null_marker_emitted_unescaped() {
        let mut line = Vec::new();
        encode_row(&mut line, &vec![None], &CopyFormat::default()).unwrap();
        assert_eq!(line, b"\\N\n");
    }

    #[test]
    fn test_value_equal_to_null_marker_text_stays_data() {
        // A real value "\N" is escaped on the wire, so it never collides with
        // the unescaped marker.
        let format = CopyFormat::default();
        let row: Row = vec![Some("\\N".into())];
        let mut line = Vec::new();
        encode_row(&mut line, &row, &format).unwrap();
        assert_eq!(line, b"\\\\N\n");

        let decoded = decode_row(&line[..line.len() - 1], &format).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_exact_unescaped_marker_decodes_to_null() {
        let decoded = decode_row(b"\\N", &CopyFormat::default()).unwrap();
        assert_eq!(decoded, vec![None]);
    }

    #[test]
    fn test_marker_text_plus_suffix_decodes_to_text() {
        let decoded = decode_row(b"\\\\Nx", &CopyFormat::default()).unwrap();
        assert_eq!(decoded, vec![Some("\\Nx".to_string())]);
    }

    #[test]
    fn test_nul_byte_is_encoding_error() {
        let mut line = Vec::new();
        let row: Row = vec![Some("bad\0value".into())];
        assert!(matches!(
            encode_row(&mut line, &row, &CopyFormat::default()),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_empty_field_vs_null() {
        let format = CopyFormat::default();
        let row: Row = vec![Some(String::new()), None, Some(String::new())];
        let mut line = Vec::new();
        encode_row(&mut line, &row, &format).unwrap();
        assert_eq!(line, b"\t\\N\t\n");
        let decoded = decode_row(&line[..line.len() - 1], &format).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_dangling_backslash_is_protocol_error() {
        assert!(decode_row(b"oops\\", &CopyFormat::default()).is_err());
    }
}
