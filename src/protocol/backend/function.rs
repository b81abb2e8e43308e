//! Fast-path function-call protocol backend message.

use crate::error::Result;
use crate::protocol::codec::{read_bytes, read_i32};

/// FunctionCallResponse message - result value of a fast-path call.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCallResponse<'a> {
    /// Result bytes in the requested format, or `None` for a NULL result.
    pub value: Option<&'a [u8]>,
}

impl<'a> FunctionCallResponse<'a> {
    /// Parse a FunctionCallResponse message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (len, rest) = read_i32(payload)?;
        if len == -1 {
            return Ok(Self { value: None });
        }
        let (value, _) = read_bytes(rest, len as usize)?;
        Ok(Self { value: Some(value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int4_result() {
        let mut payload = 4_i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&17_i32.to_be_bytes());

        let resp = FunctionCallResponse::parse(&payload).unwrap();
        assert_eq!(resp.value, Some(&17_i32.to_be_bytes()[..]));
    }

    #[test]
    fn test_parse_null_result() {
        let payload = (-1_i32).to_be_bytes();
        let resp = FunctionCallResponse::parse(&payload).unwrap();
        assert!(resp.value.is_none());
    }
}
