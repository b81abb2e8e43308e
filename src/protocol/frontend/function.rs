//! Fast-path function-call protocol frontend message.
//!
//! Large-object operations (`lo_open`, `loread`, `lowrite`, ...) are carried
//! as FunctionCall messages rather than SQL statements.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::Oid;

/// Write a FunctionCall message.
///
/// All arguments and the result use the binary format. `None` arguments are
/// transmitted as NULL (length -1).
pub fn write_function_call(buf: &mut Vec<u8>, fn_oid: Oid, args: &[Option<&[u8]>]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::FUNCTION_CALL);
    msg.write_u32(fn_oid);

    // One format code that applies to all arguments: binary.
    msg.write_i16(1);
    msg.write_i16(1);

    msg.write_i16(args.len() as i16);
    for arg in args {
        match arg {
            Some(bytes) => {
                msg.write_i32(bytes.len() as i32);
                msg.write_bytes(bytes);
            }
            None => msg.write_i32(-1),
        }
    }

    // Result format: binary.
    msg.write_i16(1);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_call_layout() {
        let mut buf = Vec::new();
        // lo_close(fd)
        write_function_call(&mut buf, 953, &[Some(&7_i32.to_be_bytes())]);

        assert_eq!(buf[0], b'F');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);

        // Function OID
        assert_eq!(&buf[5..9], &953_u32.to_be_bytes());
        // One format code, binary
        assert_eq!(&buf[9..13], &[0, 1, 0, 1]);
        // One argument, 4 bytes, value 7
        assert_eq!(&buf[13..15], &[0, 1]);
        assert_eq!(&buf[15..19], &4_i32.to_be_bytes());
        assert_eq!(&buf[19..23], &7_i32.to_be_bytes());
        // Binary result format
        assert_eq!(&buf[23..25], &[0, 1]);
    }

    #[test]
    fn test_function_call_null_argument() {
        let mut buf = Vec::new();
        write_function_call(&mut buf, 957, &[None]);

        // Argument count 1, then length -1 with no payload
        assert_eq!(&buf[13..15], &[0, 1]);
        assert_eq!(&buf[15..19], &(-1_i32).to_be_bytes());
    }
}
