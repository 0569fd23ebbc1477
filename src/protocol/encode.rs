//! Protocol message encoding

use super::constants::{fields, tags, SSL_REQUEST_CODE};
use super::message::{ErrorFields, StartupMessage};
use bytes::{BufMut, BytesMut};

/// Encode a startup message (no type byte)
pub fn encode_startup(msg: &StartupMessage) -> BytesMut {
    let mut buf = BytesMut::new();

    // Reserve space for length (will be filled at end)
    let len_pos = buf.len();
    buf.put_i32(0);

    buf.put_i32(msg.version);

    // Parameters (key-value pairs, null-terminated)
    for (key, value) in msg.params.as_slice() {
        buf.put(key.as_bytes());
        buf.put_u8(0);
        buf.put(value.as_bytes());
        buf.put_u8(0);
    }

    // Final null terminator
    buf.put_u8(0);

    let len = buf.len() - len_pos;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as i32).to_be_bytes());

    buf
}

/// Encode the 8-byte SSLRequest
pub fn encode_ssl_request() -> BytesMut {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_i32(8); // Length (includes itself)
    buf.put_i32(SSL_REQUEST_CODE);
    buf
}

/// Encode an ErrorResponse
///
/// Severity is written both as the localized (`S`) and non-localized (`V`) field.
pub fn encode_error_response(error: &ErrorFields) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(tags::ERROR_RESPONSE);
    let len_pos = buf.len();
    buf.put_i32(0);

    if let Some(severity) = &error.severity {
        put_field(&mut buf, fields::SEVERITY, severity);
        put_field(&mut buf, fields::SEVERITY_NONLOCALIZED, severity);
    }
    if let Some(code) = &error.code {
        put_field(&mut buf, fields::CODE, code);
    }
    if let Some(message) = &error.message {
        put_field(&mut buf, fields::MESSAGE, message);
    }
    if let Some(detail) = &error.detail {
        put_field(&mut buf, fields::DETAIL, detail);
    }
    if let Some(hint) = &error.hint {
        put_field(&mut buf, fields::HINT, hint);
    }
    buf.put_u8(0);

    let len = buf.len() - len_pos;
    buf[len_pos..len_pos + 4].copy_from_slice(&(len as i32).to_be_bytes());

    buf
}

fn put_field(buf: &mut BytesMut, field: u8, value: &str) {
    buf.put_u8(field);
    // Interior nulls would terminate the field early on the reader's side
    buf.put(value.replace('\0', "").as_bytes());
    buf.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::StartupParams;

    #[test]
    fn test_encode_ssl_request() {
        let buf = encode_ssl_request();

        // SSLRequest is exactly 8 bytes: 4-byte length (8) + 4-byte code (80877103)
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x08]);
        assert_eq!(&buf[4..8], &[0x04, 0xD2, 0x16, 0x2F]);
    }

    #[test]
    fn test_encode_startup() {
        let msg = StartupMessage::new(
            vec![("database", "mydb")]
                .into_iter()
                .collect::<StartupParams>(),
        );
        let buf = encode_startup(&msg);

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());
        assert_eq!(&buf[4..8], &[0, 3, 0, 0]);
        assert_eq!(&buf[8..], b"database\0mydb\0\0");
    }

    #[test]
    fn test_encode_error_response() {
        let buf = encode_error_response(&ErrorFields::fatal("boom"));

        assert_eq!(buf[0], b'E');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len, (buf.len() - 1) as i32);
        assert_eq!(&buf[5..], b"SFATAL\0VFATAL\0C08004\0Mboom\0\0");
    }
}
