//! Protocol message decoding

use super::constants::{
    fields, tags, CANCEL_REQUEST_CODE, GSSENC_REQUEST_CODE, MAX_STARTUP_LENGTH,
    MIN_STARTUP_LENGTH, SSL_REQUEST_CODE,
};
use super::message::{ErrorFields, StartupFrame, StartupMessage, StartupParams};
use bytes::BytesMut;
use std::io;

/// Maximum tagged message length accepted by [`decode_error_response`].
const MAX_MESSAGE_LENGTH: usize = 1_048_576;

/// Decode a startup frame (SSLRequest, GSSENCRequest, CancelRequest or StartupMessage)
///
/// Startup frames have no type tag: a 4-byte length that includes itself, a 4-byte
/// protocol version or special request code, then the payload.
///
/// # Returns
/// `Ok((frame, consumed))` - Frame and number of bytes consumed
/// `Err(e)` with `UnexpectedEof` - more bytes are needed
/// `Err(e)` with `InvalidData` - the frame can never become valid
pub fn decode_startup(data: &mut BytesMut) -> io::Result<(StartupFrame, usize)> {
    if data.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete startup header",
        ));
    }

    let len = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if len < MIN_STARTUP_LENGTH as i32 || len as usize > MAX_STARTUP_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "invalid startup packet length {} (expected {}..={})",
                len, MIN_STARTUP_LENGTH, MAX_STARTUP_LENGTH
            ),
        ));
    }
    let len = len as usize;

    if data.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete startup body",
        ));
    }

    let code = i32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let body = &data[8..len];

    let frame = match code {
        SSL_REQUEST_CODE => {
            expect_empty(body, "SSLRequest")?;
            StartupFrame::SslRequest
        }
        GSSENC_REQUEST_CODE => {
            expect_empty(body, "GSSENCRequest")?;
            StartupFrame::GssEncRequest
        }
        CANCEL_REQUEST_CODE => decode_cancel_request(body)?,
        version if version >> 16 == 3 => StartupFrame::Startup(StartupMessage {
            version,
            params: decode_startup_params(body)?,
        }),
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported protocol version or request code: {}", other),
            ))
        }
    };

    Ok((frame, len))
}

fn expect_empty(body: &[u8], what: &str) -> io::Result<()> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} carries {} unexpected trailing bytes", what, body.len()),
        ))
    }
}

fn decode_cancel_request(body: &[u8]) -> io::Result<StartupFrame> {
    if body.len() != 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "CancelRequest must carry exactly 8 bytes",
        ));
    }
    let process_id = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let secret_key = i32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    Ok(StartupFrame::CancelRequest {
        process_id,
        secret_key,
    })
}

fn decode_startup_params(data: &[u8]) -> io::Result<StartupParams> {
    let mut params = StartupParams::default();
    let mut offset = 0;

    loop {
        let key = read_cstring(data, &mut offset, "parameter name")?;
        if key.is_empty() {
            break;
        }
        let value = read_cstring(data, &mut offset, "parameter value")?;
        params.push(key, value);
    }

    if offset != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes after startup parameters",
        ));
    }

    Ok(params)
}

/// Read a null-terminated UTF-8 string starting at `offset`, advancing past the null.
fn read_cstring(data: &[u8], offset: &mut usize, what: &str) -> io::Result<String> {
    let rest = data.get(*offset..).unwrap_or_default();
    let end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("missing null terminator in {}", what),
        )
    })?;
    let value = std::str::from_utf8(&rest[..end])
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("{} is not UTF-8", what)))?
        .to_string();
    *offset += end + 1;
    Ok(value)
}

/// Decode an ErrorResponse message (tag `E`)
///
/// Used by peers of the proxy (and tests) to read the fatal error the proxy sends.
pub fn decode_error_response(data: &mut BytesMut) -> io::Result<(ErrorFields, usize)> {
    if data.len() < 5 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message header",
        ));
    }

    let tag = data[0];
    if tag != tags::ERROR_RESPONSE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected ErrorResponse, got tag: {}", tag),
        ));
    }

    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    if !(4..=MAX_MESSAGE_LENGTH as i32).contains(&len) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid message length {}", len),
        ));
    }
    let len = len as usize;

    if data.len() < len + 1 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete message body",
        ));
    }

    let fields = decode_error_fields(&data[5..len + 1])?;
    Ok((fields, len + 1))
}

fn decode_error_fields(data: &[u8]) -> io::Result<ErrorFields> {
    let mut error = ErrorFields::default();
    let mut offset = 0;

    loop {
        if offset >= data.len() {
            break;
        }
        let field_type = data[offset];
        offset += 1;
        if field_type == 0 {
            break;
        }

        let end = data[offset..].iter().position(|&b| b == 0).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "missing null terminator in error field",
            )
        })?;
        let value = String::from_utf8_lossy(&data[offset..offset + end]).to_string();
        offset += end + 1;

        match field_type {
            fields::SEVERITY => error.severity = Some(value),
            fields::CODE => error.code = Some(value),
            fields::MESSAGE => error.message = Some(value),
            fields::DETAIL => error.detail = Some(value),
            fields::HINT => error.hint = Some(value),
            _ => {} // Ignore unknown fields
        }
    }

    Ok(error)
}
