#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pg_tls_proxy::protocol::decode::decode_error_response;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    loop {
        if buf.is_empty() {
            break;
        }
        match decode_error_response(&mut buf) {
            Ok((_, consumed)) => {
                if consumed == 0 {
                    break;
                }
                let _ = buf.split_to(consumed);
            }
            Err(_) => break,
        }
    }
});
