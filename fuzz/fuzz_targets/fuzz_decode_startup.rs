#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pg_tls_proxy::protocol::decode::decode_startup;
use pg_tls_proxy::protocol::encode::encode_startup;
use pg_tls_proxy::protocol::StartupFrame;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    if let Ok((frame, consumed)) = decode_startup(&mut buf) {
        assert!(consumed >= 8 && consumed <= buf.len());

        // Anything we accept must survive being forwarded to a backend
        if let StartupFrame::Startup(msg) = frame {
            let mut reencoded = encode_startup(&msg);
            let (again, len) = decode_startup(&mut reencoded).expect("re-encoded startup decodes");
            assert_eq!(len, reencoded.len());
            assert_eq!(again, StartupFrame::Startup(msg));
        }
    }
});
