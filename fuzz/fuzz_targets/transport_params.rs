#![no_main]

use libfuzzer_sys::fuzz_target;
use params::TransportParameters;

fuzz_target!(|data: &[u8]| {
    let mut buf = data;
    if let Ok(decoded) = TransportParameters::decode(&mut buf) {
        assert!(buf.is_empty());
        let encoded = decoded.encode().expect("decoded parameters must re-encode");
        assert_eq!(
            TransportParameters::decode(&mut &encoded[..]).expect("re-encoded parameters must decode"),
            decoded
        );
    }
    let _ = TransportParameters::describe(data);
});
