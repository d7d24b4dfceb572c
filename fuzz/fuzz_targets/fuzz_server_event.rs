#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The binary-frame path must absorb arbitrary bytes (including invalid
    // UTF-8) without panicking — unknown shapes become ServerEvent::Unknown.
    let _ = decoy_den_client::protocol::ServerEvent::parse_bytes(data);

    // Also exercise the str-based path for valid UTF-8 input, and the raw
    // serde path that parse() wraps.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decoy_den_client::protocol::ServerEvent::parse(s);
        let _ = serde_json::from_str::<decoy_den_client::protocol::ServerEvent>(s);
    }
});
