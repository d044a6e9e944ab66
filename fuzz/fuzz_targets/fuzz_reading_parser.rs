#![no_main]
use libfuzzer_sys::fuzz_target;
use medibox_core::{Channel, ReadingValue, parser};

fuzz_target!(|data: &[u8]| {
    for channel in Channel::ALL {
        // Accepted numeric values are always finite.
        match parser::parse(channel, data) {
            Ok(ReadingValue::Scalar(v)) => assert!(v.is_finite()),
            Ok(ReadingValue::Vector(v)) => {
                assert!(v.x.is_finite() && v.y.is_finite() && v.z.is_finite());
            }
            Ok(_) | Err(_) => {}
        }
    }
});
