#![no_main]

use cubic_tag::Tag;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Metadata values come straight off disk, so any input must fail cleanly
    if let Ok(tag) = Tag::from_bytes(data) {
        // Compare bytes, NaN doubles never equal themselves
        let bytes = tag.to_bytes().unwrap();
        assert_eq!(Tag::from_bytes(&bytes).unwrap().to_bytes().unwrap(), bytes);
    }
});
