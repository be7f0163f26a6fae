use filterkit::counting::CounterWidth;
use filterkit::counting::CountingBloomFilter;
use filterkit::counting::CountingBloomFilterBuilder;

#[test]
fn counts_and_removal_match_the_reference_scenario() {
    let mut filter = CountingBloomFilterBuilder::with_accuracy(20, 0.01)
        .counter_width(CounterWidth::Bits8)
        .build();

    filter.insert_str("foo");
    filter.insert_str("bar");
    filter.insert_str("multi");
    filter.insert_str("multi");

    assert_eq!(filter.count(b"multi"), 2);
    assert_eq!(filter.count(b"fizzbuzz"), 0);
    assert!(!filter.contains_str("baz"));

    filter.remove_str("bar");
    filter.remove_str("multi");

    assert!(!filter.contains_str("bar"));
    assert!(filter.contains_str("multi"));
    assert_eq!(filter.count(b"multi"), 1);

    let bytes = filter.serialize();
    let restored = CountingBloomFilter::deserialize(&bytes).unwrap();

    assert!(!restored.contains_str("bar"));
    assert!(restored.contains_str("multi"));
    assert_eq!(restored.count(b"multi"), 1);
}

#[test]
fn remove_inverts_add_when_no_saturation_occurred() {
    let mut filter = CountingBloomFilterBuilder::with_size(4096, 5).build();

    assert!(!filter.contains_str("x"));
    filter.insert_str("x");
    filter.remove_str("x");
    assert!(!filter.contains_str("x"));
}

#[test]
fn saturated_counters_still_report_membership_after_one_remove() {
    // Once a counter saturates, "true" multiplicity is lost: removing once
    // only brings it down from the saturation ceiling, not back to the
    // actual insert count, so membership keeps reporting true.
    let mut filter = CountingBloomFilterBuilder::with_size(64, 2)
        .counter_width(CounterWidth::Bits8)
        .build();

    for _ in 0..(u8::MAX as u32 + 10) {
        filter.insert_str("hot");
    }
    assert_eq!(filter.count(b"hot"), u8::MAX as u64);

    filter.remove_str("hot");
    assert_eq!(filter.count(b"hot"), u8::MAX as u64 - 1);
    assert!(filter.contains_str("hot"));
}
