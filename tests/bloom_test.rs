use filterkit::bloom::BloomFilter;
use filterkit::bloom::BloomFilterBuilder;

#[test]
fn basic_insert_and_lookup_round_trips_through_persistence() {
    let mut filter = BloomFilterBuilder::with_accuracy(15, 0.01).build();

    filter.insert_str("asdf");
    filter.insert_str("bar");
    filter.insert_str("foo");

    assert!(filter.contains_str("foo"));
    assert!(filter.contains_str("bar"));
    assert!(filter.contains_str("asdf"));
    assert!(!filter.contains_str("baz"));

    let bytes = filter.serialize();
    let restored = BloomFilter::deserialize(&bytes).unwrap();

    assert!(restored.contains_str("foo"));
    assert!(restored.contains_str("bar"));
    assert!(restored.contains_str("asdf"));
    assert!(!restored.contains_str("baz"));
}

#[test]
fn empty_filter_has_no_members() {
    let filter = BloomFilterBuilder::with_accuracy(100, 0.01).build();
    assert!(!filter.contains_str("anything"));
    assert!(!filter.contains_str(""));
}

#[test]
fn save_and_load_a_real_file() {
    let mut filter = BloomFilterBuilder::with_accuracy(15, 0.01).build();
    filter.insert_str("asdf");
    filter.insert_str("bar");
    filter.insert_str("foo");

    let dir = std::env::temp_dir();
    let path = dir.join(format!("filterkit-bloom-{}.bin", std::process::id()));
    filter.save(&path).unwrap();
    let restored = BloomFilter::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(filter, restored);
}

#[test]
fn ten_thousand_random_keys_stay_below_twice_the_target_fpp() {
    // Property-based suggestion from the spec: inserting `n` keys into a
    // filter sized for `n` at false positive rate `p` should keep the
    // observed false positive rate on disjoint keys within roughly `2p`.
    let n = 10_000u64;
    let p = 0.01;
    let mut filter = BloomFilterBuilder::with_accuracy(n, p).build();

    for i in 0..n {
        filter.insert_str(&format!("member-{i}"));
    }

    let mut false_positives = 0u64;
    let trials = 10_000u64;
    for i in 0..trials {
        if filter.contains_str(&format!("absent-{i}")) {
            false_positives += 1;
        }
    }

    let observed_fpp = false_positives as f64 / trials as f64;
    assert!(
        observed_fpp <= 2.0 * p,
        "observed fpp {observed_fpp} exceeded twice the target {p}"
    );
}

#[test]
fn every_inserted_key_is_found() {
    let mut filter = BloomFilterBuilder::with_accuracy(10_000, 0.01).build();
    let keys: Vec<String> = (0..10_000).map(|i| format!("key-{i}")).collect();

    for key in &keys {
        filter.insert_str(key);
    }
    for key in &keys {
        assert!(filter.contains_str(key), "false negative for {key}");
    }
}
