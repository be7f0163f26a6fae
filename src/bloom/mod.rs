//! Classical Bloom filter: a bit array with `k` hash positions per element.
//!
//! Supports fast membership queries with no false negatives and a tunable
//! false positive rate, plus set operations (`union`, `intersect`, `invert`)
//! on compatible filters and host-local persistence.
//!
//! # Usage
//!
//! ```rust
//! use filterkit::bloom::BloomFilterBuilder;
//!
//! let mut filter = BloomFilterBuilder::with_accuracy(15, 0.01).build();
//! filter.insert_str("foo");
//! filter.insert_str("bar");
//!
//! assert!(filter.contains_str("foo"));
//! assert!(!filter.contains_str("baz"));
//! ```

mod sketch;

pub use self::sketch::BloomFilter;
pub use self::sketch::BloomFilterBuilder;
