//! Counting Bloom filter: a Bloom filter with removable, saturating
//! counters in place of single bits.
//!
//! Trades memory for the ability to remove elements: insert and remove are
//! symmetric operations on the same `k` positions, and `count` returns a
//! conservative estimate of how many times an element was inserted.
//!
//! # Usage
//!
//! ```rust
//! use filterkit::counting::{CounterWidth, CountingBloomFilterBuilder};
//!
//! let mut filter = CountingBloomFilterBuilder::with_accuracy(15, 0.01)
//!     .counter_width(CounterWidth::Bits8)
//!     .build();
//! filter.insert_str("foo");
//! assert!(filter.contains_str("foo"));
//! filter.remove_str("foo");
//! assert!(!filter.contains_str("foo"));
//! ```

mod sketch;

pub use self::sketch::CounterWidth;
pub use self::sketch::CountingBloomFilter;
pub use self::sketch::CountingBloomFilterBuilder;
