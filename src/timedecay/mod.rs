//! Time-decaying Bloom filter: entries expire after a configurable timeout
//! measured against a monotonic, per-filter clock.
//!
//! Each slot stores a compact timestamp rather than a bit: a lookup is a
//! member only if its slots were all touched within `timeout` of now. No
//! explicit removal is needed — membership simply lapses.
//!
//! # Usage
//!
//! ```rust
//! use filterkit::timedecay::TimeDecayBloomFilterBuilder;
//! use std::time::Duration;
//!
//! let mut filter = TimeDecayBloomFilterBuilder::with_accuracy(15, 0.01)
//!     .timeout(Duration::from_secs(60))
//!     .build()
//!     .unwrap();
//! filter.insert_str("foo");
//! assert!(filter.contains_str("foo"));
//! ```

mod sketch;

pub use self::sketch::TimeDecayBloomFilter;
pub use self::sketch::TimeDecayBloomFilterBuilder;
