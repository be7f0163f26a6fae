//! Cuckoo filter: a fingerprint-based set-membership filter supporting
//! genuine deletion.
//!
//! Each element is reduced to a small fingerprint stored in one of two
//! candidate buckets, chosen so that either bucket can be recovered from the
//! other via `i2 = i1 XOR hash(fingerprint)`. Insertion evicts an existing
//! fingerprint to its alternate bucket when both candidate buckets are full,
//! bounded by `max_kicks` attempts.
//!
//! # Usage
//!
//! ```rust
//! use filterkit::cuckoo::CuckooFilterBuilder;
//!
//! let mut filter = CuckooFilterBuilder::with_capacity(1000).build();
//! filter.insert_str("foo").unwrap();
//! assert!(filter.contains_str("foo"));
//! filter.remove_str("foo");
//! assert!(!filter.contains_str("foo"));
//! ```

mod sketch;

pub use self::sketch::CuckooFilter;
pub use self::sketch::CuckooFilterBuilder;
