// Licensed under either of
//   Apache License, Version 2.0
//   MIT license
// at your option.

//! `filterkit` is a small library of probabilistic set-membership filters
//! sharing a common MurmurHash3 hashing substrate:
//!
//! - [`bloom::BloomFilter`] — a classical Bloom filter.
//! - [`counting::CountingBloomFilter`] — a Bloom filter with removable,
//!   saturating counters in place of single bits.
//! - [`timedecay::TimeDecayBloomFilter`] — a Bloom filter whose entries
//!   expire after a configurable timeout.
//! - [`cuckoo::CuckooFilter`] — a cuckoo filter supporting genuine deletion.
//!
//! All four are addressable by raw byte sequences and by UTF-8 text, are
//! persistable to a local byte-addressable file, and are single-threaded:
//! callers must serialize concurrent access externally.
//!
//! # Examples
//!
//! ```
//! use filterkit::bloom::BloomFilterBuilder;
//!
//! let mut filter = BloomFilterBuilder::with_accuracy(1_000, 0.01).build();
//! filter.insert_str("apple");
//!
//! assert!(filter.contains_str("apple"));
//! assert!(!filter.contains_str("grape"));
//! ```

mod codec;
mod common;
pub mod error;
mod hash;
mod persist;

pub mod bloom;
pub mod counting;
pub mod cuckoo;
pub mod timedecay;
