use crate::codec::FilterBytes;
use crate::codec::FilterSlice;
use crate::common::RandomSource;
use crate::common::XorShift32;
use crate::error::Error;
use crate::hash::mmh3_32;
use crate::persist;

const MAGIC: &[u8; 4] = b"FKCK";
const FORMAT_VERSION: u8 = 1;

const DEFAULT_BUCKET_SIZE: u8 = 4;
const DEFAULT_MAX_KICKS: u32 = 500;
const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.95;

const MIN_NUM_BUCKETS: u64 = 2;
const MAX_NUM_BUCKETS: u64 = 1 << 30;

/// A cuckoo filter: a fingerprint-based set-membership filter that, unlike
/// the Bloom filter family, supports genuine deletion.
///
/// Each element is reduced to a small fingerprint, stored in one of two
/// candidate buckets. Both candidates are recoverable from each other via
/// `i2 = i1 XOR mix(fingerprint)`, so lookup and removal never need to
/// rehash the original element against a stored index.
#[derive(Debug, Clone, PartialEq)]
pub struct CuckooFilter {
    num_buckets: u64,
    bucket_size: u8,
    max_kicks: u32,
    insertions: u64,
    rng: XorShift32,
    buckets: Vec<u16>,
}

impl CuckooFilter {
    /// Returns a builder for creating a cuckoo filter.
    pub fn builder() -> CuckooFilterBuilder {
        CuckooFilterBuilder::default()
    }

    /// Inserts a raw byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::OutOfMemory`](crate::error::ErrorKind::OutOfMemory)
    /// if no free slot could be found within `max_kicks` evictions. The
    /// filter is effectively full at this point; further inserts of
    /// different elements are also likely to fail.
    pub fn insert(&mut self, element: &[u8]) -> Result<(), Error> {
        let (mut fingerprint, i1) = self.fingerprint_and_index1(element);

        if self.try_insert_into_bucket(i1, fingerprint) {
            self.insertions += 1;
            return Ok(());
        }
        let i2 = self.alt_index(i1, fingerprint);
        if self.try_insert_into_bucket(i2, fingerprint) {
            self.insertions += 1;
            return Ok(());
        }

        let mut index = if self.rng.next_u32() % 2 == 0 { i1 } else { i2 };
        for _ in 0..self.max_kicks {
            let slot = (self.rng.next_u32() % self.bucket_size as u32) as usize;
            let bucket_start = (index * self.bucket_size as u64) as usize;
            std::mem::swap(&mut fingerprint, &mut self.buckets[bucket_start + slot]);

            index = self.alt_index(index, fingerprint);
            if self.try_insert_into_bucket(index, fingerprint) {
                self.insertions += 1;
                return Ok(());
            }
        }

        Err(Error::out_of_memory(format!(
            "failed to place fingerprint after {} evictions",
            self.max_kicks
        )))
    }

    /// Inserts a UTF-8 string.
    pub fn insert_str(&mut self, element: &str) -> Result<(), Error> {
        self.insert(element.as_bytes())
    }

    /// Tests whether a raw byte sequence is possibly a member of the set.
    pub fn contains(&self, element: &[u8]) -> bool {
        let (fingerprint, i1) = self.fingerprint_and_index1(element);
        let i2 = self.alt_index(i1, fingerprint);
        self.bucket_contains(i1, fingerprint) || self.bucket_contains(i2, fingerprint)
    }

    /// Tests whether a UTF-8 string is possibly a member of the set.
    pub fn contains_str(&self, element: &str) -> bool {
        self.contains(element.as_bytes())
    }

    /// Removes a raw byte sequence, if present.
    ///
    /// Returns `true` if a matching fingerprint was found and removed.
    /// Unlike the Bloom filter family, this is exact: removing an element
    /// never disturbs the membership of any other element (barring a
    /// fingerprint collision).
    pub fn remove(&mut self, element: &[u8]) -> bool {
        let (fingerprint, i1) = self.fingerprint_and_index1(element);
        if self.remove_from_bucket(i1, fingerprint) {
            self.insertions = self.insertions.saturating_sub(1);
            return true;
        }
        let i2 = self.alt_index(i1, fingerprint);
        if self.remove_from_bucket(i2, fingerprint) {
            self.insertions = self.insertions.saturating_sub(1);
            return true;
        }
        false
    }

    /// Removes a UTF-8 string, if present.
    pub fn remove_str(&mut self, element: &str) -> bool {
        self.remove(element.as_bytes())
    }

    /// Clears every slot.
    pub fn reset(&mut self) {
        self.buckets.iter_mut().for_each(|slot| *slot = 0);
        self.insertions = 0;
    }

    /// Returns `true` if no elements have been inserted.
    pub fn is_empty(&self) -> bool {
        self.insertions == 0
    }

    /// Returns the total number of buckets.
    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    /// Returns the number of slots per bucket.
    pub fn bucket_size(&self) -> u8 {
        self.bucket_size
    }

    /// Returns the total slot capacity (`num_buckets * bucket_size`).
    pub fn capacity(&self) -> u64 {
        self.num_buckets * self.bucket_size as u64
    }

    /// Returns the net number of elements currently stored.
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Returns the percentage of slots currently occupied:
    /// `100 * insertions / (num_buckets * bucket_size)`.
    pub fn load_factor(&self) -> f64 {
        100.0 * self.insertions as f64 / self.buckets.len() as f64
    }

    /// Serializes the filter to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = FilterBytes::with_capacity(40 + self.buckets.len() * 2);
        bytes.write(MAGIC);
        bytes.write_u8(FORMAT_VERSION);
        bytes.write_u64_le(self.num_buckets);
        bytes.write_u8(self.bucket_size);
        bytes.write_u32_le(self.max_kicks);
        bytes.write_u64_le(self.insertions);
        bytes.write_u32_le(self.rng.state());
        for &slot in &self.buckets {
            bytes.write_u16_le(slot);
        }
        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = FilterSlice::new(bytes);
        let err = || Error::invalid_file("truncated header");

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&cursor.read_vec_u8(4).map_err(|_| err())?);
        if &magic != MAGIC {
            return Err(Error::invalid_file("not a CuckooFilter file"));
        }
        let version = cursor.read_u8().map_err(|_| err())?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_file(format!(
                "unsupported format version {version}"
            )));
        }
        let num_buckets = cursor.read_u64_le().map_err(|_| err())?;
        let bucket_size = cursor.read_u8().map_err(|_| err())?;
        let max_kicks = cursor.read_u32_le().map_err(|_| err())?;
        let insertions = cursor.read_u64_le().map_err(|_| err())?;
        let rng_state = cursor.read_u32_le().map_err(|_| err())?;

        let num_slots = (num_buckets * bucket_size as u64) as usize;
        let mut buckets = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            buckets.push(
                cursor
                    .read_u16_le()
                    .map_err(|_| Error::invalid_file("truncated bucket payload"))?,
            );
        }

        Ok(CuckooFilter {
            num_buckets,
            bucket_size,
            max_kicks,
            insertions,
            rng: XorShift32::from_state(rng_state),
            buckets,
        })
    }

    /// Saves the filter to `path`, overwriting any existing file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Error> {
        persist::write_file(path, &self.serialize())
    }

    /// Loads a filter previously written by [`save`](Self::save).
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let bytes = persist::read_file(path)?;
        Self::deserialize(&bytes)
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    /// Derives the fingerprint and primary bucket index from a single hash,
    /// exactly as the partial-key scheme requires: both are functions of
    /// the same `h = mmh3_32(element, 0)`, so the alternate bucket stays
    /// recoverable from either candidate and a stored fingerprint alone.
    ///
    /// `0` is reserved to mean "empty slot", so a hash whose low 16 bits
    /// happen to be zero is remapped to 1.
    fn fingerprint_and_index1(&self, element: &[u8]) -> (u16, u64) {
        let hash = mmh3_32(element, 0);
        let fingerprint = match (hash & 0xffff) as u16 {
            0 => 1,
            fp => fp,
        };
        let i1 = (hash as u64) & (self.num_buckets - 1);
        (fingerprint, i1)
    }

    /// Computes the alternate bucket index from a bucket index and
    /// fingerprint alone, so lookup and removal never need the original
    /// element once a fingerprint has been extracted from a bucket.
    fn alt_index(&self, index: u64, fingerprint: u16) -> u64 {
        let mask = self.num_buckets - 1;
        (index ^ ((fingerprint >> 1) as u64)) & mask
    }

    fn try_insert_into_bucket(&mut self, index: u64, fingerprint: u16) -> bool {
        let start = (index * self.bucket_size as u64) as usize;
        let end = start + self.bucket_size as usize;
        for slot in &mut self.buckets[start..end] {
            if *slot == 0 {
                *slot = fingerprint;
                return true;
            }
        }
        false
    }

    fn bucket_contains(&self, index: u64, fingerprint: u16) -> bool {
        let start = (index * self.bucket_size as u64) as usize;
        let end = start + self.bucket_size as usize;
        self.buckets[start..end].contains(&fingerprint)
    }

    fn remove_from_bucket(&mut self, index: u64, fingerprint: u16) -> bool {
        let start = (index * self.bucket_size as u64) as usize;
        let end = start + self.bucket_size as usize;
        for slot in &mut self.buckets[start..end] {
            if *slot == fingerprint {
                *slot = 0;
                return true;
            }
        }
        false
    }
}

/// Builder for creating [`CuckooFilter`] instances.
#[derive(Debug, Clone)]
pub struct CuckooFilterBuilder {
    num_buckets: u64,
    bucket_size: u8,
    max_kicks: u32,
    seed: Option<u32>,
}

impl Default for CuckooFilterBuilder {
    fn default() -> Self {
        Self {
            num_buckets: MIN_NUM_BUCKETS,
            bucket_size: DEFAULT_BUCKET_SIZE,
            max_kicks: DEFAULT_MAX_KICKS,
            seed: None,
        }
    }
}

impl CuckooFilterBuilder {
    /// Creates a builder sized to hold `expected_items` elements at the
    /// default bucket size and load factor.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0.
    pub fn with_capacity(expected_items: u64) -> Self {
        assert!(expected_items > 0, "expected_items must be greater than 0");

        let raw_buckets = (expected_items as f64
            / DEFAULT_BUCKET_SIZE as f64
            / DEFAULT_MAX_LOAD_FACTOR)
            .ceil() as u64;
        let num_buckets = raw_buckets.max(MIN_NUM_BUCKETS).next_power_of_two();

        Self {
            num_buckets: num_buckets.min(MAX_NUM_BUCKETS),
            ..Self::default()
        }
    }

    /// Sets the number of buckets directly, rounding up to the next power
    /// of two (required for the XOR-based alternate-bucket derivation to be
    /// reversible).
    ///
    /// # Panics
    ///
    /// Panics if `num_buckets` is 0.
    pub fn num_buckets(mut self, num_buckets: u64) -> Self {
        assert!(num_buckets > 0, "num_buckets must be greater than 0");
        self.num_buckets = num_buckets.next_power_of_two().min(MAX_NUM_BUCKETS);
        self
    }

    /// Sets the number of slots per bucket. Larger buckets tolerate a
    /// higher load factor before eviction chains start, at the cost of a
    /// linear scan per lookup.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_size` is 0.
    pub fn bucket_size(mut self, bucket_size: u8) -> Self {
        assert!(bucket_size > 0, "bucket_size must be greater than 0");
        self.bucket_size = bucket_size;
        self
    }

    /// Sets the maximum number of evictions attempted before an insert
    /// gives up and returns an error.
    pub fn max_kicks(mut self, max_kicks: u32) -> Self {
        self.max_kicks = max_kicks;
        self
    }

    /// Sets the seed for the eviction PRNG, making eviction sequences
    /// reproducible. Without an explicit seed, the PRNG is seeded from the
    /// monotonic clock, matching the original implementation's
    /// `CLOCK_MONOTONIC`-derived seed (spec: a reproducible PRNG is only
    /// useful when a caller actually asks for reproducibility; left
    /// unseeded, eviction order should vary from run to run).
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the cuckoo filter.
    pub fn build(self) -> CuckooFilter {
        let num_slots = (self.num_buckets * self.bucket_size as u64) as usize;
        let rng = match self.seed {
            Some(seed) => XorShift32::seeded(seed),
            None => XorShift32::from_clock(),
        };
        CuckooFilter {
            num_buckets: self.num_buckets,
            bucket_size: self.bucket_size,
            max_kicks: self.max_kicks,
            insertions: 0,
            rng,
            buckets: vec![0u16; num_slots],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).build();

        assert!(!filter.contains_str("foo"));
        filter.insert_str("foo").unwrap();
        assert!(filter.contains_str("foo"));
        assert!(!filter.contains_str("bar"));
    }

    #[test]
    fn remove_deletes_exactly_that_element() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).build();
        filter.insert_str("foo").unwrap();
        filter.insert_str("bar").unwrap();

        assert!(filter.remove_str("foo"));
        assert!(!filter.contains_str("foo"));
        assert!(filter.contains_str("bar"));
    }

    #[test]
    fn remove_of_absent_element_returns_false() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).build();
        assert!(!filter.remove_str("absent"));
    }

    #[test]
    fn alt_index_is_reversible() {
        let filter = CuckooFilterBuilder::with_capacity(1000).build();
        let fingerprint = 0x1234u16;
        let i1 = 5u64 & (filter.num_buckets - 1);
        let i2 = filter.alt_index(i1, fingerprint);
        let recovered = filter.alt_index(i2, fingerprint);
        assert_eq!(i1, recovered);
    }

    #[test]
    fn many_distinct_inserts_all_remain_findable() {
        let mut filter = CuckooFilterBuilder::with_capacity(2000).build();
        let items: Vec<String> = (0..1500).map(|i| format!("item-{i}")).collect();

        for item in &items {
            filter.insert_str(item).unwrap();
        }
        for item in &items {
            assert!(filter.contains_str(item), "missing {item}");
        }
    }

    #[test]
    fn load_factor_tracks_occupied_slots() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).build();
        assert_eq!(filter.load_factor(), 0.0);
        filter.insert_str("foo").unwrap();
        assert!(filter.load_factor() > 0.0);
    }

    #[test]
    fn load_factor_is_a_percentage_of_capacity() {
        let mut filter = CuckooFilterBuilder::default()
            .num_buckets(16)
            .bucket_size(4)
            .build();
        for i in 0..16 {
            filter.insert_str(&format!("item-{i}")).unwrap();
        }
        // 16 inserts into a 16*4=64-slot table is 25%, not a 0.25 fraction.
        assert_eq!(filter.load_factor(), 25.0);
    }

    #[test]
    fn fingerprint_and_index1_derive_from_the_same_hash() {
        // Both must come from one mmh3_32(element, 0) call so the alternate
        // bucket stays recoverable from a stored fingerprint alone.
        let filter = CuckooFilterBuilder::with_capacity(1000).build();
        let hash = crate::hash::mmh3_32(b"consistent", 0);
        let expected_fingerprint = match (hash & 0xffff) as u16 {
            0 => 1,
            fp => fp,
        };
        let (fingerprint, i1) = filter.fingerprint_and_index1(b"consistent");
        assert_eq!(i1, (hash as u64) & (filter.num_buckets - 1));
        assert_eq!(fingerprint, expected_fingerprint);
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).seed(42).build();
        filter.insert_str("foo").unwrap();
        filter.insert_str("bar").unwrap();

        let bytes = filter.serialize();
        let restored = CuckooFilter::deserialize(&bytes).unwrap();

        assert_eq!(filter, restored);
        assert!(restored.contains_str("foo"));
        assert!(restored.contains_str("bar"));
    }

    #[test]
    fn deserialize_rejects_wrong_magic() {
        let mut bytes = CuckooFilterBuilder::with_capacity(100).build().serialize();
        bytes[0] = b'X';
        assert!(CuckooFilter::deserialize(&bytes).is_err());
    }

    #[test]
    fn reset_clears_all_slots() {
        let mut filter = CuckooFilterBuilder::with_capacity(1000).build();
        filter.insert_str("foo").unwrap();
        filter.reset();
        assert!(filter.is_empty());
        assert!(!filter.contains_str("foo"));
    }
}
