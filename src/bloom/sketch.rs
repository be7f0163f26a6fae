use crate::codec::FilterBytes;
use crate::codec::FilterSlice;
use crate::error::Error;
use crate::hash::mmh3_x64_128;
use crate::persist;

const MAGIC: &[u8; 4] = b"FKBL";
const FORMAT_VERSION: u8 = 1;

const MIN_NUM_BITS: u64 = 64;
const MAX_NUM_BITS: u64 = (1u64 << 35) - 64;

/// A classical Bloom filter for probabilistic set membership testing.
///
/// Provides fast membership queries with:
/// - No false negatives (inserted items always return `true`).
/// - A tunable false positive rate.
/// - Constant space usage.
///
/// Use [`BloomFilterBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    /// Total number of bits in the filter (`m`).
    size: u64,
    /// Number of hash functions to use (`k`).
    hashcount: u16,
    /// Maximum expected number of elements, used only for `capacity_used`.
    expected: u64,
    /// Target false positive rate the filter was sized for.
    accuracy: f64,
    /// Number of `insert` calls observed so far.
    insertions: u64,
    /// Bit array packed into `u64` words. Length = `ceil(size / 64)`.
    bitmap: Vec<u64>,
}

impl BloomFilter {
    /// Returns a builder for creating a Bloom filter.
    pub fn builder() -> BloomFilterBuilder {
        BloomFilterBuilder::default()
    }

    // ========================================================================
    // Update operations
    // ========================================================================

    /// Inserts a raw byte sequence into the filter.
    pub fn insert(&mut self, element: &[u8]) {
        for position in self.positions(element) {
            self.set_bit(position);
        }
        self.insertions += 1;
    }

    /// Inserts a UTF-8 string into the filter, hashing its raw byte
    /// sequence. No normalization is performed.
    pub fn insert_str(&mut self, element: &str) {
        self.insert(element.as_bytes());
    }

    /// Tests and inserts an element in a single pass, returning whether it
    /// was possibly already present beforehand.
    pub fn contains_and_insert(&mut self, element: &[u8]) -> bool {
        let positions: Vec<u64> = self.positions(element).collect();
        let was_present = positions.iter().all(|&p| self.get_bit(p));
        for position in positions {
            self.set_bit(position);
        }
        self.insertions += 1;
        was_present
    }

    /// Resets the filter to its initial empty state, preserving capacity and
    /// configuration.
    pub fn reset(&mut self) {
        for word in &mut self.bitmap {
            *word = 0;
        }
        self.insertions = 0;
    }

    // ========================================================================
    // Query operations
    // ========================================================================

    /// Tests whether a raw byte sequence is possibly a member of the set.
    ///
    /// Returns `true` if the element was possibly inserted (or is a false
    /// positive), `false` if it is definitely absent.
    pub fn contains(&self, element: &[u8]) -> bool {
        self.positions(element).all(|p| self.get_bit(p))
    }

    /// Tests whether a UTF-8 string is possibly a member of the set.
    pub fn contains_str(&self, element: &str) -> bool {
        self.contains(element.as_bytes())
    }

    // ========================================================================
    // Set operations
    // ========================================================================

    /// Merges another filter into this one via bitwise OR (union).
    ///
    /// # Panics
    ///
    /// Panics if the filters are not [compatible](Self::is_compatible).
    pub fn union(&mut self, other: &BloomFilter) {
        assert!(
            self.is_compatible(other),
            "cannot union incompatible Bloom filters"
        );
        for (word, other_word) in self.bitmap.iter_mut().zip(&other.bitmap) {
            *word |= *other_word;
        }
    }

    /// Intersects this filter with another via bitwise AND.
    ///
    /// # Panics
    ///
    /// Panics if the filters are not [compatible](Self::is_compatible).
    pub fn intersect(&mut self, other: &BloomFilter) {
        assert!(
            self.is_compatible(other),
            "cannot intersect incompatible Bloom filters"
        );
        for (word, other_word) in self.bitmap.iter_mut().zip(&other.bitmap) {
            *word &= *other_word;
        }
    }

    /// Inverts every bit in the filter.
    ///
    /// This does not produce a well-defined false-positive guarantee; it is
    /// offered as a primitive for callers building their own set algebra on
    /// top of the bit array.
    pub fn invert(&mut self) {
        for word in &mut self.bitmap {
            *word = !*word;
        }
        let excess_bits = self.size % 64;
        if excess_bits != 0 {
            let last = self.bitmap.len() - 1;
            let mask = (1u64 << excess_bits) - 1;
            self.bitmap[last] &= mask;
        }
    }

    /// Returns `true` if `other` has the same bit count and hash count as
    /// `self` (hashes are always seeded `0..k` by round index, so no
    /// separate seed check is needed).
    pub fn is_compatible(&self, other: &BloomFilter) -> bool {
        self.size == other.size && self.hashcount == other.hashcount
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Returns `true` if no elements have been inserted.
    pub fn is_empty(&self) -> bool {
        self.insertions == 0
    }

    /// Returns the total number of bits in the filter (`m`).
    pub fn capacity(&self) -> u64 {
        self.size
    }

    /// Returns the number of hash functions used (`k`).
    pub fn num_hashes(&self) -> u16 {
        self.hashcount
    }

    /// Returns the number of `insert` calls observed so far.
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Returns `100 * insertions / expected`, as a percentage of the
    /// capacity this filter was sized for.
    pub fn capacity_used(&self) -> f64 {
        100.0 * self.insertions as f64 / self.expected as f64
    }

    /// Returns the fraction of bits currently set.
    pub fn load_factor(&self) -> f64 {
        let set: u64 = self.bitmap.iter().map(|w| w.count_ones() as u64).sum();
        set as f64 / self.size as f64
    }

    /// Estimates the current false positive probability from the bit load
    /// factor: `(1 - e^(-k*load))^k`.
    pub fn estimated_fpp(&self) -> f64 {
        let k = self.hashcount as f64;
        let load = self.load_factor();
        (1.0 - (-k * load).exp()).powf(k)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serializes the filter to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = FilterBytes::with_capacity(32 + self.bitmap.len() * 8);
        bytes.write(MAGIC);
        bytes.write_u8(FORMAT_VERSION);
        bytes.write_u64_le(self.size);
        bytes.write_u16_le(self.hashcount);
        bytes.write_u64_le(self.expected);
        bytes.write_f64_le(self.accuracy);
        bytes.write_u64_le(self.insertions);
        for &word in &self.bitmap {
            bytes.write_u64_le(word);
        }
        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = FilterSlice::new(bytes);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(
            &cursor
                .read_vec_u8(4)
                .map_err(|_| Error::invalid_file("truncated header"))?,
        );
        if &magic != MAGIC {
            return Err(Error::invalid_file("not a BloomFilter file"));
        }
        let version = cursor
            .read_u8()
            .map_err(|_| Error::invalid_file("truncated header"))?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_file(format!(
                "unsupported format version {version}"
            )));
        }

        let size = cursor
            .read_u64_le()
            .map_err(|_| Error::invalid_file("truncated header"))?;
        let hashcount = cursor
            .read_u16_le()
            .map_err(|_| Error::invalid_file("truncated header"))?;
        let expected = cursor
            .read_u64_le()
            .map_err(|_| Error::invalid_file("truncated header"))?;
        let accuracy = cursor
            .read_f64_le()
            .map_err(|_| Error::invalid_file("truncated header"))?;
        let insertions = cursor
            .read_u64_le()
            .map_err(|_| Error::invalid_file("truncated header"))?;

        let num_words = size.div_ceil(64) as usize;
        let mut bitmap = vec![0u64; num_words];
        for word in &mut bitmap {
            *word = cursor
                .read_u64_le()
                .map_err(|_| Error::invalid_file("truncated bitmap payload"))?;
        }

        Ok(BloomFilter {
            size,
            hashcount,
            expected,
            accuracy,
            insertions,
            bitmap,
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

    /// Computes the `k` bit positions for `element` via Kirsch-Mitzenmacher
    /// double hashing: each round `i` is seeded independently so the
    /// sequence of positions is reproducible across implementations that
    /// follow the same contract.
    fn positions<'a>(&'a self, element: &'a [u8]) -> impl Iterator<Item = u64> + 'a {
        let m = self.size;
        (0..self.hashcount).map(move |i| {
            let (h0, h1) = mmh3_x64_128(element, i as u64);
            ((h0 % m) + (h1 % m)) % m
        })
    }

    fn get_bit(&self, position: u64) -> bool {
        let word = (position / 64) as usize;
        let bit = position % 64;
        (self.bitmap[word] & (1u64 << bit)) != 0
    }

    fn set_bit(&mut self, position: u64) {
        let word = (position / 64) as usize;
        let bit = position % 64;
        self.bitmap[word] |= 1u64 << bit;
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for creating [`BloomFilter`] instances.
#[derive(Debug, Clone)]
pub struct BloomFilterBuilder {
    size: u64,
    hashcount: u16,
    expected: u64,
    accuracy: f64,
}

impl Default for BloomFilterBuilder {
    fn default() -> Self {
        Self {
            size: MIN_NUM_BITS,
            hashcount: 1,
            expected: 1,
            accuracy: 0.01,
        }
    }
}

impl BloomFilterBuilder {
    /// Creates a builder sized for `max_items` elements at a target false
    /// positive rate `fpp`.
    ///
    /// `m = ceil(-max_items * ln(fpp) / ln(2)^2)`, `k = floor(m / max_items *
    /// ln 2)`, clamped to `k >= 1`.
    ///
    /// # Panics
    ///
    /// Panics if `max_items` is 0 or `fpp` is not in `(0.0, 1.0)`.
    pub fn with_accuracy(max_items: u64, fpp: f64) -> Self {
        assert!(max_items > 0, "max_items must be greater than 0");
        assert!(
            fpp > 0.0 && fpp < 1.0,
            "fpp must be between 0.0 and 1.0 (exclusive)"
        );

        let size = Self::suggest_num_bits(max_items, fpp);
        let hashcount = Self::suggest_num_hashes(max_items, size);

        Self {
            size,
            hashcount,
            expected: max_items,
            accuracy: fpp,
        }
    }

    /// Creates a builder with manual size specification.
    ///
    /// # Panics
    ///
    /// Panics if `num_bits` is out of range or `num_hashes` is 0.
    pub fn with_size(num_bits: u64, num_hashes: u16) -> Self {
        assert!(num_bits >= MIN_NUM_BITS, "num_bits must be at least 64");
        assert!(num_bits <= MAX_NUM_BITS, "num_bits is unreasonably large");
        assert!(num_hashes > 0, "num_hashes must be at least 1");

        Self {
            size: num_bits,
            hashcount: num_hashes,
            expected: num_bits,
            accuracy: 0.0,
        }
    }

    /// Sets the maximum expected number of elements used by
    /// [`BloomFilter::capacity_used`]. Only meaningful after
    /// [`with_size`](Self::with_size); ignored by `with_accuracy`, which
    /// already derives it.
    pub fn expected(mut self, expected: u64) -> Self {
        self.expected = expected;
        self
    }

    /// Builds the Bloom filter.
    pub fn build(self) -> BloomFilter {
        let num_words = self.size.div_ceil(64) as usize;
        BloomFilter {
            size: self.size,
            hashcount: self.hashcount,
            expected: self.expected,
            accuracy: self.accuracy,
            insertions: 0,
            bitmap: vec![0u64; num_words],
        }
    }

    /// Suggests the ideal number of bits for `max_items` elements at false
    /// positive rate `fpp`: `m = ceil(-n * ln(p) / ln(2)^2)`.
    pub fn suggest_num_bits(max_items: u64, fpp: f64) -> u64 {
        let n = max_items as f64;
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let bits = (-n * fpp.ln() / ln2_squared).ceil() as u64;
        let bits = bits.div_ceil(64) * 64;
        bits.clamp(MIN_NUM_BITS, MAX_NUM_BITS)
    }

    /// Suggests the ideal number of hash functions for `max_items` elements
    /// and `num_bits` total bits: `k = floor(m/n * ln 2)`, clamped to `k >=
    /// 1` (an implementation that ends up with `k == 0` because `expected >
    /// size` is clamped rather than rejected).
    pub fn suggest_num_hashes(max_items: u64, num_bits: u64) -> u16 {
        let m = num_bits as f64;
        let n = max_items as f64;
        let k = (m / n * std::f64::consts::LN_2).floor() as u64;
        k.clamp(1, 100) as u16
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_with_accuracy() {
        let filter = BloomFilterBuilder::with_accuracy(1000, 0.01).build();
        assert!(filter.capacity() >= 9000);
        assert!(filter.num_hashes() >= 1);
        assert!(filter.is_empty());
    }

    #[test]
    fn builder_with_size() {
        let filter = BloomFilterBuilder::with_size(1024, 5).build();
        assert_eq!(filter.capacity(), 1024);
        assert_eq!(filter.num_hashes(), 5);
    }

    #[test]
    fn hashcount_clamped_to_one_when_expected_exceeds_size() {
        // max_items so large relative to the derived m that m/n*ln2 floors to 0.
        let filter = BloomFilterBuilder::with_accuracy(1, 0.5).build();
        assert!(filter.num_hashes() >= 1);
    }

    #[test]
    fn insert_and_contains() {
        let mut filter = BloomFilterBuilder::with_accuracy(15, 0.01).build();

        assert!(!filter.contains_str("asdf"));
        filter.insert_str("asdf");
        filter.insert_str("bar");
        filter.insert_str("foo");

        assert!(filter.contains_str("foo"));
        assert!(filter.contains_str("bar"));
        assert!(filter.contains_str("asdf"));
        assert!(!filter.contains_str("baz"));
    }

    #[test]
    fn contains_and_insert_reports_prior_presence() {
        let mut filter = BloomFilterBuilder::with_accuracy(100, 0.01).build();

        assert!(!filter.contains_and_insert(b"apple"));
        assert!(filter.contains_and_insert(b"apple"));
    }

    #[test]
    fn reset_clears_state() {
        let mut filter = BloomFilterBuilder::with_accuracy(100, 0.01).build();
        filter.insert_str("test");
        assert!(!filter.is_empty());

        filter.reset();
        assert!(filter.is_empty());
        assert!(!filter.contains_str("test"));
    }

    #[test]
    fn union_combines_members() {
        let mut f1 = BloomFilterBuilder::with_size(4096, 5).build();
        let mut f2 = BloomFilterBuilder::with_size(4096, 5).build();

        f1.insert_str("a");
        f2.insert_str("b");
        f1.union(&f2);

        assert!(f1.contains_str("a"));
        assert!(f1.contains_str("b"));
    }

    #[test]
    fn intersect_keeps_only_shared_members() {
        let mut f1 = BloomFilterBuilder::with_size(4096, 5).build();
        let mut f2 = BloomFilterBuilder::with_size(4096, 5).build();

        f1.insert_str("a");
        f1.insert_str("b");
        f2.insert_str("b");
        f2.insert_str("c");
        f1.intersect(&f2);

        assert!(f1.contains_str("b"));
    }

    #[test]
    #[should_panic(expected = "incompatible")]
    fn union_panics_on_incompatible_filters() {
        let mut f1 = BloomFilterBuilder::with_size(1024, 5).build();
        let f2 = BloomFilterBuilder::with_size(2048, 5).build();
        f1.union(&f2);
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut filter = BloomFilterBuilder::with_accuracy(15, 0.01).build();
        filter.insert_str("asdf");
        filter.insert_str("bar");
        filter.insert_str("foo");

        let bytes = filter.serialize();
        let restored = BloomFilter::deserialize(&bytes).unwrap();

        assert_eq!(filter, restored);
        assert!(restored.contains_str("foo"));
        assert!(restored.contains_str("bar"));
        assert!(restored.contains_str("asdf"));
        assert!(!restored.contains_str("baz"));
    }

    #[test]
    fn deserialize_rejects_wrong_magic() {
        let mut bytes = BloomFilterBuilder::with_size(64, 2).build().serialize();
        bytes[0] = b'X';
        assert!(BloomFilter::deserialize(&bytes).is_err());
    }

    #[test]
    fn deserialize_rejects_truncated_payload() {
        let bytes = BloomFilterBuilder::with_size(64, 2).build().serialize();
        let truncated = &bytes[..bytes.len() - 4];
        assert!(BloomFilter::deserialize(truncated).is_err());
    }

    #[test]
    fn empty_filter_membership_is_false() {
        let filter = BloomFilterBuilder::with_accuracy(100, 0.01).build();
        assert!(!filter.contains_str("anything"));
    }

    #[test]
    fn statistics_move_with_insertions() {
        let mut filter = BloomFilterBuilder::with_size(1000, 5).build();
        assert_eq!(filter.load_factor(), 0.0);

        filter.insert_str("test");
        assert!(filter.load_factor() > 0.0);
        assert!(filter.estimated_fpp() > 0.0);
    }
}
