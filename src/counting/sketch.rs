use crate::codec::FilterBytes;
use crate::codec::FilterSlice;
use crate::error::Error;
use crate::hash::mmh3_x64_128;
use crate::persist;

const MAGIC: &[u8; 4] = b"FKCB";
const FORMAT_VERSION: u8 = 1;

const MIN_NUM_COUNTERS: u64 = 64;
const MAX_NUM_COUNTERS: u64 = (1u64 << 32) - 1;

/// The width of each counter slot.
///
/// Wider counters tolerate more repeated insertions of the same element
/// before saturating, at a proportional cost in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWidth {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl CounterWidth {
    fn tag(self) -> u8 {
        match self {
            CounterWidth::Bits8 => 0,
            CounterWidth::Bits16 => 1,
            CounterWidth::Bits32 => 2,
            CounterWidth::Bits64 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(CounterWidth::Bits8),
            1 => Ok(CounterWidth::Bits16),
            2 => Ok(CounterWidth::Bits32),
            3 => Ok(CounterWidth::Bits64),
            other => Err(Error::invalid_file(format!(
                "unknown counter width tag {other}"
            ))),
        }
    }

    fn max_value(self) -> u64 {
        match self {
            CounterWidth::Bits8 => u8::MAX as u64,
            CounterWidth::Bits16 => u16::MAX as u64,
            CounterWidth::Bits32 => u32::MAX as u64,
            CounterWidth::Bits64 => u64::MAX,
        }
    }
}

/// A single tag for the whole filter, rather than a per-slot tag: every
/// counter in a given filter has the same width, so the discriminant is
/// stored once instead of duplicated `n` times.
#[derive(Debug, Clone, PartialEq)]
enum Counters {
    Bits8(Vec<u8>),
    Bits16(Vec<u16>),
    Bits32(Vec<u32>),
    Bits64(Vec<u64>),
}

impl Counters {
    fn zeroed(width: CounterWidth, len: usize) -> Self {
        match width {
            CounterWidth::Bits8 => Counters::Bits8(vec![0; len]),
            CounterWidth::Bits16 => Counters::Bits16(vec![0; len]),
            CounterWidth::Bits32 => Counters::Bits32(vec![0; len]),
            CounterWidth::Bits64 => Counters::Bits64(vec![0; len]),
        }
    }

    fn width(&self) -> CounterWidth {
        match self {
            Counters::Bits8(_) => CounterWidth::Bits8,
            Counters::Bits16(_) => CounterWidth::Bits16,
            Counters::Bits32(_) => CounterWidth::Bits32,
            Counters::Bits64(_) => CounterWidth::Bits64,
        }
    }

    fn len(&self) -> usize {
        match self {
            Counters::Bits8(v) => v.len(),
            Counters::Bits16(v) => v.len(),
            Counters::Bits32(v) => v.len(),
            Counters::Bits64(v) => v.len(),
        }
    }

    fn get(&self, index: usize) -> u64 {
        match self {
            Counters::Bits8(v) => v[index] as u64,
            Counters::Bits16(v) => v[index] as u64,
            Counters::Bits32(v) => v[index] as u64,
            Counters::Bits64(v) => v[index],
        }
    }

    fn increment(&mut self, index: usize) {
        match self {
            Counters::Bits8(v) => v[index] = v[index].saturating_add(1),
            Counters::Bits16(v) => v[index] = v[index].saturating_add(1),
            Counters::Bits32(v) => v[index] = v[index].saturating_add(1),
            Counters::Bits64(v) => v[index] = v[index].saturating_add(1),
        }
    }

    fn decrement(&mut self, index: usize) {
        match self {
            Counters::Bits8(v) => v[index] = v[index].saturating_sub(1),
            Counters::Bits16(v) => v[index] = v[index].saturating_sub(1),
            Counters::Bits32(v) => v[index] = v[index].saturating_sub(1),
            Counters::Bits64(v) => v[index] = v[index].saturating_sub(1),
        }
    }

    fn clear(&mut self) {
        match self {
            Counters::Bits8(v) => v.iter_mut().for_each(|c| *c = 0),
            Counters::Bits16(v) => v.iter_mut().for_each(|c| *c = 0),
            Counters::Bits32(v) => v.iter_mut().for_each(|c| *c = 0),
            Counters::Bits64(v) => v.iter_mut().for_each(|c| *c = 0),
        }
    }

    fn write(&self, bytes: &mut FilterBytes) {
        match self {
            Counters::Bits8(v) => v.iter().for_each(|&c| bytes.write_u8(c)),
            Counters::Bits16(v) => v.iter().for_each(|&c| bytes.write_u16_le(c)),
            Counters::Bits32(v) => v.iter().for_each(|&c| bytes.write_u32_le(c)),
            Counters::Bits64(v) => v.iter().for_each(|&c| bytes.write_u64_le(c)),
        }
    }

    fn read(width: CounterWidth, len: usize, cursor: &mut FilterSlice) -> Result<Self, Error> {
        let err = || Error::invalid_file("truncated counter payload");
        Ok(match width {
            CounterWidth::Bits8 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u8().map_err(|_| err())?);
                }
                Counters::Bits8(v)
            }
            CounterWidth::Bits16 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u16_le().map_err(|_| err())?);
                }
                Counters::Bits16(v)
            }
            CounterWidth::Bits32 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u32_le().map_err(|_| err())?);
                }
                Counters::Bits32(v)
            }
            CounterWidth::Bits64 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u64_le().map_err(|_| err())?);
                }
                Counters::Bits64(v)
            }
        })
    }
}

/// A counting Bloom filter: like [`BloomFilter`](crate::bloom::BloomFilter),
/// but backed by saturating counters so elements can be removed.
#[derive(Debug, Clone, PartialEq)]
pub struct CountingBloomFilter {
    size: u64,
    hashcount: u16,
    expected: u64,
    accuracy: f64,
    insertions: u64,
    counters: Counters,
}

impl CountingBloomFilter {
    /// Returns a builder for creating a counting Bloom filter.
    pub fn builder() -> CountingBloomFilterBuilder {
        CountingBloomFilterBuilder::default()
    }

    /// Inserts a raw byte sequence, incrementing each of its `k` counters.
    pub fn insert(&mut self, element: &[u8]) {
        for position in self.positions(element) {
            self.counters.increment(position as usize);
        }
        self.insertions += 1;
    }

    /// Inserts a UTF-8 string.
    pub fn insert_str(&mut self, element: &str) {
        self.insert(element.as_bytes());
    }

    /// Removes a raw byte sequence, decrementing each of its `k` counters.
    ///
    /// If any of the `k` positions is already zero, `element` was never
    /// inserted (an `insert` always raises all `k` counters together), so
    /// the whole operation is a no-op: decrementing anyway would corrupt
    /// the count of whichever other element actually owns that position.
    pub fn remove(&mut self, element: &[u8]) {
        let positions: Vec<u64> = self.positions(element).collect();
        let absent = positions
            .iter()
            .any(|&p| self.counters.get(p as usize) == 0);
        if absent {
            return;
        }
        for position in positions {
            self.counters.decrement(position as usize);
        }
        self.insertions = self.insertions.saturating_sub(1);
    }

    /// Removes a UTF-8 string.
    pub fn remove_str(&mut self, element: &str) {
        self.remove(element.as_bytes());
    }

    /// Tests whether a raw byte sequence is possibly a member of the set.
    pub fn contains(&self, element: &[u8]) -> bool {
        self.count(element) > 0
    }

    /// Tests whether a UTF-8 string is possibly a member of the set.
    pub fn contains_str(&self, element: &str) -> bool {
        self.contains(element.as_bytes())
    }

    /// Returns a conservative estimate of how many times `element` was
    /// inserted: the minimum counter value across its `k` positions.
    pub fn count(&self, element: &[u8]) -> u64 {
        self.positions(element)
            .map(|p| self.counters.get(p as usize))
            .min()
            .unwrap_or(0)
    }

    /// Resets every counter to zero.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.insertions = 0;
    }

    /// Returns `true` if no elements have been inserted.
    pub fn is_empty(&self) -> bool {
        self.insertions == 0
    }

    /// Returns the total number of counter slots (`m`).
    pub fn capacity(&self) -> u64 {
        self.size
    }

    /// Returns the number of hash functions used (`k`).
    pub fn num_hashes(&self) -> u16 {
        self.hashcount
    }

    /// Returns the width of each counter slot.
    pub fn counter_width(&self) -> CounterWidth {
        self.counters.width()
    }

    /// Returns the number of net `insert` calls observed so far (inserts
    /// minus removes).
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Returns `100 * insertions / expected`.
    pub fn capacity_used(&self) -> f64 {
        100.0 * self.insertions as f64 / self.expected as f64
    }

    /// Serializes the filter to a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = FilterBytes::with_capacity(40 + self.counters.len() * 8);
        bytes.write(MAGIC);
        bytes.write_u8(FORMAT_VERSION);
        bytes.write_u8(self.counters.width().tag());
        bytes.write_u64_le(self.size);
        bytes.write_u16_le(self.hashcount);
        bytes.write_u64_le(self.expected);
        bytes.write_f64_le(self.accuracy);
        bytes.write_u64_le(self.insertions);
        self.counters.write(&mut bytes);
        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = FilterSlice::new(bytes);
        let err = || Error::invalid_file("truncated header");

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&cursor.read_vec_u8(4).map_err(|_| err())?);
        if &magic != MAGIC {
            return Err(Error::invalid_file("not a CountingBloomFilter file"));
        }
        let version = cursor.read_u8().map_err(|_| err())?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_file(format!(
                "unsupported format version {version}"
            )));
        }
        let width = CounterWidth::from_tag(cursor.read_u8().map_err(|_| err())?)?;
        let size = cursor.read_u64_le().map_err(|_| err())?;
        let hashcount = cursor.read_u16_le().map_err(|_| err())?;
        let expected = cursor.read_u64_le().map_err(|_| err())?;
        let accuracy = cursor.read_f64_le().map_err(|_| err())?;
        let insertions = cursor.read_u64_le().map_err(|_| err())?;
        let counters = Counters::read(width, size as usize, &mut cursor)?;

        Ok(CountingBloomFilter {
            size,
            hashcount,
            expected,
            accuracy,
            insertions,
            counters,
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

    fn positions<'a>(&'a self, element: &'a [u8]) -> impl Iterator<Item = u64> + 'a {
        let m = self.size;
        (0..self.hashcount).map(move |i| {
            let (h0, h1) = mmh3_x64_128(element, i as u64);
            ((h0 % m) + (h1 % m)) % m
        })
    }
}

/// Builder for creating [`CountingBloomFilter`] instances.
#[derive(Debug, Clone)]
pub struct CountingBloomFilterBuilder {
    size: u64,
    hashcount: u16,
    expected: u64,
    accuracy: f64,
    width: CounterWidth,
}

impl Default for CountingBloomFilterBuilder {
    fn default() -> Self {
        Self {
            size: MIN_NUM_COUNTERS,
            hashcount: 1,
            expected: 1,
            accuracy: 0.01,
            width: CounterWidth::Bits8,
        }
    }
}

impl CountingBloomFilterBuilder {
    /// Creates a builder sized for `max_items` elements at a target false
    /// positive rate `fpp`, using the same `m`/`k` formulas as the
    /// classical Bloom filter.
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

        let size = Self::suggest_num_counters(max_items, fpp);
        let hashcount = Self::suggest_num_hashes(max_items, size);

        Self {
            size,
            hashcount,
            expected: max_items,
            accuracy: fpp,
            width: CounterWidth::Bits8,
        }
    }

    /// Creates a builder with manual size specification.
    ///
    /// # Panics
    ///
    /// Panics if `num_counters` is out of range or `num_hashes` is 0.
    pub fn with_size(num_counters: u64, num_hashes: u16) -> Self {
        assert!(
            num_counters >= MIN_NUM_COUNTERS,
            "num_counters must be at least 64"
        );
        assert!(
            num_counters <= MAX_NUM_COUNTERS,
            "num_counters is unreasonably large"
        );
        assert!(num_hashes > 0, "num_hashes must be at least 1");

        Self {
            size: num_counters,
            hashcount: num_hashes,
            expected: num_counters,
            accuracy: 0.0,
            width: CounterWidth::Bits8,
        }
    }

    /// Sets the counter width. Wider counters tolerate more repeated
    /// insertions of the same element before saturating.
    pub fn counter_width(mut self, width: CounterWidth) -> Self {
        self.width = width;
        self
    }

    /// Sets the maximum expected number of elements used by
    /// [`CountingBloomFilter::capacity_used`].
    pub fn expected(mut self, expected: u64) -> Self {
        self.expected = expected;
        self
    }

    /// Builds the counting Bloom filter.
    pub fn build(self) -> CountingBloomFilter {
        CountingBloomFilter {
            size: self.size,
            hashcount: self.hashcount,
            expected: self.expected,
            accuracy: self.accuracy,
            insertions: 0,
            counters: Counters::zeroed(self.width, self.size as usize),
        }
    }

    /// Suggests the ideal number of counters for `max_items` elements at
    /// false positive rate `fpp` (identical formula to the classical Bloom
    /// filter's `m`).
    pub fn suggest_num_counters(max_items: u64, fpp: f64) -> u64 {
        let n = max_items as f64;
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let counters = (-n * fpp.ln() / ln2_squared).ceil() as u64;
        counters.clamp(MIN_NUM_COUNTERS, MAX_NUM_COUNTERS)
    }

    /// Suggests the ideal number of hash functions, clamped to `k >= 1`.
    pub fn suggest_num_hashes(max_items: u64, num_counters: u64) -> u16 {
        let m = num_counters as f64;
        let n = max_items as f64;
        let k = (m / n * std::f64::consts::LN_2).floor() as u64;
        k.clamp(1, 100) as u16
    }
}
