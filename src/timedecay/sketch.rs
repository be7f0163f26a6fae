use std::time::Duration;
use std::time::Instant;

use crate::codec::FilterBytes;
use crate::codec::FilterSlice;
use crate::error::Error;
use crate::hash::mmh3_x64_128;
use crate::persist;

const MAGIC: &[u8; 4] = b"FKTD";
const FORMAT_VERSION: u8 = 1;

const MIN_NUM_SLOTS: u64 = 64;
const MAX_NUM_SLOTS: u64 = (1u64 << 32) - 1;

/// The width of each slot's timestamp, chosen automatically from the
/// requested timeout: the smallest width whose domain strictly exceeds the
/// timeout (in seconds) is used, so the wraparound modulus always leaves
/// room between "just expired" and "about to wrap".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampWidth {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl TimestampWidth {
    /// Selects a width for `timeout_secs`, preserving the original
    /// cascade's strict `<` comparisons: a timeout exactly equal to a
    /// width's domain boundary escalates to the next width up, rather than
    /// fitting snugly into it.
    fn select(timeout_secs: u64) -> Result<Self, Error> {
        if timeout_secs < u8::MAX as u64 {
            Ok(TimestampWidth::Bits8)
        } else if timeout_secs < u16::MAX as u64 {
            Ok(TimestampWidth::Bits16)
        } else if timeout_secs < u32::MAX as u64 {
            Ok(TimestampWidth::Bits32)
        } else if timeout_secs < u64::MAX {
            Ok(TimestampWidth::Bits64)
        } else {
            Err(Error::invalid_argument(
                "timeout is too large to represent in any supported timestamp width",
            ))
        }
    }

    fn tag(self) -> u8 {
        match self {
            TimestampWidth::Bits8 => 0,
            TimestampWidth::Bits16 => 1,
            TimestampWidth::Bits32 => 2,
            TimestampWidth::Bits64 => 3,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(TimestampWidth::Bits8),
            1 => Ok(TimestampWidth::Bits16),
            2 => Ok(TimestampWidth::Bits32),
            3 => Ok(TimestampWidth::Bits64),
            other => Err(Error::invalid_file(format!(
                "unknown timestamp width tag {other}"
            ))),
        }
    }

    /// The wraparound modulus for this width: timestamps range `1..=max`,
    /// with `0` reserved to mean "never written".
    fn max_time(self) -> u64 {
        match self {
            TimestampWidth::Bits8 => u8::MAX as u64,
            TimestampWidth::Bits16 => u16::MAX as u64,
            TimestampWidth::Bits32 => u32::MAX as u64,
            TimestampWidth::Bits64 => u64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Timestamps {
    Bits8(Vec<u8>),
    Bits16(Vec<u16>),
    Bits32(Vec<u32>),
    Bits64(Vec<u64>),
}

impl Timestamps {
    fn zeroed(width: TimestampWidth, len: usize) -> Self {
        match width {
            TimestampWidth::Bits8 => Timestamps::Bits8(vec![0; len]),
            TimestampWidth::Bits16 => Timestamps::Bits16(vec![0; len]),
            TimestampWidth::Bits32 => Timestamps::Bits32(vec![0; len]),
            TimestampWidth::Bits64 => Timestamps::Bits64(vec![0; len]),
        }
    }

    fn width(&self) -> TimestampWidth {
        match self {
            Timestamps::Bits8(_) => TimestampWidth::Bits8,
            Timestamps::Bits16(_) => TimestampWidth::Bits16,
            Timestamps::Bits32(_) => TimestampWidth::Bits32,
            Timestamps::Bits64(_) => TimestampWidth::Bits64,
        }
    }

    fn len(&self) -> usize {
        match self {
            Timestamps::Bits8(v) => v.len(),
            Timestamps::Bits16(v) => v.len(),
            Timestamps::Bits32(v) => v.len(),
            Timestamps::Bits64(v) => v.len(),
        }
    }

    fn get(&self, index: usize) -> u64 {
        match self {
            Timestamps::Bits8(v) => v[index] as u64,
            Timestamps::Bits16(v) => v[index] as u64,
            Timestamps::Bits32(v) => v[index] as u64,
            Timestamps::Bits64(v) => v[index],
        }
    }

    fn set(&mut self, index: usize, value: u64) {
        match self {
            Timestamps::Bits8(v) => v[index] = value as u8,
            Timestamps::Bits16(v) => v[index] = value as u16,
            Timestamps::Bits32(v) => v[index] = value as u32,
            Timestamps::Bits64(v) => v[index] = value,
        }
    }

    fn clear(&mut self) {
        match self {
            Timestamps::Bits8(v) => v.iter_mut().for_each(|c| *c = 0),
            Timestamps::Bits16(v) => v.iter_mut().for_each(|c| *c = 0),
            Timestamps::Bits32(v) => v.iter_mut().for_each(|c| *c = 0),
            Timestamps::Bits64(v) => v.iter_mut().for_each(|c| *c = 0),
        }
    }

    fn write(&self, bytes: &mut FilterBytes) {
        match self {
            Timestamps::Bits8(v) => v.iter().for_each(|&c| bytes.write_u8(c)),
            Timestamps::Bits16(v) => v.iter().for_each(|&c| bytes.write_u16_le(c)),
            Timestamps::Bits32(v) => v.iter().for_each(|&c| bytes.write_u32_le(c)),
            Timestamps::Bits64(v) => v.iter().for_each(|&c| bytes.write_u64_le(c)),
        }
    }

    fn read(width: TimestampWidth, len: usize, cursor: &mut FilterSlice) -> Result<Self, Error> {
        let err = || Error::invalid_file("truncated timestamp payload");
        Ok(match width {
            TimestampWidth::Bits8 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u8().map_err(|_| err())?);
                }
                Timestamps::Bits8(v)
            }
            TimestampWidth::Bits16 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u16_le().map_err(|_| err())?);
                }
                Timestamps::Bits16(v)
            }
            TimestampWidth::Bits32 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u32_le().map_err(|_| err())?);
                }
                Timestamps::Bits32(v)
            }
            TimestampWidth::Bits64 => {
                let mut v = Vec::with_capacity(len);
                for _ in 0..len {
                    v.push(cursor.read_u64_le().map_err(|_| err())?);
                }
                Timestamps::Bits64(v)
            }
        })
    }
}

/// A Bloom filter whose entries expire after `timeout` has elapsed, measured
/// against a monotonic per-filter clock.
///
/// Unlike [`BloomFilter`](crate::bloom::BloomFilter) and
/// [`CountingBloomFilter`](crate::counting::CountingBloomFilter), membership
/// here is a function of wall-clock time as well as the inserted set: a
/// `contains` call can flip from `true` to `false` with no further calls at
/// all once `timeout` passes.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDecayBloomFilter {
    size: u64,
    hashcount: u16,
    expected: u64,
    accuracy: f64,
    timeout_secs: u64,
    insertions: u64,
    #[doc(hidden)]
    epoch: Instant,
    slots: Timestamps,
}

impl TimeDecayBloomFilter {
    /// Returns a builder for creating a time-decaying Bloom filter.
    pub fn builder() -> TimeDecayBloomFilterBuilder {
        TimeDecayBloomFilterBuilder::default()
    }

    /// Inserts a raw byte sequence, stamping each of its `k` slots with the
    /// current time.
    pub fn insert(&mut self, element: &[u8]) {
        let ts = self.current_ts();
        for position in self.positions(element) {
            self.slots.set(position as usize, ts);
        }
        self.insertions += 1;
    }

    /// Inserts a UTF-8 string.
    pub fn insert_str(&mut self, element: &str) {
        self.insert(element.as_bytes());
    }

    /// Tests whether a raw byte sequence is possibly a member of the set
    /// *and* was inserted (or re-inserted) within the last `timeout`.
    pub fn contains(&self, element: &[u8]) -> bool {
        // Once real elapsed time exceeds the timestamp domain, the cyclic
        // distance check below can no longer tell a freshly-written slot
        // from one that merely happens to land nearby after wrapping
        // around one or more full periods. Past that horizon the filter
        // must be treated as entirely expired.
        if self.epoch.elapsed().as_secs() > self.slots.width().max_time() {
            return false;
        }
        let now_ts = self.current_ts();
        self.positions(element).all(|position| {
            let stored = self.slots.get(position as usize);
            stored != 0 && !self.is_expired(now_ts, stored)
        })
    }

    /// Tests whether a UTF-8 string is possibly a live member of the set.
    pub fn contains_str(&self, element: &str) -> bool {
        self.contains(element.as_bytes())
    }

    /// Clears every slot, leaving the clock untouched.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.insertions = 0;
    }

    /// Resets the filter's internal clock to the present moment.
    ///
    /// Existing slot timestamps are left untouched, so they are now
    /// measured against a new reference point; elements inserted before the
    /// reset may read as expired or as freshly inserted depending on how
    /// far their stored timestamp lands from the new epoch. Callers that
    /// want a clean slate should call [`clear`](Self::clear) as well.
    pub fn reset_start_time(&mut self) {
        self.epoch = Instant::now();
    }

    /// Rewinds the filter's epoch by `elapsed`, simulating that much time
    /// having passed without an actual `sleep` in test code.
    #[doc(hidden)]
    pub fn rewind_epoch_for_testing(&mut self, elapsed: Duration) {
        self.epoch -= elapsed;
    }

    /// Returns `true` if no elements have ever been inserted.
    pub fn is_empty(&self) -> bool {
        self.insertions == 0
    }

    /// Returns the total number of slots (`m`).
    pub fn capacity(&self) -> u64 {
        self.size
    }

    /// Returns the number of hash functions used (`k`).
    pub fn num_hashes(&self) -> u16 {
        self.hashcount
    }

    /// Returns the configured timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the number of `insert` calls observed so far (not adjusted
    /// for expiry).
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Serializes the filter to a byte vector.
    ///
    /// The monotonic clock baseline does not survive a process restart, so
    /// the serialized form instead records how many seconds had elapsed
    /// since the filter's epoch at the moment of saving; `deserialize`
    /// reconstructs an epoch that preserves the same elapsed-time
    /// relationship to the stored slot timestamps.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = FilterBytes::with_capacity(48 + self.slots.len() * 8);
        bytes.write(MAGIC);
        bytes.write_u8(FORMAT_VERSION);
        bytes.write_u8(self.slots.width().tag());
        bytes.write_u64_le(self.size);
        bytes.write_u16_le(self.hashcount);
        bytes.write_u64_le(self.expected);
        bytes.write_f64_le(self.accuracy);
        bytes.write_u64_le(self.timeout_secs);
        bytes.write_u64_le(self.insertions);
        bytes.write_u64_le(self.epoch.elapsed().as_secs());
        self.slots.write(&mut bytes);
        bytes.into_bytes()
    }

    /// Deserializes a filter from bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = FilterSlice::new(bytes);
        let err = || Error::invalid_file("truncated header");

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&cursor.read_vec_u8(4).map_err(|_| err())?);
        if &magic != MAGIC {
            return Err(Error::invalid_file("not a TimeDecayBloomFilter file"));
        }
        let version = cursor.read_u8().map_err(|_| err())?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_file(format!(
                "unsupported format version {version}"
            )));
        }
        let width = TimestampWidth::from_tag(cursor.read_u8().map_err(|_| err())?)?;
        let size = cursor.read_u64_le().map_err(|_| err())?;
        let hashcount = cursor.read_u16_le().map_err(|_| err())?;
        let expected = cursor.read_u64_le().map_err(|_| err())?;
        let accuracy = cursor.read_f64_le().map_err(|_| err())?;
        let timeout_secs = cursor.read_u64_le().map_err(|_| err())?;
        let insertions = cursor.read_u64_le().map_err(|_| err())?;
        let elapsed_at_save = cursor.read_u64_le().map_err(|_| err())?;
        let slots = Timestamps::read(width, size as usize, &mut cursor)?;

        let epoch = Instant::now() - Duration::from_secs(elapsed_at_save);

        Ok(TimeDecayBloomFilter {
            size,
            hashcount,
            expected,
            accuracy,
            timeout_secs,
            insertions,
            epoch,
            slots,
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

    /// Computes the current tick, in `1..=max_time`, wrapping around the
    /// slot width's domain. `0` is reserved to mean "never written".
    fn current_ts(&self) -> u64 {
        let max_time = self.slots.width().max_time();
        let now = self.epoch.elapsed().as_secs();
        (now % max_time) + 1
    }

    /// Returns `true` if the cyclic distance between `now_ts` and `stored`
    /// exceeds the configured timeout.
    fn is_expired(&self, now_ts: u64, stored: u64) -> bool {
        let max_time = self.slots.width().max_time();
        let age = (now_ts + max_time - stored) % max_time;
        age > self.timeout_secs
    }
}

/// Builder for creating [`TimeDecayBloomFilter`] instances.
#[derive(Debug, Clone)]
pub struct TimeDecayBloomFilterBuilder {
    size: u64,
    hashcount: u16,
    expected: u64,
    accuracy: f64,
    timeout_secs: u64,
}

impl Default for TimeDecayBloomFilterBuilder {
    fn default() -> Self {
        Self {
            size: MIN_NUM_SLOTS,
            hashcount: 1,
            expected: 1,
            accuracy: 0.01,
            timeout_secs: 60,
        }
    }
}

impl TimeDecayBloomFilterBuilder {
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

        let size = Self::suggest_num_slots(max_items, fpp);
        let hashcount = Self::suggest_num_hashes(max_items, size);

        Self {
            size,
            hashcount,
            expected: max_items,
            accuracy: fpp,
            timeout_secs: 60,
        }
    }

    /// Creates a builder with manual size specification.
    ///
    /// # Panics
    ///
    /// Panics if `num_slots` is out of range or `num_hashes` is 0.
    pub fn with_size(num_slots: u64, num_hashes: u16) -> Self {
        assert!(num_slots >= MIN_NUM_SLOTS, "num_slots must be at least 64");
        assert!(
            num_slots <= MAX_NUM_SLOTS,
            "num_slots is unreasonably large"
        );
        assert!(num_hashes > 0, "num_hashes must be at least 1");

        Self {
            size: num_slots,
            hashcount: num_hashes,
            expected: num_slots,
            accuracy: 0.0,
            timeout_secs: 60,
        }
    }

    /// Sets how long an inserted element remains a member before it expires.
    /// Determines the slot timestamp width: the smallest width whose domain
    /// strictly exceeds `timeout` is selected.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the maximum expected number of elements used by
    /// `capacity_used`-style statistics.
    pub fn expected(mut self, expected: u64) -> Self {
        self.expected = expected;
        self
    }

    /// Builds the time-decaying Bloom filter.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// if the configured timeout cannot be represented by any supported
    /// timestamp width.
    pub fn build(self) -> Result<TimeDecayBloomFilter, Error> {
        let width = TimestampWidth::select(self.timeout_secs)?;
        Ok(TimeDecayBloomFilter {
            size: self.size,
            hashcount: self.hashcount,
            expected: self.expected,
            accuracy: self.accuracy,
            timeout_secs: self.timeout_secs,
            insertions: 0,
            epoch: Instant::now(),
            slots: Timestamps::zeroed(width, self.size as usize),
        })
    }

    /// Suggests the ideal number of slots for `max_items` elements at false
    /// positive rate `fpp` (identical formula to the classical Bloom
    /// filter's `m`).
    pub fn suggest_num_slots(max_items: u64, fpp: f64) -> u64 {
        let n = max_items as f64;
        let ln2_squared = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let slots = (-n * fpp.ln() / ln2_squared).ceil() as u64;
        slots.clamp(MIN_NUM_SLOTS, MAX_NUM_SLOTS)
    }

    /// Suggests the ideal number of hash functions, clamped to `k >= 1`.
    pub fn suggest_num_hashes(max_items: u64, num_slots: u64) -> u16 {
        let m = num_slots as f64;
        let n = max_items as f64;
        let k = (m / n * std::f64::consts::LN_2).floor() as u64;
        k.clamp(1, 100) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains_before_timeout() {
        let mut filter = TimeDecayBloomFilterBuilder::with_accuracy(15, 0.01)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert!(!filter.contains_str("foo"));
        filter.insert_str("foo");
        assert!(filter.contains_str("foo"));
    }

    #[test]
    fn entry_expires_after_timeout() {
        let mut filter = TimeDecayBloomFilterBuilder::with_size(1024, 4)
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        filter.insert_str("foo");
        assert!(filter.contains_str("foo"));

        // Rewind the epoch to simulate the timeout elapsing, since sleeping
        // in a test is slow and flaky.
        filter.epoch = Instant::now() - Duration::from_secs(5);
        assert!(!filter.contains_str("foo"));
    }

    #[test]
    fn lookup_is_false_once_elapsed_time_exceeds_timestamp_domain() {
        let mut filter = TimeDecayBloomFilterBuilder::with_size(1024, 4)
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        filter.insert_str("foo");

        // Rewind the epoch past the whole 1-byte timestamp domain (max_time
        // = 255) rather than just past `timeout`, so a naive cyclic-distance
        // check could otherwise wrap around and mistake this for "fresh".
        filter.epoch = Instant::now() - Duration::from_secs(1000);
        assert!(!filter.contains_str("foo"));
    }

    #[test]
    fn clear_removes_all_entries() {
        let mut filter = TimeDecayBloomFilterBuilder::with_accuracy(100, 0.01)
            .build()
            .unwrap();
        filter.insert_str("foo");
        filter.clear();
        assert!(filter.is_empty());
        assert!(!filter.contains_str("foo"));
    }

    #[test]
    fn width_cascade_matches_timeout_domain() {
        let small = TimeDecayBloomFilterBuilder::with_size(64, 2)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        assert_eq!(small.slots.width(), TimestampWidth::Bits8);

        let medium = TimeDecayBloomFilterBuilder::with_size(64, 2)
            .timeout(Duration::from_secs(70_000))
            .build()
            .unwrap();
        assert!(matches!(medium.slots.width(), TimestampWidth::Bits32));
    }

    #[test]
    fn serialize_deserialize_preserves_liveness() {
        let mut filter = TimeDecayBloomFilterBuilder::with_accuracy(15, 0.01)
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap();
        filter.insert_str("foo");

        let bytes = filter.serialize();
        let restored = TimeDecayBloomFilter::deserialize(&bytes).unwrap();

        assert!(restored.contains_str("foo"));
        assert_eq!(restored.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn deserialize_rejects_wrong_magic() {
        let mut bytes = TimeDecayBloomFilterBuilder::with_size(64, 2)
            .build()
            .unwrap()
            .serialize();
        bytes[0] = b'X';
        assert!(TimeDecayBloomFilter::deserialize(&bytes).is_err());
    }
}
