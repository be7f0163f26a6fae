//! MurmurHash3, in the 32-bit (x86) and 128-bit (x64) variants.
//!
//! Both variants are ports of Austin Appleby's public-domain reference
//! implementation (<https://github.com/aappleby/smhasher>). They are
//! non-cryptographic, seedable, and pure: the same `(bytes, seed)` pair
//! always produces the same output.

const C1_32: u32 = 0xcc9e_2d51;
const C2_32: u32 = 0x1b87_3593;

/// 32-bit MurmurHash3 (the `x86_32` variant).
///
/// Used directly by the Cuckoo filter to derive a fingerprint and primary
/// bucket index from a single hash computation.
#[must_use]
pub fn mmh3_32(data: &[u8], seed: u32) -> u32 {
    let mut h1 = seed;
    let nblocks = data.len() / 4;

    for i in 0..nblocks {
        let block = &data[i * 4..i * 4 + 4];
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);

        k1 = k1.wrapping_mul(C1_32);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2_32);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = &data[nblocks * 4..];
    let mut k1: u32 = 0;
    match tail.len() & 3 {
        3 => {
            k1 ^= (tail[2] as u32) << 16;
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
        }
        2 => {
            k1 ^= (tail[1] as u32) << 8;
            k1 ^= tail[0] as u32;
        }
        1 => {
            k1 ^= tail[0] as u32;
        }
        _ => {}
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1_32);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2_32);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    fmix32(h1)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

const C1_128: u64 = 0x87c3_7b91_1142_53d5;
const C2_128: u64 = 0x4cf5_ad43_2745_937f;

/// 128-bit MurmurHash3 (the `x64_128` variant), returned as two 64-bit halves.
///
/// This is the hash every Bloom-family filter (classic, counting,
/// time-decaying) uses to synthesize `k` independent bit/slot positions via
/// Kirsch-Mitzenmacher double hashing: callers seed each of the `k` rounds
/// with the round index `i`, combine both returned halves, and reduce modulo
/// the filter size.
#[must_use]
pub fn mmh3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;
    let nblocks = data.len() / 16;

    for i in 0..nblocks {
        let block = &data[i * 16..i * 16 + 16];
        let mut k1 = u64::from_le_bytes(block[0..8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(block[8..16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1_128);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2_128);
        h1 ^= k1;

        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2_128);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1_128);
        h2 ^= k2;

        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    let tail = &data[nblocks * 16..];
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;

    let tail_len = tail.len() & 15;
    if tail_len >= 15 {
        k2 ^= (tail[14] as u64) << 48;
    }
    if tail_len >= 14 {
        k2 ^= (tail[13] as u64) << 40;
    }
    if tail_len >= 13 {
        k2 ^= (tail[12] as u64) << 32;
    }
    if tail_len >= 12 {
        k2 ^= (tail[11] as u64) << 24;
    }
    if tail_len >= 11 {
        k2 ^= (tail[10] as u64) << 16;
    }
    if tail_len >= 10 {
        k2 ^= (tail[9] as u64) << 8;
    }
    if tail_len >= 9 {
        k2 ^= tail[8] as u64;
        k2 = k2.wrapping_mul(C2_128);
        k2 = k2.rotate_left(33);
        k2 = k2.wrapping_mul(C1_128);
        h2 ^= k2;
    }

    if tail_len >= 8 {
        k1 ^= (tail[7] as u64) << 56;
    }
    if tail_len >= 7 {
        k1 ^= (tail[6] as u64) << 48;
    }
    if tail_len >= 6 {
        k1 ^= (tail[5] as u64) << 40;
    }
    if tail_len >= 5 {
        k1 ^= (tail[4] as u64) << 32;
    }
    if tail_len >= 4 {
        k1 ^= (tail[3] as u64) << 24;
    }
    if tail_len >= 3 {
        k1 ^= (tail[2] as u64) << 16;
    }
    if tail_len >= 2 {
        k1 ^= (tail[1] as u64) << 8;
    }
    if tail_len >= 1 {
        k1 ^= tail[0] as u64;
        k1 = k1.wrapping_mul(C1_128);
        k1 = k1.rotate_left(31);
        k1 = k1.wrapping_mul(C2_128);
        h1 ^= k1;
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

/// Low 64 bits of [`mmh3_x64_128`].
///
/// Used where only a single 64-bit hash is needed rather than a pair of
/// independent positions.
#[must_use]
pub fn mmh3_x64_64(data: &[u8], seed: u64) -> u64 {
    mmh3_x64_128(data, seed).0
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmh3_32_empty_string() {
        assert_eq!(mmh3_32(b"", 0), 0x0000_0000);
    }

    #[test]
    fn mmh3_32_single_char() {
        assert_eq!(mmh3_32(b"a", 0), 0x3c25_69b2);
    }

    #[test]
    fn mmh3_32_is_deterministic() {
        let a = mmh3_32(b"the quick brown fox", 42);
        let b = mmh3_32(b"the quick brown fox", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn mmh3_32_seed_changes_output() {
        assert_ne!(mmh3_32(b"hello", 0), mmh3_32(b"hello", 1));
    }

    #[test]
    fn mmh3_x64_128_is_deterministic() {
        let a = mmh3_x64_128(b"abc", 0);
        let b = mmh3_x64_128(b"abc", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn mmh3_x64_128_matches_canonical_reference_vector() {
        // MurmurHash3_x64_128("abc", seed=0) per Austin Appleby's reference
        // implementation.
        assert_eq!(
            mmh3_x64_128(b"abc", 0),
            (0xb496_3f3f_3fad_7867, 0x3ba2_7441_26ca_2d52)
        );
    }

    #[test]
    fn mmh3_x64_128_empty_with_seed() {
        // Reference vector for MurmurHash3_x64_128("", seed=0):
        // h1 = h2 = 0 (no blocks, no tail, length 0 XORed in is a no-op,
        // and fmix64(0) == 0).
        assert_eq!(mmh3_x64_128(b"", 0), (0, 0));
    }

    #[test]
    fn mmh3_x64_64_matches_first_half_of_128() {
        let (h1, _h2) = mmh3_x64_128(b"filterkit", 7);
        assert_eq!(mmh3_x64_64(b"filterkit", 7), h1);
    }

    #[test]
    fn mmh3_x64_128_differs_across_seeds_used_for_k_positions() {
        // The Bloom-family filters seed each of the k rounds with the round
        // index; those k outputs must differ from one another for the
        // double-hashing scheme to synthesize independent positions.
        let outputs: Vec<(u64, u64)> = (0..8u64).map(|i| mmh3_x64_128(b"element", i)).collect();
        for i in 0..outputs.len() {
            for j in (i + 1)..outputs.len() {
                assert_ne!(outputs[i], outputs[j]);
            }
        }
    }
}
