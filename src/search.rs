//! Search primitives over the per-node chunk arrays.
//!
//! Both searches take the logical length `count` as the authoritative bound.
//! The vectorized paths load the full fixed-width array and mask the comparison
//! result down to `count` bits before looking at it, so whatever sits past `count`
//! never influences the answer.
//!
//! The scalar versions are the reference; the vector versions must agree with them
//! for every input.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Position of `chunk` among the first `count` entries of `chunks`.
#[inline]
pub fn find_equal_scalar(chunks: &[u8], count: usize, chunk: u8) -> Option<usize> {
    chunks[..count].iter().position(|c| *c == chunk)
}

/// First position among the first `count` entries whose chunk is `>= chunk`, or `count`.
#[inline]
pub fn find_insertion_point_scalar(chunks: &[u8], count: usize, chunk: u8) -> usize {
    chunks[..count]
        .iter()
        .position(|c| *c >= chunk)
        .unwrap_or(count)
}

/// Exact-match search, vectorized for 16 and 32 wide arrays.
#[inline]
pub fn find_equal(chunks: &[u8], count: usize, chunk: u8) -> Option<usize> {
    debug_assert!(count <= chunks.len());

    let pos = match chunks.len() {
        16 | 32 => find_equal_simd(chunks, count, chunk),
        _ => find_equal_scalar(chunks, count, chunk),
    };
    debug_assert_eq!(pos, find_equal_scalar(chunks, count, chunk));
    pos
}

/// Insertion point search, vectorized for 16 and 32 wide arrays.
#[inline]
pub fn find_insertion_point(chunks: &[u8], count: usize, chunk: u8) -> usize {
    debug_assert!(count <= chunks.len());

    let pos = match chunks.len() {
        16 | 32 => find_insertion_point_simd(chunks, count, chunk),
        _ => find_insertion_point_scalar(chunks, count, chunk),
    };
    debug_assert_eq!(pos, find_insertion_point_scalar(chunks, count, chunk));
    pos
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn count_mask(count: usize) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn find_equal_simd(chunks: &[u8], count: usize, chunk: u8) -> Option<usize> {
    let bitfield = match chunks.len() {
        16 => eq_mask_16(chunks, chunk),
        _ => eq_mask_32(chunks, chunk),
    } & count_mask(count);

    if bitfield != 0 {
        Some(bitfield.trailing_zeros() as usize)
    } else {
        None
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn find_equal_simd(chunks: &[u8], count: usize, chunk: u8) -> Option<usize> {
    find_equal_scalar(chunks, count, chunk)
}

/// There is no unsigned byte compare in SSE2/AVX2, so `x >= chunk` is computed
/// as `min(x, chunk) == chunk`.
#[cfg(target_arch = "x86_64")]
#[inline]
fn find_insertion_point_simd(chunks: &[u8], count: usize, chunk: u8) -> usize {
    let bitfield = match chunks.len() {
        16 => ge_mask_16(chunks, chunk),
        _ => ge_mask_32(chunks, chunk),
    } & count_mask(count);

    if bitfield != 0 {
        bitfield.trailing_zeros() as usize
    } else {
        count
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn find_insertion_point_simd(chunks: &[u8], count: usize, chunk: u8) -> usize {
    find_insertion_point_scalar(chunks, count, chunk)
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn eq_mask_16(chunks: &[u8], chunk: u8) -> u32 {
    assert!(chunks.len() >= 16);
    // SAFETY: sse2 is part of the x86_64 baseline, and the slice holds 16 readable bytes.
    unsafe {
        let needle = _mm_set1_epi8(chunk as i8);
        let haystack = _mm_loadu_si128(chunks.as_ptr() as *const __m128i);
        let cmp = _mm_cmpeq_epi8(needle, haystack);
        (_mm_movemask_epi8(cmp) as u32) & 0xFFFF
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn ge_mask_16(chunks: &[u8], chunk: u8) -> u32 {
    assert!(chunks.len() >= 16);
    // SAFETY: same as eq_mask_16.
    unsafe {
        let needle = _mm_set1_epi8(chunk as i8);
        let haystack = _mm_loadu_si128(chunks.as_ptr() as *const __m128i);
        let min = _mm_min_epu8(haystack, needle);
        let cmp = _mm_cmpeq_epi8(needle, min);
        (_mm_movemask_epi8(cmp) as u32) & 0xFFFF
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn eq_mask_32(chunks: &[u8], chunk: u8) -> u32 {
    assert!(chunks.len() >= 32);
    if is_x86_feature_detected!("avx2") {
        // SAFETY: avx2 availability was just checked.
        unsafe { eq_mask_32_avx2(chunks, chunk) }
    } else {
        eq_mask_16(&chunks[..16], chunk) | (eq_mask_16(&chunks[16..], chunk) << 16)
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn ge_mask_32(chunks: &[u8], chunk: u8) -> u32 {
    assert!(chunks.len() >= 32);
    if is_x86_feature_detected!("avx2") {
        // SAFETY: avx2 availability was just checked.
        unsafe { ge_mask_32_avx2(chunks, chunk) }
    } else {
        ge_mask_16(&chunks[..16], chunk) | (ge_mask_16(&chunks[16..], chunk) << 16)
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn eq_mask_32_avx2(chunks: &[u8], chunk: u8) -> u32 {
    let needle = _mm256_set1_epi8(chunk as i8);
    let haystack = _mm256_loadu_si256(chunks.as_ptr() as *const __m256i);
    let cmp = _mm256_cmpeq_epi8(needle, haystack);
    _mm256_movemask_epi8(cmp) as u32
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn ge_mask_32_avx2(chunks: &[u8], chunk: u8) -> u32 {
    let needle = _mm256_set1_epi8(chunk as i8);
    let haystack = _mm256_loadu_si256(chunks.as_ptr() as *const __m256i);
    let min = _mm256_min_epu8(haystack, needle);
    let cmp = _mm256_cmpeq_epi8(needle, min);
    _mm256_movemask_epi8(cmp) as u32
}
