// Copyright 2025 the Quilt Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion between `f32` and IEEE 754 half-precision floats.
//!
//! Half floats are the storage type of the `*16Float` pixel encodings. The
//! bulk converters pick an implementation once per process: a hardware path
//! using the F16C instructions where the CPU advertises them, and a portable
//! scalar path everywhere else. Both produce bit-identical results for all
//! finite inputs.

#[cfg(target_arch = "x86_64")]
use std::sync::OnceLock;

/// The half-precision bit pattern for `0.0`.
pub const FP16_ZERO: u16 = 0x0000;
/// The half-precision bit pattern for `1.0`.
pub const FP16_ONE: u16 = 0x3c00;
/// The half-precision bit pattern for `-1.0`.
pub const FP16_MINUS_ONE: u16 = 0xbc00;

/// Convert a single `f32` to its half-precision bit pattern.
///
/// Rounds to nearest, ties to even. Values beyond the half range saturate to
/// the infinity pattern; values below the smallest subnormal flush to signed
/// zero.
pub fn float_to_half_one(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let man = bits & 0x007f_ffff;

    if exp == 255 {
        // Infinity keeps its pattern; NaN keeps the top payload bits but is
        // forced quiet so truncation can't turn it into infinity.
        if man == 0 {
            return sign | 0x7c00;
        }
        return sign | 0x7c00 | 0x0200 | (man >> 13) as u16;
    }
    if exp >= 143 {
        // Exponent too large for half precision, saturate to infinity.
        return sign | 0x7c00;
    }
    if exp >= 113 {
        // Normal half. Round to nearest even on the 13 dropped mantissa
        // bits; a mantissa carry bumps the exponent, which also turns the
        // largest representable values into infinity as required.
        let mut v = (((exp - 112) as u32) << 10) | (man >> 13);
        let rem = man & 0x1fff;
        if rem > 0x1000 || (rem == 0x1000 && (v & 1) != 0) {
            v += 1;
        }
        return sign | v as u16;
    }
    if exp >= 101 {
        // Subnormal half output. The implicit bit becomes explicit and the
        // whole mantissa is shifted into the 10-bit field.
        let full = man | 0x0080_0000;
        let shift = (126 - exp) as u32;
        let mut v = full >> shift;
        let rem = full & ((1 << shift) - 1);
        let half = 1 << (shift - 1);
        if rem > half || (rem == half && (v & 1) != 0) {
            v += 1;
        }
        return sign | v as u16;
    }
    // Smaller than half the smallest subnormal.
    sign
}

/// Convert a half-precision bit pattern to `f32`. This direction is exact.
pub fn half_to_float_one(h: u16) -> f32 {
    let sign = ((h & 0x8000) as u32) << 16;
    let exp = ((h >> 10) & 0x1f) as u32;
    let man = (h & 0x03ff) as u32;

    let bits = if exp == 0x1f {
        sign | 0x7f80_0000 | (man << 13)
    } else if exp != 0 {
        sign | ((exp + 112) << 23) | (man << 13)
    } else if man != 0 {
        // Subnormal half, normalize into an f32 exponent.
        let mut e = 113;
        let mut m = man;
        while m & 0x0400 == 0 {
            m <<= 1;
            e -= 1;
        }
        sign | (e << 23) | ((m & 0x03ff) << 13)
    } else {
        sign
    };
    f32::from_bits(bits)
}

/// Convert a slice of floats to half floats. `dest` and `src` must have the
/// same length.
pub fn float_to_half(dest: &mut [u16], src: &[f32]) {
    assert_eq!(dest.len(), src.len());
    #[cfg(target_arch = "x86_64")]
    if have_f16c() {
        // SAFETY: guarded by the runtime F16C check.
        unsafe { float_to_half_f16c(dest, src) };
        return;
    }
    float_to_half_scalar(dest, src);
}

/// Convert a slice of half floats to floats. `dest` and `src` must have the
/// same length.
pub fn half_to_float(dest: &mut [f32], src: &[u16]) {
    assert_eq!(dest.len(), src.len());
    #[cfg(target_arch = "x86_64")]
    if have_f16c() {
        // SAFETY: guarded by the runtime F16C check.
        unsafe { half_to_float_f16c(dest, src) };
        return;
    }
    half_to_float_scalar(dest, src);
}

/// Convert one RGBA pixel worth of floats to half floats.
pub fn float_to_half_4(dest: &mut [u16; 4], src: &[f32; 4]) {
    float_to_half(dest, src);
}

/// Convert one RGBA pixel worth of half floats to floats.
pub fn half_to_float_4(dest: &mut [f32; 4], src: &[u16; 4]) {
    half_to_float(dest, src);
}

fn float_to_half_scalar(dest: &mut [u16], src: &[f32]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d = float_to_half_one(*s);
    }
}

fn half_to_float_scalar(dest: &mut [f32], src: &[u16]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d = half_to_float_one(*s);
    }
}

/// Whether the executing CPU supports the F16C conversion instructions.
///
/// Detection runs once; concurrent first calls race benignly on the same
/// idempotent computation.
#[cfg(target_arch = "x86_64")]
fn have_f16c() -> bool {
    static HAVE_F16C: OnceLock<bool> = OnceLock::new();
    *HAVE_F16C.get_or_init(|| std::arch::is_x86_feature_detected!("f16c"))
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "f16c")]
unsafe fn float_to_half_f16c(dest: &mut [u16], src: &[f32]) {
    use std::arch::x86_64::*;

    let chunks = src.len() / 8;
    for i in 0..chunks {
        // SAFETY: unaligned loads/stores within the checked slice bounds.
        unsafe {
            let v = _mm256_loadu_ps(src.as_ptr().add(i * 8));
            let h = _mm256_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(v);
            _mm_storeu_si128(dest.as_mut_ptr().add(i * 8).cast(), h);
        }
    }
    // The trailing unaligned elements go through the scalar path.
    float_to_half_scalar(&mut dest[chunks * 8..], &src[chunks * 8..]);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "f16c")]
unsafe fn half_to_float_f16c(dest: &mut [f32], src: &[u16]) {
    use std::arch::x86_64::*;

    let chunks = src.len() / 8;
    for i in 0..chunks {
        // SAFETY: unaligned loads/stores within the checked slice bounds.
        unsafe {
            let h = _mm_loadu_si128(src.as_ptr().add(i * 8).cast());
            let v = _mm256_cvtph_ps(h);
            _mm256_storeu_ps(dest.as_mut_ptr().add(i * 8), v);
        }
    }
    half_to_float_scalar(&mut dest[chunks * 8..], &src[chunks * 8..]);
}
