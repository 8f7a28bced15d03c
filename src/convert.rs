//! Per-sample conversion between the hardware's native representation and
//! the caller-facing wire formats.
//!
//! Native samples are 16-bit signed with 12 significant bits (full scale
//! 2048). Conversion always operates on one half of an I/Q pair at a time:
//! the caller side is complex interleaved, so these functions read or write
//! at stride 2 with `iq_offset` 0 (I) or 1 (Q).

/// Number of entries in the float lookup table (one per 12-bit code).
pub const LUT_SIZE: usize = 4096;

/// Build the lookup table mapping raw 12-bit sample codes to floats in
/// [-1.0, 1.0). Codes are reinterpreted as twelve-bit two's complement
/// before scaling by 1/2048.
pub fn build_cf32_lut() -> Vec<f32> {
    let mut table = Vec::with_capacity(LUT_SIZE);
    for i in 0..LUT_SIZE as i32 {
        table.push((((i + 2048) % 4096) - 2048) as f32 / 2048.0);
    }
    table
}

/// Scatter native samples into interleaved 16-bit output. Identity copy.
pub fn native_to_cs16(src: &[i16], dst: &mut [i16], iq_offset: usize) {
    for (j, &s) in src.iter().enumerate() {
        dst[j * 2 + iq_offset] = s;
    }
}

/// Scatter native samples into interleaved 8-bit output, dropping the low
/// four bits.
pub fn native_to_cs8(src: &[i16], dst: &mut [i8], iq_offset: usize) {
    for (j, &s) in src.iter().enumerate() {
        dst[j * 2 + iq_offset] = (s >> 4) as i8;
    }
}

/// Scatter native samples into interleaved float output via the lookup
/// table. Only the low 12 bits of each sample participate.
pub fn native_to_cf32(src: &[i16], dst: &mut [f32], iq_offset: usize, lut: &[f32]) {
    for (j, &s) in src.iter().enumerate() {
        dst[j * 2 + iq_offset] = lut[(s as u16 & 0x0fff) as usize];
    }
}

/// Gather one half-channel of interleaved 16-bit input into native
/// samples. Identity copy.
pub fn cs16_to_native(src: &[i16], dst: &mut [i16], iq_offset: usize) {
    for (j, d) in dst.iter_mut().enumerate() {
        *d = src[j * 2 + iq_offset];
    }
}

/// Gather one half-channel of interleaved 8-bit input into native samples,
/// restoring the 12-bit scale.
pub fn cs8_to_native(src: &[i8], dst: &mut [i16], iq_offset: usize) {
    for (j, d) in dst.iter_mut().enumerate() {
        *d = (src[j * 2 + iq_offset] as i16) << 4;
    }
}

/// Gather one half-channel of interleaved float input into native samples.
/// No clamping: out-of-range input wraps, matching the hardware's
/// truncating cast.
pub fn cf32_to_native(src: &[f32], dst: &mut [i16], iq_offset: usize) {
    for (j, d) in dst.iter_mut().enumerate() {
        // f32 as i16 saturates; go through i64 so the cast wraps instead.
        *d = (src[j * 2 + iq_offset] * 2048.0) as i64 as i16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_is_centered() {
        let lut = build_cf32_lut();
        assert_eq!(lut.len(), LUT_SIZE);

        // Positive codes scale directly, codes >= 2048 wrap negative
        assert_eq!(lut[0], 0.0);
        assert_eq!(lut[1], 1.0 / 2048.0);
        assert_eq!(lut[2047], 2047.0 / 2048.0);
        assert_eq!(lut[2048], -1.0);
        assert_eq!(lut[4095], -1.0 / 2048.0);

        // Spot-check the centered formula across the range
        for &i in &[3, 100, 1024, 2000, 2049, 3000, 3500, 4000] {
            let expected = (((i as i32 + 2048) % 4096) - 2048) as f32 / 2048.0;
            assert_eq!(lut[i], expected, "lut[{}] mismatch", i);
        }
    }

    #[test]
    fn test_cs16_round_trip_is_identity() {
        let native = vec![0i16, 1, -1, 2047, -2048, 12345, -12345];
        let mut wire = vec![0i16; native.len() * 2];
        native_to_cs16(&native, &mut wire, 0);

        let mut back = vec![0i16; native.len()];
        cs16_to_native(&wire, &mut back, 0);
        assert_eq!(back, native);
    }

    #[test]
    fn test_cs8_shifts_by_four() {
        let native = vec![256i16, -256, 0, 2047, -2048];
        let mut wire = vec![0i8; native.len() * 2];
        native_to_cs8(&native, &mut wire, 0);

        // 2047 >> 4 = 127, -2048 >> 4 = -128
        assert_eq!(wire[0], 16);
        assert_eq!(wire[2], -16);
        assert_eq!(wire[4], 0);
        assert_eq!(wire[6], 127);
        assert_eq!(wire[8], -128);

        // Values that survive the shift come back exactly
        let mut back = vec![0i16; native.len()];
        cs8_to_native(&wire, &mut back, 0);
        assert_eq!(back, vec![256, -256, 0, 2032, -2048]);
    }

    #[test]
    fn test_cf32_round_trip_exact_for_12_bit_values() {
        let lut = build_cf32_lut();
        let native = vec![0i16, 1, -1, 100, -100, 1024, 2047, -2048];
        let mut wire = vec![0.0f32; native.len() * 2];
        native_to_cf32(&native, &mut wire, 0, &lut);

        let mut back = vec![0i16; native.len()];
        cf32_to_native(&wire, &mut back, 0);
        assert_eq!(back, native);
    }

    #[test]
    fn test_cf32_negative_codes_via_high_bits() {
        // -1 as u16 is 0xFFFF; masking to 12 bits selects code 4095
        let lut = build_cf32_lut();
        let native = vec![-1i16];
        let mut wire = vec![0.0f32; 2];
        native_to_cf32(&native, &mut wire, 0, &lut);
        assert_eq!(wire[0], -1.0 / 2048.0);
    }

    #[test]
    fn test_cf32_out_of_range_wraps() {
        // 16.0 * 2048 = 32768, one past i16::MAX, wrapping to i16::MIN
        let wire = vec![16.0f32, 0.0];
        let mut native = vec![0i16; 1];
        cf32_to_native(&wire, &mut native, 0);
        assert_eq!(native[0], i16::MIN);
    }

    #[test]
    fn test_iq_offsets_interleave() {
        let i_samples = vec![1i16, 3, 5];
        let q_samples = vec![2i16, 4, 6];
        let mut wire = vec![0i16; 6];
        native_to_cs16(&i_samples, &mut wire, 0);
        native_to_cs16(&q_samples, &mut wire, 1);
        assert_eq!(wire, vec![1, 2, 3, 4, 5, 6]);

        let mut i_back = vec![0i16; 3];
        let mut q_back = vec![0i16; 3];
        cs16_to_native(&wire, &mut i_back, 0);
        cs16_to_native(&wire, &mut q_back, 1);
        assert_eq!(i_back, i_samples);
        assert_eq!(q_back, q_samples);
    }
}
