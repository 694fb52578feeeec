//! Precomputed tuning tables.
//!
//! All four tables are built once, the first time any of them is touched,
//! and never change afterward. This mirrors the one-time lookup-table
//! initializers used throughout the tracker engine this crate is modeled
//! on, but built behind [`LazyLock`] instead of `const fn` since the
//! frequency and volume curves need `f64::powf`.

use std::sync::LazyLock;

/// Frequency, in milliHz, for fractional MIDI notes 0..12 (one octave).
/// `get_freq` extrapolates to the full range by shifting.
static FREQS: LazyLock<[u32; 256]> = LazyLock::new(|| {
    let mut table = [0u32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let note = (i as f64) * 12.0 / 256.0 - 69.0;
        *slot = (440_000.0 * 2f64.powf(note / 12.0)).round() as u32;
    }
    table
});

/// Velocity/controller value (0..127) to linear gain (0..65535).
/// Exponent is the TiMidity-derived `1.66096404744` curve.
static VOLS: LazyLock<[u32; 128]> = LazyLock::new(|| {
    let mut table = [0u32; 128];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = (65535.0 * (i as f64 / 127.0).powf(1.66096404744)).round() as u32;
    }
    table
});

/// Log-domain envelope decode: high 10 bits of `envelope_value` to a linear
/// amplitude scalar. 60 dB range, unity gain at the top of the table (see
/// DESIGN.md Open Questions — the original table builder was not available
/// in the retrieved reference source).
static POWS: LazyLock<[f64; 1024]> = LazyLock::new(|| {
    let mut table = [0f64; 1024];
    for (i, slot) in table.iter_mut().enumerate() {
        let db_exp = (i as f64 - 1023.0) / 1023.0 * 3.0;
        *slot = 10f64.powf(db_exp);
    }
    table
});

/// One period of sine, scaled to 14-bit signed amplitude, for tremolo.
static SINES: LazyLock<[i32; 1024]> = LazyLock::new(|| {
    let mut table = [0i32; 1024];
    for (i, slot) in table.iter_mut().enumerate() {
        let theta = (i as f64) / 1024.0 * std::f64::consts::TAU;
        *slot = (8192.0 * theta.sin()).round() as i32;
    }
    table
});

/// Converts an 8:8 fixed-point note number to a frequency in milliHz.
///
/// `note` is `note_number << 8 | fraction`. Octaves beyond the first are
/// reached by shifting the in-octave table value left.
pub fn get_freq(note: u32) -> u32 {
    let note2 = note / 12;
    FREQS[(note2 % 256) as usize] << (note2 / 256)
}

/// Velocity/controller value (0..127) to linear gain (0..65535).
pub fn vol(index: u8) -> u32 {
    VOLS[index as usize]
}

/// Envelope phase accumulator (top 10 bits of a 0..=1023<<20 value) to a
/// linear amplitude scalar.
pub fn envelope_power(index: u32) -> f64 {
    POWS[(index & 1023) as usize]
}

/// One period of sine at 14-bit signed amplitude, indexed 0..1024.
pub fn sine(index: u32) -> i32 {
    SINES[(index & 1023) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a440_is_exact() {
        // note 69, fraction 0 -> 69 << 8
        assert!(get_freq(69 << 8).abs_diff(440_000) <= 1);
    }

    #[test]
    fn octave_doubles() {
        let low = get_freq(60 << 8);
        let high = get_freq(72 << 8);
        assert!(high.abs_diff(2 * low) <= 2);
    }

    #[test]
    fn vol_endpoints() {
        assert_eq!(vol(0), 0);
        assert_eq!(vol(127), 65535);
    }

    #[test]
    fn envelope_power_monotonic() {
        let mut prev = envelope_power(0);
        for i in 1..1024 {
            let cur = envelope_power(i);
            assert!(cur >= prev, "pows table must be non-decreasing");
            prev = cur;
        }
        assert!((envelope_power(1023) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sine_is_bounded() {
        for i in 0..1024 {
            assert!(sine(i).abs() <= 8192);
        }
        assert_eq!(sine(0), 0);
    }
}
