//! Rotation-invariant codeword matching.

use crate::Dictionary;

/// A dictionary hit for an observed code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id.
    pub id: u32,
    /// Rotation `0..=3` with `observed == rotate(dict_code, rotation)`.
    ///
    /// Equivalently: the marker's logical top-left corner sits at index
    /// `rotation` of the observed (clockwise) corner sequence.
    pub rotation: u8,
    /// Hamming distance between observed and rotated dictionary code.
    pub hamming: u8,
}

/// Immutable lookup table over one dictionary.
///
/// All four cyclic rotations of every codeword are computed once here, so a
/// per-candidate match is a linear scan of XOR/popcount operations. For the
/// built-in families (<= a few hundred ids) that scan is far below the cost
/// of sampling the candidate itself.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotations: Vec<[u64; 4]>,
}

impl Matcher {
    /// Build the rotation table for `dict`, accepting matches up to
    /// `max_hamming` bit errors.
    ///
    /// # Panics
    /// Panics when the dictionary grid does not fit a `u64` codeword.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        assert!(
            dict.bit_count() <= 64,
            "{}: {}x{} bits exceed a u64 codeword",
            dict.name,
            dict.marker_size,
            dict.marker_size
        );

        let n = dict.marker_size;
        let rotations = dict
            .codes
            .iter()
            .map(|&code| {
                let r1 = rotate_code(code, n, 1);
                let r2 = rotate_code(r1, n, 1);
                let r3 = rotate_code(r2, n, 1);
                [code, r1, r2, r3]
            })
            .collect();

        Self {
            dict,
            max_hamming,
            rotations,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Best match for `observed` within the Hamming tolerance, if any.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;
        for (id, rots) in self.rotations.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let h = (observed ^ cand).count_ones() as u8;
                if h > self.max_hamming {
                    continue;
                }
                if best.map_or(true, |b| h < b.hamming) {
                    best = Some(Match {
                        id: id as u32,
                        rotation: rot as u8,
                        hamming: h,
                    });
                    if h == 0 {
                        return best;
                    }
                }
            }
        }
        best
    }
}

/// Rotate a row-major `n x n` codeword by `rot` quarter turns clockwise.
pub fn rotate_code(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }
    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            if (code >> (y * n + x)) & 1 == 0 {
                continue;
            }
            // one clockwise quarter turn maps (x, y) -> (n-1-y, x)
            let (mut dx, mut dy) = (x, y);
            for _ in 0..rot {
                let t = dx;
                dx = n - 1 - dy;
                dy = t;
            }
            out |= 1u64 << (dy * n + dx);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;

    #[test]
    fn four_quarter_turns_are_identity() {
        let code = 0xa53a_u64;
        assert_eq!(rotate_code(code, 4, 0), code);
        let once = rotate_code(code, 4, 1);
        assert_eq!(rotate_code(once, 4, 3), code);
        assert_eq!(rotate_code(code, 4, 2), rotate_code(once, 4, 1));
    }

    #[test]
    fn matcher_recovers_id_and_rotation() {
        let matcher = Matcher::new(DICT_4X4_50, 0);
        for rot in 0..4u8 {
            let observed = rotate_code(DICT_4X4_50.codes[7], 4, rot);
            let m = matcher.match_code(observed).expect("exact hit");
            assert_eq!(m.id, 7);
            assert_eq!(m.rotation, rot);
            assert_eq!(m.hamming, 0);
        }
    }

    #[test]
    fn single_bit_error_is_corrected_within_tolerance() {
        let strict = Matcher::new(DICT_4X4_50, 0);
        let tolerant = Matcher::new(DICT_4X4_50, 1);
        let corrupted = DICT_4X4_50.codes[3] ^ (1 << 9);
        assert!(strict.match_code(corrupted).is_none());
        let m = tolerant.match_code(corrupted).expect("corrected");
        assert_eq!(m.id, 3);
        assert_eq!(m.hamming, 1);
    }

    #[test]
    fn random_codes_rarely_match() {
        // LCG-driven sweep: the acceptance region of a 50-entry 4x4 family
        // with 1-bit correction covers 50*4*17 of 65536 codes, ~5%.
        let matcher = Matcher::new(DICT_4X4_50, 1);
        let mut state = 0x2545_f491_4f6c_dd1d_u64;
        let mut hits = 0usize;
        let trials = 4000usize;
        for _ in 0..trials {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            if matcher.match_code(state & 0xffff).is_some() {
                hits += 1;
            }
        }
        assert!(
            hits < trials / 10,
            "false-positive rate too high: {hits}/{trials}"
        );
    }
}
