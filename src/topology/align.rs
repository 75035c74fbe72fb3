//! Packed alignment codes.
//!
//! An alignment code relates a simplex's stored vertex order to one of its
//! uses inside a higher entity: bit 0 is a flip (swap of the last two
//! vertices), bits 1-2 a forward rotation, and the remaining bits record
//! which downward slot the use occupies.

/// The code that maps every tuple to itself.
pub const IDENTITY_CODE: u8 = 0;

#[inline]
pub fn make_code(flipped: bool, rotation: u8, which_down: u8) -> u8 {
    which_down << 3 | rotation << 1 | u8::from(flipped)
}

#[inline]
pub fn code_is_flipped(code: u8) -> bool {
    code & 1 != 0
}

#[inline]
pub fn code_rotation(code: u8) -> u8 {
    (code >> 1) & 0x3
}

#[inline]
pub fn code_which_down(code: u8) -> u8 {
    code >> 3
}

/// Apply a code to `deg` values: flip first, then rotate forward so that
/// `out[(i + rotation) % deg] = flipped[i]`.
pub fn align_adj<T: Copy>(deg: usize, code: u8, input: &[T], out: &mut [T]) {
    debug_assert!(deg >= 1 && deg <= 3);
    let rot = code_rotation(code) as usize;
    let mut flipped = [input[0]; 3];
    flipped[..deg].copy_from_slice(&input[..deg]);
    if code_is_flipped(code) && deg >= 2 {
        flipped.swap(deg - 2, deg - 1);
    }
    for i in 0..deg {
        out[(i + rot) % deg] = flipped[i];
    }
}

fn apply_to_identity(deg: usize, code: u8) -> [u8; 3] {
    let ident = [0u8, 1, 2];
    let mut out = [0u8; 3];
    align_adj(deg, code, &ident[..deg], &mut out[..deg]);
    out
}

/// The code whose application equals applying `a` then `b`. The composed
/// code carries no `which_down` bits.
pub fn compound_alignments(deg: usize, a: u8, b: u8) -> u8 {
    let ident = [0u8, 1, 2];
    let mut mid = [0u8; 3];
    let mut target = [0u8; 3];
    align_adj(deg, a, &ident[..deg], &mut mid[..deg]);
    align_adj(deg, b, &mid.clone()[..deg], &mut target[..deg]);
    for flipped in [false, true] {
        for rotation in 0..deg as u8 {
            let code = make_code(flipped, rotation, 0);
            if apply_to_identity(deg, code) == target {
                return code;
            }
        }
    }
    unreachable!("alignment codes form a group")
}

/// The code undoing `code` (ignoring `which_down`).
pub fn invert_alignment(deg: usize, code: u8) -> u8 {
    let ident = apply_to_identity(deg, IDENTITY_CODE);
    for flipped in [false, true] {
        for rotation in 0..deg as u8 {
            let inv = make_code(flipped, rotation, 0);
            if apply_to_identity(deg, compound_alignments(deg, code, inv)) == ident {
                return inv;
            }
        }
    }
    unreachable!("alignment codes form a group")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned3(code: u8) -> [u32; 3] {
        let mut out = [0u32; 3];
        align_adj(3, code, &[0, 1, 2], &mut out);
        out
    }

    #[test]
    fn flip_and_rotations_on_a_triangle() {
        assert_eq!(aligned3(make_code(true, 0, 0)), [0, 2, 1]);
        assert_eq!(aligned3(make_code(false, 1, 0)), [2, 0, 1]);
        assert_eq!(aligned3(make_code(false, 2, 0)), [1, 2, 0]);
    }

    #[test]
    fn compound_matches_sequential_application() {
        for rot1 in 0..3 {
            for flip1 in [false, true] {
                for rot2 in 0..3 {
                    for flip2 in [false, true] {
                        let code1 = make_code(flip1, rot1, 0);
                        let code2 = make_code(flip2, rot2, 0);
                        let mut step1 = [0u32; 3];
                        let mut step2 = [0u32; 3];
                        align_adj(3, code1, &[0, 1, 2], &mut step1);
                        align_adj(3, code2, &step1.clone(), &mut step2);
                        let compound = compound_alignments(3, code1, code2);
                        assert_eq!(aligned3(compound), step2);
                    }
                }
            }
        }
    }

    #[test]
    fn compound_with_inverse_is_identity() {
        for deg in [2usize, 3] {
            for rot in 0..deg as u8 {
                for flip in [false, true] {
                    let code = make_code(flip, rot, 0);
                    let inv = invert_alignment(deg, code);
                    assert_eq!(
                        compound_alignments(deg, code, inv),
                        IDENTITY_CODE,
                        "deg {deg} code {code:#b}"
                    );
                }
            }
        }
    }

    #[test]
    fn which_down_passes_through() {
        let code = make_code(false, 1, 4);
        assert_eq!(code_which_down(code), 4);
        assert_eq!(code_rotation(code), 1);
        assert!(!code_is_flipped(code));
    }
}
