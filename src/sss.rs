//! Thien–Lin polynomial sharing and reconstruction over GF(257).
//!
//! Sharing treats each run of k whitened pixels as the coefficients
//! (a0, …, a_{k-1}) of a degree-(k−1) polynomial and hands shadow i the
//! evaluation at x = i. Any k shadows then pin the polynomial down again:
//! reconstruction solves the k×(k+1) Vandermonde system per pixel group by
//! Gaussian elimination, which is Lagrange interpolation in matrix clothing.

use anyhow::{ensure, Result};

use crate::bmp::{self, Bitmap};
use crate::gf257::{modp, INV, PRIME};
use crate::prng;

// ---------------------------------------------------------------------------
// Sharing
// ---------------------------------------------------------------------------

/// Split the (already whitened) `secret` into `n` shadow bitmaps with
/// threshold `k`, all stamped with `seed` and indices 1..=n.
///
/// Returns the shadows together with the number of coefficient repairs that
/// fired. A repair decrements a pixel of the working buffer (see
/// [`repair_group`]), so a nonzero count means recovery will differ from the
/// pre-repair secret by exactly those decrements; callers should surface
/// that to the user.
pub fn form_shadows(
    secret: &mut Bitmap,
    k: u16,
    n: u16,
    seed: u16,
) -> Result<(Vec<Bitmap>, u64)> {
    ensure!(k >= 2 && k <= n, "threshold out of range: need 2 <= k <= n");
    let len = secret.pixels.len();
    ensure!(
        len % k as usize == 0,
        "secret pixel count {len} is not divisible by k = {k}"
    );

    let per_shadow = (len / k as usize) as u32;
    let (width, height) = bmp::shadow_dimensions(per_shadow)?;
    let mut shadows: Vec<Bitmap> = (1..=n)
        .map(|i| Bitmap::new_shadow(width, height, seed, i))
        .collect();

    let mut evals = vec![0u32; n as usize];
    let mut repairs = 0u64;

    for j in 0..per_shadow as usize {
        let group = &mut secret.pixels[j * k as usize..(j + 1) * k as usize];
        loop {
            for (i, value) in evals.iter_mut().enumerate() {
                *value = eval_poly(group, i as u32 + 1);
            }
            if evals.iter().all(|&v| v != 256) {
                break;
            }
            repair_group(group);
            repairs += 1;
        }
        for (shadow, &value) in shadows.iter_mut().zip(evals.iter()) {
            shadow.pixels[j] = value as u8;
        }
    }

    Ok((shadows, repairs))
}

/// Evaluate the pixel-group polynomial at `x` by Horner's rule, mod 257.
fn eval_poly(coeffs: &[u8], x: u32) -> u32 {
    let mut acc = 0u32;
    for &c in coeffs.iter().rev() {
        acc = (acc * x + u32::from(c)) % PRIME;
    }
    acc
}

/// Decrement the first non-zero coefficient of a group whose polynomial hit
/// 256 at some evaluation point.
///
/// The construction's preprocessing argument promises a zero coefficient
/// exists after whitening; the original scheme nevertheless edits the first
/// NON-zero one, which makes the recovered group differ from the pre-repair
/// one by the applied decrement. That observable behavior is kept here. An
/// all-zero group evaluates to 0 everywhere and never reaches this function.
fn repair_group(group: &mut [u8]) {
    if let Some(c) = group.iter_mut().find(|c| **c != 0) {
        *c -= 1;
    }
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

/// Augmented k×(k+1) Vandermonde system over GF(257), stored as one
/// contiguous buffer.
struct ShareMatrix {
    k: usize,
    cells: Vec<u32>,
}

impl ShareMatrix {
    fn new(k: usize) -> Self {
        Self {
            k,
            cells: vec![0; k * (k + 1)],
        }
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> u32 {
        self.cells[row * (self.k + 1) + col]
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, value: u32) {
        self.cells[row * (self.k + 1) + col] = value;
    }

    /// Load row `j` with the powers of `x` and the shadow pixel for the
    /// current group.
    fn load_row(&mut self, j: usize, x: u16, pixel: u8) {
        let mut power = 1u32;
        for t in 0..self.k {
            self.set(j, t, power);
            power = power * u32::from(x) % PRIME;
        }
        self.set(j, self.k, u32::from(pixel));
    }

    /// Gaussian elimination to reduced row-echelon form; afterwards column k
    /// holds the recovered polynomial coefficients in degree order.
    ///
    /// A zero pivot means the shadow indices were not pairwise distinct mod
    /// 257 (or the inputs are otherwise corrupt) and is fatal.
    fn solve(&mut self) -> Result<()> {
        let k = self.k;

        // Forward elimination, bottom row upward within each column.
        for col in 0..k - 1 {
            for row in (col + 1..k).rev() {
                let pivot = self.at(row - 1, col);
                ensure!(pivot != 0, "zero pivot during elimination: invalid shadow set");
                let alpha = self.at(row, col) * INV[pivot as usize] % PRIME;
                for t in col..=k {
                    let sub = self.at(row - 1, t) * alpha % PRIME;
                    let value = modp(i64::from(self.at(row, t)) - i64::from(sub));
                    self.set(row, t, value);
                }
            }
        }

        // Back-substitution: normalize each pivot to 1 and clear its column.
        for row in (1..k).rev() {
            let pivot = self.at(row, row);
            ensure!(pivot != 0, "zero pivot during back-substitution: invalid shadow set");
            self.set(row, k, self.at(row, k) * INV[pivot as usize] % PRIME);
            self.set(row, row, 1);
            for t in (0..row).rev() {
                let sub = self.at(row, k) * self.at(t, row) % PRIME;
                let value = modp(i64::from(self.at(t, k)) - i64::from(sub));
                self.set(t, k, value);
                self.set(t, row, 0);
            }
        }

        Ok(())
    }
}

/// Rebuild the secret bitmap from `k` shadows.
///
/// Shadow indices must be nonzero and pairwise distinct, and all shadows
/// must agree on the whitening seed; the recovered pixels are un-whitened
/// with that seed before returning.
pub fn reveal_secret(shadows: &[Bitmap], width: u32, height: i32) -> Result<Bitmap> {
    let k = shadows.len();
    ensure!(k >= 2, "need at least 2 shadows, have {k}");

    let seed = shadows[0].seed;
    let per_shadow = shadows[0].pixels.len();
    for (i, shadow) in shadows.iter().enumerate() {
        ensure!(
            shadow.shadow_index != 0,
            "shadow without an index: reserved header slot 2 is zero"
        );
        ensure!(
            shadow.seed == seed,
            "shadows disagree on the whitening seed ({} vs {})",
            shadow.seed,
            seed
        );
        ensure!(
            shadow.pixels.len() == per_shadow,
            "shadow {} has {} pixels, expected {per_shadow}",
            shadow.shadow_index,
            shadow.pixels.len()
        );
        for other in &shadows[..i] {
            ensure!(
                other.shadow_index != shadow.shadow_index,
                "duplicate shadow index {}",
                shadow.shadow_index
            );
        }
    }

    let mut secret = Bitmap::new(width, height, seed);
    ensure!(
        secret.pixels.len() == per_shadow * k,
        "{k} shadows of {per_shadow} pixels cannot fill a {width}x{} secret",
        height.unsigned_abs()
    );

    let mut matrix = ShareMatrix::new(k);
    for p in 0..per_shadow {
        for (j, shadow) in shadows.iter().enumerate() {
            matrix.load_row(j, shadow.shadow_index, shadow.pixels[p]);
        }
        matrix.solve()?;
        for j in 0..k {
            secret.pixels[p * k + j] = matrix.at(j, k) as u8;
        }
    }

    prng::mask_in_place(&mut secret.pixels, seed);
    Ok(secret)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::mask_in_place;

    /// 4x8 secret, 32 pixel bytes, no row padding.
    fn test_secret(seed: u16) -> Bitmap {
        let mut secret = Bitmap::new(4, 8, seed);
        for (i, p) in secret.pixels.iter_mut().enumerate() {
            *p = (i as u8).wrapping_add(10);
        }
        secret
    }

    #[test]
    fn eval_poly_horner() {
        assert_eq!(eval_poly(&[10, 20], 1), 30);
        assert_eq!(eval_poly(&[10, 20], 2), 50);
        assert_eq!(eval_poly(&[255, 255, 255], 3), (255 + 255 * 3 + 255 * 9) % 257);
        assert_eq!(eval_poly(&[0, 0], 5), 0);
    }

    #[test]
    fn two_of_two_roundtrip() {
        let original = test_secret(0).pixels;
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (shadows, repairs) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        assert_eq!(repairs, 0);
        assert_eq!(shadows.len(), 2);
        assert_eq!(shadows[0].pixels.len(), 16);

        let recovered = reveal_secret(&shadows, 4, 8).unwrap();
        assert_eq!(recovered.pixels, original);
        assert_eq!(recovered.seed, 0);
    }

    #[test]
    fn known_two_of_two_shadow_values() {
        // First whitened group with seed 0 is (10^187, 11^212) = (177, 223):
        // shadow 1 gets (177 + 223) mod 257 = 143, shadow 2 gets
        // (177 + 2*223) mod 257 = 109.
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (shadows, _) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        assert_eq!(shadows[0].pixels[0], 143);
        assert_eq!(shadows[1].pixels[0], 109);
    }

    #[test]
    fn shadow_indices_are_distinct_and_sequential() {
        let mut secret = test_secret(691);
        mask_in_place(&mut secret.pixels, 691);
        let (shadows, _) = form_shadows(&mut secret, 2, 4, 691).unwrap();
        let indices: Vec<u16> = shadows.iter().map(|s| s.shadow_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        for shadow in &shadows {
            assert_eq!(shadow.seed, 691);
        }
    }

    #[test]
    fn any_three_of_five_recover_the_same_secret() {
        // 48 pixel bytes (4x12), k = 3: 16-pixel shadows shaped 4x4.
        let mut secret = Bitmap::new(4, 12, 691);
        for (i, p) in secret.pixels.iter_mut().enumerate() {
            *p = ((i * 7 + 3) % 256) as u8;
        }
        let original = secret.pixels.clone();
        mask_in_place(&mut secret.pixels, 691);
        let (shadows, repairs) = form_shadows(&mut secret, 3, 5, 691).unwrap();
        assert_eq!(repairs, 0);

        for combo in [[0usize, 1, 2], [0, 2, 4], [1, 3, 4]] {
            let subset: Vec<Bitmap> = combo.iter().map(|&i| shadows[i].clone()).collect();
            let recovered = reveal_secret(&subset, 4, 12).unwrap();
            assert_eq!(recovered.pixels, original, "combo {combo:?}");
        }
    }

    #[test]
    fn sharing_is_deterministic() {
        let run = || {
            let mut secret = test_secret(7);
            mask_in_place(&mut secret.pixels, 7);
            let (shadows, _) = form_shadows(&mut secret, 2, 3, 7).unwrap();
            shadows
                .into_iter()
                .map(|s| s.to_bytes())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn coefficient_repair_fires_on_evaluation_256() {
        // Group (128, 128) evaluates to 256 at x = 1; the repair decrements
        // the first coefficient to 127, yielding 255 and 126 for the two
        // shadows. Recovery then returns the repaired group, not the input.
        let mut secret = Bitmap::new(4, 8, 0);
        secret.pixels[0] = 128;
        secret.pixels[1] = 128;
        // Remaining groups are (1, 0) and never evaluate to 256.
        for j in 1..16 {
            secret.pixels[2 * j] = 1;
        }

        let (shadows, repairs) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        assert_eq!(repairs, 1);
        assert_eq!(shadows[0].pixels[0], 255);
        assert_eq!(shadows[1].pixels[0], 126);
        // The working buffer now holds the repaired coefficients.
        assert_eq!(&secret.pixels[..2], &[127, 128]);

        let mut recovered = reveal_secret(&shadows, 4, 8).unwrap();
        // Undo the final un-whitening to compare raw coefficients.
        mask_in_place(&mut recovered.pixels, 0);
        assert_eq!(&recovered.pixels[..2], &[127, 128]);
    }

    #[test]
    fn indivisible_pixel_count_rejected() {
        let mut secret = test_secret(0); // 32 pixels
        assert!(form_shadows(&mut secret, 3, 3, 0).is_err());
    }

    #[test]
    fn threshold_bounds_enforced() {
        let mut secret = test_secret(0);
        assert!(form_shadows(&mut secret, 1, 2, 0).is_err());
        assert!(form_shadows(&mut secret, 3, 2, 0).is_err());
    }

    #[test]
    fn duplicate_shadow_index_rejected() {
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (shadows, _) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        let dupes = vec![shadows[0].clone(), shadows[0].clone()];
        let err = reveal_secret(&dupes, 4, 8).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn zero_shadow_index_rejected() {
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (mut shadows, _) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        shadows[0].shadow_index = 0;
        assert!(reveal_secret(&shadows, 4, 8).is_err());
    }

    #[test]
    fn seed_disagreement_rejected() {
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (mut shadows, _) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        shadows[1].seed = 1;
        let err = reveal_secret(&shadows, 4, 8).unwrap_err();
        assert!(err.to_string().contains("seed"));
    }

    #[test]
    fn shadow_size_mismatch_rejected() {
        let mut secret = test_secret(0);
        mask_in_place(&mut secret.pixels, 0);
        let (shadows, _) = form_shadows(&mut secret, 2, 2, 0).unwrap();
        // Wrong target geometry for these shadows.
        assert!(reveal_secret(&shadows, 4, 4).is_err());
    }
}
