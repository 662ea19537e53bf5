//! Directory scanning for carrier and stego candidates.
//!
//! Candidates are probed header-only and collected in sorted path order, so
//! a fixed carrier set always yields the same shadow assignment and
//! byte-identical outputs. Files that fail the probe are skipped; only a
//! shortfall of qualifying files is fatal.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bmp::{self, Probe};

/// All regular files in `dir`, sorted by path.
pub fn regular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("{:?} is not a directory", dir);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read directory {:?}", dir))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            path.is_file().then_some(path)
        })
        .collect();

    paths.sort();
    Ok(paths)
}

/// Count of regular files in `dir` — the default for the total shadow count.
pub fn count_regular_files(dir: &Path) -> Result<usize> {
    Ok(regular_files(dir)?.len())
}

/// Select up to `n` carriers able to conceal a `shadow_len`-pixel shadow:
/// valid 8-bit uncompressed BMPs whose pixel count is divisible by `k` and
/// holds at least 8 carrier pixels per shadow pixel.
pub fn collect_carriers(dir: &Path, k: u16, n: u16, shadow_len: u32) -> Result<Vec<PathBuf>> {
    let mut found = Vec::with_capacity(n as usize);
    for path in regular_files(dir)? {
        if found.len() == n as usize {
            break;
        }
        let Ok(probe) = bmp::probe(&path) else { continue };
        if carrier_ok(&probe, k, shadow_len) {
            found.push(path);
        }
    }
    if found.len() < n as usize {
        bail!(
            "not enough carrier bitmaps for a ({k},{n}) scheme in {:?}: found {}",
            dir,
            found.len()
        );
    }
    Ok(found)
}

fn carrier_ok(probe: &Probe, k: u16, shadow_len: u32) -> bool {
    probe.is_greyscale8()
        && probe.pixel_count() % u64::from(k) == 0
        && probe.pixel_count() >= u64::from(shadow_len) * 8
}

/// Select the first `k` stego bitmaps hiding a shadow of a
/// `secret_pixels`-pixel secret: valid 8-bit BMPs with a nonzero shadow
/// index and enough pixels to have held the embedding.
pub fn collect_stego(dir: &Path, k: u16, secret_pixels: u64) -> Result<Vec<PathBuf>> {
    let needed = secret_pixels * 8 / u64::from(k);
    let mut found = Vec::with_capacity(k as usize);
    for path in regular_files(dir)? {
        if found.len() == k as usize {
            break;
        }
        let Ok(probe) = bmp::probe(&path) else { continue };
        if probe.is_greyscale8() && probe.shadow_index != 0 && probe.pixel_count() >= needed {
            found.push(path);
        }
    }
    if found.len() < k as usize {
        bail!(
            "not enough stego bitmaps in {:?}: need {k}, found {}",
            dir,
            found.len()
        );
    }
    Ok(found)
}
