//! CLI argument surface and the distribute / recover pipelines.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::bmp::Bitmap;
use crate::io;
use crate::prng;
use crate::sss;
use crate::stego;

/// Whitening seed used when none is given on the command line.
pub const DEFAULT_SEED: u16 = 691;

/// Shadow indices ride a 16-bit header slot but serve as evaluation points
/// mod 257, so more than 255 shadows would alias and break reconstruction.
const MAX_SHADOWS: u16 = 255;

/// Split a greyscale BMP into steganographically hidden shadow images, or
/// rebuild it from them.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_flag = true)]
pub struct Cli {
    /// Distribute: split --secret into n shadows hidden in carrier bitmaps
    #[arg(short = 'd')]
    pub distribute: bool,

    /// Recover: rebuild --secret from k hidden shadows
    #[arg(short = 'r')]
    pub recover: bool,

    /// Secret image to split (-d) or output path for the rebuilt image (-r)
    #[arg(long)]
    pub secret: PathBuf,

    /// Threshold K — shadows required to reconstruct the secret
    #[arg(short = 'k')]
    pub threshold: u16,

    /// Total shadows N to produce (-d only; defaults to the file count in --dir)
    #[arg(short = 'n')]
    pub num_shadows: Option<u16>,

    /// Secret image width (required with -r; checked against the secret with -d)
    #[arg(short = 'w')]
    pub width: Option<u32>,

    /// Secret image height (required with -r; checked against the secret with -d)
    #[arg(short = 'h')]
    pub height: Option<i32>,

    /// 16-bit whitening seed
    #[arg(short = 's', default_value_t = DEFAULT_SEED)]
    pub seed: u16,

    /// Directory holding carrier (-d) or stego (-r) bitmaps
    #[arg(long, default_value = "./")]
    pub dir: PathBuf,

    /// Print help (the short flag is taken by height)
    #[arg(long, action = ArgAction::Help, value_parser = clap::value_parser!(bool))]
    pub help: Option<bool>,
}

pub fn run(cli: Cli) -> Result<()> {
    if cli.distribute == cli.recover {
        bail!("choose exactly one of -d (distribute) and -r (recover)");
    }
    if cli.threshold < 2 {
        bail!("threshold k must be at least 2, was {}", cli.threshold);
    }

    if cli.distribute {
        distribute(&cli)
    } else {
        recover(&cli)
    }
}

// ---------------------------------------------------------------------------
// Distribute
// ---------------------------------------------------------------------------

fn distribute(cli: &Cli) -> Result<()> {
    let mut secret = Bitmap::from_file(&cli.secret)?;
    eprintln!(
        "distribute: read secret {:?} ({}x{}, {} pixel bytes)",
        cli.secret,
        secret.width,
        secret.height.unsigned_abs(),
        secret.pixels.len()
    );

    // Optional geometry cross-check: -w/-h must agree with the header.
    if let (Some(width), Some(height)) = (cli.width, cli.height) {
        if width != secret.width || height.unsigned_abs() != secret.height.unsigned_abs() {
            bail!(
                "-w/-h ({}x{}) do not match the secret image ({}x{})",
                width,
                height.unsigned_abs(),
                secret.width,
                secret.height.unsigned_abs()
            );
        }
    }

    let k = cli.threshold;
    let n = match cli.num_shadows {
        Some(n) => n,
        None => {
            let count = io::count_regular_files(&cli.dir)?;
            u16::try_from(count)
                .map_err(|_| anyhow::anyhow!("{count} files in {:?} exceed the shadow limit", cli.dir))?
        }
    };
    if n < 2 || k > n {
        bail!("k and n must satisfy 2 <= k <= n (k = {k}, n = {n})");
    }
    if n > MAX_SHADOWS {
        bail!("at most {MAX_SHADOWS} shadows are supported, asked for {n}");
    }

    let len = secret.pixels.len();
    if len % k as usize != 0 {
        bail!("secret pixel count {len} is not divisible by k = {k}");
    }
    let shadow_len = (len / k as usize) as u32;

    let carriers = io::collect_carriers(&cli.dir, k, n, shadow_len)?;
    eprintln!(
        "distribute: selected {} carrier(s) from {:?}",
        carriers.len(),
        cli.dir
    );

    prng::mask_in_place(&mut secret.pixels, cli.seed);
    let (shadows, repairs) = sss::form_shadows(&mut secret, k, n, cli.seed)?;
    secret.pixels.zeroize();
    if repairs > 0 {
        eprintln!(
            "distribute: warning: coefficient repair fired {repairs} time(s); \
             the recovered image will differ from the original by the applied decrements"
        );
    }

    for (shadow, carrier_path) in shadows.iter().zip(&carriers) {
        let mut carrier = Bitmap::from_file(carrier_path)?;
        stego::embed(&mut carrier, shadow)
            .with_context(|| format!("embed shadow {} in {:?}", shadow.shadow_index, carrier_path))?;
        let out = format!("shadow{}.bmp", shadow.shadow_index);
        carrier.to_file(Path::new(&out))?;
        eprintln!(
            "distribute: hid shadow {} from {:?} in {out}",
            shadow.shadow_index, carrier_path
        );
    }
    eprintln!("distribute: wrote {} shadow file(s)", shadows.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Recover
// ---------------------------------------------------------------------------

fn recover(cli: &Cli) -> Result<()> {
    let (Some(width), Some(height)) = (cli.width, cli.height) else {
        bail!("-r needs the secret dimensions: specify a positive -w and -h");
    };
    if width == 0 || height == 0 {
        bail!("-w and -h must be nonzero");
    }

    let k = cli.threshold;
    let secret_pixels = u64::from(width) * u64::from(height.unsigned_abs());
    let paths = io::collect_stego(&cli.dir, k, secret_pixels)?;
    eprintln!("recover: using {} stego file(s) from {:?}", paths.len(), cli.dir);

    let mut shadows = Vec::with_capacity(paths.len());
    for path in &paths {
        let carrier = Bitmap::from_file(path)?;
        let shadow = stego::extract(&carrier, width, height, k)
            .with_context(|| format!("extract shadow from {:?}", path))?;
        eprintln!("recover: extracted shadow {} from {:?}", shadow.shadow_index, path);
        shadows.push(shadow);
    }

    let secret = sss::reveal_secret(&shadows, width, height)?;
    secret.to_file(&cli.secret)?;
    eprintln!("recover: wrote secret image {:?}", cli.secret);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
