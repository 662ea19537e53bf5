mod bmp;
mod cmd;
mod gf257;
mod io;
mod prng;
mod sss;
mod stego;

use clap::Parser;

fn main() {
    let cli = cmd::Cli::parse();
    if let Err(err) = cmd::run(cli) {
        eprintln!("stegoshare: {err:#}");
        std::process::exit(1);
    }
}
