use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dexdecode::file::{DexFileContainer, VerifyPreset};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Verify {
    None,
    Checksum,
    All,
}

impl From<Verify> for VerifyPreset {
    fn from(value: Verify) -> Self {
        match value {
            Verify::None => VerifyPreset::None,
            Verify::Checksum => VerifyPreset::ChecksumOnly,
            Verify::All => VerifyPreset::All,
        }
    }
}

/// Decode a DEX file and print its contents.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the .dex file
    file: PathBuf,

    /// Print the decoded document as JSON
    #[arg(long)]
    json: bool,

    /// Only print the map table
    #[arg(long, conflicts_with = "json")]
    map: bool,

    /// Header checks to run before decoding sections
    #[arg(long, value_enum, default_value_t = Verify::None)]
    verify: Verify,

    /// Maximum nesting of encoded arrays and annotations
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Only dump the class definition at this index
    #[arg(long, conflicts_with_all = ["json", "map"])]
    class: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let container = DexFileContainer::from_path(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?
        .verify(args.verify.into())
        .max_value_depth(args.max_depth);
    let dex = container
        .open()
        .with_context(|| format!("failed to decode {}", args.file.display()))?;
    log::info!(
        "{}: {} map entries, {} diagnostic(s)",
        dex.get_location(),
        dex.map().len(),
        dex.diagnostics().len()
    );

    let out = if args.json {
        serde_json::to_string_pretty(&dex)?
    } else if args.map {
        dex.map_table().to_string()
    } else {
        let mut out = String::new();
        match args.class {
            Some(idx) => dex.dump_class(&mut out, idx)?,
            None => dex.dump(&mut out)?,
        }
        out
    };
    println!("{out}");
    Ok(())
}
