use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use orrery_core::consts::FITS_DATE_FIELD;
use orrery_core::io::fits::FitsReader;
use orrery_core::timelapse::parse_obs_date;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = FitsReader::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    println!("HDUs:        {}", reader.hdus().len());
    for (i, hdu) in reader.hdus().iter().enumerate() {
        let kind = hdu.header.get("XTENSION").unwrap_or("PRIMARY");
        let axes: Vec<String> = hdu.axes().iter().map(|a| a.to_string()).collect();
        let shape = if axes.is_empty() {
            "no data".to_string()
        } else {
            axes.join("x")
        };
        println!(
            "  [{i}] {:<10} BITPIX={:<4} {}",
            kind,
            hdu.bitpix().unwrap_or(0),
            shape
        );
    }

    match reader.find_keyword(FITS_DATE_FIELD) {
        Some(value) => {
            let parsed = parse_obs_date(value)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unparseable".to_string());
            println!("{:<13}{} ({})", format!("{FITS_DATE_FIELD}:"), value, parsed);
        }
        None => println!("{:<13}not found", format!("{FITS_DATE_FIELD}:")),
    }

    Ok(())
}
