use clap::Parser;
use datasus_procedures_analysis::{clean, frame::Frame, header, Config};
use qu::ick_use::*;
use std::path::PathBuf;

#[derive(Parser)]
struct Opt {
    /// IBGE code of the municipality to clean. Defaults to the home municipality.
    #[clap(long, short)]
    municipality: Option<String>,
    /// Read the raw extract from here instead of the configured file.
    #[clap(long, short)]
    input: Option<PathBuf>,
    /// Write the cleaned dataset here instead of the configured file.
    #[clap(long, short)]
    output: Option<PathBuf>,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load()?;
    let municipality = match opt.municipality.as_deref() {
        Some(code) => config
            .municipality(code)
            .ok_or_else(|| format_err!("municipality {} is not configured", code))?,
        None => &config.home,
    };
    let input = opt.input.unwrap_or_else(|| config.raw_path(municipality));
    let output = opt.output.unwrap_or_else(|| config.clean_path(municipality));

    header(&format!("Cleaning {} ({})", municipality.name, municipality.code));
    let raw = Frame::read_csv(&input)?;
    println!("input: \"{}\"", input.display());
    println!("rows: {}", raw.len());
    println!("columns: {}", raw.width());

    let (cleaned, report) = clean::clean(raw, config.target_year)?;
    report.print();

    cleaned.write_csv(&output, false)?;
    println!("\nsaved cleaned data to \"{}\"", output.display());
    Ok(())
}
