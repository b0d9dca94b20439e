use clap::Parser;
use datasus_procedures_analysis::{config::Municipality, db, header, Config};
use itertools::Itertools;
use qu::ick_use::*;

#[derive(Parser)]
struct Opt {
    /// IBGE code of the municipality to extract. Defaults to the home municipality.
    #[clap(long, short)]
    municipality: Option<String>,
    /// Extract every configured municipality.
    #[clap(long, short)]
    all: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = Config::load()?;
    let targets: Vec<&Municipality> = if opt.all {
        std::iter::once(&config.home)
            .chain(config.comparisons.iter())
            .unique_by(|m| m.code.clone())
            .collect()
    } else if let Some(code) = opt.municipality.as_deref() {
        let municipality = config
            .municipality(code)
            .ok_or_else(|| format_err!("municipality {} is not configured", code))?;
        vec![municipality]
    } else {
        vec![&config.home]
    };

    for municipality in targets {
        header(&format!(
            "Extracting {} ({})",
            municipality.name, municipality.code
        ));
        let extract =
            db::fetch_extract(&config.database, "pars", "pa_ufmun", &municipality.code);
        let frame = match extract {
            Ok(frame) => frame,
            Err(error) => {
                event!(
                    Level::ERROR,
                    "extract for {} failed, nothing written: {:#}",
                    municipality.name,
                    error
                );
                continue;
            }
        };
        println!("rows: {}", frame.len());
        println!("columns: {}", frame.width());
        let path = config.raw_path(municipality);
        frame.write_csv(&path, true)?;
        println!("saved to \"{}\"", path.display());
    }
    Ok(())
}
