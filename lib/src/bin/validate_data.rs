use datasus_procedures_analysis::{
    catalog::DiseaseCatalog, frame::Frame, header, validate, Config,
};
use qu::ick_use::*;

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let path = config.clean_path(&config.home);
    let frame = Frame::read_csv(&path)?;

    header(&format!("Dataset profile: {}", config.home.name));
    validate::print_profile(&frame);

    header("Validation");
    let diseases = DiseaseCatalog::load(config.reference_source());
    let report = validate::validate(&frame, &diseases);
    validate::print_details(&frame, &diseases, &report);
    report.print();
    Ok(())
}
