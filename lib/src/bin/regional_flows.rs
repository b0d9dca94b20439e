use datasus_procedures_analysis::{
    catalog::{FacilityCatalog, MunicipalityCatalog, MUNICIPALITY_CODE_WIDTH},
    chart::{self, ChartDir},
    columns,
    enrich::normalize_code,
    header, percent,
    report::{ChartKind, Measure, Ranking},
    row, share, subheader, table_with_header, truncate, ArcStr, Config, Procedure, Procedures,
};
use qu::ick_use::*;

const NAME_NOT_FOUND: &str = "name not found";

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("4_regional_flows"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?.with_normalized_codes();
    let source = config.reference_source();
    let municipalities = MunicipalityCatalog::load(source);
    let facilities = FacilityCatalog::load(source);
    let home_code = normalize_code(&config.home.code, MUNICIPALITY_CODE_WIDTH);
    let home = config.home.name.as_str();

    header("Regional flows and access to health services");
    if !procedures.require_column(columns::RESIDENCE, "regional flows") {
        return Ok(());
    }
    let is_home = |record: &Procedure| record.residence_code.as_deref() == Some(home_code.as_str());
    let municipality_name = |code: &ArcStr| {
        municipalities
            .describe(code)
            .unwrap_or(NAME_NOT_FOUND)
            .to_owned()
    };
    let facility_name = |code: &ArcStr| {
        facilities
            .get(code)
            .and_then(|f| f.name())
            .unwrap_or(NAME_NOT_FOUND)
            .to_owned()
    };
    let residence = |record: &Procedure| record.residence_code.clone();

    subheader("Patients' municipality of residence");
    let origins = Ranking::build(&procedures, residence, Procedure::approved, Measure::Count);
    println!("records: {}", procedures.len());
    println!("distinct municipalities: {}\n", origins.len());
    let mut table = table_with_header(&["", "#", "Municipality", "Code", "Count", "Share"]);
    for (idx, entry) in origins.top(20).iter().enumerate() {
        let marker = if *entry.key == *home_code { "*" } else { "" };
        table.add_row(row([
            marker.to_owned(),
            (idx + 1).to_string(),
            truncate(&municipality_name(&entry.key), 30),
            entry.key.to_string(),
            entry.count.to_string(),
            percent(share(entry.count as f64, procedures.len() as f64)),
        ]));
    }
    println!("{}", table);
    println!("* {}", home);

    subheader(&format!("Records by origin ({} vs other municipalities)", home));
    let home_count = procedures.iter().filter(|&r| is_home(r)).count();
    let external_count = procedures.len() - home_count;
    let total = procedures.len() as f64;
    println!(
        "residents of {}: {} ({})",
        home,
        home_count,
        percent(share(home_count as f64, total))
    );
    println!(
        "other municipalities: {} ({})",
        external_count,
        percent(share(external_count as f64, total))
    );
    chart::pie_chart(
        &charts.file("patient_origin.png"),
        "Origin of the patients served",
        &[
            (home.to_owned(), home_count as f64),
            ("Other municipalities".to_owned(), external_count as f64),
        ],
    )?;

    subheader("Most used facilities");
    let by_facility = Ranking::build(
        &procedures,
        |r: &Procedure| r.facility_code.clone(),
        Procedure::approved,
        Measure::Count,
    );
    let mut table = table_with_header(&["#", "Facility", "Count", "Share"]);
    for (idx, entry) in by_facility.top(10).iter().enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            truncate(&facility_name(&entry.key), 50),
            entry.count.to_string(),
            percent(share(entry.count as f64, total)),
        ]));
    }
    println!("{}", table);
    by_facility.render(
        ChartKind::HorizontalBar,
        10,
        &charts.file("top_facilities.png"),
        "Top 10 most used facilities",
        |code: &ArcStr| truncate(&facility_name(code), 40),
        "Records",
    )?;

    subheader("Flow by facility and origin");
    let mut table = table_with_header(&["Facility", home, "Others", "Total"]);
    for entry in by_facility.top(5) {
        let from_home = procedures
            .iter()
            .filter(|&r| r.facility_code.as_ref() == Some(&entry.key) && is_home(r))
            .count();
        table.add_row(row([
            truncate(&facility_name(&entry.key), 50),
            from_home.to_string(),
            (entry.count - from_home).to_string(),
            entry.count.to_string(),
        ]));
    }
    println!("{}", table);

    subheader(&format!("External municipalities using {}", home));
    let external = procedures.filter(|r| !is_home(r));
    let externals = Ranking::build(&external, residence, Procedure::approved, Measure::Count);
    let mut table = table_with_header(&["#", "Municipality", "Code", "Count", "Share of external"]);
    for (idx, entry) in externals.top(15).iter().enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            truncate(&municipality_name(&entry.key), 30),
            entry.key.to_string(),
            entry.count.to_string(),
            percent(share(entry.count as f64, external.len() as f64)),
        ]));
    }
    println!("{}", table);
    externals.render(
        ChartKind::HorizontalBar,
        10,
        &charts.file("top_external_municipalities.png"),
        &format!("Top 10 external municipalities using {}", home),
        |code: &ArcStr| municipality_name(code),
        "Records",
    )?;
    Ok(())
}
