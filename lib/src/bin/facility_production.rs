use datasus_procedures_analysis::{
    catalog::FacilityCatalog,
    chart::{self, Bar, ChartDir, Marker, Orientation, Series},
    columns, header,
    measures::{is_ideal_rate, production_rate, RateBand},
    row,
    stats::Summary,
    subheader, table_with_header, truncate, ArcStr, Config, Procedures,
};
use qu::ick_use::*;
use std::{cmp::Ordering, collections::BTreeMap};

const NAME_NOT_FOUND: &str = "name not found";

/// Quantities billed by one facility.
struct Facility {
    code: ArcStr,
    name: String,
    approved: f64,
    produced: f64,
    rate: Option<f64>,
}

impl Facility {
    fn difference(&self) -> f64 {
        self.produced - self.approved
    }

    fn rate_text(&self) -> String {
        self.rate
            .map(|r| format!("{:.1}%", r))
            .unwrap_or_else(|| "-".into())
    }
}

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("2_facility_production"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?.with_normalized_codes();
    let catalog = FacilityCatalog::load(config.reference_source());

    header(&format!("Production by health facility: {}", config.home.name));
    if !procedures.require_column(columns::APPROVED_QUANTITY, "facility production")
        || !procedures.require_column(columns::PRODUCED_QUANTITY, "facility production")
    {
        return Ok(());
    }

    let mut totals: BTreeMap<ArcStr, (f64, f64)> = BTreeMap::new();
    for record in procedures.iter() {
        let Some(code) = record.facility_code.clone() else {
            continue;
        };
        let total = totals.entry(code).or_insert((0., 0.));
        total.0 += record.approved_quantity.unwrap_or(0.);
        total.1 += record.produced_quantity.unwrap_or(0.);
    }
    let mut facilities: Vec<Facility> = totals
        .into_iter()
        .map(|(code, (approved, produced))| Facility {
            name: catalog
                .get(&code)
                .and_then(|f| f.name())
                .unwrap_or(NAME_NOT_FOUND)
                .to_owned(),
            code,
            approved,
            produced,
            rate: production_rate(approved, produced),
        })
        .collect();
    facilities.sort_by(|a, b| {
        b.produced
            .partial_cmp(&a.produced)
            .unwrap_or(Ordering::Equal)
    });

    subheader("Production ranking");
    println!("facilities: {}\n", facilities.len());
    let mut table = table_with_header(&[
        "#",
        "CNES",
        "Name",
        "Approved",
        "Produced",
        "Rate",
        "Difference",
    ]);
    for (idx, facility) in facilities.iter().take(15).enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            facility.code.to_string(),
            truncate(&facility.name, 45),
            format!("{:.0}", facility.approved),
            format!("{:.0}", facility.produced),
            facility.rate_text(),
            format!("{:.0}", facility.difference()),
        ]));
    }
    println!("{}", table);

    subheader("Approved vs produced");
    let approved: f64 = facilities.iter().map(|f| f.approved).sum();
    let produced: f64 = facilities.iter().map(|f| f.produced).sum();
    println!("approved:   {:.0}", approved);
    println!("produced:   {:.0}", produced);
    match production_rate(approved, produced) {
        Some(rate) => println!("rate:       {:.2}%", rate),
        None => println!("rate:       undefined (nothing approved)"),
    }
    println!("difference: {:.0}", produced - approved);

    subheader("Production rates");
    let rates: Vec<f64> = facilities.iter().filter_map(|f| f.rate).collect();
    let summary = Summary::of(&rates);
    if let Some(summary) = summary {
        println!("mean:   {:.2}%", summary.mean);
        println!("median: {:.2}%", summary.median);
    }
    for (band, title) in [
        (RateBand::Under, "Facilities with rate < 80%"),
        (RateBand::Over, "Facilities with rate > 100%"),
    ] {
        let matching: Vec<&Facility> = facilities
            .iter()
            .filter(|f| f.rate.map_or(false, |r| RateBand::of(r) == band))
            .collect();
        if matching.is_empty() {
            continue;
        }
        println!("\n{} ({}):", title, matching.len());
        let mut table =
            table_with_header(&["Name", "Rate", "Approved", "Produced", "Difference"]);
        for facility in matching.iter().take(10) {
            table.add_row(row([
                truncate(&facility.name, 45),
                facility.rate_text(),
                format!("{:.0}", facility.approved),
                format!("{:.0}", facility.produced),
                format!("{:.0}", facility.difference()),
            ]));
        }
        println!("{}", table);
    }
    let ideal = rates.iter().filter(|r| is_ideal_rate(**r)).count();
    println!("\nfacilities with an ideal rate (90-110%): {}", ideal);

    let top: Vec<&Facility> = facilities.iter().take(15).collect();
    let labels: Vec<String> = top.iter().map(|f| truncate(&f.name, 35)).collect();
    chart::grouped_bar_chart(
        &charts.file("production_ranking.png"),
        "Top 15 facilities: approved vs produced",
        &labels,
        &[
            Series::new("Approved", top.iter().map(|f| f.approved).collect()),
            Series::new("Produced", top.iter().map(|f| f.produced).collect()),
        ],
        Orientation::Horizontal,
        "Quantity",
    )?;

    let bars: Vec<Bar> = top
        .iter()
        .zip(labels)
        .map(|(facility, label)| {
            let rate = facility.rate.unwrap_or(0.);
            let color = if is_ideal_rate(rate) {
                chart::GREEN
            } else if rate >= 80. {
                chart::ORANGE
            } else {
                chart::RED
            };
            Bar::new(label, rate).with_color(color)
        })
        .collect();
    let mut markers = vec![Marker::new("Target 100%", 100., chart::PALETTE[0])];
    if let Some(summary) = summary {
        markers.push(Marker::new(
            format!("Mean ({:.1}%)", summary.mean),
            summary.mean,
            chart::PALETTE[4],
        ));
    }
    chart::bar_chart(
        &charts.file("production_rate.png"),
        "Production rate of the top 15 facilities",
        &bars,
        Orientation::Horizontal,
        "Production rate (%)",
        &markers,
    )?;
    Ok(())
}
