use datasus_procedures_analysis::{
    areas::{self, CARDIOLOGY, ONCOLOGY, OTHER_SPECIALTY},
    catalog::ProcedureCatalog,
    chart::{self, Bar, ChartDir, Orientation, Series},
    config::Municipality,
    enrich::{competence_label, with_competence},
    header,
    measures::{broad_age_bands, elderly_share, Growth, ELDERLY_AGE},
    money, percent,
    report::{monthly, Month},
    row, share,
    stats::Summary,
    subheader, table_with_header, Config, Procedures,
};
use itertools::Itertools;
use qu::ick_use::*;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

/// One municipality's cleaned records.
struct Dataset<'a> {
    municipality: &'a Municipality,
    procedures: Procedures,
    months: Vec<Month>,
}

impl Dataset<'_> {
    fn name(&self) -> &str {
        &self.municipality.name
    }

    fn monthly_counts(&self) -> Vec<(u32, f64)> {
        self.months
            .iter()
            .map(|m| (m.year_month, m.count as f64))
            .collect()
    }

    /// Approved value per procedure.
    fn average_value(&self) -> f64 {
        if self.procedures.is_empty() {
            0.
        } else {
            self.procedures.total_approved() / self.procedures.len() as f64
        }
    }

    fn ages(&self) -> Vec<f64> {
        self.procedures.iter().filter_map(|p| p.age).collect()
    }
}

/// Values of `series` at each of `keys`, 0 where the series has no point.
fn align(keys: &[u32], series: &[(u32, f64)]) -> Vec<f64> {
    let by_key: BTreeMap<u32, f64> = series.iter().copied().collect();
    keys.iter()
        .map(|k| by_key.get(k).copied().unwrap_or(0.))
        .collect()
}

fn by_value_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("7_municipality_comparison"))?;
    let catalog = ProcedureCatalog::load(config.reference_source());
    let mut datasets = vec![];
    for municipality in config.comparisons.iter() {
        let procedures = Procedures::load(config.clean_path(municipality))?.with_normalized_codes();
        let months = monthly(&procedures);
        datasets.push(Dataset {
            municipality,
            procedures,
            months,
        });
    }
    ensure!(!datasets.is_empty(), "no municipalities configured for comparison");

    header(&format!(
        "Regional comparison and trends: {}",
        datasets.iter().map(|d| d.name()).join(", ")
    ));
    let names: Vec<String> = datasets.iter().map(|d| d.name().to_owned()).collect();

    subheader("Procedure volume");
    let all_records: usize = datasets.iter().map(|d| d.procedures.len()).sum();
    let by_volume: Vec<&Dataset> = datasets
        .iter()
        .sorted_by(|a, b| b.procedures.len().cmp(&a.procedures.len()))
        .collect();
    let mut table = table_with_header(&["Municipality", "Procedures", "Share"]);
    for dataset in by_volume.iter() {
        table.add_row(row([
            dataset.name().to_owned(),
            dataset.procedures.len().to_string(),
            percent(share(dataset.procedures.len() as f64, all_records as f64)),
        ]));
    }
    println!("{}", table);
    let bars: Vec<Bar> = by_volume
        .iter()
        .map(|d| Bar::new(d.name(), d.procedures.len() as f64))
        .collect();
    chart::bar_chart(
        &charts.file("01_volume.png"),
        "Total procedures per municipality",
        &bars,
        Orientation::Vertical,
        "Count",
        &[],
    )?;

    subheader("Monthly evolution");
    let competences: Vec<u32> = datasets
        .iter()
        .flat_map(|d| d.months.iter().map(|m| m.year_month))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let competence_labels: Vec<String> =
        competences.iter().map(|c| competence_label(*c)).collect();
    println!("mean procedures per month:");
    for dataset in datasets.iter() {
        let counts: Vec<f64> = dataset.months.iter().map(|m| m.count as f64).collect();
        if let Some(stats) = Summary::of(&counts) {
            println!("  {:<15} {:>10.0}", dataset.name(), stats.mean);
        }
    }
    chart::line_chart(
        &charts.file("02_monthly_evolution.png"),
        "Monthly procedures per municipality",
        &competence_labels,
        &datasets
            .iter()
            .map(|d| Series::new(d.name(), align(&competences, &d.monthly_counts())))
            .collect::<Vec<_>>(),
        &[],
        "Procedures",
    )?;

    subheader("Growth (first vs last competence)");
    let mut growths = vec![];
    for dataset in datasets.iter() {
        println!("\n  {}:", dataset.name());
        match Growth::of_series(&dataset.monthly_counts()) {
            Some(growth) => {
                println!("    first competence: {:.0} procedures", growth.first);
                println!("    last competence:  {:.0} procedures", growth.last);
                println!(
                    "    growth:           {:+.0} ({:+.2}%)",
                    growth.absolute, growth.percent
                );
                growths.push((dataset.name(), growth));
            }
            None => println!("    needs at least 2 competences"),
        }
    }

    subheader("Financial values");
    let by_value: Vec<&Dataset> = datasets
        .iter()
        .sorted_by(|a, b| {
            by_value_desc(a.procedures.total_approved(), b.procedures.total_approved())
        })
        .collect();
    let mut table =
        table_with_header(&["Municipality", "Approved", "Produced", "Average/procedure"]);
    for dataset in by_value.iter() {
        table.add_row(row([
            dataset.name().to_owned(),
            money(dataset.procedures.total_approved()),
            money(dataset.procedures.total_produced()),
            money(dataset.average_value()),
        ]));
    }
    println!("{}", table);
    chart::grouped_bar_chart(
        &charts.file("03_financial_values.png"),
        "Financial values per municipality",
        &by_value.iter().map(|d| d.name().to_owned()).collect::<Vec<_>>(),
        &[
            Series::new(
                "Approved",
                by_value
                    .iter()
                    .map(|d| d.procedures.total_approved())
                    .collect(),
            ),
            Series::new(
                "Produced",
                by_value
                    .iter()
                    .map(|d| d.procedures.total_produced())
                    .collect(),
            ),
        ],
        Orientation::Horizontal,
        "Value (R$)",
    )?;

    subheader("Age profile");
    let mut age_stats = vec![];
    let mut table = table_with_header(&["Municipality", "Mean age", "Median", "Std dev"]);
    for dataset in datasets.iter() {
        if let Some(stats) = Summary::of(&dataset.ages()) {
            table.add_row(row([
                dataset.name().to_owned(),
                format!("{:.2}", stats.mean),
                format!("{:.1}", stats.median),
                format!("{:.2}", stats.std_dev),
            ]));
            age_stats.push((dataset.name(), stats));
        }
    }
    println!("{}", table);
    let band_labels = broad_age_bands().labels();
    let mut band_series = vec![];
    println!("broad age bands:");
    for dataset in datasets.iter() {
        let ages = dataset.ages();
        let counts = broad_age_bands().bucket_values(ages.iter());
        let total = counts.total();
        println!("\n  {}:", dataset.name());
        for (label, count) in counts.labelled() {
            println!(
                "    {:<6} {:>7} ({})",
                label,
                count,
                percent(share(count as f64, total as f64))
            );
        }
        band_series.push(Series::new(
            dataset.name(),
            counts.labelled().map(|(_, c)| c as f64).collect(),
        ));
    }
    chart::grouped_bar_chart(
        &charts.file("04_age_profile.png"),
        "Broad age bands per municipality",
        &band_labels,
        &band_series,
        Orientation::Vertical,
        "Count",
    )?;

    subheader("Specialized areas");
    let specialties = [CARDIOLOGY.name, ONCOLOGY.name, OTHER_SPECIALTY];
    let mut specialty_counts: Vec<BTreeMap<&'static str, usize>> = vec![];
    for dataset in datasets.iter() {
        let counts = dataset
            .procedures
            .iter()
            .map(|p| {
                areas::specialty(
                    p.procedure_code
                        .as_deref()
                        .and_then(|code| catalog.describe(code)),
                )
            })
            .counts()
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        println!("\n  {}:", dataset.name());
        for specialty in specialties {
            let count = counts.get(specialty).copied().unwrap_or(0);
            if count > 0 {
                println!(
                    "    {:<15} {:>7} ({})",
                    specialty,
                    count,
                    percent(share(count as f64, dataset.procedures.len() as f64))
                );
            }
        }
        specialty_counts.push(counts);
    }
    chart::grouped_bar_chart(
        &charts.file("05_specialized_areas.png"),
        "Specialized procedures per municipality",
        &names,
        &[CARDIOLOGY.name, ONCOLOGY.name]
            .into_iter()
            .map(|specialty| {
                Series::new(
                    specialty,
                    specialty_counts
                        .iter()
                        .map(|c| c.get(specialty).copied().unwrap_or(0) as f64)
                        .collect(),
                )
            })
            .collect::<Vec<_>>(),
        Orientation::Vertical,
        "Count",
    )?;

    subheader(&format!("Ageing trend (patients aged {}+)", ELDERLY_AGE));
    let mut aging_series = vec![];
    for dataset in datasets.iter() {
        let records = with_competence(&dataset.procedures);
        let shares = elderly_share(&records);
        let values: Vec<f64> = shares.iter().map(|(_, s)| *s).collect();
        if let (Some(stats), Some(first), Some(last)) =
            (Summary::of(&values), values.first(), values.last())
        {
            println!("\n  {}:", dataset.name());
            println!("    mean share:        {:.2}%", stats.mean);
            println!("    first competence:  {:.2}%", first);
            println!("    last competence:   {:.2}%", last);
            println!("    variation:         {:+.2} percentage points", last - first);
        }
        aging_series.push(Series::new(dataset.name(), align(&competences, &shares)));
    }
    chart::line_chart(
        &charts.file("06_ageing_trend.png"),
        "Share of procedures for elderly patients",
        &competence_labels,
        &aging_series,
        &[],
        "Share (%)",
    )?;

    subheader("Conclusions");
    if let Some(leader) = by_volume.first() {
        println!(
            "1. volume: {} leads with {} procedures",
            leader.name(),
            leader.procedures.len()
        );
    }
    println!("2. growth:");
    for (name, growth) in growths
        .iter()
        .sorted_by(|a, b| by_value_desc(a.1.percent, b.1.percent))
    {
        let direction = if growth.percent > 0. { "up" } else { "down" };
        println!("   {} {}: {:+.2}%", direction, name, growth.percent);
    }
    if let Some(richest) = by_value.first() {
        println!(
            "3. financial: {} has the largest approved value, {}",
            richest.name(),
            money(richest.procedures.total_approved())
        );
    }
    println!("4. age profile:");
    for (name, stats) in age_stats.iter() {
        println!("   {}: mean age {:.1} years", name, stats.mean);
    }
    if let Some((oldest, _)) = age_stats
        .iter()
        .max_by(|a, b| a.1.mean.partial_cmp(&b.1.mean).unwrap_or(Ordering::Equal))
    {
        println!("   {} serves the oldest population", oldest);
    }
    Ok(())
}
