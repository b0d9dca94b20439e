use datasus_procedures_analysis::{
    chart::{self, Bar, ChartDir, Orientation, Series},
    header,
    measures::{five_year_age_bands, sex_label},
    percent,
    report::{ChartKind, Measure, Ranking},
    row, share,
    stats::Summary,
    subheader, table_with_header, Config, Procedure, Procedures,
};
use itertools::Itertools;
use qu::ick_use::*;
use std::collections::BTreeMap;

fn sex_of(record: &Procedure) -> Option<&'static str> {
    record.sex.as_deref().and_then(sex_label)
}

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("3_demographics"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?;
    let bands = five_year_age_bands();

    header(&format!(
        "Demographic profile of the population served: {}",
        config.home.name
    ));

    subheader("Sex");
    println!("records: {}\n", procedures.len());
    let sexes = Ranking::build(&procedures, sex_of, Procedure::approved, Measure::Count);
    let mut table = table_with_header(&["Sex", "Count", "Percentage"]);
    for entry in sexes.entries() {
        table.add_row(row([
            entry.key.to_string(),
            entry.count.to_string(),
            percent(sexes.share(entry)),
        ]));
    }
    println!("{}", table);
    sexes.render(
        ChartKind::Pie,
        sexes.len(),
        &charts.file("01_sex_distribution.png"),
        "Distribution by sex",
        |label| label.to_string(),
        "Count",
    )?;

    subheader("Age bands (5 years)");
    let counts = five_year_age_bands().bucket_values_with_missing(procedures.iter().map(|p| p.age));
    let banded = procedures.len() - counts.missing();
    let mut table = table_with_header(&["Age band", "Count", "Percentage"]);
    for (label, count) in counts.for_display() {
        table.add_row(row([
            label,
            count.to_string(),
            percent(share(count as f64, banded as f64)),
        ]));
    }
    println!("{}", table);
    let bars: Vec<Bar> = counts
        .for_display()
        .take(bands.len())
        .map(|(label, count)| Bar::new(label, count as f64).with_color(chart::GREEN))
        .collect();
    chart::bar_chart(
        &charts.file("02_age_bands.png"),
        "Distribution by age band (5 years)",
        &bars,
        Orientation::Vertical,
        "Count",
        &[],
    )?;

    subheader("Age statistics");
    let ages: Vec<f64> = procedures.iter().filter_map(|p| p.age).collect();
    if let Some(stats) = Summary::of(&ages) {
        println!("mean:               {:.2} years", stats.mean);
        println!("median:             {:.2} years", stats.median);
        println!("standard deviation: {:.2} years", stats.std_dev);
        println!("minimum:            {:.0} years", stats.min);
        println!("maximum:            {:.0} years", stats.max);
    }
    println!("\nmean age by sex:");
    let ages_by_sex = procedures
        .iter()
        .filter_map(|p| Some((sex_of(p)?, p.age?)))
        .into_group_map();
    for (sex, ages) in ages_by_sex.iter().sorted_by_key(|(sex, _)| **sex) {
        if let Some(stats) = Summary::of(ages) {
            println!("  {}: {:.2} years", sex, stats.mean);
        }
    }

    subheader("Sex by age band");
    let labels: Vec<&'static str> = sexes.entries().iter().map(|e| e.key).collect();
    let mut crosstab: BTreeMap<(usize, &'static str), usize> = BTreeMap::new();
    for record in procedures.iter() {
        let band = record.age.and_then(|a| bands.bucket_of(&a));
        if let (Some(band), Some(sex)) = (band, sex_of(record)) {
            *crosstab.entry((band, sex)).or_default() += 1;
        }
    }
    let mut headers = vec!["Age band"];
    headers.extend(labels.iter().copied());
    let mut table = table_with_header(&headers);
    for idx in 0..bands.len() {
        table.add_row(row(std::iter::once(bands.label(idx)).chain(
            labels.iter().map(|sex| {
                crosstab
                    .get(&(idx, *sex))
                    .copied()
                    .unwrap_or(0)
                    .to_string()
            }),
        )));
    }
    println!("{}", table);
    let series: Vec<Series> = labels
        .iter()
        .map(|sex| {
            Series::new(
                *sex,
                (0..bands.len())
                    .map(|idx| crosstab.get(&(idx, *sex)).copied().unwrap_or(0) as f64)
                    .collect(),
            )
        })
        .collect();
    chart::grouped_bar_chart(
        &charts.file("03_sex_by_age_band.png"),
        "Distribution by sex and age band",
        &bands.labels(),
        &series,
        Orientation::Vertical,
        "Count",
    )?;

    subheader("Predominant groups");
    let top_bands: Vec<(usize, usize)> = counts
        .for_display()
        .take(bands.len())
        .map(|(_, count)| count)
        .enumerate()
        .filter(|(_, count)| *count > 0)
        .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .take(5)
        .collect();
    println!("top 5 age bands:");
    for (rank, (band, count)) in top_bands.iter().enumerate() {
        println!(
            "  {}. {} years: {} ({})",
            rank + 1,
            bands.label(*band),
            count,
            percent(share(*count as f64, procedures.len() as f64))
        );
    }
    println!("\nsex in the predominant age bands:");
    for (band, _) in top_bands.iter().take(3) {
        let in_band: usize = labels
            .iter()
            .map(|sex| crosstab.get(&(*band, *sex)).copied().unwrap_or(0))
            .sum();
        println!("\n  {} years:", bands.label(*band));
        for sex in labels.iter() {
            let count = crosstab.get(&(*band, *sex)).copied().unwrap_or(0);
            if count > 0 {
                println!(
                    "    {}: {} ({})",
                    sex,
                    count,
                    percent(share(count as f64, in_band as f64))
                );
            }
        }
    }
    Ok(())
}
