use datasus_procedures_analysis::{
    catalog::{ProcedureCatalog, TimeDimension},
    chart::{self, ChartDir, Marker, Series},
    describe,
    enrich::{recent_windows, with_competence, Competence},
    header, percent,
    report::{last_n, monthly, ChartKind, Measure, Ranking},
    row, stats, subheader, table_with_header, ArcStr, Config, Procedure, Procedures,
};
use qu::ick_use::*;
use std::collections::BTreeMap;

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("1_procedure_volume"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?.with_normalized_codes();
    let source = config.reference_source();
    let catalog = ProcedureCatalog::load(source);
    let time = TimeDimension::load(source);

    header(&format!("Procedure volume and profile: {}", config.home.name));

    subheader("Volume");
    let dated = with_competence(&procedures);
    let windows = recent_windows(&dated, |(competence, _): &(Competence, &Procedure)| {
        competence.date
    });
    if let (Some(windows), Some(first)) = (&windows, dated.iter().map(|(c, _)| c.date).min()) {
        println!(
            "period: {} to {}\n",
            first.format("%d-%m-%Y"),
            windows.latest.format("%d-%m-%Y")
        );
        println!("last month:   {:>10} procedures", windows.last_30.len());
        println!("last quarter: {:>10} procedures", windows.last_90.len());
        println!("last year:    {:>10} procedures", windows.last_365.len());
        println!(
            "(windows drawn from the {} records with a valid competence)",
            windows.dated
        );
    } else {
        println!("no records with a valid competence");
    }
    println!("total:        {:>10} procedures (all records)", procedures.len());

    subheader("Procedures");
    let ranking = Ranking::build(
        &procedures,
        |p: &Procedure| p.procedure_code.clone(),
        Procedure::approved,
        Measure::Count,
    );
    println!("distinct procedures: {}\n", ranking.len());
    let mut table = table_with_header(&["#", "Procedure", "Count", "Share of all", "Description"]);
    for (idx, entry) in ranking.top(15).iter().enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            entry.key.to_string(),
            entry.count.to_string(),
            percent(ranking.share(entry)),
            describe(catalog.describe(&entry.key), 55),
        ]));
    }
    println!("{}", table);
    ranking.render(
        ChartKind::HorizontalBar,
        15,
        &charts.file("top_procedures.png"),
        &format!("Top 15 ambulatory procedures in {}", config.home.name),
        |code: &ArcStr| format!("{} - {}", code, describe(catalog.describe(code), 50)),
        "Count",
    )?;

    subheader("Monthly evolution (last 12 months)");
    let months = monthly(&procedures);
    let mut table = table_with_header(&["Month", "Procedures"]);
    for month in last_n(&months, 12) {
        table.add_row(row([
            time.month_label(month.year_month),
            month.count.to_string(),
        ]));
    }
    println!("{}", table);

    subheader("Quarterly evolution (last 8 quarters)");
    let mut quarters: BTreeMap<(u32, u32), (String, usize)> = BTreeMap::new();
    for month in months.iter() {
        let key = (month.year_month / 100, (month.year_month % 100 + 2) / 3);
        let quarter = quarters
            .entry(key)
            .or_insert_with(|| (time.quarter_label(month.year_month), 0));
        quarter.1 += month.count;
    }
    let quarters: Vec<_> = quarters.into_values().collect();
    let mut table = table_with_header(&["Quarter", "Procedures"]);
    for (label, count) in last_n(&quarters, 8) {
        table.add_row(row([label.clone(), count.to_string()]));
    }
    println!("{}", table);

    subheader("Peaks and troughs in demand");
    let series: Vec<(u32, f64)> = months
        .iter()
        .map(|m| (m.year_month, m.count as f64))
        .collect();
    let Some(analysis) = stats::peaks_and_troughs(&series, 1.) else {
        println!("no monthly data");
        return Ok(());
    };
    println!("monthly mean: {:.0} procedures", analysis.mean);
    println!("standard deviation: {:.0} procedures", analysis.std_dev);
    if !analysis.peaks.is_empty() {
        println!("\npeaks (above mean + 1 std):");
        for (ym, count) in analysis.peaks.iter() {
            println!(
                "  {}: {:>8} ({:+.1}%)",
                time.month_label(*ym),
                count,
                analysis.deviation(*count)
            );
        }
    }
    if !analysis.troughs.is_empty() {
        println!("\ntroughs (below mean - 1 std):");
        for (ym, count) in analysis.troughs.iter() {
            println!(
                "  {}: {:>8} ({:+.1}%)",
                time.month_label(*ym),
                count,
                analysis.deviation(*count)
            );
        }
    }

    let labels: Vec<String> = months
        .iter()
        .map(|m| time.month_label(m.year_month))
        .collect();
    chart::line_chart(
        &charts.file("monthly_evolution.png"),
        "Monthly evolution of ambulatory procedures",
        &labels,
        &[Series::new(
            "Procedures",
            series.iter().map(|(_, v)| *v).collect(),
        )],
        &[
            Marker::new("Mean", analysis.mean, chart::RED),
            Marker::new(
                "Mean + 1 std",
                analysis.mean + analysis.std_dev,
                chart::ORANGE,
            ),
            Marker::new(
                "Mean - 1 std",
                analysis.mean - analysis.std_dev,
                chart::ORANGE,
            ),
        ],
        "Procedures",
    )?;
    Ok(())
}
