use datasus_procedures_analysis::{
    catalog::ProcedureCatalog,
    chart::{self, Bar, ChartDir, Marker, Orientation, Series},
    describe,
    enrich::competence_label,
    header,
    measures::{value_bands, verdict},
    money, percent,
    report::{monthly, ChartKind, Measure, Ranking},
    row, share, subheader, table_with_header, ArcStr, Config, Procedure, Procedures,
};
use qu::ick_use::*;

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("5_financial_resources"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?.with_normalized_codes();
    let catalog = ProcedureCatalog::load(config.reference_source());

    header("Financial resources");

    subheader("Total approved vs produced value");
    let approved = procedures.total_approved();
    let produced = procedures.total_produced();
    let difference = produced - approved;
    println!("records: {}\n", procedures.len());
    println!("approved (SUS): {}", money(approved));
    println!("produced:       {}", money(produced));
    println!("difference:     {}", money(difference));
    println!("difference %:   {:+.2}%", share(difference, approved));
    println!("\n{} by {}", verdict(approved, produced), money(difference.abs()));
    chart::bar_chart(
        &charts.file("01_total_values.png"),
        "Total values: approved vs produced",
        &[Bar::new("Approved", approved), Bar::new("Produced", produced)],
        Orientation::Vertical,
        "Value (R$)",
        &[],
    )?;

    subheader("Monthly evolution of values");
    let months = monthly(&procedures);
    let mut table = table_with_header(&[
        "Competence",
        "Approved",
        "Produced",
        "Difference",
        "%",
        "Procedures",
    ]);
    for month in months.iter() {
        table.add_row(row([
            competence_label(month.year_month),
            money(month.approved),
            money(month.produced),
            money(month.difference()),
            percent(share(month.difference(), month.approved)),
            month.count.to_string(),
        ]));
    }
    println!("{}", table);
    let labels: Vec<String> = months
        .iter()
        .map(|m| competence_label(m.year_month))
        .collect();
    chart::line_chart(
        &charts.file("02_value_evolution.png"),
        "Monthly values: approved vs produced",
        &labels,
        &[
            Series::new("Approved", months.iter().map(|m| m.approved).collect()),
            Series::new("Produced", months.iter().map(|m| m.produced).collect()),
        ],
        &[],
        "Value (R$)",
    )?;

    subheader("Average cost per procedure");
    let average = |total: f64, count: usize| {
        if count == 0 {
            0.
        } else {
            total / count as f64
        }
    };
    let mut table = table_with_header(&["Competence", "Average approved", "Average produced"]);
    for month in months.iter() {
        table.add_row(row([
            competence_label(month.year_month),
            money(month.average_cost()),
            money(average(month.produced, month.count)),
        ]));
    }
    println!("{}", table);
    let overall_approved = average(approved, procedures.len());
    let overall_produced = average(produced, procedures.len());
    println!("overall average per procedure:");
    println!("  approved: {}", money(overall_approved));
    println!("  produced: {}", money(overall_produced));
    chart::line_chart(
        &charts.file("03_average_cost.png"),
        "Average cost per procedure",
        &labels,
        &[
            Series::new(
                "Average approved",
                months.iter().map(|m| m.average_cost()).collect(),
            ),
            Series::new(
                "Average produced",
                months.iter().map(|m| average(m.produced, m.count)).collect(),
            ),
        ],
        &[
            Marker::new("Overall approved", overall_approved, chart::PALETTE[0]),
            Marker::new("Overall produced", overall_produced, chart::GREEN),
        ],
        "Average cost (R$)",
    )?;

    subheader("Top 10 procedures by approved value");
    let costs = Ranking::build(
        &procedures,
        |p: &Procedure| p.procedure_code.clone(),
        Procedure::approved,
        Measure::Total,
    );
    let mut table = table_with_header(&[
        "#",
        "Procedure",
        "Description",
        "Total approved",
        "Count",
        "Average cost",
    ]);
    for (idx, entry) in costs.top(10).iter().enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            entry.key.to_string(),
            describe(catalog.describe(&entry.key), 50),
            money(entry.total),
            entry.count.to_string(),
            money(entry.average()),
        ]));
    }
    println!("{}", table);
    costs.render(
        ChartKind::HorizontalBar,
        10,
        &charts.file("04_top10_costliest_procedures.png"),
        "Top 10 procedures by total approved value",
        |code: &ArcStr| format!("{} - {}", code, describe(catalog.describe(code), 30)),
        "Total value (R$)",
    )?;

    subheader("Distribution by value band");
    let bands = value_bands();
    let mut totals = vec![(0usize, 0f64); bands.len()];
    for record in procedures.iter() {
        if let Some(idx) = record.approved_value.and_then(|v| bands.bucket_of(&v)) {
            totals[idx].0 += 1;
            totals[idx].1 += record.approved();
        }
    }
    let mut table = table_with_header(&["Band", "Total value", "% value", "Count", "% count"]);
    let mut slices = vec![];
    for (idx, (count, total)) in totals.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        table.add_row(row([
            bands.label(idx),
            money(*total),
            percent(share(*total, approved)),
            count.to_string(),
            percent(share(*count as f64, procedures.len() as f64)),
        ]));
        slices.push((bands.label(idx), *total));
    }
    println!("{}", table);
    chart::pie_chart(
        &charts.file("05_value_bands.png"),
        "Total value by price band",
        &slices,
    )?;
    Ok(())
}
