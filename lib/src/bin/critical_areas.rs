use datasus_procedures_analysis::{
    areas::{AreaMatcher, CRITICAL_MATCHERS},
    catalog::ProcedureCatalog,
    chart::{self, Bar, ChartDir, Orientation},
    describe,
    enrich::competence_label,
    header, money,
    report::{monthly, ChartKind, Measure, Ranking},
    row, share, subheader, table_with_header, ArcStr, Config, Procedure, Procedures,
};
use qu::ick_use::*;
use std::collections::BTreeSet;

/// Totals for one area, for the comparison at the end.
struct AreaTotals {
    name: &'static str,
    count: usize,
    approved: f64,
}

/// `Saúde Mental` -> `saude_mental`
fn file_stem(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            ' ' => '_',
            ch => ch,
        })
        .collect()
}

fn analyse_area(
    procedures: &Procedures,
    catalog: &ProcedureCatalog,
    matcher: &AreaMatcher,
    charts: &ChartDir,
) -> Result<Option<AreaTotals>> {
    let area = matcher.area();
    subheader(area.name);
    let codes: BTreeSet<&str> = catalog
        .iter()
        .filter(|entry| {
            entry
                .description
                .as_deref()
                .map_or(false, |d| matcher.is_match(d))
        })
        .map(|entry| &*entry.code)
        .collect();
    let records = procedures.filter(|p| {
        p.procedure_code
            .as_deref()
            .map_or(false, |code| codes.contains(code))
    });
    if records.is_empty() {
        println!("no procedures found for {}", area.name);
        return Ok(None);
    }

    let approved = records.total_approved();
    let produced = records.total_produced();
    println!("procedures: {}", records.len());
    println!("approved:   {}", money(approved));
    println!("produced:   {}", money(produced));
    println!(
        "difference: {} ({:+.2}%)",
        money(produced - approved),
        share(produced - approved, approved)
    );

    let top = Ranking::build(
        &records,
        |p: &Procedure| p.procedure_code.clone(),
        Procedure::approved,
        Measure::Count,
    );
    println!("\ntop 10 procedures in {}:", area.name);
    let mut table = table_with_header(&["#", "Procedure", "Description", "Count", "Total value"]);
    for (idx, entry) in top.top(10).iter().enumerate() {
        table.add_row(row([
            (idx + 1).to_string(),
            entry.key.to_string(),
            describe(catalog.describe(&entry.key), 50),
            entry.count.to_string(),
            money(entry.total),
        ]));
    }
    println!("{}", table);

    println!("monthly evolution:");
    for month in monthly(&records) {
        println!(
            "  {}: {} procedures",
            competence_label(month.year_month),
            month.count
        );
    }

    top.render(
        ChartKind::HorizontalBar,
        10,
        &charts.file(&format!("top10_{}.png", file_stem(area.name))),
        &format!("Top 10 procedures: {}", area.name),
        |code: &ArcStr| format!("{} - {}", code, describe(catalog.describe(code), 30)),
        "Count",
    )?;
    Ok(Some(AreaTotals {
        name: area.name,
        count: records.len(),
        approved,
    }))
}

#[qu::ick]
pub fn main() -> Result {
    let config = Config::load()?;
    let charts = ChartDir::create(config.chart_dir("6_critical_areas"))?;
    let procedures = Procedures::load(config.clean_path(&config.home))?.with_normalized_codes();
    let catalog = ProcedureCatalog::load(config.reference_source());

    header("Critical health areas");
    let distinct: BTreeSet<&str> = procedures
        .iter()
        .filter_map(|p| p.procedure_code.as_deref())
        .collect();
    println!("records: {}", procedures.len());
    println!("distinct procedures: {}", distinct.len());

    let mut areas = vec![];
    for matcher in CRITICAL_MATCHERS.iter() {
        if let Some(totals) = analyse_area(&procedures, &catalog, matcher, &charts)? {
            areas.push(totals);
        }
    }

    subheader("Comparison between critical areas");
    if areas.is_empty() {
        println!("no critical area has any records");
        return Ok(());
    }
    let total_approved = procedures.total_approved();
    let mut table = table_with_header(&["Area", "Procedures", "Total value", "% of total"]);
    for area in areas.iter() {
        table.add_row(row([
            area.name.to_owned(),
            area.count.to_string(),
            money(area.approved),
            format!("{:.2}%", share(area.approved, total_approved)),
        ]));
    }
    println!("{}", table);

    let counts: Vec<Bar> = areas
        .iter()
        .map(|a| Bar::new(a.name, a.count as f64))
        .collect();
    chart::bar_chart(
        &charts.file("comparison_count.png"),
        "Procedures per critical area",
        &counts,
        Orientation::Vertical,
        "Count",
        &[],
    )?;
    let values: Vec<Bar> = areas
        .iter()
        .map(|a| Bar::new(a.name, a.approved).with_color(chart::RED))
        .collect();
    chart::bar_chart(
        &charts.file("comparison_values.png"),
        "Approved value per critical area",
        &values,
        Orientation::Vertical,
        "Total value (R$)",
        &[],
    )?;
    Ok(())
}
