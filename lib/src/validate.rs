//! Diagnostic checks on the cleaned dataset. Nothing here changes the data.
use crate::{
    catalog::DiseaseCatalog,
    clean::AGE_RANGE,
    columns,
    enrich::normalize_disease_code,
    frame::{ColumnKind, Frame},
    row, stats::Summary, subheader, table_with_header, util, ArcStr, NOT_INFORMED,
};
use itertools::Itertools;

/// Accepted `PA_SEXO` codes. `0` means not informed.
pub const SEX_CODES: [&str; 3] = ["M", "F", "0"];
/// Invalid disease codes listed in the report.
const MAX_LISTED_CODES: usize = 10;

/// The outcome of one value-domain rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule: &'static str,
    /// Rows breaking the rule.
    pub offending: usize,
    pub total: usize,
    /// Distinct invalid values, where the rule lists them.
    pub invalid_values: Vec<ArcStr>,
}

impl RuleOutcome {
    pub fn percentage(&self) -> f64 {
        util::share(self.offending as f64, self.total as f64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub outcomes: Vec<RuleOutcome>,
    /// Human readable problems found, including rules that couldn't run.
    pub problems: Vec<String>,
}

impl ValidationReport {
    pub fn outcome(&self, rule: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule == rule)
    }

    pub fn print(&self) {
        subheader("Validation summary");
        if self.problems.is_empty() {
            println!("no problems found");
        } else {
            println!("{} problem(s) found:", self.problems.len());
            for (idx, problem) in self.problems.iter().enumerate() {
                println!("  {}. {}", idx + 1, problem);
            }
        }
    }
}

pub const AGE_RULE: &str = "age range";
pub const SEX_RULE: &str = "sex code";
pub const DISEASE_RULE: &str = "disease code";

/// Run every rule. An empty catalog means it couldn't be loaded, and the disease-code rule is
/// skipped.
pub fn validate(frame: &Frame, diseases: &DiseaseCatalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (rule, column, outcome) in [
        (AGE_RULE, columns::AGE, check_age(frame)),
        (SEX_RULE, columns::SEX, check_sex(frame)),
    ] {
        match outcome {
            Some(outcome) => report.push(outcome),
            None => report
                .problems
                .push(format!("{} check skipped: column `{}` missing", rule, column)),
        }
    }
    if diseases.is_empty() {
        report
            .problems
            .push("disease code validation skipped: catalog unavailable".into());
    } else {
        match check_disease_codes(frame, diseases) {
            Some(outcome) => report.push(outcome),
            None => report.problems.push(format!(
                "{} check skipped: column `{}` missing",
                DISEASE_RULE,
                columns::DISEASE
            )),
        }
    }
    report
}

impl ValidationReport {
    fn push(&mut self, outcome: RuleOutcome) {
        if outcome.offending > 0 {
            let mut problem = format!(
                "{}: {} rows ({:.2}%) invalid",
                outcome.rule,
                outcome.offending,
                outcome.percentage()
            );
            if !outcome.invalid_values.is_empty() {
                problem.push_str(&format!(
                    ", e.g. {}",
                    outcome.invalid_values.iter().join(", ")
                ));
            }
            self.problems.push(problem);
        }
        self.outcomes.push(outcome);
    }
}

/// Rows whose age is a number outside the plausible range. Unparseable ages are not counted.
pub fn check_age(frame: &Frame) -> Option<RuleOutcome> {
    let idx = frame.column_index(columns::AGE)?;
    let offending = frame
        .column(idx)
        .filter_map(|v| v.and_then(util::parse_f64))
        .filter(|age| *age < AGE_RANGE.0 || *age > AGE_RANGE.1)
        .count();
    Some(RuleOutcome {
        rule: AGE_RULE,
        offending,
        total: frame.len(),
        invalid_values: vec![],
    })
}

/// Rows whose sex code isn't one of `SEX_CODES`. Missing codes are invalid.
pub fn check_sex(frame: &Frame) -> Option<RuleOutcome> {
    let idx = frame.column_index(columns::SEX)?;
    let invalid = |v: Option<&str>| v.map_or(true, |v| !SEX_CODES.contains(&v));
    let offending = frame.column(idx).filter(|v| invalid(*v)).count();
    let invalid_values = frame
        .column(idx)
        .flatten()
        .filter(|v| invalid(Some(*v)))
        .unique()
        .map(ArcStr::from)
        .collect();
    Some(RuleOutcome {
        rule: SEX_RULE,
        offending,
        total: frame.len(),
        invalid_values,
    })
}

/// Rows whose disease code isn't in the catalog. The "not informed" placeholder is accepted.
pub fn check_disease_codes(frame: &Frame, diseases: &DiseaseCatalog) -> Option<RuleOutcome> {
    let idx = frame.column_index(columns::DISEASE)?;
    let placeholder = NOT_INFORMED.to_lowercase();
    let is_invalid = |code: &str| {
        code.to_lowercase() != placeholder && !diseases.contains(&normalize_disease_code(code))
    };
    let mut offending = 0;
    let mut invalid_values: Vec<ArcStr> = vec![];
    for code in frame.column(idx).flatten() {
        if is_invalid(code) {
            offending += 1;
            if invalid_values.len() < MAX_LISTED_CODES
                && !invalid_values.iter().any(|v| &**v == code)
            {
                invalid_values.push(code.into());
            }
        }
    }
    Some(RuleOutcome {
        rule: DISEASE_RULE,
        offending,
        total: frame.len(),
        invalid_values,
    })
}

/// Print a descriptive profile of the dataset: dimensions, column kinds, statistics, missing
/// values and the most frequent values of the first text columns.
pub fn print_profile(frame: &Frame) {
    subheader("Dimensions");
    println!("rows: {}", frame.len());
    println!("columns: {}", frame.width());
    println!("cells: {}", frame.len() * frame.width());

    subheader("Column kinds");
    let mut table = table_with_header(&["Column", "Kind", "Non-null"]);
    for (idx, name) in frame.column_names().enumerate() {
        table.add_row(row([
            name.to_string(),
            frame.kind(idx).name().to_owned(),
            (frame.len() - frame.null_count(idx)).to_string(),
        ]));
    }
    println!("{}", table);

    let (numeric, text): (Vec<usize>, Vec<usize>) =
        (0..frame.width()).partition(|idx| frame.kind(*idx) == ColumnKind::Numeric);

    if !numeric.is_empty() {
        subheader("Numeric columns");
        let mut table = table_with_header(&["Column", "Mean", "Median", "Min", "Max", "Std dev"]);
        for idx in numeric.iter().copied() {
            if let Some(s) = Summary::of(&frame.numeric_values(idx)) {
                table.add_row(row([
                    frame.column_name(idx).to_owned(),
                    format!("{:.2}", s.mean),
                    format!("{:.2}", s.median),
                    format!("{:.2}", s.min),
                    format!("{:.2}", s.max),
                    format!("{:.2}", s.std_dev),
                ]));
            }
        }
        println!("{}", table);
    }

    if !text.is_empty() {
        subheader("Text columns");
        for idx in text.iter().copied() {
            let counts = frame.value_counts(idx);
            println!(
                "{}: {} distinct values",
                frame.column_name(idx),
                counts.len()
            );
            for (value, count) in counts.iter().take(5) {
                println!(
                    "    {}: {} ({:.2}%)",
                    util::truncate(value, 50),
                    count,
                    util::share(*count as f64, frame.len() as f64)
                );
            }
        }
    }

    subheader("Missing values");
    let missing: Vec<_> = (0..frame.width())
        .filter(|idx| frame.null_count(*idx) > 0)
        .collect();
    if missing.is_empty() {
        println!("no missing values");
    } else {
        let mut table = table_with_header(&["Column", "Missing", "Missing %"]);
        for idx in missing {
            table.add_row(row([
                frame.column_name(idx).to_owned(),
                frame.null_count(idx).to_string(),
                format!("{:.2}%", frame.null_ratio(idx) * 100.),
            ]));
        }
        println!("{}", table);
    }

    for idx in text.iter().copied().take(5) {
        subheader(&format!("Top 10 values of {}", frame.column_name(idx)));
        let mut table = table_with_header(&["Value", "Count", "Share"]);
        for (value, count) in frame.value_counts(idx).into_iter().take(10) {
            table.add_row(row([
                util::truncate(&value, 50),
                count.to_string(),
                util::percent(util::share(count as f64, frame.len() as f64)),
            ]));
        }
        println!("{}", table);
    }
}

/// Print details behind the rule outcomes: the sex distribution, age range and the most frequent
/// disease codes.
pub fn print_details(frame: &Frame, diseases: &DiseaseCatalog, report: &ValidationReport) {
    if let Some(outcome) = report.outcome(AGE_RULE) {
        subheader("Age");
        println!(
            "{} rows outside {}-{} ({:.2}%)",
            outcome.offending,
            AGE_RANGE.0,
            AGE_RANGE.1,
            outcome.percentage()
        );
        if outcome.offending > 0 {
            if let Some(idx) = frame.column_index(columns::AGE) {
                if let Some(s) = Summary::of(&frame.numeric_values(idx)) {
                    println!("min {:.0}, max {:.0}, mean {:.1}", s.min, s.max, s.mean);
                }
            }
        }
    }

    if let Some(idx) = frame.column_index(columns::SEX) {
        subheader("Sex");
        let mut table = table_with_header(&["Code", "Count", "Share"]);
        for (code, count) in frame.value_counts(idx) {
            table.add_row(row([
                code.to_string(),
                count.to_string(),
                util::percent(util::share(count as f64, frame.len() as f64)),
            ]));
        }
        println!("{}", table);
        if let Some(outcome) = report.outcome(SEX_RULE) {
            println!("{} rows with an invalid code", outcome.offending);
        }
    }

    if let (Some(idx), Some(outcome)) = (
        frame.column_index(columns::DISEASE),
        report.outcome(DISEASE_RULE),
    ) {
        subheader("Disease codes");
        println!(
            "{} rows ({:.2}%) with a code not in the catalog",
            outcome.offending,
            outcome.percentage()
        );
        if !outcome.invalid_values.is_empty() {
            println!("invalid codes: {}", outcome.invalid_values.iter().join(", "));
        }
        let mut table = table_with_header(&["Code", "Description", "Count"]);
        for (code, count) in frame.value_counts(idx).into_iter().take(10) {
            let description = diseases.describe(&normalize_disease_code(&code));
            table.add_row(row([
                code.to_string(),
                util::describe(description, 50),
                count.to_string(),
            ]));
        }
        println!("{}", table);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::DiseaseEntry;

    fn frame() -> Frame {
        Frame::from_text(
            ["PA_IDADE", "PA_SEXO", "PA_CIDPRI"],
            vec![
                vec!["34", "M", "c50"],
                vec!["130", "F", "Z999"],
                vec!["-2", "X", "Não informado"],
                vec!["abc", "", "I10"],
                vec!["60", "0", "Z999"],
            ],
        )
        .unwrap()
    }

    fn diseases() -> DiseaseCatalog {
        ["C50", "I10"]
            .into_iter()
            .map(|code| DiseaseEntry {
                code: code.into(),
                description: None,
            })
            .collect()
    }

    #[test]
    fn rules() {
        let frame = frame();
        let report = validate(&frame, &diseases());

        let age = report.outcome(AGE_RULE).unwrap();
        assert_eq!(age.offending, 2);
        assert_eq!(age.percentage(), 40.);

        let sex = report.outcome(SEX_RULE).unwrap();
        assert_eq!(sex.offending, 2);
        assert_eq!(sex.invalid_values, vec![ArcStr::from("X")]);

        let cid = report.outcome(DISEASE_RULE).unwrap();
        assert_eq!(cid.offending, 2);
        assert_eq!(cid.invalid_values, vec![ArcStr::from("Z999")]);

        assert_eq!(report.problems.len(), 3);
    }

    #[test]
    fn validation_does_not_change_data() {
        let frame = frame();
        let before = frame.clone();
        validate(&frame, &diseases());
        assert_eq!(frame, before);
    }

    #[test]
    fn empty_catalog_skips_disease_rule() {
        let report = validate(&frame(), &DiseaseCatalog::new(vec![]));
        assert!(report.outcome(DISEASE_RULE).is_none());
        assert!(report
            .problems
            .iter()
            .any(|p| p.contains("disease code validation skipped")));
    }

    #[test]
    fn missing_column_is_noted() {
        let frame = Frame::from_text(["PA_IDADE"], vec![vec!["3"]]).unwrap();
        let report = validate(&frame, &diseases());
        assert!(report.outcome(SEX_RULE).is_none());
        assert!(report.problems.iter().any(|p| p.contains("PA_SEXO")));
    }
}
