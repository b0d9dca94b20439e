//! The cleaning pipeline, applied to the raw extract before any analysis.
//!
//! Stages run in a fixed order: period filter, duplicate removal, sparse column removal,
//! imputation and the age filter. Dropping columns and filling nulls can make distinct rows
//! equal, so duplicates are removed again after imputation. Running the pipeline on its own
//! output changes nothing.
use crate::{
    columns,
    frame::{ColumnKind, Frame},
    row, subheader, table_with_header, util, ArcStr, Result, NOT_INFORMED, NUMERIC_FILL,
};
use qu::ick_use::*;

/// Columns with a larger share of nulls than this are dropped.
pub const MAX_NULL_RATIO: f64 = 0.5;
/// Ages outside this range (inclusive) are not plausible.
pub const AGE_RANGE: (f64, f64) = (0., 120.);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PeriodFilter,
    Duplicates,
    SparseColumns,
    Imputation,
    ImputedDuplicates,
    AgeFilter,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::PeriodFilter => "period filter",
            Stage::Duplicates => "duplicate removal",
            Stage::SparseColumns => "sparse column removal",
            Stage::Imputation => "imputation",
            Stage::ImputedDuplicates => "duplicate removal after imputation",
            Stage::AgeFilter => "age filter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageCount {
    pub stage: Stage,
    pub rows_before: usize,
    pub rows_after: usize,
    /// The column the stage needs was missing.
    pub skipped: bool,
}

/// A column that was dropped or filled, with its null statistics at the time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnNote {
    pub name: ArcStr,
    pub nulls: usize,
    pub ratio: f64,
    /// The fill value, for imputed columns.
    pub fill: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanReport {
    pub initial_rows: usize,
    pub initial_columns: usize,
    pub stages: Vec<StageCount>,
    pub dropped_columns: Vec<ColumnNote>,
    pub filled_columns: Vec<ColumnNote>,
    /// `PA_SEXO` values with counts after cleaning. Informational only.
    pub sex_distribution: Vec<(ArcStr, usize)>,
    pub final_rows: usize,
    pub final_columns: usize,
    pub remaining_nulls: usize,
}

impl CleanReport {
    pub fn rows_removed(&self) -> usize {
        self.initial_rows - self.final_rows
    }

    pub fn columns_removed(&self) -> usize {
        self.initial_columns - self.final_columns
    }

    pub fn print(&self) {
        subheader("Stages");
        let mut table = table_with_header(&["Stage", "Rows before", "Rows after", "Removed"]);
        for stage in self.stages.iter() {
            let removed = if stage.skipped {
                "skipped".to_owned()
            } else {
                (stage.rows_before - stage.rows_after).to_string()
            };
            table.add_row(row([
                stage.stage.name().to_owned(),
                stage.rows_before.to_string(),
                stage.rows_after.to_string(),
                removed,
            ]));
        }
        println!("{}", table);

        if !self.dropped_columns.is_empty() {
            subheader(&format!(
                "Columns dropped (more than {:.0}% missing)",
                MAX_NULL_RATIO * 100.
            ));
            let mut table = table_with_header(&["Column", "Missing", "Missing %"]);
            for note in self.dropped_columns.iter() {
                table.add_row(row([
                    note.name.to_string(),
                    note.nulls.to_string(),
                    format!("{:.2}%", note.ratio * 100.),
                ]));
            }
            println!("{}", table);
        }

        if !self.filled_columns.is_empty() {
            subheader("Columns imputed");
            let mut table = table_with_header(&["Column", "Missing", "Missing %", "Filled with"]);
            for note in self.filled_columns.iter() {
                table.add_row(row([
                    note.name.to_string(),
                    note.nulls.to_string(),
                    format!("{:.2}%", note.ratio * 100.),
                    note.fill.unwrap_or("").to_owned(),
                ]));
            }
            println!("{}", table);
        }

        if !self.sex_distribution.is_empty() {
            subheader("Sex codes");
            let mut table = table_with_header(&["Code", "Count"]);
            for (code, count) in self.sex_distribution.iter() {
                table.add_row(row([code.to_string(), count.to_string()]));
            }
            println!("{}", table);
        }

        subheader("Summary");
        let removed_pct = util::share(self.rows_removed() as f64, self.initial_rows as f64);
        println!(
            "rows: {} -> {} ({} removed, {:.2}%)",
            self.initial_rows,
            self.final_rows,
            self.rows_removed(),
            removed_pct
        );
        println!(
            "columns: {} -> {} ({} removed)",
            self.initial_columns,
            self.final_columns,
            self.columns_removed()
        );
        println!("remaining missing values: {}", self.remaining_nulls);
    }
}

/// Run every stage on `frame`, keeping only records from `target_year`.
pub fn clean(mut frame: Frame, target_year: i32) -> Result<(Frame, CleanReport)> {
    let initial_rows = frame.len();
    let initial_columns = frame.width();
    let mut stages = vec![];

    stages.push(filter_period(&mut frame, target_year)?);
    stages.push(remove_duplicates(&mut frame, Stage::Duplicates)?);
    let (count, dropped_columns) = drop_sparse_columns(&mut frame)?;
    stages.push(count);
    let (count, filled_columns) = impute(&mut frame)?;
    stages.push(count);
    stages.push(remove_duplicates(&mut frame, Stage::ImputedDuplicates)?);
    stages.push(filter_age(&mut frame)?);

    let sex_distribution = frame
        .column_index(columns::SEX)
        .map(|idx| frame.value_counts(idx))
        .unwrap_or_default();
    let report = CleanReport {
        initial_rows,
        initial_columns,
        stages,
        dropped_columns,
        filled_columns,
        sex_distribution,
        final_rows: frame.len(),
        final_columns: frame.width(),
        remaining_nulls: frame.total_nulls(),
    };
    Ok((frame, report))
}

/// Keep records whose competence starts with the target year.
pub fn filter_period(frame: &mut Frame, target_year: i32) -> Result<StageCount> {
    let rows_before = frame.len();
    let Some(idx) = frame.column_index(columns::COMPETENCE) else {
        event!(
            Level::WARN,
            "column `{}` not found, skipping the period filter",
            columns::COMPETENCE
        );
        return Ok(skipped(Stage::PeriodFilter, rows_before));
    };
    let year = target_year.to_string();
    let removed = frame.retain_where(idx, |cmp| {
        cmp.and_then(|cmp| cmp.get(..4))
            .map_or(false, |y| y == year)
    })?;
    event!(
        Level::INFO,
        "period filter ({}): removed {} rows",
        target_year,
        removed
    );
    Ok(done(Stage::PeriodFilter, rows_before, frame.len()))
}

/// Remove rows equal to an earlier row, recording the removal under `stage`.
pub fn remove_duplicates(frame: &mut Frame, stage: Stage) -> Result<StageCount> {
    let rows_before = frame.len();
    let removed = frame.drop_duplicates()?;
    event!(Level::INFO, "{}: removed {} rows", stage.name(), removed);
    Ok(done(stage, rows_before, frame.len()))
}

/// Drop columns where more than half the values are missing.
pub fn drop_sparse_columns(frame: &mut Frame) -> Result<(StageCount, Vec<ColumnNote>)> {
    let rows = frame.len();
    let mut notes = vec![];
    for idx in 0..frame.width() {
        let nulls = frame.null_count(idx);
        if nulls == 0 {
            continue;
        }
        let ratio = frame.null_ratio(idx);
        if ratio > MAX_NULL_RATIO {
            notes.push(ColumnNote {
                name: frame.column_name(idx).into(),
                nulls,
                ratio,
                fill: None,
            });
        }
    }
    let names: Vec<&str> = notes.iter().map(|n| &*n.name).collect();
    frame.drop_columns(&names)?;
    if !notes.is_empty() {
        event!(
            Level::INFO,
            "dropped {} sparse columns: {}",
            notes.len(),
            names.join(", ")
        );
    }
    Ok((done(Stage::SparseColumns, rows, frame.len()), notes))
}

/// Fill remaining nulls: text columns with `NOT_INFORMED`, numeric columns with `-1`.
pub fn impute(frame: &mut Frame) -> Result<(StageCount, Vec<ColumnNote>)> {
    let rows = frame.len();
    let mut notes = vec![];
    for idx in 0..frame.width() {
        let nulls = frame.null_count(idx);
        if nulls == 0 {
            continue;
        }
        let ratio = frame.null_ratio(idx);
        let fill = match frame.kind(idx) {
            ColumnKind::Numeric => NUMERIC_FILL,
            ColumnKind::Text => NOT_INFORMED,
        };
        frame.fill_nulls(idx, fill)?;
        notes.push(ColumnNote {
            name: frame.column_name(idx).into(),
            nulls,
            ratio,
            fill: Some(fill),
        });
    }
    event!(Level::INFO, "imputed {} columns", notes.len());
    Ok((done(Stage::Imputation, rows, frame.len()), notes))
}

/// Keep records with a parseable age inside `AGE_RANGE`.
pub fn filter_age(frame: &mut Frame) -> Result<StageCount> {
    let rows_before = frame.len();
    let Some(idx) = frame.column_index(columns::AGE) else {
        event!(
            Level::WARN,
            "column `{}` not found, skipping the age filter",
            columns::AGE
        );
        return Ok(skipped(Stage::AgeFilter, rows_before));
    };
    let removed = frame.retain_where(idx, |age| {
        age.and_then(util::parse_f64)
            .map_or(false, |age| age >= AGE_RANGE.0 && age <= AGE_RANGE.1)
    })?;
    event!(Level::INFO, "removed {} rows with implausible ages", removed);
    Ok(done(Stage::AgeFilter, rows_before, frame.len()))
}

fn done(stage: Stage, rows_before: usize, rows_after: usize) -> StageCount {
    StageCount {
        stage,
        rows_before,
        rows_after,
        skipped: false,
    }
}

fn skipped(stage: Stage, rows: usize) -> StageCount {
    StageCount {
        stage,
        rows_before: rows,
        rows_after: rows,
        skipped: true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw() -> Frame {
        Frame::from_text(
            ["PA_CMP", "PA_IDADE", "PA_SEXO", "PA_CIDPRI", "PA_OBS", "PA_VALAPR"],
            vec![
                vec!["202501", "34", "M", "C50", "", "10.5"],
                vec!["202501", "34", "M", "C50", "", "10.5"],
                vec!["202412", "50", "F", "I10", "", "3"],
                vec!["202502", "130", "F", "", "x", "4"],
                vec!["202503", "abc", "F", "I10", "", "7"],
                vec!["202503", "", "M", "", "", ""],
                vec!["202504", "0", "0", "J45", "y", "1"],
                vec!["202505", "120", "F", "J45", "", "2"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn pipeline() {
        let raw = raw();
        let (frame, report) = clean(raw.clone(), 2025).unwrap();
        let counts: Vec<_> = report
            .stages
            .iter()
            .map(|s| (s.stage, s.rows_before, s.rows_after))
            .collect();
        assert_eq!(
            counts,
            vec![
                (Stage::PeriodFilter, 8, 7),
                (Stage::Duplicates, 7, 6),
                (Stage::SparseColumns, 6, 6),
                (Stage::Imputation, 6, 6),
                (Stage::ImputedDuplicates, 6, 6),
                (Stage::AgeFilter, 6, 3),
            ]
        );
        assert_eq!(report.dropped_columns.len(), 1);
        assert_eq!(&*report.dropped_columns[0].name, "PA_OBS");
        assert!(!frame.has_column("PA_OBS"));
        assert_eq!(report.final_rows, 3);
        assert_eq!(report.remaining_nulls, 0);
        assert_eq!(report.rows_removed(), 5);
        assert_eq!(report.columns_removed(), 1);

        // columns at most half empty in the raw data survive
        for idx in 0..raw.width() {
            if raw.null_ratio(idx) <= MAX_NULL_RATIO {
                assert!(frame.has_column(raw.column_name(idx)));
            }
        }

        // every survivor is from 2025 with a plausible age
        let cmp = frame.column_index("PA_CMP").unwrap();
        assert!(frame.column(cmp).all(|v| v.unwrap().starts_with("2025")));
        let age = frame.column_index("PA_IDADE").unwrap();
        for value in frame.column(age) {
            let age: f64 = value.unwrap().parse().unwrap();
            assert!((0. ..=120.).contains(&age));
        }
    }

    #[test]
    fn imputation_by_kind() {
        let (frame, report) = clean(raw(), 2025).unwrap();
        let fills: Vec<_> = report
            .filled_columns
            .iter()
            .map(|n| (&*n.name, n.fill))
            .collect();
        assert_eq!(
            fills,
            vec![
                ("PA_IDADE", Some(NOT_INFORMED)),
                ("PA_CIDPRI", Some(NOT_INFORMED)),
                ("PA_VALAPR", Some(NUMERIC_FILL)),
            ]
        );
        // "abc" makes the age column text, so the missing age is filled with text and then
        // dropped by the age filter
        assert!(frame
            .column(frame.column_index("PA_IDADE").unwrap())
            .all(|v| v != Some(NOT_INFORMED)));
    }

    #[test]
    fn idempotent() {
        let (once, _) = clean(raw(), 2025).unwrap();
        let (twice, report) = clean(once.clone(), 2025).unwrap();
        assert_eq!(once, twice);
        assert!(report.dropped_columns.is_empty());
        assert!(report.filled_columns.is_empty());
    }

    #[test]
    fn rows_equal_after_imputation_are_removed() {
        let frame = Frame::from_text(
            ["PA_CMP", "PA_IDADE", "PA_CIDPRI", "PA_VALAPR"],
            vec![
                vec!["202501", "30", "", "5"],
                vec!["202501", "30", NOT_INFORMED, "5"],
                vec!["202501", "40", "C50", ""],
                vec!["202501", "40", "C50", NUMERIC_FILL],
            ],
        )
        .unwrap();
        let (once, report) = clean(frame, 2025).unwrap();
        assert_eq!(report.stages[1].rows_after, 4);
        let imputed = &report.stages[4];
        assert_eq!(imputed.stage, Stage::ImputedDuplicates);
        assert_eq!((imputed.rows_before, imputed.rows_after), (4, 2));
        assert_eq!(once.len(), 2);

        let mut deduped = once.clone();
        assert_eq!(deduped.drop_duplicates().unwrap(), 0);

        let (twice, _) = clean(once.clone(), 2025).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn sparse_column_boundary() {
        // 2 of 4 missing is exactly half, and kept
        let mut frame = Frame::from_text(
            ["PA_CMP", "PA_OBS"],
            vec![
                vec!["202501", "a"],
                vec!["202501", ""],
                vec!["202502", "b"],
                vec!["202502", ""],
            ],
        )
        .unwrap();
        let (_, notes) = drop_sparse_columns(&mut frame).unwrap();
        assert!(notes.is_empty());
        assert!(frame.has_column("PA_OBS"));

        // 3 of 5 missing is more than half, and dropped
        let mut frame = Frame::from_text(
            ["PA_CMP", "PA_OBS"],
            vec![
                vec!["202501", "a"],
                vec!["202501", ""],
                vec!["202502", "b"],
                vec!["202502", ""],
                vec!["202503", ""],
            ],
        )
        .unwrap();
        let (count, notes) = drop_sparse_columns(&mut frame).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(&*notes[0].name, "PA_OBS");
        assert_eq!(notes[0].nulls, 3);
        assert_eq!(notes[0].ratio, 0.6);
        assert_eq!((count.rows_before, count.rows_after), (5, 5));
        assert!(!frame.has_column("PA_OBS"));
        assert!(frame.has_column("PA_CMP"));
    }

    #[test]
    fn missing_columns_skip_stages() {
        let frame = Frame::from_text(["PA_SEXO"], vec![vec!["M"], vec!["F"]]).unwrap();
        let (frame, report) = clean(frame, 2025).unwrap();
        assert_eq!(report.stages[0].stage, Stage::PeriodFilter);
        assert!(report.stages[0].skipped);
        assert_eq!(report.stages[5].stage, Stage::AgeFilter);
        assert!(report.stages[5].skipped);
        assert_eq!(frame.len(), 2);
    }
}
