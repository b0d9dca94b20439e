//! The raw extract as a polars `DataFrame` of optional text cells.
//!
//! The raw extract is a `SELECT *` and the cleaning stage drops columns depending on how sparse
//! they are, so neither stage can work with a fixed record type. Every column is read as a
//! string column and numeric columns are recognised by inspection.
use crate::{util, ArcStr, Context, Result};
use itertools::Itertools;
use polars::{
    io::csv::read::CsvReadOptions,
    prelude::{
        BooleanChunked, Column, CsvWriter, DataFrame, NamedFrom, SerReader, SerWriter,
        UniqueKeepStrategy,
    },
};
use qu::ick_use::*;
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

const BOM: &str = "\u{feff}";

pub type Cell = Option<ArcStr>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every non-null cell parses as a number.
    Numeric,
    Text,
}

impl ColumnKind {
    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    df: DataFrame,
}

impl Frame {
    /// Build a frame from rows of cells, one cell per column in each row.
    pub fn new(columns: Vec<ArcStr>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            ensure!(
                row.len() == columns.len(),
                "row {} has {} cells, expected {}",
                idx,
                row.len(),
                columns.len()
            );
        }
        let columns = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let values: Vec<Option<&str>> =
                    rows.iter().map(|row| row[idx].as_deref()).collect();
                Column::new(name.as_ref().into(), values)
            })
            .collect();
        Ok(Frame {
            df: DataFrame::new(columns)?,
        })
    }

    /// Build a frame from raw text, applying the same null handling as `read_csv`.
    pub fn from_text<C, R, S>(columns: C, rows: R) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = columns.into_iter().map(|c| c.as_ref().into()).collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|c| cell(c.as_ref()).map(ArcStr::from))
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<Frame> {
            // no schema inference, so every column is read as text
            let raw = CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?;
            let mut columns = Vec::with_capacity(raw.width());
            for (idx, column) in raw.get_columns().iter().enumerate() {
                let name = column.name().as_str().trim();
                let name = if idx == 0 {
                    name.trim_start_matches(BOM)
                } else {
                    name
                };
                let values: Vec<Option<&str>> = column
                    .str()?
                    .into_iter()
                    .map(|value| value.and_then(cell))
                    .collect();
                columns.push(Column::new(name.into(), values));
            }
            Ok(Frame {
                df: DataFrame::new(columns)?,
            })
        }
        let path = path.as_ref();
        inner(path).with_context(|| format!("while loading \"{}\"", path.display()))
    }

    /// Write as CSV. Nulls are written as empty fields.
    pub fn write_csv(&self, path: impl AsRef<Path>, with_bom: bool) -> Result {
        fn inner(frame: &Frame, path: &Path, with_bom: bool) -> Result {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("could not create parent")?;
            }
            if util::path_exists(path)? {
                event!(
                    Level::WARN,
                    "overwriting existing file at \"{}\"",
                    path.display()
                );
            }
            let mut out = io::BufWriter::new(fs::File::create(path)?);
            if with_bom {
                out.write_all(BOM.as_bytes())?;
            }
            let mut df = frame.df.clone();
            CsvWriter::new(&mut out)
                .include_header(true)
                .finish(&mut df)?;
            out.flush()?;
            Ok(())
        }
        let path = path.as_ref();
        inner(self, path, with_bom)
            .with_context(|| format!("unable to save data to \"{}\"", path.display()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.df.get_columns().iter().map(|c| c.name().as_str())
    }

    pub fn column_name(&self, idx: usize) -> &str {
        self.df
            .get_columns()
            .get(idx)
            .map_or("", |c| c.name().as_str())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.df
            .get_columns()
            .get(idx)
            .and_then(|c| c.str().ok())
            .into_iter()
            .flatten()
    }

    pub fn null_count(&self, idx: usize) -> usize {
        self.df
            .get_columns()
            .get(idx)
            .map_or(0, |c| c.null_count())
    }

    /// Fraction of null cells in a column, 0 for an empty frame.
    pub fn null_ratio(&self, idx: usize) -> f64 {
        if self.is_empty() {
            0.
        } else {
            self.null_count(idx) as f64 / self.len() as f64
        }
    }

    pub fn total_nulls(&self) -> usize {
        self.df.get_columns().iter().map(|c| c.null_count()).sum()
    }

    pub fn kind(&self, idx: usize) -> ColumnKind {
        if self
            .column(idx)
            .flatten()
            .all(|v| util::parse_f64(v).is_some())
        {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }

    /// The non-null cells of a column that parse as numbers.
    pub fn numeric_values(&self, idx: usize) -> Vec<f64> {
        self.column(idx).flatten().filter_map(util::parse_f64).collect()
    }

    /// Distinct non-null values with their counts, most frequent first, ties by value.
    pub fn value_counts(&self, idx: usize) -> Vec<(ArcStr, usize)> {
        self.column(idx)
            .flatten()
            .counts()
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
            .map(|(value, count)| (ArcStr::from(value), count))
            .collect()
    }

    /// Keep rows where the cell in column `idx` matches the predicate. Returns the number
    /// removed.
    pub fn retain_where(
        &mut self,
        idx: usize,
        mut f: impl FnMut(Option<&str>) -> bool,
    ) -> Result<usize> {
        let before = self.len();
        let mask: BooleanChunked = self.column(idx).map(|v| f(v)).collect();
        ensure!(mask.len() == before, "no column at index {}", idx);
        self.df = self.df.filter(&mask)?;
        Ok(before - self.len())
    }

    /// Remove rows equal to an earlier row in every column. Returns the number removed.
    pub fn drop_duplicates(&mut self) -> Result<usize> {
        if self.width() == 0 {
            return Ok(0);
        }
        let before = self.len();
        self.df = self
            .df
            .unique_stable(None, UniqueKeepStrategy::First, None)?;
        Ok(before - self.len())
    }

    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Result {
        for name in names {
            self.df.drop_in_place(name.as_ref())?;
        }
        Ok(())
    }

    /// Replace nulls in a column with `value`. Returns the number of cells filled.
    pub fn fill_nulls(&mut self, idx: usize, value: &str) -> Result<usize> {
        let filled = self.null_count(idx);
        if filled == 0 {
            return Ok(0);
        }
        let column = {
            let values: Vec<Option<&str>> =
                self.column(idx).map(|v| Some(v.unwrap_or(value))).collect();
            Column::new(self.column_name(idx).into(), values)
        };
        self.df.with_column(column)?;
        Ok(filled)
    }
}

/// Same column names, and the same cells in every column.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.len() == other.len()
            && self.column_names().eq(other.column_names())
            && (0..self.width()).all(|idx| self.column(idx).eq(other.column(idx)))
    }
}

fn cell(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    if util::is_null_token(raw) {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Frame {
        Frame::from_text(
            ["PA_CMP", "PA_SEXO", "PA_IDADE"],
            vec![
                vec!["202501", "M", "34"],
                vec!["202501", "M", "34"],
                vec!["202502", "NA", "nan"],
                vec!["202502", "F", ""],
            ],
        )
        .unwrap()
    }

    #[test]
    fn null_tokens() {
        let frame = sample();
        assert_eq!(frame.null_count(1), 1);
        assert_eq!(frame.null_count(2), 2);
        assert_eq!(frame.null_ratio(2), 0.5);
        assert_eq!(frame.total_nulls(), 3);
    }

    #[test]
    fn kinds() {
        let frame = sample();
        assert_eq!(frame.kind(0), ColumnKind::Numeric);
        assert_eq!(frame.kind(1), ColumnKind::Text);
        assert_eq!(frame.kind(2), ColumnKind::Numeric);
    }

    #[test]
    fn duplicates_keep_first() {
        let mut frame = sample();
        assert_eq!(frame.drop_duplicates().unwrap(), 1);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.drop_duplicates().unwrap(), 0);
        let cmp: Vec<_> = frame.column(0).collect();
        assert_eq!(cmp, vec![Some("202501"), Some("202502"), Some("202502")]);
    }

    #[test]
    fn null_rows_are_duplicates() {
        let mut frame =
            Frame::from_text(["A", "B"], vec![vec!["", "x"], vec!["NA", "x"]]).unwrap();
        assert_eq!(frame.drop_duplicates().unwrap(), 1);
    }

    #[test]
    fn value_counts_order() {
        let frame = sample();
        let counts = frame.value_counts(1);
        assert_eq!(counts, vec![(ArcStr::from("M"), 2), (ArcStr::from("F"), 1)]);
    }

    #[test]
    fn retain_where_filters_rows() {
        let mut frame = sample();
        assert_eq!(frame.retain_where(2, |age| age.is_some()).unwrap(), 2);
        assert_eq!(frame.len(), 2);
        assert!(frame.retain_where(7, |_| true).is_err());
    }

    #[test]
    fn drop_and_fill() {
        let mut frame = sample();
        frame.drop_columns(&["PA_IDADE"]).unwrap();
        assert_eq!(frame.width(), 2);
        assert!(!frame.has_column("PA_IDADE"));
        assert_eq!(frame.fill_nulls(1, "Não informado").unwrap(), 1);
        assert_eq!(frame.column_name(1), "PA_SEXO");
        assert_eq!(frame.total_nulls(), 0);
        assert_eq!(frame.column(1).nth(2), Some(Some("Não informado")));
    }

    #[test]
    fn csv_round_trip_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extract.csv");
        let frame = sample();
        frame.write_csv(&path, true).unwrap();
        let raw = fs::read(&path).unwrap();
        assert!(raw.starts_with(BOM.as_bytes()));
        let back = Frame::read_csv(&path).unwrap();
        assert_eq!(back, frame);
    }
}
