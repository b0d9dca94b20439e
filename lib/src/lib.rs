pub mod areas;
pub mod catalog;
pub mod chart;
pub mod clean;
pub mod config;
pub mod db;
pub mod enrich;
pub mod frame;
pub mod measures;
mod range;
pub mod report;
pub mod stats;
mod util;
pub mod validate;

pub use anyhow::{Context, Error};
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::BTreeSet, ops::Deref, path::Path, sync::Arc};

pub use crate::{
    config::Config,
    range::{RangeSet, RangeSetCounts, RangeSetCountsWithMissing},
    util::{
        describe, header, money, percent, row, share, subheader, table_with_header, truncate,
    },
};
use crate::{
    catalog::{FACILITY_CODE_WIDTH, MUNICIPALITY_CODE_WIDTH, PROCEDURE_CODE_WIDTH},
    enrich::{normalize_code, normalize_disease_code},
    util::{lenient_f64, lenient_year_month, optional_string},
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;

/// What missing text is replaced with during cleaning.
pub const NOT_INFORMED: &str = "Não informado";
/// What missing numbers are replaced with during cleaning.
pub const NUMERIC_FILL: &str = "-1";

/// Column names in the `pars` extract.
pub mod columns {
    pub const COMPETENCE: &str = "PA_CMP";
    pub const AGE: &str = "PA_IDADE";
    pub const SEX: &str = "PA_SEXO";
    pub const DISEASE: &str = "PA_CIDPRI";
    pub const PROCEDURE: &str = "PA_PROC_ID";
    pub const FACILITY: &str = "PA_CODUNI";
    pub const RESIDENCE: &str = "PA_MUNPCN";
    pub const FACILITY_MUNICIPALITY: &str = "PA_UFMUN";
    pub const APPROVED_VALUE: &str = "PA_VALAPR";
    pub const PRODUCED_VALUE: &str = "PA_VALPRO";
    pub const APPROVED_QUANTITY: &str = "PA_QTDAPR";
    pub const PRODUCED_QUANTITY: &str = "PA_QTDPRO";

    /// Columns a cleaned dataset must have to be analysed at all.
    pub const REQUIRED: &[&str] = &[
        COMPETENCE,
        PROCEDURE,
        FACILITY,
        AGE,
        SEX,
        APPROVED_VALUE,
        PRODUCED_VALUE,
    ];
}

/// A row in the cleaned procedures dataset: one billed ambulatory procedure.
///
/// Columns that cleaning may have dropped for being too sparse are `#[serde(default)]`; use
/// `Procedures::has_column` to tell a dropped column from one that is present but empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Procedure {
    /// Billing period, `YYYYMM`.
    #[serde(rename = "PA_CMP", deserialize_with = "lenient_year_month")]
    pub competence: Option<u32>,
    #[serde(rename = "PA_IDADE", deserialize_with = "lenient_f64")]
    pub age: Option<f64>,
    #[serde(rename = "PA_SEXO", deserialize_with = "optional_string")]
    pub sex: Option<ArcStr>,
    #[serde(rename = "PA_CIDPRI", default, deserialize_with = "optional_string")]
    pub disease_code: Option<ArcStr>,
    #[serde(rename = "PA_PROC_ID", deserialize_with = "optional_string")]
    pub procedure_code: Option<ArcStr>,
    /// CNES of the performing facility.
    #[serde(rename = "PA_CODUNI", deserialize_with = "optional_string")]
    pub facility_code: Option<ArcStr>,
    /// Municipality the patient lives in.
    #[serde(rename = "PA_MUNPCN", default, deserialize_with = "optional_string")]
    pub residence_code: Option<ArcStr>,
    #[serde(rename = "PA_UFMUN", default, deserialize_with = "optional_string")]
    pub facility_municipality: Option<ArcStr>,
    #[serde(rename = "PA_VALAPR", deserialize_with = "lenient_f64")]
    pub approved_value: Option<f64>,
    #[serde(rename = "PA_VALPRO", deserialize_with = "lenient_f64")]
    pub produced_value: Option<f64>,
    #[serde(rename = "PA_QTDAPR", default, deserialize_with = "lenient_f64")]
    pub approved_quantity: Option<f64>,
    #[serde(rename = "PA_QTDPRO", default, deserialize_with = "lenient_f64")]
    pub produced_quantity: Option<f64>,
}

impl Procedure {
    pub fn approved(&self) -> f64 {
        self.approved_value.unwrap_or(0.)
    }

    pub fn produced(&self) -> f64 {
        self.produced_value.unwrap_or(0.)
    }

    /// A copy with every code column normalized for joining against the catalogs.
    pub fn normalized(&self) -> Self {
        fn norm(code: &Option<ArcStr>, f: impl Fn(&str) -> String) -> Option<ArcStr> {
            code.as_ref().map(|code| {
                if is_placeholder(code) {
                    code.clone()
                } else {
                    f(code).into()
                }
            })
        }
        Procedure {
            disease_code: norm(&self.disease_code, normalize_disease_code),
            procedure_code: norm(&self.procedure_code, |c| {
                normalize_code(c, PROCEDURE_CODE_WIDTH)
            }),
            facility_code: norm(&self.facility_code, |c| {
                normalize_code(c, FACILITY_CODE_WIDTH)
            }),
            residence_code: norm(&self.residence_code, |c| {
                normalize_code(c, MUNICIPALITY_CODE_WIDTH)
            }),
            facility_municipality: norm(&self.facility_municipality, |c| {
                normalize_code(c, MUNICIPALITY_CODE_WIDTH)
            }),
            ..self.clone()
        }
    }
}

/// Values written by cleaning in place of missing data.
pub fn is_placeholder(value: &str) -> bool {
    value == NOT_INFORMED || value == NUMERIC_FILL
}

/// The cleaned procedures dataset, along with the columns the file had.
#[derive(Debug, Clone)]
pub struct Procedures {
    els: Arc<Vec<Procedure>>,
    columns: Arc<BTreeSet<ArcStr>>,
}

impl Procedures {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fn inner(path: &Path) -> Result<Procedures> {
            let (columns, els) = load_csv::<Procedure>(path)?;
            for required in columns::REQUIRED {
                ensure!(
                    columns.contains(*required),
                    "required column `{}` is missing",
                    required
                );
            }
            Ok(Procedures::new(columns, els))
        }
        let path = path.as_ref();
        let procedures = inner(path)
            .with_context(|| format!("unable to load procedures from \"{}\"", path.display()))?;
        event!(
            Level::INFO,
            "loaded {} procedures from \"{}\"",
            procedures.len(),
            path.display()
        );
        Ok(procedures)
    }

    pub fn new(columns: BTreeSet<ArcStr>, els: Vec<Procedure>) -> Self {
        Procedures {
            els: Arc::new(els),
            columns: Arc::new(columns),
        }
    }

    /// Whether the source file had the column, even if every value is empty.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Like `has_column`, but logs that `section` is skipped when the column is missing.
    pub fn require_column(&self, name: &str, section: &str) -> bool {
        let present = self.has_column(name);
        if !present {
            event!(
                Level::WARN,
                "column `{}` is missing, skipping {}",
                name,
                section
            );
        }
        present
    }

    /// A copy with codes normalized (see `Procedure::normalized`).
    pub fn with_normalized_codes(&self) -> Self {
        Procedures {
            els: Arc::new(self.els.iter().map(Procedure::normalized).collect()),
            columns: self.columns.clone(),
        }
    }

    /// Get a `Procedures` object containing only records that match the filter.
    pub fn filter(&self, f: impl Fn(&Procedure) -> bool) -> Self {
        Procedures {
            els: Arc::new(self.els.iter().filter(|p| f(p)).cloned().collect()),
            columns: self.columns.clone(),
        }
    }

    pub fn total_approved(&self) -> f64 {
        self.els.iter().map(Procedure::approved).sum()
    }

    pub fn total_produced(&self) -> f64 {
        self.els.iter().map(Procedure::produced).sum()
    }

    /// The first and last competence present.
    pub fn period(&self) -> Option<(u32, u32)> {
        let mut competences = self.els.iter().filter_map(|p| p.competence);
        let first = competences.next()?;
        Some(competences.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
    }
}

impl Deref for Procedures {
    type Target = [Procedure];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl<'a> IntoIterator for &'a Procedures {
    type IntoIter = <&'a [Procedure] as IntoIterator>::IntoIter;
    type Item = &'a Procedure;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

/// Load a CSV file with a header row, returning the column names and the deserialized rows.
///
/// A leading byte order mark is ignored.
pub fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<(BTreeSet<ArcStr>, Vec<T>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut headers = reader.headers()?.clone();
    if let Some(first) = headers.get(0) {
        if first.starts_with('\u{feff}') {
            headers = headers
                .iter()
                .enumerate()
                .map(|(idx, h)| if idx == 0 { h.trim_start_matches('\u{feff}') } else { h })
                .collect();
            reader.set_headers(headers.clone());
        }
    }
    let columns = headers.iter().map(ArcStr::from).collect();
    let rows = reader
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("while loading \"{}\"", path.display()))?;
    Ok((columns, rows))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    const CLEAN: &str = "\
PA_CMP,PA_PROC_ID,PA_CODUNI,PA_IDADE,PA_SEXO,PA_VALAPR,PA_VALPRO,PA_MUNPCN,EXTRA
202501,301010072,2245426,34,M,10.5,12,431020,x
202502,Não informado,2245426,abc,F,,7,-1,y
";

    #[test]
    fn load_cleaned_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.csv");
        fs::write(&path, CLEAN).unwrap();
        let procs = Procedures::load(&path).unwrap();
        assert_eq!(procs.len(), 2);
        assert!(procs.has_column(columns::RESIDENCE));
        assert!(!procs.has_column(columns::DISEASE));
        assert_eq!(procs[0].competence, Some(202501));
        assert_eq!(procs[1].age, None);
        assert_eq!(procs[1].approved_value, None);
        assert_eq!(procs.total_approved(), 10.5);
        assert_eq!(procs.total_produced(), 19.);
        assert_eq!(procs.period(), Some((202501, 202502)));

        let norm = procs.with_normalized_codes();
        assert_eq!(norm[0].procedure_code.as_deref(), Some("0301010072"));
        assert_eq!(norm[1].procedure_code.as_deref(), Some(NOT_INFORMED));
        assert_eq!(norm[1].residence_code.as_deref(), Some("-1"));
        // the source collection is untouched
        assert_eq!(procs[0].procedure_code.as_deref(), Some("301010072"));
    }

    #[test]
    fn missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.csv");
        fs::write(&path, "PA_CMP,PA_IDADE\n202501,3\n").unwrap();
        let error = Procedures::load(&path).unwrap_err();
        assert!(format!("{:#}", error).contains("PA_PROC_ID"));
    }

    #[test]
    fn bom_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        fs::write(&path, format!("\u{feff}{}", CLEAN)).unwrap();
        let procs = Procedures::load(&path).unwrap();
        assert!(procs.has_column(columns::COMPETENCE));
        assert_eq!(procs[0].competence, Some(202501));
    }
}
