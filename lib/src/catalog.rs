//! Reference tables: procedure, municipality, facility and disease-code catalogs, plus the time
//! dimension.
//!
//! Codes are normalized on load so they join against the normalized codes of the procedure
//! records.
use crate::{
    config::DbConfig,
    db::{self, TableQuery},
    enrich::{normalize_code, normalize_disease_code},
    ArcStr, Context, Result,
};
use qu::ick_use::*;
use serde::{de::DeserializeOwned, Deserialize};
use std::{collections::BTreeMap, ops::Deref, path::Path, sync::Arc};

pub const PROCEDURE_CODE_WIDTH: usize = 10;
pub const FACILITY_CODE_WIDTH: usize = 7;
pub const MUNICIPALITY_CODE_WIDTH: usize = 6;

/// Where reference tables are read from.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceSource<'a> {
    Database(&'a DbConfig),
    /// A directory holding `<table>.csv` files with the database's column names.
    Files(&'a Path),
}

impl ReferenceSource<'_> {
    /// Load the rows of a table. Failures are logged and give no rows.
    fn rows<T>(&self, query: TableQuery) -> Vec<T>
    where
        T: DeserializeOwned + for<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> + Send + Unpin,
    {
        match self {
            ReferenceSource::Database(config) => db::fetch_or_empty(config, &query),
            ReferenceSource::Files(dir) => {
                let path = dir.join(format!("{}.csv", query.table));
                match load_csv_rows(&path) {
                    Ok(rows) => {
                        event!(
                            Level::INFO,
                            "loaded {} rows from \"{}\"",
                            rows.len(),
                            path.display()
                        );
                        rows
                    }
                    Err(error) => {
                        event!(Level::ERROR, "{:#}", error);
                        vec![]
                    }
                }
            }
        }
    }
}

fn load_csv_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("while loading \"{}\"", path.display()))
}

/// An entry in a catalog, identified by its normalized code.
pub trait CatalogEntry {
    fn code(&self) -> &str;
    fn description(&self) -> Option<&str>;
}

/// A reference table with an index on the code. When a code appears twice the first entry wins.
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    els: Arc<Vec<T>>,
    code_idx: BTreeMap<ArcStr, usize>,
}

impl<T: CatalogEntry> Catalog<T> {
    pub fn new(els: Vec<T>) -> Self {
        let mut code_idx = BTreeMap::new();
        for (idx, el) in els.iter().enumerate() {
            code_idx.entry(ArcStr::from(el.code())).or_insert(idx);
        }
        Catalog {
            els: Arc::new(els),
            code_idx,
        }
    }

    pub fn get(&self, code: &str) -> Option<&T> {
        let idx = self.code_idx.get(code)?;
        self.els.get(*idx)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.code_idx.contains_key(code)
    }

    /// The description for a code, if the code is known and has one.
    pub fn describe(&self, code: &str) -> Option<&str> {
        self.get(code)?.description()
    }
}

impl<T> Deref for Catalog<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

impl<T: CatalogEntry> FromIterator<T> for Catalog<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self::new(iter.into_iter().collect())
    }
}

fn text(value: Option<String>) -> Option<ArcStr> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .map(ArcStr::from)
}

/// A padded code, `None` for a missing or blank value.
fn code(value: Option<String>, width: usize) -> Option<ArcStr> {
    text(value).map(|v| normalize_code(&v, width).into())
}

// Procedures (SIGTAP)

#[derive(Debug, Deserialize, sqlx::FromRow)]
struct ProcedureRow {
    ip_cod: Option<String>,
    ip_dscr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcedureEntry {
    pub code: ArcStr,
    pub description: Option<ArcStr>,
}

impl CatalogEntry for ProcedureEntry {
    fn code(&self) -> &str {
        &self.code
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

pub type ProcedureCatalog = Catalog<ProcedureEntry>;

impl ProcedureCatalog {
    pub fn load(source: ReferenceSource) -> Self {
        source
            .rows::<ProcedureRow>(TableQuery::new("tb_sigtaw", &["ip_cod", "ip_dscr"]))
            .into_iter()
            .filter_map(|row| {
                Some(ProcedureEntry {
                    code: code(row.ip_cod, PROCEDURE_CODE_WIDTH)?,
                    description: text(row.ip_dscr),
                })
            })
            .collect()
    }
}

// Municipalities

#[derive(Debug, Deserialize, sqlx::FromRow)]
struct MunicipalityRow {
    co_municip: Option<String>,
    ds_nome: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MunicipalityEntry {
    pub code: ArcStr,
    pub name: Option<ArcStr>,
}

impl CatalogEntry for MunicipalityEntry {
    fn code(&self) -> &str {
        &self.code
    }
    fn description(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

pub type MunicipalityCatalog = Catalog<MunicipalityEntry>;

impl MunicipalityCatalog {
    /// Active municipalities only.
    pub fn load(source: ReferenceSource) -> Self {
        let query = TableQuery::new("tb_municip", &["co_municip", "ds_nome"])
            .with_filter("co_status = 'ATIVO'");
        source
            .rows::<MunicipalityRow>(query)
            .into_iter()
            .filter_map(|row| {
                Some(MunicipalityEntry {
                    code: code(row.co_municip, MUNICIPALITY_CODE_WIDTH)?,
                    name: text(row.ds_nome),
                })
            })
            .collect()
    }
}

// Facilities (CNES)

#[derive(Debug, Deserialize, sqlx::FromRow)]
struct FacilityRow {
    cnes: Option<String>,
    fantasia: Option<String>,
    raz_soci: Option<String>,
    codufmun: Option<String>,
    bairro: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FacilityEntry {
    pub code: ArcStr,
    pub trade_name: Option<ArcStr>,
    pub legal_name: Option<ArcStr>,
    pub municipality: Option<ArcStr>,
    pub neighbourhood: Option<ArcStr>,
}

impl FacilityEntry {
    /// The trade name, falling back to the legal name.
    pub fn name(&self) -> Option<&str> {
        self.trade_name.as_deref().or(self.legal_name.as_deref())
    }
}

impl CatalogEntry for FacilityEntry {
    fn code(&self) -> &str {
        &self.code
    }
    fn description(&self) -> Option<&str> {
        self.name()
    }
}

pub type FacilityCatalog = Catalog<FacilityEntry>;

impl FacilityCatalog {
    /// Facilities that haven't been removed from the registry.
    pub fn load(source: ReferenceSource) -> Self {
        let query = TableQuery::new(
            "cadgerrs",
            &["cnes", "fantasia", "raz_soci", "codufmun", "bairro"],
        )
        .with_filter("excluido = 0");
        source
            .rows::<FacilityRow>(query)
            .into_iter()
            .filter_map(|row| {
                Some(FacilityEntry {
                    code: code(row.cnes, FACILITY_CODE_WIDTH)?,
                    trade_name: text(row.fantasia),
                    legal_name: text(row.raz_soci),
                    municipality: code(row.codufmun, MUNICIPALITY_CODE_WIDTH),
                    neighbourhood: text(row.bairro),
                })
            })
            .collect()
    }
}

// Disease codes (CID)

#[derive(Debug, Deserialize, sqlx::FromRow)]
struct DiseaseRow {
    cd_cod: Option<String>,
    cd_descr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiseaseEntry {
    pub code: ArcStr,
    pub description: Option<ArcStr>,
}

impl CatalogEntry for DiseaseEntry {
    fn code(&self) -> &str {
        &self.code
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

pub type DiseaseCatalog = Catalog<DiseaseEntry>;

impl DiseaseCatalog {
    pub fn load(source: ReferenceSource) -> Self {
        source
            .rows::<DiseaseRow>(TableQuery::new("s_cid", &["cd_cod", "cd_descr"]))
            .into_iter()
            .filter_map(|row| {
                Some(DiseaseEntry {
                    code: text(row.cd_cod).map(|c| normalize_disease_code(&c).into())?,
                    description: text(row.cd_descr),
                })
            })
            .collect()
    }
}

// Time dimension

#[derive(Debug, Deserialize, sqlx::FromRow)]
struct TimeRow {
    anomes: Option<String>,
    mes: Option<String>,
    mesext: Option<String>,
    ano: Option<String>,
    triex_t: Option<String>,
    anotri: Option<String>,
}

/// Calendar attributes of one year-month.
#[derive(Debug, Clone)]
pub struct TimeEntry {
    pub year_month: u32,
    pub month: Option<u32>,
    pub month_name: Option<ArcStr>,
    pub year: Option<i32>,
    pub quarter: Option<ArcStr>,
    pub year_quarter: Option<ArcStr>,
}

/// The `dimtempo` table, keyed by year-month (`YYYYMM`).
#[derive(Debug, Clone, Default)]
pub struct TimeDimension {
    by_year_month: BTreeMap<u32, TimeEntry>,
}

impl TimeDimension {
    pub fn load(source: ReferenceSource) -> Self {
        let query = TableQuery::new(
            "dimtempo",
            &["anomes", "mes", "mesext", "ano", "triex_t", "anotri"],
        );
        let mut skipped = 0;
        let entries = source
            .rows::<TimeRow>(query)
            .into_iter()
            .filter_map(|row| {
                let year_month = row.anomes.as_deref().and_then(crate::util::parse_year_month);
                if year_month.is_none() {
                    skipped += 1;
                }
                Some(TimeEntry {
                    year_month: year_month?,
                    month: row.mes.as_deref().and_then(crate::util::parse_year_month),
                    month_name: text(row.mesext),
                    year: row.ano.and_then(|y| y.trim().parse().ok()),
                    quarter: text(row.triex_t),
                    year_quarter: text(row.anotri),
                })
            })
            .collect::<Vec<_>>();
        if skipped > 0 {
            event!(
                Level::WARN,
                "skipped {} time dimension rows without a valid year-month",
                skipped
            );
        }
        Self::new(entries)
    }

    pub fn new(entries: impl IntoIterator<Item = TimeEntry>) -> Self {
        let mut by_year_month = BTreeMap::new();
        for entry in entries {
            by_year_month.entry(entry.year_month).or_insert(entry);
        }
        Self { by_year_month }
    }

    pub fn get(&self, year_month: u32) -> Option<&TimeEntry> {
        self.by_year_month.get(&year_month)
    }

    pub fn len(&self) -> usize {
        self.by_year_month.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_year_month.is_empty()
    }

    /// e.g. `Março/2025`, falling back to `2025-03` when the month is unknown.
    pub fn month_label(&self, year_month: u32) -> String {
        match self.get(year_month) {
            Some(TimeEntry {
                month_name: Some(name),
                ..
            }) => format!("{}/{}", name, year_month / 100),
            _ => crate::enrich::competence_label(year_month),
        }
    }

    /// e.g. `1º Trimestre/2025`, falling back to `2025-Q1`.
    pub fn quarter_label(&self, year_month: u32) -> String {
        match self.get(year_month) {
            Some(TimeEntry {
                quarter: Some(quarter),
                ..
            }) => format!("{}/{}", quarter, year_month / 100),
            _ => format!("{}-Q{}", year_month / 100, (year_month % 100 + 2) / 3),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn first_entry_wins() {
        let catalog: DiseaseCatalog = vec![
            DiseaseEntry {
                code: "A00".into(),
                description: Some("Cólera".into()),
            },
            DiseaseEntry {
                code: "A00".into(),
                description: Some("duplicate".into()),
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(catalog.describe("A00"), Some("Cólera"));
        assert_eq!(catalog.len(), 2);
        assert!(!catalog.contains("B00"));
    }

    #[test]
    fn facility_name_falls_back_to_legal_name() {
        let facility = FacilityEntry {
            code: "2245426".into(),
            trade_name: None,
            legal_name: Some("HOSPITAL DE CARIDADE".into()),
            municipality: None,
            neighbourhood: None,
        };
        assert_eq!(facility.name(), Some("HOSPITAL DE CARIDADE"));
    }

    #[test]
    fn blank_codes_are_missing() {
        assert_eq!(code(Some("".into()), MUNICIPALITY_CODE_WIDTH), None);
        assert_eq!(code(Some("   ".into()), MUNICIPALITY_CODE_WIDTH), None);
        assert_eq!(code(None, MUNICIPALITY_CODE_WIDTH), None);
        assert_eq!(
            code(Some(" 42054 ".into()), MUNICIPALITY_CODE_WIDTH).as_deref(),
            Some("042054")
        );
    }

    #[test]
    fn facility_without_municipality() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cadgerrs.csv"),
            "cnes,fantasia,raz_soci,codufmun,bairro
2245426,HOSPITAL,,,CENTRO
12,POSTO,,420540,
",
        )
        .unwrap();
        let facilities = FacilityCatalog::load(ReferenceSource::Files(dir.path()));
        assert_eq!(facilities.len(), 2);
        assert_eq!(facilities.get("2245426").unwrap().municipality, None);
        assert_eq!(
            facilities.get("0000012").unwrap().municipality.as_deref(),
            Some("420540")
        );
    }

    #[test]
    fn loads_and_normalizes_from_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tb_sigtaw.csv"),
            "ip_cod,ip_dscr\n301010072,CONSULTA MEDICA EM ATENCAO ESPECIALIZADA\n,NO CODE\n",
        )
        .unwrap();
        fs::write(dir.path().join("s_cid.csv"), "cd_cod,cd_descr\n c50 ,NEOPLASIA\n").unwrap();
        let source = ReferenceSource::Files(dir.path());

        let procedures = ProcedureCatalog::load(source);
        assert_eq!(procedures.len(), 1);
        assert_eq!(
            procedures.describe("0301010072"),
            Some("CONSULTA MEDICA EM ATENCAO ESPECIALIZADA")
        );
        let diseases = DiseaseCatalog::load(source);
        assert!(diseases.contains("C50"));
        // missing file degrades to an empty catalog
        assert!(MunicipalityCatalog::load(source).is_empty());
    }

    #[test]
    fn time_labels() {
        let time = TimeDimension::new(vec![TimeEntry {
            year_month: 202503,
            month: Some(3),
            month_name: Some("Março".into()),
            year: Some(2025),
            quarter: Some("1º Trimestre".into()),
            year_quarter: Some("20251".into()),
        }]);
        assert_eq!(time.month_label(202503), "Março/2025");
        assert_eq!(time.month_label(202504), "2025-04");
        assert_eq!(time.quarter_label(202503), "1º Trimestre/2025");
        assert_eq!(time.quarter_label(202511), "2025-Q4");
    }
}
