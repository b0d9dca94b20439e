//! Settings shared by every binary.
//!
//! Built-in defaults are overlaid by an optional TOML file, then database settings are taken from
//! the environment (a `.env` file is honoured).
use crate::{catalog::ReferenceSource, util, Context, Result};
use qu::ick_use::*;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Environment variable pointing at a config file.
pub const CONFIG_VAR: &str = "ANALYSIS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "analysis.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            database: "datasus_db".into(),
            user: "root".into(),
            password: String::new(),
        }
    }
}

impl DbConfig {
    /// Override settings from `DB_*` variables. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result {
        if let Some(host) = lookup("DB_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT should be a port number, found \"{}\"", port))?;
        }
        if let Some(database) = lookup("DB_DATABASE") {
            self.database = database;
        }
        if let Some(user) = lookup("DB_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.password = password;
        }
        Ok(())
    }
}

/// A municipality we extract and analyse records for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Municipality {
    pub name: String,
    /// 6-digit IBGE code, as found in `PA_UFMUN`/`PA_MUNPCN`.
    pub code: String,
    /// Raw extract file name, relative to `data_dir`.
    pub raw_file: PathBuf,
    /// Cleaned dataset file name, relative to `data_dir`.
    pub clean_file: PathBuf,
}

impl Municipality {
    fn new(name: &str, code: &str, raw_file: &str, clean_file: &str) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            raw_file: raw_file.into(),
            clean_file: clean_file.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DbConfig,
    pub data_dir: PathBuf,
    pub charts_dir: PathBuf,
    /// When set, reference tables are read from `<reference_dir>/<table>.csv`.
    pub reference_dir: Option<PathBuf>,
    /// Only records from this year survive cleaning.
    pub target_year: i32,
    pub home: Municipality,
    pub comparisons: Vec<Municipality>,
}

impl Default for Config {
    fn default() -> Self {
        let home = Municipality::new("Ijuí", "431020", "dados_pars.csv", "dados_limpos.csv");
        Self {
            database: DbConfig::default(),
            data_dir: "data".into(),
            charts_dir: "charts".into(),
            reference_dir: None,
            target_year: 2025,
            comparisons: vec![
                home.clone(),
                Municipality::new(
                    "Santa Rosa",
                    "431720",
                    "dados_pars_sr.csv",
                    "dados_limpos_sr.csv",
                ),
                Municipality::new(
                    "Cruz Alta",
                    "430610",
                    "dados_pars_ca.csv",
                    "dados_limpos_ca.csv",
                ),
            ],
            home,
        }
    }
}

impl Config {
    /// Defaults, then the config file if there is one, then the environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = match env::var(CONFIG_VAR) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if util::path_exists(&path)? {
                    Some(path)
                } else {
                    None
                }
            }
        };
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.database.apply_env(|name| env::var(name).ok())?;
        event!(
            Level::DEBUG,
            "using database {}@{}:{}/{}",
            config.database.user,
            config.database.host,
            config.database.port,
            config.database.database
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config from \"{}\"", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in config \"{}\"", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn raw_path(&self, municipality: &Municipality) -> PathBuf {
        self.data_dir.join(&municipality.raw_file)
    }

    pub fn clean_path(&self, municipality: &Municipality) -> PathBuf {
        self.data_dir.join(&municipality.clean_file)
    }

    /// Where a report's charts go.
    pub fn chart_dir(&self, report: &str) -> PathBuf {
        self.charts_dir.join(report)
    }

    /// Find a configured municipality by IBGE code.
    pub fn municipality(&self, code: &str) -> Option<&Municipality> {
        std::iter::once(&self.home)
            .chain(self.comparisons.iter())
            .find(|m| m.code == code)
    }

    pub fn reference_source(&self) -> ReferenceSource<'_> {
        match &self.reference_dir {
            Some(dir) => ReferenceSource::Files(dir),
            None => ReferenceSource::Database(&self.database),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.database.port, 3306);
        assert_eq!(config.database.database, "datasus_db");
        assert_eq!(config.target_year, 2025);
        assert_eq!(config.home.code, "431020");
        assert_eq!(config.comparisons.len(), 3);
        assert_eq!(
            config.clean_path(&config.home),
            Path::new("data").join("dados_limpos.csv")
        );
    }

    #[test]
    fn toml_overlay_keeps_unset_defaults() {
        let config = Config::from_toml(
            r#"
            target_year = 2024
            charts_dir = "out"

            [database]
            host = "db.internal"
            "#,
        )
        .unwrap();
        assert_eq!(config.target_year, 2024);
        assert_eq!(config.charts_dir, PathBuf::from("out"));
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.user, "root");
        assert_eq!(config.home.name, "Ijuí");
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [("DB_HOST", "mysql"), ("DB_PORT", "3307")].into();
        let mut db = DbConfig::default();
        db.apply_env(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(db.host, "mysql");
        assert_eq!(db.port, 3307);

        let mut db = DbConfig::default();
        assert!(db.apply_env(|_| Some("not a port".into())).is_err());
    }

    #[test]
    fn find_municipality() {
        let config = Config::default();
        assert_eq!(config.municipality("431720").unwrap().name, "Santa Rosa");
        assert!(config.municipality("000000").is_none());
    }
}
