//! Helpers that derive fields and attach descriptions to coded values.
use crate::{
    catalog::{Catalog, CatalogEntry},
    ArcStr, Procedure, Procedures,
};
use chrono::{Duration, NaiveDate};

/// Trim, upper-case and left-pad with zeros to `width`. Longer codes are left as they are.
pub fn normalize_code(code: &str, width: usize) -> String {
    let code = code.trim().to_uppercase();
    format!("{:0>width$}", code, width = width)
}

/// Disease codes are compared trimmed and upper-cased, but never padded.
pub fn normalize_disease_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Pair each item with the catalog description of its code.
///
/// Every item is kept, in order. Items whose code is missing or unknown get `None`.
pub fn join_descriptions<'a, T, E>(
    items: impl IntoIterator<Item = &'a T>,
    code: impl Fn(&T) -> Option<&str>,
    catalog: &Catalog<E>,
) -> Vec<(&'a T, Option<ArcStr>)>
where
    T: 'a,
    E: CatalogEntry,
{
    items
        .into_iter()
        .map(|item| {
            let description = code(item)
                .and_then(|code| catalog.describe(code))
                .map(ArcStr::from);
            (item, description)
        })
        .collect()
}

/// `202503` -> `"2025-03"`.
pub fn competence_label(year_month: u32) -> String {
    format!("{:04}-{:02}", year_month / 100, year_month % 100)
}

/// A year-month code resolved to a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Competence {
    /// The first day of the month.
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub year_month: u32,
}

/// `None` unless the code names a real month.
pub fn parse_competence(year_month: u32) -> Option<Competence> {
    let year = i32::try_from(year_month / 100).ok()?;
    let month = year_month % 100;
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(Competence {
        date,
        year,
        month,
        year_month,
    })
}

/// Records paired with their parsed competence. Records without a valid one are dropped.
pub fn with_competence(procedures: &Procedures) -> Vec<(Competence, &Procedure)> {
    procedures
        .iter()
        .filter_map(|record| Some((parse_competence(record.competence?)?, record)))
        .collect()
}

/// Items from the last 30, 90 and 365 days before the latest date present.
#[derive(Debug)]
pub struct RecentWindows<T> {
    /// Number of items the windows were drawn from.
    pub dated: usize,
    pub latest: NaiveDate,
    pub last_30: Vec<T>,
    pub last_90: Vec<T>,
    pub last_365: Vec<T>,
}

/// The windows overlap and include their lower bound. `None` if there are no items.
pub fn recent_windows<T: Clone>(
    items: &[T],
    date: impl Fn(&T) -> NaiveDate,
) -> Option<RecentWindows<T>> {
    let latest = items.iter().map(&date).max()?;
    let since = |days: i64| {
        let from = latest - Duration::days(days);
        items
            .iter()
            .filter(|item| date(*item) >= from)
            .cloned()
            .collect::<Vec<_>>()
    };
    Some(RecentWindows {
        dated: items.len(),
        latest,
        last_30: since(30),
        last_90: since(90),
        last_365: since(365),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ProcedureEntry;

    #[test]
    fn normalize() {
        assert_eq!(normalize_code(" 12 ", 5), "00012");
        assert_eq!(normalize_code("ab3", 5), "00AB3");
        assert_eq!(normalize_code("1234567", 5), "1234567");
        assert_eq!(normalize_disease_code(" c50 "), "C50");
    }

    #[test]
    fn unmatched_codes_keep_their_row() {
        let catalog: Catalog<ProcedureEntry> = vec![ProcedureEntry {
            code: "XYZ".into(),
            description: Some("known".into()),
        }]
        .into_iter()
        .collect();
        let rows = vec!["ABC", "XYZ"];
        let joined = join_descriptions(rows.iter(), |r| Some(*r), &catalog);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].1, None);
        assert_eq!(joined[1].1.as_deref(), Some("known"));
    }

    #[test]
    fn competence() {
        assert_eq!(competence_label(202503), "2025-03");
        let c = parse_competence(202503).unwrap();
        assert_eq!((c.year, c.month), (2025, 3));
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert!(parse_competence(202513).is_none());
        assert!(parse_competence(0).is_none());
    }

    #[test]
    fn windows_are_inclusive() {
        let d = |m, day| NaiveDate::from_ymd_opt(2025, m, day).unwrap();
        let dates = vec![d(1, 1), d(10, 2), d(11, 30), d(12, 31)];
        let windows = recent_windows(&dates, |d| *d).unwrap();
        assert_eq!(windows.latest, d(12, 31));
        // 2025-11-30 is 31 days before, 2025-10-02 exactly 90.
        assert_eq!(windows.last_30, vec![d(12, 31)]);
        assert_eq!(windows.last_90, vec![d(10, 2), d(11, 30), d(12, 31)]);
        assert_eq!(windows.last_365.len(), 4);
        assert_eq!(windows.dated, 4);
        assert!(recent_windows(&[] as &[NaiveDate], |d| *d).is_none());
    }

    #[test]
    fn windows_only_count_dated_records() {
        let record = |competence| Procedure {
            competence,
            ..Procedure::default()
        };
        let procedures = Procedures::new(
            Default::default(),
            vec![record(Some(202512)), record(Some(202599)), record(None)],
        );
        let dated = with_competence(&procedures);
        assert_eq!(dated.len(), 1);
        let windows = recent_windows(&dated, |(c, _): &(Competence, &Procedure)| c.date).unwrap();
        assert_eq!(windows.dated, 1);
        assert_eq!(windows.last_365.len(), 1);
        assert_eq!(procedures.len(), 3);
    }
}
