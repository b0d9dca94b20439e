//! Derived measures used by the reports: production rates, bands and growth.
use crate::{
    enrich::Competence,
    range::RangeSet,
    Procedure,
};
use std::collections::BTreeMap;

/// Produced over approved quantity, in percent. Undefined when nothing was approved.
pub fn production_rate(approved: f64, produced: f64) -> Option<f64> {
    if approved == 0. {
        None
    } else {
        Some(produced / approved * 100.)
    }
}

/// Rates in this band (inclusive) are considered healthy.
pub const IDEAL_RATE: (f64, f64) = (90., 110.);

pub fn is_ideal_rate(rate: f64) -> bool {
    rate >= IDEAL_RATE.0 && rate <= IDEAL_RATE.1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RateBand {
    /// Below 80%.
    Under,
    /// 80% to 100%.
    Expected,
    /// Above 100%.
    Over,
}

impl RateBand {
    pub fn of(rate: f64) -> Self {
        if rate < 80. {
            RateBand::Under
        } else if rate <= 100. {
            RateBand::Expected
        } else {
            RateBand::Over
        }
    }
}

/// Labels for the `PA_SEXO` codes. Other codes have no label.
pub fn sex_label(code: &str) -> Option<&'static str> {
    match code {
        "M" => Some("Masculino"),
        "F" => Some("Feminino"),
        "0" => Some("Não Informado"),
        _ => None,
    }
}

/// Five year bands `0-4` to `95-99`, then `100+` (up to 150).
pub fn five_year_age_bands() -> RangeSet<f64> {
    let bounds: Vec<f64> = (0..=100).step_by(5).map(f64::from).chain([150.]).collect();
    let labels = (0..100)
        .step_by(5)
        .map(|lo| format!("{}-{}", lo, lo + 4))
        .chain(["100+".to_owned()])
        .collect();
    RangeSet::from_bounds(&bounds, false).with_labels(labels)
}

/// `0-17`, `18-39`, `40-59`, `60+`.
pub fn broad_age_bands() -> RangeSet<f64> {
    RangeSet::from_bounds(&[0., 18., 40., 60.], true).with_labels(vec![
        "0-17".into(),
        "18-39".into(),
        "40-59".into(),
        "60+".into(),
    ])
}

/// Bands for the approved value of single procedures.
pub fn value_bands() -> RangeSet<f64> {
    RangeSet::from_bounds(&[0., 10., 50., 100., 500., 1000.], true).with_labels(vec![
        "R$ 0-10".into(),
        "R$ 10-50".into(),
        "R$ 50-100".into(),
        "R$ 100-500".into(),
        "R$ 500-1000".into(),
        "R$ 1000+".into(),
    ])
}

/// Change between two observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub first: f64,
    pub last: f64,
    pub absolute: f64,
    /// 0 when `first` is 0.
    pub percent: f64,
}

impl Growth {
    pub fn between(first: f64, last: f64) -> Self {
        let percent = if first == 0. {
            0.
        } else {
            (last - first) / first * 100.
        };
        Growth {
            first,
            last,
            absolute: last - first,
            percent,
        }
    }

    /// Growth from the first to the last point of a series, `None` with fewer than 2 points.
    pub fn of_series(series: &[(u32, f64)]) -> Option<Self> {
        if series.len() < 2 {
            return None;
        }
        Some(Self::between(series[0].1, series[series.len() - 1].1))
    }
}

/// How produced compares to approved value.
pub fn verdict(approved: f64, produced: f64) -> &'static str {
    if produced > approved {
        "produced value above approved"
    } else if produced < approved {
        "produced value below approved"
    } else {
        "produced value equals approved"
    }
}

/// Age at or above which a patient counts as elderly.
pub const ELDERLY_AGE: f64 = 60.;

/// Share of procedures per competence performed on elderly patients, in percent.
pub fn elderly_share<'a>(
    records: impl IntoIterator<Item = &'a (Competence, &'a Procedure)>,
) -> Vec<(u32, f64)> {
    let mut counts: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for (competence, record) in records {
        let entry = counts.entry(competence.year_month).or_insert((0, 0));
        entry.0 += 1;
        if record.age.map_or(false, |age| age >= ELDERLY_AGE) {
            entry.1 += 1;
        }
    }
    counts
        .into_iter()
        .map(|(ym, (total, elderly))| (ym, elderly as f64 / total as f64 * 100.))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::enrich::parse_competence;

    #[test]
    fn rates() {
        assert_eq!(production_rate(0., 5.), None);
        assert_eq!(production_rate(200., 150.), Some(75.));
        assert_eq!(RateBand::of(75.), RateBand::Under);
        assert_eq!(RateBand::of(80.), RateBand::Expected);
        assert_eq!(RateBand::of(100.), RateBand::Expected);
        assert_eq!(RateBand::of(100.1), RateBand::Over);
        assert!(is_ideal_rate(90.) && is_ideal_rate(110.));
        assert!(!is_ideal_rate(89.9));
    }

    #[test]
    fn age_bands() {
        let bands = five_year_age_bands();
        assert_eq!(bands.len(), 21);
        assert_eq!(bands.label(0), "0-4");
        assert_eq!(bands.bucket_of(&4.), Some(0));
        assert_eq!(bands.bucket_of(&5.), Some(1));
        assert_eq!(bands.label(20), "100+");
        assert_eq!(bands.bucket_of(&120.), Some(20));

        let broad = broad_age_bands();
        assert_eq!(broad.bucket_of(&17.), Some(0));
        assert_eq!(broad.bucket_of(&18.), Some(1));
        assert_eq!(broad.label(broad.bucket_of(&60.).unwrap()), "60+");
    }

    #[test]
    fn growth() {
        let g = Growth::between(200., 250.);
        assert_eq!(g.absolute, 50.);
        assert_eq!(g.percent, 25.);
        assert_eq!(Growth::between(0., 10.).percent, 0.);
        assert!(Growth::of_series(&[(202501, 3.)]).is_none());
    }

    #[test]
    fn elderly() {
        let young = Procedure {
            age: Some(30.),
            ..Procedure::default()
        };
        let old = Procedure {
            age: Some(60.),
            ..Procedure::default()
        };
        let jan = parse_competence(202501).unwrap();
        let feb = parse_competence(202502).unwrap();
        let records = vec![(jan, &young), (jan, &old), (feb, &young)];
        assert_eq!(elderly_share(&records), vec![(202501, 50.), (202502, 0.)]);
    }
}
