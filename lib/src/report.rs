//! The group, rank, render pipeline shared by the reports.
use crate::{
    chart::{self, Bar, Orientation},
    enrich::parse_competence,
    share, Procedure, Result,
};
use itertools::Itertools;
use std::{cmp::Ordering, collections::BTreeMap, path::Path};

/// What a ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Number of records.
    Count,
    /// Sum of the value.
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    HorizontalBar,
    VerticalBar,
    Pie,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankEntry<K> {
    pub key: K,
    pub count: usize,
    pub total: f64,
}

impl<K> RankEntry<K> {
    pub fn value(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Count => self.count as f64,
            Measure::Total => self.total,
        }
    }

    /// `total / count`.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.total / self.count as f64
        }
    }
}

/// Records grouped by a key, largest first.
#[derive(Debug, Clone)]
pub struct Ranking<K> {
    entries: Vec<RankEntry<K>>,
    measure: Measure,
    count: usize,
    total: f64,
}

impl<K: Ord + Clone> Ranking<K> {
    /// Group `items` by `key`, counting them and summing `value`. Items without a key are
    /// skipped. Entries are sorted by `measure`, descending, with ties in key order.
    pub fn build<'a, T: 'a>(
        items: impl IntoIterator<Item = &'a T>,
        key: impl Fn(&T) -> Option<K>,
        value: impl Fn(&T) -> f64,
        measure: Measure,
    ) -> Self {
        let mut groups: BTreeMap<K, (usize, f64)> = BTreeMap::new();
        for item in items {
            if let Some(k) = key(item) {
                let group = groups.entry(k).or_insert((0, 0.));
                group.0 += 1;
                group.1 += value(item);
            }
        }
        let count: usize = groups.values().map(|(c, _)| c).sum();
        let total: f64 = groups.values().map(|(_, t)| t).sum();
        // the sort is stable, so equal entries stay in key order
        let entries = groups
            .into_iter()
            .map(|(key, (count, total))| RankEntry { key, count, total })
            .sorted_by(|a, b| {
                b.value(measure)
                    .partial_cmp(&a.value(measure))
                    .unwrap_or(Ordering::Equal)
            })
            .collect();
        Ranking {
            entries,
            measure,
            count,
            total,
        }
    }

    pub fn get(&self, key: &K) -> Option<&RankEntry<K>> {
        self.entries.iter().find(|e| &e.key == key)
    }
}

impl<K> Ranking<K> {
    pub fn entries(&self) -> &[RankEntry<K>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn measure(&self) -> Measure {
        self.measure
    }

    /// The first `n` entries (or all of them if there are fewer).
    pub fn top(&self, n: usize) -> &[RankEntry<K>] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Number of records with a key.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of the values of records with a key.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// The entry's part of the ranked measure, in percent.
    pub fn share(&self, entry: &RankEntry<K>) -> f64 {
        match self.measure {
            Measure::Count => share(entry.count as f64, self.count as f64),
            Measure::Total => share(entry.total, self.total),
        }
    }

    /// Chart the top `n` entries by the ranked measure.
    pub fn render(
        &self,
        kind: ChartKind,
        n: usize,
        path: &Path,
        title: &str,
        label: impl Fn(&K) -> String,
        value_desc: &str,
    ) -> Result {
        let top = self.top(n);
        match kind {
            ChartKind::Pie => {
                let slices: Vec<_> = top
                    .iter()
                    .map(|e| (label(&e.key), e.value(self.measure)))
                    .collect();
                chart::pie_chart(path, title, &slices)
            }
            ChartKind::HorizontalBar | ChartKind::VerticalBar => {
                let bars: Vec<_> = top
                    .iter()
                    .map(|e| Bar::new(label(&e.key), e.value(self.measure)))
                    .collect();
                let orientation = if kind == ChartKind::HorizontalBar {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                };
                chart::bar_chart(path, title, &bars, orientation, value_desc, &[])
            }
        }
    }
}

/// Totals of the records billed in one competence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Month {
    pub year_month: u32,
    pub count: usize,
    pub approved: f64,
    pub produced: f64,
}

impl Month {
    pub fn difference(&self) -> f64 {
        self.produced - self.approved
    }

    /// Approved value per procedure.
    pub fn average_cost(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.approved / self.count as f64
        }
    }
}

/// Records grouped by competence, in calendar order. Records without a valid competence are
/// left out.
pub fn monthly<'a>(records: impl IntoIterator<Item = &'a Procedure>) -> Vec<Month> {
    let mut months: BTreeMap<u32, Month> = BTreeMap::new();
    for record in records {
        let Some(competence) = record.competence.and_then(parse_competence) else {
            continue;
        };
        let month = months.entry(competence.year_month).or_insert(Month {
            year_month: competence.year_month,
            ..Month::default()
        });
        month.count += 1;
        month.approved += record.approved();
        month.produced += record.produced();
    }
    months.into_values().collect()
}

/// The last `n` items of a slice.
pub fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(procedure: &str, competence: u32, approved: f64) -> Procedure {
        Procedure {
            competence: Some(competence),
            procedure_code: Some(procedure.into()),
            approved_value: Some(approved),
            produced_value: Some(approved * 2.),
            ..Procedure::default()
        }
    }

    #[test]
    fn ranking_by_count() {
        let records = vec![
            record("b", 202501, 1.),
            record("a", 202501, 1.),
            record("c", 202502, 50.),
            record("c", 202502, 5.),
            Procedure::default(),
        ];
        let ranking = Ranking::build(
            &records,
            |r: &Procedure| r.procedure_code.clone(),
            Procedure::approved,
            Measure::Count,
        );
        let keys: Vec<&str> = ranking.entries().iter().map(|e| &*e.key).collect();
        // ties in key order, the record without a code is skipped
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(ranking.count(), 4);
        assert_eq!(ranking.total(), 57.);
        assert_eq!(ranking.top(1)[0].total, 55.);
        assert_eq!(ranking.top(10).len(), 3);
        assert_eq!(ranking.share(&ranking.entries()[0]), 50.);
        assert_eq!(ranking.entries()[0].average(), 27.5);
    }

    #[test]
    fn ranking_by_total() {
        let records = vec![
            record("a", 202501, 1.),
            record("a", 202501, 1.),
            record("b", 202501, 10.),
        ];
        let ranking = Ranking::build(
            &records,
            |r: &Procedure| r.procedure_code.clone(),
            Procedure::approved,
            Measure::Total,
        );
        assert_eq!(&*ranking.entries()[0].key, "b");
        assert!((ranking.share(&ranking.entries()[0]) - 83.333).abs() < 1e-3);
        assert_eq!(ranking.get(&"a".into()).map(|e| e.count), Some(2));
    }

    #[test]
    fn months_in_order() {
        let records = vec![
            record("a", 202503, 10.),
            record("a", 202501, 10.),
            record("a", 202501, 20.),
            record("a", 202513, 99.),
        ];
        let months = monthly(&records);
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].year_month, 202501);
        assert_eq!(months[0].count, 2);
        assert_eq!(months[0].approved, 30.);
        assert_eq!(months[0].difference(), 30.);
        assert_eq!(months[0].average_cost(), 15.);
        assert_eq!(last_n(&months, 1)[0].year_month, 202503);
        assert_eq!(last_n(&months, 5).len(), 2);
    }
}
