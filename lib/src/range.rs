use itertools::Itertools;
use std::{borrow::Borrow, fmt};

/// Range where lower bound is inclusive, upper bound is exclusive or unbounded.
#[derive(Debug, Copy, Clone)]
struct Range<T>(T, Option<T>);

impl<T> Range<T>
where
    T: PartialOrd,
{
    /// `None` unless the range goes from low to high.
    fn new(from: T, to: Option<T>) -> Option<Self> {
        match &to {
            Some(to) if from >= *to => None,
            _ => Some(Range(from, to)),
        }
    }

    fn contains(&self, val: &T) -> bool {
        if let Some(end) = &self.1 {
            val >= &self.0 && val < end
        } else {
            val >= &self.0
        }
    }
}

impl<T> fmt::Display for Range<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(end) = &self.1 {
            write!(f, "{} - {}", self.0, end)
        } else {
            write!(f, "{}+", self.0)
        }
    }
}

/// An ordered list of ranges, optionally with a label for each one.
#[derive(Debug, Clone)]
pub struct RangeSet<T> {
    ranges: Vec<Range<T>>,
    labels: Vec<String>,
}

impl<T> RangeSet<T> {
    /// Attach display labels, one per range. Ranges without a label display their bounds.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl<T> RangeSet<T>
where
    T: fmt::Display,
{
    pub fn label(&self, idx: usize) -> String {
        match self.labels.get(idx) {
            Some(label) => label.clone(),
            None => self
                .ranges
                .get(idx)
                .map(|range| range.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.ranges.len()).map(|idx| self.label(idx)).collect()
    }
}

impl<T> RangeSet<T>
where
    T: PartialOrd + Clone,
{
    /// Consecutive ranges `[b0, b1), [b1, b2), ...`, the last one unbounded if `open_end`.
    ///
    /// Bounds should increase strictly. A pair that doesn't gives no range.
    pub fn from_bounds(bounds: &[T], open_end: bool) -> Self {
        let mut ranges: Vec<_> = bounds
            .iter()
            .tuple_windows()
            .filter_map(|(lo, hi)| Range::new(lo.clone(), Some(hi.clone())))
            .collect();
        if open_end {
            if let Some(last) = bounds.last().and_then(|last| Range::new(last.clone(), None)) {
                ranges.push(last);
            }
        }
        RangeSet {
            ranges,
            labels: vec![],
        }
    }
}

impl<T> RangeSet<T>
where
    T: PartialOrd,
{
    /// The index of the first range containing `value`.
    pub fn bucket_of(&self, value: &T) -> Option<usize> {
        self.ranges.iter().position(|range| range.contains(value))
    }

    pub fn bucket_values<I, B>(self, values: I) -> RangeSetCounts<T>
    where
        I: Iterator<Item = B>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0usize; self.ranges.len()];
        for value in values {
            if let Some(idx) = self.bucket_of(value.borrow()) {
                buckets[idx] += 1;
            }
        }
        RangeSetCounts {
            set: self,
            counts: buckets,
        }
    }

    /// Like `bucket_values`, but `None` and values outside every range are counted as missing.
    pub fn bucket_values_with_missing<I, B>(self, values: I) -> RangeSetCountsWithMissing<T>
    where
        I: Iterator<Item = Option<B>>,
        B: Borrow<T>,
    {
        let mut buckets = vec![0usize; self.ranges.len() + 1];
        let last = self.ranges.len();
        for value in values {
            match value.and_then(|value| self.bucket_of(value.borrow())) {
                Some(idx) => buckets[idx] += 1,
                None => buckets[last] += 1,
            }
        }
        RangeSetCountsWithMissing {
            set: self,
            counts: buckets,
        }
    }
}

/// A range set with values bucketed, and bucket sizes recorded.
pub struct RangeSetCounts<T> {
    set: RangeSet<T>,
    counts: Vec<usize>,
}

impl<T> RangeSetCounts<T> {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl<T> RangeSetCounts<T>
where
    T: fmt::Display,
{
    pub fn labelled(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(idx, count)| (self.set.label(idx), *count))
    }
}

/// A range set with values bucketed, and bucket sizes recorded.
pub struct RangeSetCountsWithMissing<T> {
    set: RangeSet<T>,
    counts: Vec<usize>,
}

impl<T> RangeSetCountsWithMissing<T> {
    pub fn missing(&self) -> usize {
        self.counts.last().copied().unwrap_or(0)
    }
}

impl<T> RangeSetCountsWithMissing<T>
where
    T: fmt::Display,
{
    pub fn for_display(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        self.counts.iter().enumerate().map(|(idx, count)| {
            let label = if idx < self.set.len() {
                self.set.label(idx)
            } else {
                "missing data".to_owned()
            };
            (label, *count)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounds_are_half_open() {
        let set = RangeSet::from_bounds(&[0., 10., 50.], true);
        assert_eq!(set.len(), 3);
        assert_eq!(set.bucket_of(&0.), Some(0));
        assert_eq!(set.bucket_of(&9.99), Some(0));
        assert_eq!(set.bucket_of(&10.), Some(1));
        assert_eq!(set.bucket_of(&1e9), Some(2));
        assert_eq!(set.bucket_of(&-1.), None);
        assert_eq!(set.labels(), vec!["0 - 10", "10 - 50", "50+"]);
    }

    #[test]
    fn bounds_that_dont_increase_give_no_range() {
        let set = RangeSet::from_bounds(&[0, 10, 10, 5, 20], false);
        assert_eq!(set.len(), 2);
        assert_eq!(set.bucket_of(&3), Some(0));
        assert_eq!(set.bucket_of(&15), Some(1));
        assert_eq!(set.bucket_of(&25), None);
    }

    #[test]
    fn missing_labels_fall_back_to_bounds() {
        let set = RangeSet::from_bounds(&[0, 18, 40], true).with_labels(vec!["young".into()]);
        assert_eq!(set.labels(), vec!["young", "18 - 40", "40+"]);
    }

    #[test]
    fn missing_values_are_counted() {
        let set = RangeSet::from_bounds(&[0u16, 18, 40], false)
            .with_labels(vec!["young".into(), "adult".into()]);
        let counts = set.bucket_values_with_missing(
            vec![Some(3u16), Some(20), None, Some(90)].into_iter(),
        );
        let shown: Vec<_> = counts.for_display().collect();
        assert_eq!(
            shown,
            vec![
                ("young".to_owned(), 1),
                ("adult".to_owned(), 1),
                ("missing data".to_owned(), 2)
            ]
        );
        assert_eq!(counts.missing(), 2);
    }
}
