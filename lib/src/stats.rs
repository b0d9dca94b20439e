//! Descriptive statistics and peak/trough detection.
use statrs::statistics::{Data, Median, Statistics};

/// Summary statistics of a sample. The standard deviation is the sample (n - 1) one, 0 for a
/// single value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty sample.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let std_dev = if values.len() > 1 {
            Statistics::std_dev(values.iter())
        } else {
            0.
        };
        Some(Summary {
            count: values.len(),
            total: values.iter().sum(),
            mean: Statistics::mean(values.iter()),
            median: Data::new(values.to_vec()).median(),
            std_dev,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Points of a series unusually far from its mean.
#[derive(Debug, Clone)]
pub struct PeakTrough<K> {
    pub mean: f64,
    pub std_dev: f64,
    /// Points above `mean + n * std_dev`.
    pub peaks: Vec<(K, f64)>,
    /// Points below `mean - n * std_dev`.
    pub troughs: Vec<(K, f64)>,
}

impl<K> PeakTrough<K> {
    /// How far `value` is from the mean, in percent of the mean.
    pub fn deviation(&self, value: f64) -> f64 {
        if self.mean == 0. {
            0.
        } else {
            (value - self.mean) / self.mean * 100.
        }
    }
}

/// Split out the points more than `n_std` standard deviations from the mean. Points exactly on
/// the threshold are in neither set. `None` for an empty series.
pub fn peaks_and_troughs<K: Clone>(series: &[(K, f64)], n_std: f64) -> Option<PeakTrough<K>> {
    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let summary = Summary::of(&values)?;
    let upper = summary.mean + n_std * summary.std_dev;
    let lower = summary.mean - n_std * summary.std_dev;
    let pick = |keep: &dyn Fn(f64) -> bool| {
        series
            .iter()
            .filter(|(_, v)| keep(*v))
            .cloned()
            .collect::<Vec<_>>()
    };
    Some(PeakTrough {
        mean: summary.mean,
        std_dev: summary.std_dev,
        peaks: pick(&|v| v > upper),
        troughs: pick(&|v| v < lower),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary() {
        let s = Summary::of(&[2., 4., 4., 4., 5., 5., 7., 9.]).unwrap();
        assert_eq!(s.count, 8);
        assert_eq!(s.total, 40.);
        assert_eq!(s.mean, 5.);
        assert_eq!(s.median, 4.5);
        assert_eq!((s.min, s.max), (2., 9.));
        assert!((s.std_dev - 2.138_089_935).abs() < 1e-6);
        assert!(Summary::of(&[]).is_none());
        assert_eq!(Summary::of(&[3.]).unwrap().std_dev, 0.);
    }

    #[test]
    fn threshold_points_are_not_flagged() {
        // mean 2, sample std dev exactly 1
        let series = vec![("a", 1.), ("b", 2.), ("c", 3.)];
        let pt = peaks_and_troughs(&series, 1.).unwrap();
        assert_eq!(pt.mean, 2.);
        assert_eq!(pt.std_dev, 1.);
        assert!(pt.peaks.is_empty());
        assert!(pt.troughs.is_empty());
    }

    #[test]
    fn outlier_is_a_peak_only() {
        let series = vec![(1, 10.), (2, 10.), (3, 10.), (4, 10.), (5, 100.)];
        let pt = peaks_and_troughs(&series, 1.).unwrap();
        assert_eq!(pt.peaks, vec![(5, 100.)]);
        assert!(pt.troughs.is_empty());
        assert!((pt.deviation(100.) - 257.142_857).abs() < 1e-4);
    }
}
