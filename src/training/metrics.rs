use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;

/// Shuffle `0..n` with `seed` and hold out `test_fraction` of it.
/// Returns (train indices, test indices). The test side gets at least one row
/// whenever there are two or more rows.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut n_test = (n as f64 * test_fraction).ceil() as usize;
    if n >= 2 {
        n_test = n_test.clamp(1, n - 1);
    } else {
        n_test = 0;
    }

    let test = indices.split_off(n - n_test);
    (indices, test)
}

/// Fraction of predictions equal to their label
pub fn accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(actual)
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / actual.len() as f64
}

/// Mean negative log-likelihood of the true class
pub fn log_loss(probabilities: &[Vec<f64>], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let total: f64 = probabilities
        .iter()
        .zip(actual)
        .map(|(probs, &label)| {
            let p = probs.get(label).copied().unwrap_or(0.0).clamp(1e-15, 1.0);
            -p.ln()
        })
        .sum();
    total / actual.len() as f64
}

/// Counts of (actual, predicted) pairs
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(labels: &[&str], predicted: &[usize], actual: &[usize]) -> Self {
        let k = labels.len();
        let mut counts = vec![vec![0; k]; k];
        for (&p, &a) in predicted.iter().zip(actual) {
            if p < k && a < k {
                counts[a][p] += 1;
            }
        }
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            counts,
        }
    }

    pub fn count(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual][predicted]
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(|l| l.len()).max().unwrap_or(0).max(6);
        write!(f, "{:>width$}", "actual", width = width)?;
        for label in &self.labels {
            write!(f, " {:>width$}", label, width = width)?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{:>width$}", label, width = width)?;
            for count in row {
                write!(f, " {:>width$}", count, width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_and_determinism() {
        let (train, test) = train_test_split(100, 0.2, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        assert_eq!(train_test_split(100, 0.2, 42), (train, test));
        assert_ne!(train_test_split(100, 0.2, 7).1, train_test_split(100, 0.2, 42).1);
    }

    #[test]
    fn test_split_edge_cases() {
        assert_eq!(train_test_split(0, 0.2, 1), (vec![], vec![]));
        assert_eq!(train_test_split(1, 0.2, 1).1.len(), 0);
        assert_eq!(train_test_split(3, 0.2, 1).1.len(), 1);
    }

    #[test]
    fn test_accuracy_and_log_loss() {
        assert_eq!(accuracy(&[0, 1, 2, 1], &[0, 1, 1, 1]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);

        let perfect = log_loss(&[vec![1.0, 0.0], vec![0.0, 1.0]], &[0, 1]);
        assert!(perfect < 1e-12);
        let uniform = log_loss(&[vec![1.0 / 3.0; 3]], &[2]);
        assert!((uniform - 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix() {
        let cm = ConfusionMatrix::new(&["H", "D", "A"], &[0, 0, 2, 1], &[0, 1, 2, 2]);
        assert_eq!(cm.count(0, 0), 1);
        assert_eq!(cm.count(1, 0), 1);
        assert_eq!(cm.count(2, 1), 1);
        let rendered = cm.to_string();
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.contains("actual"));
    }
}
