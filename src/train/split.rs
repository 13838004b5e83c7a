//! Stratified train/test partitioning.

use crate::error::TrainError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Row indices of each partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split rows so each class keeps its proportion in both partitions.
///
/// Every class contributes `round(n_class * test_size)` rows to the test
/// partition, clamped so it keeps at least one row on each side. The same
/// seed always yields the same partition.
pub fn stratified_split(y: &[usize], test_size: f64, seed: u64) -> Result<SplitIndices, TrainError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainError::Split(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &class) in y.iter().enumerate() {
        by_class.entry(class).or_default().push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();

    for (class, mut rows) in by_class {
        if rows.len() < 2 {
            return Err(TrainError::Split(format!(
                "class {class} has {} row(s); at least 2 are needed to appear in both partitions",
                rows.len()
            )));
        }
        rows.shuffle(&mut rng);

        let n_test = ((rows.len() as f64 * test_size).round() as usize).clamp(1, rows.len() - 1);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn imbalanced(n: usize, positive_every: usize) -> Vec<usize> {
        (0..n).map(|i| usize::from(i % positive_every == 0)).collect()
    }

    #[test]
    fn test_preserves_minority_proportion() {
        // ~11.7% positive, like the bank marketing data
        let y: Vec<usize> = (0..4521).map(|i| usize::from(i % 1000 < 117)).collect();
        let full_rate = y.iter().sum::<usize>() as f64 / y.len() as f64;

        let split = stratified_split(&y, 0.2, 42).unwrap();

        let rate = |rows: &[usize]| rows.iter().map(|&r| y[r]).sum::<usize>() as f64 / rows.len() as f64;
        assert!((rate(&split.test) - full_rate).abs() < 0.005);
        assert!((rate(&split.train) - full_rate).abs() < 0.005);
        assert!((split.test.len() as f64 / y.len() as f64 - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let y = imbalanced(200, 7);
        let split = stratified_split(&y, 0.25, 7).unwrap();

        let train: HashSet<_> = split.train.iter().copied().collect();
        let test: HashSet<_> = split.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), y.len());
    }

    #[test]
    fn test_seed_is_deterministic() {
        let y = imbalanced(100, 5);
        assert_eq!(
            stratified_split(&y, 0.2, 1).unwrap(),
            stratified_split(&y, 0.2, 1).unwrap()
        );
        assert_ne!(
            stratified_split(&y, 0.2, 1).unwrap().test,
            stratified_split(&y, 0.2, 2).unwrap().test
        );
    }

    #[test]
    fn test_tiny_class_keeps_a_row_on_each_side() {
        let y = vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let split = stratified_split(&y, 0.1, 3).unwrap();
        assert_eq!(split.test.iter().filter(|&&r| y[r] == 1).count(), 1);
        assert_eq!(split.train.iter().filter(|&&r| y[r] == 1).count(), 1);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let y = vec![0, 0, 0, 1];
        assert!(matches!(
            stratified_split(&y, 0.5, 0),
            Err(TrainError::Split(_))
        ));
    }
}
