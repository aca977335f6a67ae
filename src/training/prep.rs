//! Training data preparation: column cleaning, stratified split, balancing

use crate::types::{FeatureMatrix, Frame};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Drop columns whose null fraction exceeds `null_threshold`.
///
/// Returns the dropped column names in frame order.
pub fn clean_columns(frame: &mut Frame, null_threshold: f64) -> Vec<String> {
    let n = frame.n_rows();
    if n == 0 {
        return Vec::new();
    }

    let dropped: Vec<String> = frame
        .columns()
        .iter()
        .enumerate()
        .filter(|(idx, _)| {
            let nulls = frame.column(*idx).filter(|v| v.is_missing()).count();
            nulls as f64 / n as f64 > null_threshold
        })
        .map(|(_, name)| name.clone())
        .collect();

    if !dropped.is_empty() {
        frame.retain_columns(|c| !dropped.iter().any(|d| d == c));
        info!(
            dropped = dropped.len(),
            remaining = frame.columns().len(),
            null_threshold,
            "Dropped sparse columns"
        );
    }
    dropped
}

/// Indices of rows without any missing cell.
pub fn complete_rows(frame: &Frame) -> Vec<usize> {
    frame
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| row.iter().all(|v| !v.is_missing()))
        .map(|(i, _)| i)
        .collect()
}

/// Split row indices into (train, validation), keeping the class ratio of
/// `labels` in both halves. Each class contributes `round(n * test_fraction)`
/// rows to validation. Indices come back sorted.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut validation = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        members.shuffle(&mut rng);
        let take = ((members.len() as f64) * test_fraction).round() as usize;
        validation.extend_from_slice(&members[..take.min(members.len())]);
        train.extend_from_slice(&members[take.min(members.len())..]);
    }

    train.sort_unstable();
    validation.sort_unstable();
    debug!(
        train = train.len(),
        validation = validation.len(),
        test_fraction,
        "Stratified split"
    );
    (train, validation)
}

/// Random oversampling of the minority class up to parity.
///
/// Appends rows drawn with replacement from the minority class. Input with a
/// single class is returned unchanged.
pub fn oversample(x: &FeatureMatrix, y: &[u8], seed: u64) -> (FeatureMatrix, Vec<u8>) {
    let positives: Vec<usize> = (0..y.len()).filter(|&i| y[i] == 1).collect();
    let negatives: Vec<usize> = (0..y.len()).filter(|&i| y[i] != 1).collect();

    let (minority, majority_len, minority_label) = if positives.len() <= negatives.len() {
        (positives, negatives.len(), 1u8)
    } else {
        (negatives, positives.len(), 0u8)
    };
    if minority.is_empty() || minority.len() == majority_len {
        return (x.clone(), y.to_vec());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let extra = majority_len - minority.len();
    let mut out = x.clone();
    let mut labels = y.to_vec();
    out.rows.reserve(extra);
    labels.reserve(extra);
    for _ in 0..extra {
        let pick = minority[rng.gen_range(0..minority.len())];
        out.rows.push(x.rows[pick].clone());
        labels.push(minority_label);
    }

    info!(
        added = extra,
        rows = out.n_rows(),
        minority_label,
        "Oversampled minority class"
    );
    (out, labels)
}
