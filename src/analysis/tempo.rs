/// Tempo from the median inter-onset interval, considering only intervals that
/// map to 60-200 BPM. `None` when there is nothing to go on.
pub fn estimate_tempo(onsets: &[f64]) -> Option<f32> {
    if onsets.len() < 2 {
        return None;
    }

    // 60-200 BPM → 0.3-1.0s
    let mut reasonable: Vec<f64> = onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (0.3..=1.0).contains(&i))
        .collect();

    if reasonable.is_empty() {
        return None;
    }

    reasonable.sort_by(f64::total_cmp);
    let median_interval = reasonable[reasonable.len() / 2];

    Some((60.0 / median_interval) as f32)
}
