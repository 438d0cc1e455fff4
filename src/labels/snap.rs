use crate::dataset::frame_to_time;

/// Move `time` onto the nearest changepoint within `window_secs`, or return it
/// unchanged when none is in reach. Equidistant changepoints resolve to the
/// earlier one.
pub fn snap_to_changepoint(time: f64, changepoints: &[bool], fps: f64, window_secs: f64) -> f64 {
    if fps <= 0.0 || window_secs <= 0.0 || changepoints.is_empty() {
        return time;
    }

    // Distances are measured in frames so that ties compare exactly.
    let position = time * fps;
    let reach = window_secs * fps + 1e-9;
    let lo = (position - reach).ceil().max(0.0) as usize;
    let hi = ((position + reach).floor().max(0.0) as usize).min(changepoints.len() - 1);
    if lo > hi {
        return time;
    }

    let mut best: Option<(usize, f64)> = None;
    for frame in lo..=hi {
        if !changepoints[frame] {
            continue;
        }
        let distance = (frame as f64 - position).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((frame, distance)),
        }
    }

    best.map_or(time, |(frame, _)| frame_to_time(frame, fps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changepoints(n: usize, at: &[usize]) -> Vec<bool> {
        let mut cps = vec![false; n];
        for &i in at {
            cps[i] = true;
        }
        cps
    }

    #[test]
    fn snaps_to_nearest_in_window() {
        let cps = changepoints(100, &[19, 51]);
        assert!((snap_to_changepoint(2.0, &cps, 10.0, 0.2) - 1.9).abs() < 1e-9);
        assert!((snap_to_changepoint(5.0, &cps, 10.0, 0.2) - 5.1).abs() < 1e-9);
    }

    #[test]
    fn keeps_raw_time_outside_window() {
        let cps = changepoints(100, &[19]);
        assert_eq!(snap_to_changepoint(2.5, &cps, 10.0, 0.2), 2.5);
    }

    #[test]
    fn tie_goes_to_earlier() {
        let cps = changepoints(100, &[19, 21]);
        assert!((snap_to_changepoint(2.0, &cps, 10.0, 0.2) - 1.9).abs() < 1e-9);
    }

    #[test]
    fn window_edge_is_inclusive() {
        let cps = changepoints(100, &[22]);
        assert!((snap_to_changepoint(2.0, &cps, 10.0, 0.2) - 2.2).abs() < 1e-9);
    }
}
