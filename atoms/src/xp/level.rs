/// Highest reachable level; XP beyond its threshold keeps accruing but the
/// level stays here.
pub const MAX_LEVEL: u32 = 100;

/// Total XP needed to reach `level`: 0 for level 1, 5n² + 5n with n = level - 1.
pub fn xp_required(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let n = (level - 1) as u64;
    5 * n * n + 5 * n
}

/// Largest level in [1, MAX_LEVEL] whose threshold is at most `total_xp`.
pub fn level_for_xp(total_xp: u64) -> u32 {
    (1..=MAX_LEVEL)
        .rev()
        .find(|&level| xp_required(level) <= total_xp)
        .unwrap_or(1)
}

/// Fraction of the way from the current level's threshold to the next.
pub fn progress(total_xp: u64) -> f64 {
    let level = level_for_xp(total_xp);
    if level >= MAX_LEVEL {
        return 1.0;
    }
    let floor = xp_required(level);
    let ceiling = xp_required(level + 1);
    let width = ceiling.saturating_sub(floor);
    if width == 0 {
        return 1.0;
    }
    let into_band = total_xp.saturating_sub(floor) as f64;
    (into_band / width as f64).clamp(0.0, 1.0)
}

pub fn xp_to_next(total_xp: u64) -> u64 {
    let level = level_for_xp(total_xp);
    if level >= MAX_LEVEL {
        return 0;
    }
    xp_required(level + 1).saturating_sub(total_xp)
}

/// One XP per verified active minute, never negative.
pub fn xp_for_session(active_minutes: i64) -> u64 {
    active_minutes.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_strictly_increase_and_invert() {
        assert_eq!(xp_required(0), 0);
        assert_eq!(xp_required(1), 0);
        assert_eq!(xp_required(2), 10);
        assert_eq!(xp_required(3), 30);
        for level in 1..MAX_LEVEL {
            assert!(xp_required(level + 1) > xp_required(level), "level {}", level);
        }
        for level in 1..=MAX_LEVEL {
            assert_eq!(level_for_xp(xp_required(level)), level);
        }
    }

    #[test]
    fn level_is_capped() {
        assert_eq!(level_for_xp(xp_required(MAX_LEVEL)), MAX_LEVEL);
        assert_eq!(level_for_xp(u64::MAX / 2), MAX_LEVEL);
        assert_eq!(level_for_xp(u64::MAX), MAX_LEVEL);
    }

    #[test]
    fn level_band_edges() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(9), 1);
        assert_eq!(level_for_xp(10), 2);
        assert_eq!(level_for_xp(20), 2);
        assert_eq!(level_for_xp(29), 2);
        assert_eq!(level_for_xp(30), 3);
    }

    #[test]
    fn progress_and_remaining() {
        assert_eq!(progress(0), 0.0);
        assert!((progress(20) - 0.5).abs() < 1e-9);
        assert_eq!(xp_to_next(20), 10);
        assert_eq!(xp_to_next(0), 10);
        assert_eq!(progress(xp_required(MAX_LEVEL) + 5), 1.0);
        assert_eq!(xp_to_next(xp_required(MAX_LEVEL) + 5), 0);
        for xp in [0u64, 1, 15, 299, 5_000, 49_000] {
            let p = progress(xp);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn session_xp_never_negative() {
        assert_eq!(xp_for_session(-5), 0);
        assert_eq!(xp_for_session(0), 0);
        for minutes in [1i64, 25, 90, 600] {
            assert_eq!(xp_for_session(minutes), minutes as u64);
        }
    }
}
