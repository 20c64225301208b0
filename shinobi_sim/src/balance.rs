// Game balance formulas.
//
// Pure functions of levels, elapsed time, and (where noted) the engine's
// PRNG. Kept apart from the reducers so the curves can be tested on their
// own. Tunables that designers touch often live in `GameConfig`; the curve
// shapes here are fixed.

use crate::prng::GameRng;

/// Logistic function.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Chance that a unit resolves a task successfully.
///
/// Logistic in the level difference, shifted by `ln 3` so that a unit at
/// exactly the task's level succeeds 75% of the time.
pub fn task_success_chance(unit_level: u32, task_level: u32) -> f64 {
    let diff = f64::from(unit_level) - f64::from(task_level);
    sigmoid(diff + 3f64.ln())
}

/// Mean experience for a successful task before jitter. Higher task levels
/// pay more; each level the unit is above the task cuts the reward by 15%.
pub fn base_task_experience(unit_level: u32, task_level: u32) -> f64 {
    let overlevel = unit_level.saturating_sub(task_level);
    5.0 * (1.0 + f64::from(task_level)).powf(1.15) * 0.85f64.powi(overlevel as i32)
}

/// Experience granted for a successful task: the base value jittered by
/// ±15%, rounded up.
pub fn task_experience_gain(unit_level: u32, task_level: u32, rng: &mut GameRng) -> u64 {
    let gain = rng.deviate(base_task_experience(unit_level, task_level), 0.15);
    gain.ceil().max(0.0) as u64
}

/// Points carried by a pool task of the given level.
pub fn task_points(level: u32, rng: &mut GameRng) -> u64 {
    let base = 25.0 * 1.25f64.powi(level as i32);
    rng.deviate(base, 0.10).round().max(0.0) as u64
}

/// Points needed to graduate a trainee of the given level.
pub fn graduation_cost(level: u32) -> u64 {
    (5.0 * 1.25f64.powi(level as i32)).round() as u64
}

/// Scale factor for village task rewards and durations. Harder villages
/// and missions grow it; stronger units shrink it.
pub fn activity_rate(base_difficulty: u32, difficulty: u32, unit_level: u32) -> f64 {
    let exponent = i64::from(base_difficulty) + i64::from(difficulty) - i64::from(unit_level) - 1;
    1.1f64.powi(exponent.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

/// Points paid out when a village task completes.
pub fn village_task_points(rate: f64, rng: &mut GameRng) -> u64 {
    rng.deviate(5.0 * rate, 0.15).round().max(0.0) as u64
}

/// Ticks a village task takes. Always at least one.
pub fn village_task_ticks(rate: f64, rng: &mut GameRng) -> u64 {
    (rng.deviate(15.0 * rate, 0.15).round() as u64).max(1)
}

/// Ambient points per second yielded by one affiliated unit.
pub fn ambient_rate(points_per_second: f64, level_multiplier: f64, level: u32) -> f64 {
    points_per_second * level_multiplier.powi(level as i32)
}

/// How many items a recurring generator should produce on this firing.
///
/// Proportional to the time actually elapsed since the previous firing, so
/// a late or missed timer catches up, but never fewer than one and never
/// more than fit in `window_ms` (anything older would already have
/// expired).
pub fn batch_size(elapsed_ms: u64, interval_ms: u64, window_ms: u64) -> usize {
    let interval = interval_ms.max(1) as f64;
    let upper = (window_ms as f64 / interval).max(1.0);
    let ratio = elapsed_ms as f64 / interval;
    ratio.max(1.0).min(upper).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matched_levels_succeed_three_times_in_four() {
        let chance = task_success_chance(2, 2);
        assert!((chance - 0.75).abs() < 1e-12, "chance was {chance}");
    }

    #[test]
    fn success_chance_is_monotone_and_open() {
        let mut prev = 0.0;
        for unit_level in 0..=30u32 {
            let chance = task_success_chance(unit_level, 15);
            assert!(chance > 0.0 && chance < 1.0, "chance {chance} at {unit_level}");
            assert!(chance > prev);
            prev = chance;
        }
        // Harder tasks are never easier.
        for task_level in 0..10u32 {
            assert!(task_success_chance(5, task_level) > task_success_chance(5, task_level + 1));
        }
    }

    #[test]
    fn experience_drops_with_overlevel() {
        let mut prev = f64::INFINITY;
        for unit_level in 3..12u32 {
            let base = base_task_experience(unit_level, 3);
            assert!(base >= 0.0);
            assert!(base < prev);
            prev = base;
        }
        // Being underleveled earns no bonus.
        assert_eq!(base_task_experience(0, 3), base_task_experience(3, 3));
    }

    #[test]
    fn level_one_task_pays_nine_to_thirteen() {
        let mut rng = GameRng::new(11);
        for _ in 0..5_000 {
            let gain = task_experience_gain(1, 1, &mut rng);
            assert!((9..=13).contains(&gain), "gain was {gain}");
        }
    }

    #[test]
    fn graduation_cost_curve() {
        assert_eq!(graduation_cost(0), 5);
        assert_eq!(graduation_cost(1), 6);
        assert_eq!(graduation_cost(2), 8);
        assert_eq!(graduation_cost(10), 47);
    }

    #[test]
    fn task_points_stay_within_ten_percent() {
        let mut rng = GameRng::new(4);
        for level in 0..=3 {
            let base = 25.0 * 1.25f64.powi(level as i32);
            for _ in 0..500 {
                let points = task_points(level, &mut rng) as f64;
                assert!(points >= (base * 0.9).floor() && points <= (base * 1.1).ceil());
            }
        }
    }

    #[test]
    fn activity_rate_balances_levels() {
        // Base 1, difficulty 1, level 1: exponent 0.
        assert_eq!(activity_rate(1, 1, 1), 1.0);
        assert!(activity_rate(1, 1, 5) < 1.0);
        assert!(activity_rate(3, 2, 1) > 1.0);
        let mut rng = GameRng::new(8);
        for _ in 0..500 {
            let ticks = village_task_ticks(1.0, &mut rng);
            assert!((13..=17).contains(&ticks), "ticks {ticks}");
            assert!(village_task_ticks(0.0, &mut rng) >= 1);
        }
    }

    #[test]
    fn ambient_rate_scales_by_level() {
        assert_eq!(ambient_rate(1.0, 1.25, 0), 1.0);
        assert!((ambient_rate(1.0, 1.25, 2) - 1.5625).abs() < 1e-12);
    }

    #[test]
    fn batch_size_tracks_elapsed_time() {
        // On time: one item.
        assert_eq!(batch_size(5_000, 5_000, 30_000), 1);
        // Early firing still produces one.
        assert_eq!(batch_size(100, 5_000, 30_000), 1);
        // Three intervals late: three items.
        assert_eq!(batch_size(15_000, 5_000, 30_000), 3);
        // Suspended for an hour: capped at what fits in the window.
        assert_eq!(batch_size(3_600_000, 5_000, 30_000), 6);
        // Window shorter than the interval never drops below one.
        assert_eq!(batch_size(50_000, 5_000, 1_000), 1);
    }
}
