//! Daily streak transition.
//!
//! `transition` is pure: callers own the idempotency guard (one completion per
//! user per day) and persistence. Applying it twice for the same date counts twice.

use chrono::{Days, NaiveDate};

use crate::domain::StreakState;

/// New state after a completion recorded on `date`.
pub fn transition(prior: Option<&StreakState>, date: NaiveDate) -> StreakState {
  let Some(prior) = prior else {
    return StreakState {
      current_streak: 1,
      longest_streak: 1,
      last_completed_date: Some(date),
      total_completions: 1,
    };
  };

  let yesterday = date.checked_sub_days(Days::new(1));
  let current_streak = match prior.last_completed_date {
    Some(last) if Some(last) == yesterday => prior.current_streak.saturating_add(1),
    // Same-day re-entry. Only reachable if the storage guard was bypassed.
    Some(last) if last == date => prior.current_streak.max(1),
    _ => 1,
  };

  StreakState {
    current_streak,
    longest_streak: prior.longest_streak.max(current_streak),
    last_completed_date: Some(date),
    total_completions: prior.total_completions.saturating_add(1),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn prior() -> StreakState {
    StreakState {
      current_streak: 3,
      longest_streak: 5,
      last_completed_date: Some(d("2024-03-10")),
      total_completions: 20,
    }
  }

  #[test]
  fn first_completion_starts_at_one() {
    for date in ["2024-01-01", "2024-02-29", "1999-12-31"] {
      let date = d(date);
      assert_eq!(
        transition(None, date),
        StreakState {
          current_streak: 1,
          longest_streak: 1,
          last_completed_date: Some(date),
          total_completions: 1,
        }
      );
    }
  }

  #[test]
  fn consecutive_day_extends_streak() {
    assert_eq!(
      transition(Some(&prior()), d("2024-03-11")),
      StreakState {
        current_streak: 4,
        longest_streak: 5,
        last_completed_date: Some(d("2024-03-11")),
        total_completions: 21,
      }
    );
  }

  #[test]
  fn gap_resets_streak() {
    assert_eq!(
      transition(Some(&prior()), d("2024-03-14")),
      StreakState {
        current_streak: 1,
        longest_streak: 5,
        last_completed_date: Some(d("2024-03-14")),
        total_completions: 21,
      }
    );
    // Two days later is already a gap.
    assert_eq!(transition(Some(&prior()), d("2024-03-12")).current_streak, 1);
  }

  #[test]
  fn extending_past_longest_raises_longest() {
    let p = StreakState { current_streak: 5, ..prior() };
    let next = transition(Some(&p), d("2024-03-11"));
    assert_eq!(next.current_streak, 6);
    assert_eq!(next.longest_streak, 6);
  }

  #[test]
  fn same_day_reentry_keeps_current_but_counts_total() {
    let next = transition(Some(&prior()), d("2024-03-10"));
    assert_eq!(next.current_streak, 3);
    assert_eq!(next.longest_streak, 5);
    assert_eq!(next.total_completions, 21);
  }

  #[test]
  fn missing_last_date_resets() {
    let p = StreakState { last_completed_date: None, ..prior() };
    assert_eq!(transition(Some(&p), d("2024-03-11")).current_streak, 1);
  }

  #[test]
  fn streak_continues_across_year_and_leap_boundaries() {
    let p = StreakState { last_completed_date: Some(d("2023-12-31")), ..prior() };
    assert_eq!(transition(Some(&p), d("2024-01-01")).current_streak, 4);
    let p = StreakState { last_completed_date: Some(d("2024-02-28")), ..prior() };
    assert_eq!(transition(Some(&p), d("2024-02-29")).current_streak, 4);
    assert_eq!(transition(Some(&p), d("2024-03-01")).current_streak, 1);
  }

  #[test]
  fn invariants_hold_over_a_grid_of_priors() {
    let date = d("2024-06-15");
    for current in 0..6u32 {
      for extra in 0..4u32 {
        for offset in 0..5u64 {
          let p = StreakState {
            current_streak: current,
            longest_streak: current + extra,
            last_completed_date: date.checked_sub_days(Days::new(offset)),
            total_completions: current + extra * 2,
          };
          let next = transition(Some(&p), date);
          assert!(next.total_completions > p.total_completions);
          assert!(next.longest_streak >= next.current_streak);
          assert!(next.longest_streak >= p.longest_streak);
          assert!(next.current_streak >= 1);
          assert_eq!(next.last_completed_date, Some(date));
        }
      }
    }
  }

  #[test]
  fn counters_saturate() {
    let p = StreakState {
      current_streak: u32::MAX,
      longest_streak: u32::MAX,
      last_completed_date: Some(d("2024-03-10")),
      total_completions: u32::MAX,
    };
    let next = transition(Some(&p), d("2024-03-11"));
    assert_eq!(next.current_streak, u32::MAX);
    assert_eq!(next.total_completions, u32::MAX);
  }
}
