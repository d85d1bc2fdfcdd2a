//! Deterministic daily question rotation.
//!
//! Every user sees the same question per dimension on a given date; the pool index
//! is `day_of_year % 5` with Jan 1 as day 1. The index restarts from day-of-year
//! each January, so the 5-day phase shifts by `days_in_previous_year % 5` at year
//! boundaries.

use chrono::{Datelike, NaiveDate};

use crate::domain::{DailyQuestion, Dimension};
use crate::seeds::{question_pool, POOL_SIZE};

/// 1-based day of the year (Jan 1 = 1).
pub fn day_of_year(date: NaiveDate) -> u32 {
  date.ordinal()
}

pub fn rotation_index(date: NaiveDate) -> usize {
  day_of_year(date) as usize % POOL_SIZE
}

/// One question per dimension, in `Dimension::ALL` order.
pub fn select_for_date(date: NaiveDate) -> Vec<DailyQuestion> {
  let idx = rotation_index(date);
  Dimension::ALL
    .into_iter()
    .map(|dim| DailyQuestion {
      id: format!("{}_{}", dim.id(), idx),
      dimension_id: dim.id(),
      dimension_label: dim.label(),
      dimension_icon: dim.icon(),
      text: question_pool(dim)[idx],
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Days;

  fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  #[test]
  fn jan_first_is_day_one() {
    assert_eq!(day_of_year(d("2024-01-01")), 1);
    assert_eq!(rotation_index(d("2024-01-01")), 1);
    assert_eq!(day_of_year(d("2024-12-31")), 366);
  }

  #[test]
  fn day_seven_selects_index_two_everywhere() {
    let date = d("2024-01-07");
    assert_eq!(day_of_year(date), 7);
    let picked = select_for_date(date);
    assert_eq!(picked.len(), 5);
    for (q, dim) in picked.iter().zip(Dimension::ALL) {
      assert_eq!(q.id, format!("{}_2", dim.id()));
      assert_eq!(q.text, question_pool(dim)[2]);
      assert_eq!(q.dimension_label, dim.label());
    }
  }

  #[test]
  fn selection_is_deterministic() {
    let date = d("2025-08-19");
    assert_eq!(select_for_date(date), select_for_date(date));
  }

  #[test]
  fn cycles_every_five_days_within_a_year() {
    let mut date = d("2024-01-01");
    while let Some(later) = date.checked_add_days(Days::new(5)) {
      if later.year() != date.year() {
        break;
      }
      assert_eq!(select_for_date(date), select_for_date(later));
      date = date.succ_opt().unwrap();
    }
  }

  #[test]
  fn covers_whole_pool_over_five_days() {
    let start = d("2024-04-01");
    let mut seen: Vec<usize> = (0..5)
      .map(|i| rotation_index(start.checked_add_days(Days::new(i)).unwrap()))
      .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn phase_shifts_across_year_boundary() {
    // 365 % 5 == 0: crossing out of a common year keeps the phase.
    assert_eq!(rotation_index(d("2023-12-31")), 0);
    assert_eq!(rotation_index(d("2024-01-01")), 1);
    // Leap year: Dec 31 is day 366 (index 1) and Jan 1 is index 1 again.
    assert_eq!(rotation_index(d("2024-12-31")), 1);
    assert_eq!(rotation_index(d("2025-01-01")), 1);
  }
}
