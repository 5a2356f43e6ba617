use crate::models::ActivityRecord;

/// Valid submissions per recorded day, oldest day first.
pub fn daily_completion_counts(records: &[ActivityRecord]) -> Vec<u32> {
    let mut ordered: Vec<&ActivityRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.date);
    ordered
        .into_iter()
        .map(|record| record.valid_submission_count() as u32)
        .collect()
}

/// Compares the mean of the later half of the series against the earlier
/// half. With an odd length the later half holds the extra point. Ties and
/// series shorter than two points are not an improvement.
pub fn progress_improved(counts: &[u32]) -> bool {
    if counts.len() < 2 {
        return false;
    }

    let (first, second) = counts.split_at(counts.len() / 2);
    mean(second) > mean(first)
}

fn mean(values: &[u32]) -> f64 {
    let total: f64 = values.iter().map(|&v| f64::from(v)).sum();
    total / values.len() as f64
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::SubmissionEntry;

    #[test]
    fn short_series_never_improve() {
        assert!(!progress_improved(&[]));
        assert!(!progress_improved(&[0]));
        assert!(!progress_improved(&[9]));
    }

    #[test]
    fn compares_half_means() {
        assert!(progress_improved(&[1, 3]));
        assert!(!progress_improved(&[3, 1]));
        assert!(!progress_improved(&[2, 2, 2, 2]));
        // [1] vs [2, 0]: 1.0 vs 1.0
        assert!(!progress_improved(&[1, 2, 0]));
        // [1] vs [1, 2]: 1.0 vs 1.5
        assert!(progress_improved(&[1, 1, 2]));
        // [0, 0] vs [0, 0, 1]
        assert!(progress_improved(&[0, 0, 0, 0, 1]));
    }

    #[test]
    fn counts_follow_date_order() {
        let day = |d| NaiveDate::from_ymd_opt(2026, 4, d).unwrap();
        let record = |d, links: &[Option<&str>]| ActivityRecord {
            student_id: "s1".to_string(),
            date: day(d),
            submissions: links
                .iter()
                .map(|link| SubmissionEntry {
                    submission_type: "homework".to_string(),
                    question_number: 1,
                    link: link.map(str::to_string),
                    feedback: None,
                })
                .collect(),
        };
        let records = vec![
            record(9, &[Some("https://x/1"), Some("https://x/2")]),
            record(2, &[None]),
            record(5, &[Some("https://x/3"), Some("")]),
        ];
        assert_eq!(daily_completion_counts(&records), vec![0, 1, 2]);
    }
}
