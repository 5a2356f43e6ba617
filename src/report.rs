use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::follow::FollowPartition;
use crate::models::{ClassSummary, RiskRow, StoredEvaluation};
use crate::scanner::window_start;

pub fn summarize_by_class(rows: &[RiskRow]) -> Vec<ClassSummary> {
    // class name -> (at risk, never submitted, summed days, dated rows)
    let mut map: HashMap<String, (usize, usize, i64, usize)> = HashMap::new();

    for row in rows {
        let entry = map.entry(row.class_name.clone()).or_insert((0, 0, 0, 0));
        entry.0 += 1;
        match row.days_since_last_submission {
            Some(days) => {
                entry.2 += days;
                entry.3 += 1;
            }
            None => entry.1 += 1,
        }
    }

    let mut summaries: Vec<ClassSummary> = map
        .into_iter()
        .map(
            |(class_name, (at_risk_count, never_submitted, total_days, dated))| ClassSummary {
                class_name,
                at_risk_count,
                never_submitted,
                avg_days_since_submission: if dated == 0 {
                    None
                } else {
                    Some(total_days as f64 / dated as f64)
                },
            },
        )
        .collect();

    summaries.sort_by(|a, b| {
        b.at_risk_count
            .cmp(&a.at_risk_count)
            .then_with(|| a.class_name.cmp(&b.class_name))
    });
    summaries
}

pub fn describe_gap(row: &RiskRow) -> String {
    match (row.last_submission_date, row.days_since_last_submission) {
        (Some(date), Some(days)) => format!("last submitted {date} ({days} days ago)"),
        _ => "never submitted".to_string(),
    }
}

fn write_rows(output: &mut String, rows: &[RiskRow], empty: &str) {
    if rows.is_empty() {
        let _ = writeln!(output, "{empty}");
        return;
    }

    for row in rows {
        let _ = writeln!(
            output,
            "- {} ({}, {}) {}",
            row.student_name,
            row.student_email,
            row.class_name,
            describe_gap(row)
        );
    }
}

pub fn build_missing_homework_report(
    scope: Option<&str>,
    lookback_days: i64,
    today: NaiveDate,
    partition: &FollowPartition,
) -> String {
    let all_rows: Vec<RiskRow> = partition
        .followed
        .iter()
        .chain(partition.muted.iter())
        .cloned()
        .collect();
    let summaries = summarize_by_class(&all_rows);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all classes");

    let _ = writeln!(output, "# Missing Homework Report");
    let _ = writeln!(
        output,
        "Generated for {} (no valid submission since {}, {} day window)",
        scope_label,
        window_start(today, lookback_days),
        lookback_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## By Class");

    if summaries.is_empty() {
        let _ = writeln!(output, "Every student submitted within this window.");
    } else {
        for summary in summaries.iter() {
            let average = summary
                .avg_days_since_submission
                .map(|days| format!("{days:.1}"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {}: {} students ({} never submitted, avg {} days since last)",
                summary.class_name, summary.at_risk_count, summary.never_submitted, average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Following");
    write_rows(
        &mut output,
        &partition.followed,
        "No followed students are missing homework.",
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Muted");
    write_rows(&mut output, &partition.muted, "No muted students.");

    output
}

pub fn build_evaluation_report(student_id: &str, evaluations: &[StoredEvaluation]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Progress Evaluations for {student_id}");
    let _ = writeln!(output);

    if evaluations.is_empty() {
        let _ = writeln!(output, "No evaluations recorded.");
        return output;
    }

    for stored in evaluations {
        let record = &stored.record;
        let _ = writeln!(
            output,
            "- {} in {}: attendance {:.0}%, homework {:.0}%, {} -> {}",
            record.date,
            record.support_class_id,
            record.attendance_rate * 100.0,
            record.homework_completion_rate * 100.0,
            if record.progress_improved {
                "improving"
            } else {
                "not improving"
            },
            record.responsibility.as_str()
        );
        if let Some(notes) = record.notes.as_deref() {
            let _ = writeln!(output, "  - notes: {notes}");
        }
    }

    output
}
