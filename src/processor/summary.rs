use std::path::PathBuf;

use crate::models::RunOutcome;

/// The end-of-run report, one line per figure.
pub fn summary_lines(outcome: &RunOutcome) -> Vec<String> {
    let seconds = outcome.elapsed.as_secs_f64();
    let mut lines = vec![
        "=== Download Summary ===".to_string(),
        format!("Total reels found: {}", outcome.total_found),
        format!("Successfully downloaded: {}", outcome.total_succeeded),
        format!("Failed downloads: {}", outcome.total_failed),
    ];
    if !outcome.abandoned_identifiers.is_empty() {
        lines.push(format!(
            "Skipped after stop: {}",
            outcome.abandoned_identifiers.len()
        ));
    }
    lines.push(format!("Time taken: {seconds:.2} seconds"));
    if outcome.total_succeeded > 0 {
        lines.push(format!(
            "Average time per video: {:.2} seconds",
            seconds / outcome.total_succeeded as f64
        ));
    }
    lines.push(format!("Files saved in: {}", display_dir(outcome).display()));
    lines
}

fn display_dir(outcome: &RunOutcome) -> PathBuf {
    std::fs::canonicalize(&outcome.output_dir).unwrap_or_else(|_| outcome.output_dir.clone())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{PostIdentifier, RunId, Terminal};

    fn outcome(succeeded: usize, abandoned: usize) -> RunOutcome {
        RunOutcome {
            run_id: RunId::now(),
            state: Terminal::Success,
            total_found: 10,
            total_succeeded: succeeded,
            total_failed: 10 - succeeded - abandoned,
            failed_identifiers: Vec::new(),
            abandoned_identifiers: (0..abandoned)
                .map(|i| PostIdentifier::new(format!("https://www.instagram.com/reel/{i}/")))
                .collect(),
            elapsed: Duration::from_secs(20),
            output_dir: PathBuf::from("does-not-exist_reels"),
        }
    }

    #[test]
    fn average_is_reported_per_success() {
        let lines = summary_lines(&outcome(4, 0));
        assert!(lines.contains(&"Successfully downloaded: 4".to_string()));
        assert!(lines.contains(&"Average time per video: 5.00 seconds".to_string()));
        assert!(lines.contains(&"Time taken: 20.00 seconds".to_string()));
        assert_eq!(lines.last().unwrap(), "Files saved in: does-not-exist_reels");
    }

    #[test]
    fn no_average_without_successes() {
        let lines = summary_lines(&outcome(0, 0));
        assert!(!lines.iter().any(|l| l.starts_with("Average")));
    }

    #[test]
    fn stopped_runs_mention_skipped_posts() {
        let lines = summary_lines(&outcome(2, 3));
        assert!(lines.contains(&"Skipped after stop: 3".to_string()));
    }
}
