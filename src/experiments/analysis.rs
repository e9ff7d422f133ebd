use chrono::{DateTime, Utc};

use super::types::{
    ConfidenceTier, Experiment, ExperimentOutcome, MetricWinner, VariantResults, CONTROL,
    VARIANT_1,
};

pub const COMPARED_METRICS: [&str; 4] = ["views", "clicks", "conversions", "engagementTime"];
pub const NO_CLEAR_WINNER: &str = "no_clear_winner";
pub const TIE: &str = "tie";

/// Lift below this magnitude (percent) is treated as noise.
pub const MIN_LIFT_PERCENT: f64 = 5.0;

/// Percentage lift of `variant` over `control`. A zero control with a
/// non-zero variant counts as +100%.
pub fn lift_percent(control: f64, variant: f64) -> f64 {
    if control == 0.0 {
        if variant == 0.0 {
            0.0
        } else {
            100.0
        }
    } else {
        (variant - control) / control * 100.0
    }
}

pub fn confidence_tier(participants: u64) -> ConfidenceTier {
    if participants < 100 {
        ConfidenceTier::Low
    } else if participants < 500 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::High
    }
}

/// Control versus variant 1 on each compared metric, per visitor.
pub fn analyze(experiment: &Experiment, now: DateTime<Utc>) -> ExperimentOutcome {
    let empty = VariantResults::default();
    let control = experiment.results.get(CONTROL).unwrap_or(&empty);
    let variant = experiment.results.get(VARIANT_1).unwrap_or(&empty);

    let metrics: Vec<MetricWinner> = COMPARED_METRICS
        .iter()
        .map(|metric| {
            let lift = lift_percent(control.per_visitor(metric), variant.per_visitor(metric));
            let winner = if lift.abs() > MIN_LIFT_PERCENT {
                if lift > 0.0 {
                    VARIANT_1
                } else {
                    CONTROL
                }
            } else {
                NO_CLEAR_WINNER
            };
            MetricWinner {
                metric: metric.to_string(),
                winner: winner.to_string(),
                lift_percent: lift,
            }
        })
        .collect();

    let variant_wins = metrics.iter().filter(|m| m.winner == VARIANT_1).count();
    let control_wins = metrics.iter().filter(|m| m.winner == CONTROL).count();
    let overall_winner = match variant_wins.cmp(&control_wins) {
        std::cmp::Ordering::Greater => VARIANT_1,
        std::cmp::Ordering::Less => CONTROL,
        std::cmp::Ordering::Equal => TIE,
    };

    let total_participants = experiment.total_visitors();
    ExperimentOutcome {
        metrics,
        overall_winner: overall_winner.to_string(),
        confidence: confidence_tier(total_participants),
        total_participants,
        completed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experiment(control: VariantResults, variant: VariantResults) -> Experiment {
        let mut exp = Experiment::with_default_split("e", "E", 10, Utc::now());
        exp.results.insert(CONTROL.into(), control);
        exp.results.insert(VARIANT_1.into(), variant);
        exp
    }

    #[test]
    fn per_metric_winners_and_overall() {
        let exp = experiment(
            VariantResults {
                views: 100,
                clicks: 10,
                conversions: 5,
                engagement_time_ms: 10_000,
                visitors: 50,
            },
            VariantResults {
                views: 51,
                clicks: 8,
                conversions: 4,
                engagement_time_ms: 3_000,
                visitors: 25,
            },
        );
        let outcome = analyze(&exp, Utc::now());
        let winners: Vec<&str> = outcome.metrics.iter().map(|m| m.winner.as_str()).collect();
        // views 2.0 vs 2.04 (+2%), clicks 0.2 vs 0.32, conversions 0.1 vs 0.16, engagement 200 vs 120
        assert_eq!(winners, vec![NO_CLEAR_WINNER, VARIANT_1, VARIANT_1, CONTROL]);
        assert_eq!(outcome.overall_winner, VARIANT_1);
        assert_eq!(outcome.total_participants, 75);
        assert_eq!(outcome.confidence, ConfidenceTier::Low);
    }

    #[test]
    fn equal_wins_are_a_tie() {
        let exp = experiment(
            VariantResults {
                clicks: 10,
                conversions: 2,
                visitors: 10,
                ..Default::default()
            },
            VariantResults {
                clicks: 20,
                conversions: 1,
                visitors: 10,
                ..Default::default()
            },
        );
        assert_eq!(analyze(&exp, Utc::now()).overall_winner, TIE);
    }

    #[test]
    fn tiers_follow_participant_counts() {
        assert_eq!(confidence_tier(99), ConfidenceTier::Low);
        assert_eq!(confidence_tier(100), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(499), ConfidenceTier::Medium);
        assert_eq!(confidence_tier(500), ConfidenceTier::High);
    }

    #[test]
    fn zero_control_counts_as_full_lift() {
        assert_eq!(lift_percent(0.0, 0.0), 0.0);
        assert_eq!(lift_percent(0.0, 3.0), 100.0);
        assert!((lift_percent(2.0, 1.0) + 50.0).abs() < 1e-9);
    }
}
