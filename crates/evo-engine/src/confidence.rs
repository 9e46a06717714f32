//! Confidence scoring
//!
//! `confidence = min(1, base + bonus)` where
//! - `base = (accepted + default_base * prior_weight) / (outcomes + prior_weight)`,
//!   the acceptance rate over reported outcomes smoothed towards `default_base`.
//!   With no outcomes it is exactly `default_base`; an accepted outcome raises
//!   it and a rejected one lowers it
//! - `bonus = recognition_weight * pattern.confidence`, applied only when the
//!   pattern had been seen at least `recognition_min_frequency` times before
//!   this event
//!
//! Pattern confidence itself is `min(1, frequency * pattern_step)`, so the
//! bonus grows with frequency and saturates.

use chrono::{DateTime, Utc};
use evo_core::config::ConfidenceConfig;
use evo_core::{AgentRecord, ChangeEvent, EvoConfig, Pattern, PatternLimits};

/// Result of scoring one agent against one event
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub confidence: f64,
    pub pattern_key: String,
    /// Pattern state after this observation
    pub pattern: Pattern,
    /// Whether the pattern was already known well enough to earn a bonus
    pub recognized: bool,
}

#[derive(Debug, Clone)]
pub struct ConfidenceCalculator {
    config: ConfidenceConfig,
    max_examples: usize,
}

impl ConfidenceCalculator {
    pub fn new(config: &EvoConfig) -> Self {
        Self {
            config: config.confidence.clone(),
            max_examples: config.population.max_examples_per_pattern,
        }
    }

    /// Score the agent for this event and record the observation.
    ///
    /// Mutates the agent: upserts the pattern, bumps
    /// `suggestionsGenerated` and sets `lastActive` to `now`.
    pub fn score(&self, agent: &mut AgentRecord, event: &ChangeEvent, now: DateTime<Utc>) -> Score {
        let pattern_key = Pattern::key_for(event.change_type.as_str(), &event.file_path);

        let base = agent
            .performance
            .outcome_rate(self.config.default_base, self.config.prior_weight);

        let limits = PatternLimits {
            max_examples: self.max_examples,
            confidence_step: self.config.pattern_step,
        };
        let observation = agent
            .memory
            .observe_pattern(&pattern_key, &event.file_path, now, limits);

        let recognized = observation.previous_frequency > 0
            && observation.previous_frequency >= self.config.recognition_min_frequency;
        let bonus = if recognized {
            self.config.recognition_weight * observation.pattern.confidence
        } else {
            0.0
        };

        agent.performance.record_generated();
        agent.last_active = now;

        Score {
            confidence: (base + bonus).clamp(0.0, 1.0),
            pattern_key,
            pattern: observation.pattern,
            recognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evo_core::{AgentPriority, ChangeType, SuggestedAgent, Tier};

    fn agent() -> AgentRecord {
        let suggestion = SuggestedAgent {
            name: "Quality".to_string(),
            role: "quality".to_string(),
            purpose: String::new(),
            triggers: vec!["*.ts".to_string()],
            capabilities: vec![],
            priority: AgentPriority::Important,
            tier: Tier::Proactive,
            reasoning: None,
        };
        AgentRecord::from_suggestion("app-1", &suggestion, Utc::now())
    }

    fn event() -> ChangeEvent {
        ChangeEvent::new("app-1", "/x.ts", ChangeType::FileModify)
    }

    #[test]
    fn test_first_match_uses_default_base() {
        let calc = ConfidenceCalculator::new(&EvoConfig::default());
        let mut agent = agent();

        let score = calc.score(&mut agent, &event(), Utc::now());
        assert!((score.confidence - 0.5).abs() < 1e-9);
        assert_eq!(score.pattern_key, "file-modify_ts");
        assert!(!score.recognized);
        assert_eq!(agent.memory.pattern("file-modify_ts").unwrap().frequency, 1);
        assert_eq!(agent.performance.suggestions_generated, 1);
    }

    #[test]
    fn test_repeat_is_monotonic_and_saturates() {
        let calc = ConfidenceCalculator::new(&EvoConfig::default());
        let mut agent = agent();
        let now = Utc::now();

        let mut last_confidence = 0.0;
        let mut last_seen = None;
        for i in 1..=20u64 {
            let score = calc.score(&mut agent, &event(), now);
            assert_eq!(score.pattern.frequency, i);
            assert!(score.confidence >= last_confidence);
            assert!(score.confidence <= 1.0);
            if let Some(prev) = last_seen {
                assert!(score.pattern.last_seen > prev);
            }
            last_confidence = score.confidence;
            last_seen = Some(score.pattern.last_seen);
        }
        // 0.5 + 0.25 * 1.0
        assert!((last_confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_outcomes_move_the_base() {
        let calc = ConfidenceCalculator::new(&EvoConfig::default());
        let mut agent = agent();
        agent.performance.suggestions_generated = 4;
        agent.performance.suggestions_accepted = 1;
        agent.performance.suggestions_rejected = 3;

        // (1 + 0.5 * 2) / (4 + 2)
        let score = calc.score(&mut agent, &event(), Utc::now());
        assert!((score.confidence - 1.0 / 3.0).abs() < 1e-9);
        // success rate still counts generated suggestions: 1 of 5
        assert!((agent.performance.success_rate - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_acceptance_never_lowers_the_next_score() {
        let calc = ConfidenceCalculator::new(&EvoConfig::default());
        let now = Utc::now();
        let mut agent = agent();
        for _ in 0..10 {
            calc.score(&mut agent, &event(), now);
        }

        let mut without = agent.clone();
        let baseline = calc.score(&mut without, &event(), now).confidence;

        agent.performance.record_accepted();
        let after_accept = calc.score(&mut agent, &event(), now).confidence;
        assert!(after_accept > baseline, "{} <= {}", after_accept, baseline);

        let mut rejected = without.clone();
        rejected.performance.record_rejected();
        assert!(calc.score(&mut rejected, &event(), now).confidence < after_accept);
    }

    #[test]
    fn test_deterministic_for_same_state() {
        let calc = ConfidenceCalculator::new(&EvoConfig::default());
        let now = Utc::now();
        let mut a = agent();
        let mut b = a.clone();

        assert_eq!(
            calc.score(&mut a, &event(), now),
            calc.score(&mut b, &event(), now)
        );
        assert_eq!(a, b);
    }
}
