//! Engagement effectiveness report.
//!
//! Produced by the engagement run and fed back into refinement prompts. All
//! sub-objects default when the model omits them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::timestamp::lenient_seconds;

/// Number of segments in the learning-rate graph.
pub const LEARNING_RATE_SEGMENTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementAnalysis {
    pub engagement_rate: EngagementRate,
    pub accessibility_score: AccessibilityScore,
    pub active_passive_balance: ActivePassiveBalance,
    pub learning_rate_graph: LearningRateGraph,
    pub pedagogical_score: PedagogicalScore,
    pub overall_analysis: OverallAnalysis,
}

impl EngagementAnalysis {
    /// Compact text rendering used as grounding context in prompts.
    pub fn condensed(&self) -> String {
        let mut out = format!(
            "Overall score: {:.0}/100 ({})\n\
             Engagement rate: {:.0}/100\n\
             Accessibility: {:.0}/100\n\
             Active/passive: {:.0}% active, {:.0}% passive\n\
             Pedagogy: {:.0}/100",
            self.overall_analysis.overall_score,
            if self.overall_analysis.tier.is_empty() {
                "unrated"
            } else {
                self.overall_analysis.tier.as_str()
            },
            self.engagement_rate.score,
            self.accessibility_score.score,
            self.active_passive_balance.active_percentage,
            self.active_passive_balance.passive_percentage,
            self.pedagogical_score.score,
        );

        if !self.overall_analysis.top_priorities.is_empty() {
            out.push_str("\nTop priorities:");
            for p in &self.overall_analysis.top_priorities {
                out.push_str("\n- ");
                out.push_str(p);
            }
        }

        if !self.learning_rate_graph.critical_drops.is_empty() {
            out.push_str("\nCritical drops:");
            for drop in &self.learning_rate_graph.critical_drops {
                out.push_str(&format!(
                    "\n- {} ({})",
                    crate::timestamp::format_clock(drop.timestamp),
                    drop.reason
                ));
            }
        }

        if !self.accessibility_score.issues.is_empty() {
            out.push_str("\nAccessibility issues:");
            for issue in &self.accessibility_score.issues {
                out.push_str("\n- ");
                out.push_str(issue);
            }
        }

        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementRate {
    pub score: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessibilityScore {
    pub score: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivePassiveBalance {
    pub active_percentage: f64,
    pub passive_percentage: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningRateGraph {
    pub segments: Vec<LearningSegment>,
    pub critical_drops: Vec<CriticalDrop>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningSegment {
    #[serde(with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub start: f64,
    #[serde(with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub end: f64,
    pub learning_rate: f64,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CriticalDrop {
    #[serde(with = "lenient_seconds")]
    #[schemars(with = "f64")]
    pub timestamp: f64,
    pub reason: String,
    pub fix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PedagogicalScore {
    pub score: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OverallAnalysis {
    pub overall_score: f64,
    pub tier: String,
    pub top_priorities: Vec<String>,
    pub summary: String,
}
