//! Read-only derivations over analysis results for tables and charts.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::ApiError;
use crate::{AnalysisResults, Gap, PriorityArea, Recommendation};

/// Rank used when sorting by severity; unknown severities sort last.
pub fn severity_rank(severity: Option<&str>) -> u8 {
    match severity {
        Some("critical") => 0,
        Some("high") => 1,
        Some("moderate") => 2,
        Some("low") => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFilter {
    #[default]
    All,
    Survey,
    Ai,
}

impl FromStr for SourceFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SourceFilter::All),
            "survey" => Ok(SourceFilter::Survey),
            "ai" => Ok(SourceFilter::Ai),
            other => Err(ApiError::InvalidInput(format!("unknown source filter: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapSort {
    #[default]
    Severity,
    Location,
    Type,
    Confidence,
}

impl FromStr for GapSort {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "severity" => Ok(GapSort::Severity),
            "location" => Ok(GapSort::Location),
            "type" => Ok(GapSort::Type),
            "confidence" => Ok(GapSort::Confidence),
            other => Err(ApiError::InvalidInput(format!("unknown gap sort: {}", other))),
        }
    }
}

/// Filters for the gap grid. `None` means "all".
#[derive(Debug, Clone, Default)]
pub struct GapQuery {
    pub severity: Option<String>,
    pub issue_type: Option<String>,
    pub source: SourceFilter,
    pub search: String,
    pub sort_by: GapSort,
}

impl GapQuery {
    fn matches(&self, gap: &Gap) -> bool {
        let severity = self
            .severity
            .as_deref()
            .map_or(true, |s| gap.severity.as_deref() == Some(s));
        let issue_type = self
            .issue_type
            .as_deref()
            .map_or(true, |t| gap.issue_type.as_deref() == Some(t));
        let source = match self.source {
            SourceFilter::All => true,
            SourceFilter::Survey => gap.survey_based,
            SourceFilter::Ai => !gap.survey_based,
        };
        severity && issue_type && source && self.matches_search(gap)
    }

    fn matches_search(&self, gap: &Gap) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        [&gap.location, &gap.issue_type, &gap.description]
            .iter()
            .any(|field| {
                field
                    .as_deref()
                    .map_or(false, |text| text.to_lowercase().contains(&needle))
            })
    }

    fn compare(&self, a: &Gap, b: &Gap) -> Ordering {
        // Survey reports always lead, whatever the sort key.
        b.survey_based.cmp(&a.survey_based).then_with(|| match self.sort_by {
            GapSort::Severity => {
                severity_rank(a.severity.as_deref()).cmp(&severity_rank(b.severity.as_deref()))
            }
            GapSort::Location => lexical(a.location.as_deref(), b.location.as_deref()),
            GapSort::Type => lexical(a.issue_type.as_deref(), b.issue_type.as_deref()),
            GapSort::Confidence => b
                .confidence
                .unwrap_or(0.0)
                .partial_cmp(&a.confidence.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
        })
    }
}

fn lexical(a: Option<&str>, b: Option<&str>) -> Ordering {
    let a = a.unwrap_or("").to_lowercase();
    let b = b.unwrap_or("").to_lowercase();
    a.cmp(&b)
}

pub fn filtered_and_sorted_gaps<'a>(
    results: Option<&'a AnalysisResults>,
    query: &GapQuery,
) -> Vec<&'a Gap> {
    let Some(results) = results else {
        return Vec::new();
    };
    let mut gaps: Vec<&Gap> = results
        .scan_results
        .iter()
        .filter(|gap| query.matches(gap))
        .collect();
    gaps.sort_by(|a, b| query.compare(a, b));
    gaps
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecommendationSort {
    #[default]
    Priority,
    Cost,
    Timeline,
    Impact,
    Type,
}

impl FromStr for RecommendationSort {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(RecommendationSort::Priority),
            "cost" => Ok(RecommendationSort::Cost),
            "timeline" => Ok(RecommendationSort::Timeline),
            "impact" => Ok(RecommendationSort::Impact),
            "type" => Ok(RecommendationSort::Type),
            other => Err(ApiError::InvalidInput(format!(
                "unknown recommendation sort: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    /// Priority such as `high` or `immediate`, matched case-insensitively.
    pub priority: Option<String>,
    pub kind: Option<String>,
    pub sort_by: RecommendationSort,
}

pub fn priority_score(priority: Option<&str>) -> u8 {
    match priority.map(str::to_lowercase).as_deref() {
        Some("high") | Some("immediate") => 3,
        Some("medium") | Some("short-term") => 2,
        Some("low") | Some("long-term") => 1,
        _ => 0,
    }
}

pub fn impact_score(impact: Option<&str>) -> u8 {
    match impact.map(str::to_lowercase).as_deref() {
        Some("high") => 3,
        Some("medium") => 2,
        Some("low") => 1,
        _ => 0,
    }
}

/// First dollar figure in a cost estimate such as `"$150,000 - $300,000"`.
pub fn cost_value(estimate: Option<&str>) -> u64 {
    let Some(estimate) = estimate else {
        return 0;
    };
    let digits: String = estimate
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// First number in a timeline such as `"6-12 months"`; 12 when absent.
pub fn timeline_months(timeline: Option<&str>) -> u32 {
    let digits: String = timeline
        .unwrap_or("")
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(12)
}

pub fn filtered_and_sorted_recommendations<'a>(
    results: Option<&'a AnalysisResults>,
    query: &RecommendationQuery,
) -> Vec<&'a Recommendation> {
    let Some(results) = results else {
        return Vec::new();
    };

    let mut recs: Vec<&Recommendation> = results
        .recommendations
        .iter()
        .filter(|rec| {
            let priority = query.priority.as_deref().map_or(true, |wanted| {
                [&rec.priority_level, &rec.priority]
                    .iter()
                    .any(|p| p.as_deref().map_or(false, |p| p.eq_ignore_ascii_case(wanted)))
            });
            let kind = query
                .kind
                .as_deref()
                .map_or(true, |k| rec.kind.as_deref() == Some(k));
            priority && kind
        })
        .collect();

    recs.sort_by(|a, b| match query.sort_by {
        RecommendationSort::Priority => {
            priority_score(b.effective_priority()).cmp(&priority_score(a.effective_priority()))
        }
        RecommendationSort::Cost => {
            cost_value(a.cost_estimate.as_deref()).cmp(&cost_value(b.cost_estimate.as_deref()))
        }
        RecommendationSort::Timeline => {
            timeline_months(a.timeline.as_deref()).cmp(&timeline_months(b.timeline.as_deref()))
        }
        RecommendationSort::Impact => {
            impact_score(b.impact.as_deref()).cmp(&impact_score(a.impact.as_deref()))
        }
        RecommendationSort::Type => lexical(a.kind.as_deref(), b.kind.as_deref()),
    });
    recs
}

/// Priority areas, highest score first.
pub fn ranked_priority_areas(results: Option<&AnalysisResults>) -> Vec<&PriorityArea> {
    let mut areas: Vec<&PriorityArea> = results
        .map(|r| r.priority_areas.iter().collect())
        .unwrap_or_default();
    areas.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(Ordering::Equal)
    });
    areas
}

pub fn average_priority_score(results: Option<&AnalysisResults>) -> f64 {
    match results {
        Some(r) if !r.priority_areas.is_empty() => {
            let total: f64 = r.priority_areas.iter().map(|a| a.priority_score).sum();
            total / r.priority_areas.len() as f64
        }
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub moderate: usize,
    pub low: usize,
    pub survey_based: usize,
}

pub fn severity_summary(results: Option<&AnalysisResults>) -> SeveritySummary {
    match results {
        Some(r) => SeveritySummary {
            total: r.scan_results.len(),
            critical: r.severity_count("critical"),
            high: r.severity_count("high"),
            moderate: r.severity_count("moderate"),
            low: r.severity_count("low"),
            survey_based: r.survey_based_count(),
        },
        None => SeveritySummary::default(),
    }
}
