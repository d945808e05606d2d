use chrono::Utc;
use serde_json::{json, Value};

/// Deterministic analysis results for `region`.
pub fn analysis_results(region: &str, kind: &str) -> Value {
    json!({
        "metadata": {
            "state": region,
            "analysis_type": kind,
            "generated_date": Utc::now().format("%Y-%m-%d").to_string(),
        },
        "scan_results": [
            {
                "id": "gap_001",
                "location": "Fresno Downtown Transit Center",
                "issue_type": "Missing Curb Ramps",
                "severity": "critical",
                "description": "No curb ramps at four of six crossings around the transit center.",
                "confidence": 0.92,
                "coordinates": { "lat": 36.7378, "lng": -119.7871 }
            },
            {
                "id": "gap_002",
                "location": "Oakland Lake Merritt Path",
                "issue_type": "Broken Sidewalk",
                "severity": "high",
                "description": "Heaved and cracked sidewalk along the eastern shore.",
                "confidence": 0.81,
                "coordinates": { "lat": 37.8044, "lng": -122.2712 }
            },
            {
                "id": "gap_003",
                "location": "Sacramento Capitol Mall",
                "issue_type": "No Audible Signals",
                "severity": "moderate",
                "description": "Pedestrian signals lack audible cues at two intersections.",
                "confidence": 0.67,
                "coordinates": { "lat": 38.5767, "lng": -121.4934 }
            },
            {
                "id": "gap_004",
                "location": "San Diego Old Town Station",
                "issue_type": "Inaccessible Entrance",
                "severity": "low",
                "description": "Secondary entrance has a single step without a ramp.",
                "confidence": 0.55,
                "coordinates": { "lat": 32.7549, "lng": -117.1997 }
            }
        ],
        "recommendations": [
            {
                "id": "rec_001",
                "title": "Install curb ramps around Fresno transit center",
                "description": "Add ADA-compliant curb ramps with detectable warnings at all crossings.",
                "type": "infrastructure",
                "priority_level": "high",
                "impact": "high",
                "cost_estimate": "$150,000 - $300,000",
                "timeline": "6 months",
                "implementation_status": "planned",
                "agent": "PlannerBot"
            },
            {
                "id": "rec_002",
                "title": "Repair Lake Merritt sidewalk",
                "description": "Grind and replace heaved panels along the eastern path.",
                "type": "maintenance",
                "priority_level": "medium",
                "impact": "medium",
                "cost_estimate": "$45,000",
                "timeline": "3 months",
                "implementation_status": "planned",
                "agent": "PlannerBot"
            },
            {
                "id": "rec_003",
                "title": "Accessible pedestrian signal program",
                "description": "Retrofit signals on Capitol Mall with audible and vibrotactile cues.",
                "type": "technology",
                "priority_level": "low",
                "impact": "medium",
                "cost_estimate": "$80,000",
                "timeline": "12 months",
                "implementation_status": "proposed",
                "agent": "PlannerBot"
            }
        ],
        "priority_areas": [
            {
                "id": "area_001",
                "location": "Fresno",
                "priority_score": 8.7,
                "priority_level": "critical",
                "top_issue": "Missing Curb Ramps"
            },
            {
                "id": "area_002",
                "location": { "address": "Oakland, CA", "lat": 37.8044, "lng": -122.2712 },
                "priority_score": 7.4,
                "priority_level": "high",
                "top_issue": "Broken Sidewalk"
            },
            {
                "id": "area_003",
                "location": "Sacramento",
                "priority_score": 5.1,
                "priority_level": "moderate",
                "top_issue": "No Audible Signals"
            }
        ]
    })
}

/// The recommendation the survey service attaches to a report.
pub fn survey_recommendation(survey: &Value) -> Value {
    let city = survey["location"]["city"].as_str().unwrap_or("the reported location");
    let issue = survey["issue"]["type"].as_str().unwrap_or("accessibility issue");
    let critical = survey["issue"]["severity"].as_str() == Some("critical");

    json!({
        "title": format!("Address {} in {}", issue, city),
        "description": format!("Community report of {} in {}; schedule a site assessment.", issue.to_lowercase(), city),
        "type": "infrastructure",
        "priority": if critical { "High" } else { "Medium" },
        "timeline": if critical { "1-2 weeks" } else { "2-4 weeks" },
        "cost_estimate": "$5,000 - $25,000",
        "recommended_actions": [
            "Schedule site assessment",
            "Notify local accessibility coordinator",
            "Publish repair timeline to the community"
        ],
        "expected_impact": "Restores safe access for residents who reported the issue",
        "implementation_partners": ["Public Works"]
    })
}

/// Puts survey reports into `results`: a survey-based gap and, where the
/// report carries one, its recommendation. Survey entries go first and
/// replace those of an earlier merge.
pub fn merge_surveys(results: &mut Value, surveys: &[Value]) {
    let mut gaps = Vec::new();
    let mut recs = Vec::new();
    for survey in surveys {
        let id = survey["id"].as_str().unwrap_or_default();
        gaps.push(json!({
            "id": format!("survey_gap_{}", id),
            "location": survey["location"]["city"],
            "issue_type": survey["issue"]["type"],
            "severity": survey["issue"]["severity"],
            "description": survey["issue"]["description"],
            "coordinates": survey["location"]["coordinates"],
            "survey_based": true
        }));

        if let Some(Value::Object(rec)) = survey.get("ai_recommendation") {
            let mut rec = rec.clone();
            rec.insert("id".into(), json!(format!("survey_rec_{}", id)));
            rec.insert("survey_id".into(), json!(id));
            rec.insert("submitted_at".into(), survey["submitted_at"].clone());
            rec.insert("survey_based".into(), json!(true));
            rec.insert("agent".into(), json!("SurveyBot"));
            recs.push(Value::Object(rec));
        }
    }

    prepend_replacing(results, "scan_results", gaps);
    prepend_replacing(results, "recommendations", recs);
}

fn prepend_replacing(results: &mut Value, key: &str, mut entries: Vec<Value>) {
    let existing = results
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    entries.extend(
        existing
            .into_iter()
            .filter(|entry| entry.get("survey_based") != Some(&json!(true))),
    );
    results[key] = Value::Array(entries);
}
