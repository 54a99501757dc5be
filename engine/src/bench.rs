//! Streaming latency benchmark against a running gateway
//!
//! Each trial records time to the first model answer, time to the
//! synthesis event and total time until `done`.

use crate::client::GatewayClient;
use sdk::types::{ChatRequest, StreamEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

pub const DEFAULT_PROMPTS: &[&str] = &[
    "Explain quicksort in 5 bullet points.",
    "Translate this to Spanish: The sky is clear and blue.",
    "Write a Python function to merge two sorted lists.",
    "Summarize the key causes of WW1 in under 150 words.",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialReport {
    pub prompt: String,
    pub trial: usize,
    pub status: TrialStatus,
    pub models_count: usize,
    pub first_model_s: Option<f64>,
    pub synthesis_s: Option<f64>,
    pub total_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptSummary {
    pub prompt: String,
    pub ok_trials: usize,
    pub avg_first_model_s: Option<f64>,
    pub avg_synthesis_s: Option<f64>,
    pub avg_total_s: Option<f64>,
}

fn round3(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

pub async fn run_trial(
    client: &GatewayClient,
    prompt: &str,
    models: Option<&[String]>,
    trial: usize,
) -> TrialReport {
    let mut request = ChatRequest::new(prompt);
    if let Some(models) = models {
        request = request.with_models(models.iter().cloned());
    }

    let started = Instant::now();
    let mut first_model = None;
    let mut synthesis = None;
    let mut labels = HashSet::new();

    let outcome = client
        .chat(&request, None, |event| match event {
            StreamEvent::ModelResponse(result) => {
                first_model.get_or_insert_with(|| started.elapsed().as_secs_f64());
                labels.insert(result.label.clone());
            }
            StreamEvent::Synthesis(_) => {
                synthesis = Some(started.elapsed().as_secs_f64());
            }
            StreamEvent::Done => {}
        })
        .await;

    let total = started.elapsed().as_secs_f64();
    TrialReport {
        prompt: prompt.to_string(),
        trial,
        status: if outcome.is_ok() {
            TrialStatus::Ok
        } else {
            TrialStatus::Error
        },
        models_count: labels.len(),
        first_model_s: first_model.map(round3),
        synthesis_s: synthesis.map(round3),
        total_s: round3(total),
        error: outcome.err().map(|e| e.to_string()),
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| round3(sum / count as f64))
}

/// Per-prompt averages over successful trials, in first-seen prompt order
pub fn summarize(reports: &[TrialReport]) -> Vec<PromptSummary> {
    let mut order = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&TrialReport>> = BTreeMap::new();
    for report in reports {
        if !grouped.contains_key(report.prompt.as_str()) {
            order.push(report.prompt.as_str());
        }
        grouped.entry(report.prompt.as_str()).or_default().push(report);
    }

    order
        .into_iter()
        .map(|prompt| {
            let ok: Vec<&TrialReport> = grouped[prompt]
                .iter()
                .copied()
                .filter(|r| r.status == TrialStatus::Ok)
                .collect();
            PromptSummary {
                prompt: prompt.to_string(),
                ok_trials: ok.len(),
                avg_first_model_s: average(ok.iter().filter_map(|r| r.first_model_s)),
                avg_synthesis_s: average(ok.iter().filter_map(|r| r.synthesis_s)),
                avg_total_s: average(ok.iter().map(|r| r.total_s)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(prompt: &str, status: TrialStatus, total: f64, synthesis: Option<f64>) -> TrialReport {
        TrialReport {
            prompt: prompt.to_string(),
            trial: 0,
            status,
            models_count: 2,
            first_model_s: Some(0.5),
            synthesis_s: synthesis,
            total_s: total,
            error: None,
        }
    }

    #[test]
    fn test_summarize_ignores_failed_trials() {
        let reports = vec![
            report("b", TrialStatus::Ok, 2.0, Some(1.5)),
            report("a", TrialStatus::Ok, 4.0, None),
            report("b", TrialStatus::Ok, 4.0, Some(2.5)),
            report("b", TrialStatus::Error, 90.0, None),
        ];

        let summary = summarize(&reports);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].prompt, "b");
        assert_eq!(summary[0].ok_trials, 2);
        assert_eq!(summary[0].avg_total_s, Some(3.0));
        assert_eq!(summary[0].avg_synthesis_s, Some(2.0));
        assert_eq!(summary[1].avg_synthesis_s, None);
    }

    #[test]
    fn test_average_of_nothing() {
        assert_eq!(average(std::iter::empty()), None);
        assert_eq!(round3(1.23456), 1.235);
    }
}
