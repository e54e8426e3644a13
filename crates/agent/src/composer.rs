use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use boardsight_core::cleaning::classify::CURRENCY_UNIT;
use boardsight_core::{ConversationTurn, MetricResult, MetricValue, ModelError, QualityReport};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use tracing::{debug, warn};

use crate::conversation::ConversationWindow;
use crate::llm::{ChatMessage, LlmClient, Prompt};
use crate::retry::BackoffPolicy;

const FALLBACK_TEMPLATE_NAME: &str = "fallback_summary";

const FALLBACK_TEMPLATE: &str = r#"{%- if metrics | length == 0 -%}
I couldn't compute any figures for "{{ question }}".
{%- else -%}
Here is what the board data shows for "{{ question }}":
{%- for metric in metrics %}
- {{ metric.name }}: {% if metric.value is number %}{% if metric.money %}{{ metric.value | inr }}{% else %}{{ metric.value | plain }}{% if metric.unit %} {{ metric.unit }}{% endif %}{% endif %}{% elif metric.value %}{{ metric.value }}{% else %}no data{% endif %}
{%- if metric.excluded > 0 %} ({{ metric.excluded }} items excluded for unparseable values){% endif %}
{%- for group in metric.breakdown %}
  - {{ group.label }}: {% if metric.money %}{{ group.value | inr }}{% else %}{{ group.value | plain }}{% endif %}
{%- endfor %}
{%- endfor %}
{%- endif %}
{%- if caveats | length > 0 %}

Data quality: {{ caveats | join(sep="; ") }}.
{%- endif %}"#;

const ANALYST_INSTRUCTIONS: &str = "You are a sharp business analyst giving a founder a concise briefing.

INSTRUCTIONS:
1. Answer the question directly and lead with the key insight or number.
2. Add supporting data points and percentages where relevant.
3. Cite ONLY the figures listed under METRICS. Never estimate, extrapolate, or invent numbers.
4. Mention the data quality notes briefly at the end as a caveat.
5. Use bullet points when listing several data points.
6. Format money the Indian way (e.g. \"₹12.5L\", \"₹1.2Cr\"); ready-formatted values are provided.
7. Synthesize insights instead of dumping raw data. Keep it to 3-8 sentences.";

/// Formats rupee amounts with crore / lakh / thousand suffixes.
pub fn format_inr(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e7 {
        format!("₹{:.1}Cr", value / 1e7)
    } else if magnitude >= 1e5 {
        format!("₹{:.1}L", value / 1e5)
    } else if magnitude >= 1e3 {
        format!("₹{:.1}K", value / 1e3)
    } else {
        format!("₹{value:.0}")
    }
}

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn is_money(metric: &MetricResult) -> bool {
    metric.unit.as_deref() == Some(CURRENCY_UNIT)
}

/// Plain-language disclosures of what the quality report and the metric exclusions mean.
pub fn quality_caveats(quality: &QualityReport, metrics: &[MetricResult]) -> Vec<String> {
    let mut caveats = Vec::new();
    let share = |count: usize, what: &str| {
        format!("{:.0}% of items had {what} ({count} values)", quality.percent_of_items(count))
    };
    if quality.unparseable_dates > 0 {
        caveats.push(share(quality.unparseable_dates, "unparseable dates"));
    }
    if quality.unparseable_numbers > 0 {
        caveats.push(share(quality.unparseable_numbers, "unparseable numbers"));
    }
    if quality.missing_values > 0 {
        caveats.push(format!(
            "{} missing values across {} items",
            quality.missing_values, quality.total_items
        ));
    }
    for metric in metrics {
        if metric.excluded > 0 {
            caveats.push(format!(
                "{} excludes {} items with unparseable values",
                metric.name, metric.excluded
            ));
        }
        if metric.value.is_no_data() {
            caveats.push(format!("{} had no eligible items", metric.name));
        }
    }
    caveats
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerSource {
    Model,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Composition {
    pub answer: String,
    pub source: AnswerSource,
    /// Error of the last model attempt when the fallback was used.
    pub model_error: Option<ModelError>,
}

#[derive(Serialize)]
struct FallbackMetric<'a> {
    name: &'a str,
    value: Value,
    money: bool,
    unit: Option<&'a str>,
    excluded: usize,
    breakdown: Vec<FallbackGroup<'a>>,
}

#[derive(Serialize)]
struct FallbackGroup<'a> {
    label: &'a str,
    value: f64,
}

/// Templated summary used when the model cannot be reached.
#[derive(Clone, Debug)]
pub struct FallbackRenderer {
    tera: Option<Tera>,
}

impl Default for FallbackRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackRenderer {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        register_template_filters(&mut tera);
        match tera.add_raw_template(FALLBACK_TEMPLATE_NAME, FALLBACK_TEMPLATE) {
            Ok(()) => Self { tera: Some(tera) },
            Err(error) => {
                warn!(event_name = "composer.template.invalid", error = %error, "fallback template rejected");
                Self { tera: None }
            }
        }
    }

    pub fn render(&self, utterance: &str, metrics: &[MetricResult], caveats: &[String]) -> String {
        let rows = metrics.iter().map(fallback_row).collect::<Vec<_>>();
        let mut context = Context::new();
        context.insert("question", utterance.trim());
        context.insert("metrics", &rows);
        context.insert("caveats", caveats);

        let rendered = self.tera.as_ref().map(|tera| tera.render(FALLBACK_TEMPLATE_NAME, &context));
        match rendered {
            Some(Ok(text)) => text,
            Some(Err(error)) => {
                warn!(event_name = "composer.template.render_failed", error = %error, "using plain summary");
                plain_summary(utterance, metrics, caveats)
            }
            None => plain_summary(utterance, metrics, caveats),
        }
    }
}

fn fallback_row(metric: &MetricResult) -> FallbackMetric<'_> {
    let value = match &metric.value {
        MetricValue::Number(number) => serde_json::json!(number),
        MetricValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        MetricValue::NoData => Value::Null,
    };
    FallbackMetric {
        name: &metric.name,
        value,
        money: is_money(metric),
        unit: metric.unit.as_deref(),
        excluded: metric.excluded,
        breakdown: metric
            .breakdown
            .iter()
            .flatten()
            .map(|(label, value)| FallbackGroup { label, value: *value })
            .collect(),
    }
}

fn plain_summary(utterance: &str, metrics: &[MetricResult], caveats: &[String]) -> String {
    let mut text = format!("Here is what the board data shows for \"{}\":", utterance.trim());
    for metric in metrics {
        let _ = write!(text, "\n- {}: {}", metric.name, display_value(metric));
    }
    if !caveats.is_empty() {
        let _ = write!(text, "\n\nData quality: {}.", caveats.join("; "));
    }
    text
}

fn display_value(metric: &MetricResult) -> String {
    match &metric.value {
        MetricValue::Number(number) if is_money(metric) => format_inr(*number),
        MetricValue::Number(number) => match metric.unit.as_deref() {
            Some(unit) => format!("{} {unit}", format_plain(*number)),
            None => format_plain(*number),
        },
        MetricValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        MetricValue::NoData => "no data".to_string(),
    }
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("inr", tera_inr_filter);
    tera.register_filter("plain", tera_plain_filter);
}

fn number_arg(value: &tera::Value, filter: &str) -> tera::Result<f64> {
    value.as_f64().ok_or_else(|| tera::Error::msg(format!("{filter} filter expects a number")))
}

fn tera_inr_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    Ok(tera::Value::String(format_inr(number_arg(value, "inr")?)))
}

fn tera_plain_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    Ok(tera::Value::String(format_plain(number_arg(value, "plain")?)))
}

/// Turns computed metrics into the final briefing. The model only ever sees the
/// computed figures; when it stays unavailable the templated summary answers instead.
#[derive(Clone)]
pub struct ResponseComposer {
    llm: Arc<dyn LlmClient>,
    policy: BackoffPolicy,
    window: ConversationWindow,
    max_tokens: u32,
    fallback: FallbackRenderer,
    today: Option<NaiveDate>,
}

impl ResponseComposer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        policy: BackoffPolicy,
        window: ConversationWindow,
        max_tokens: u32,
    ) -> Self {
        Self { llm, policy, window, max_tokens, fallback: FallbackRenderer::new(), today: None }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn prompt(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        metrics: &[MetricResult],
        caveats: &[String],
    ) -> Prompt {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let notes = if caveats.is_empty() { "none".to_string() } else { caveats.join("\n") };
        let system = format!(
            "{ANALYST_INSTRUCTIONS}\n\nDATA QUALITY NOTES:\n{notes}\n\nTODAY'S DATE: {}",
            today.format("%Y-%m-%d")
        );

        let metrics_json = serde_json::to_string_pretty(metrics).unwrap_or_else(|_| "[]".to_string());
        let mut formatted = String::new();
        for metric in metrics {
            let _ = writeln!(formatted, "- {} = {}", metric.name, display_value(metric));
        }
        let question = format!(
            "User Question: {}\n\nMETRICS (the only figures you may cite):\n{metrics_json}\n\nFormatted values:\n{formatted}\nGive a concise, insight-driven answer based on these metrics.",
            utterance.trim()
        );

        let mut prompt = Prompt::new(system, self.max_tokens);
        for message in self.window.messages(history) {
            prompt.push(message);
        }
        prompt.with_message(ChatMessage::user(question))
    }

    pub async fn compose(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        metrics: &[MetricResult],
        quality: &QualityReport,
    ) -> Composition {
        let caveats = quality_caveats(quality, metrics);
        let prompt = self.prompt(utterance, history, metrics, &caveats);

        let mut last_error = ModelError::Unavailable("no attempt made".to_string());
        for attempt in 0..=self.policy.max_retries {
            let outcome = self.policy.attempt(self.llm.complete(&prompt)).await.and_then(|text| {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Err(ModelError::Unavailable("empty completion".to_string()))
                } else {
                    Ok(text)
                }
            });
            match outcome {
                Ok(answer) => {
                    debug!(event_name = "composer.answer.generated", attempt, "answer composed");
                    return Composition { answer, source: AnswerSource::Model, model_error: None };
                }
                Err(error) => {
                    warn!(
                        event_name = "composer.model_failed",
                        attempt,
                        error = %error,
                        "composer model call failed"
                    );
                    if attempt < self.policy.max_retries {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                    last_error = error;
                }
            }
        }

        Composition {
            answer: self.fallback.render(utterance, metrics, &caveats),
            source: AnswerSource::Fallback,
            model_error: Some(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use boardsight_core::{MetricResult, MetricValue, ModelError, QualityReport};

    use super::{format_inr, quality_caveats, AnswerSource, FallbackRenderer, ResponseComposer};
    use crate::conversation::ConversationWindow;
    use crate::llm::{LlmClient, Prompt};
    use crate::retry::BackoffPolicy;

    fn metric(name: &str, value: MetricValue, unit: Option<&str>) -> MetricResult {
        MetricResult {
            name: name.to_string(),
            aggregation: "sum".to_string(),
            board_id: None,
            value,
            unit: unit.map(ToString::to_string),
            breakdown: None,
            eligible: 4,
            excluded: 0,
        }
    }

    fn quality() -> QualityReport {
        QualityReport { total_items: 25, unparseable_dates: 3, missing_values: 2, ..QualityReport::default() }
    }

    struct FlakyLlm {
        failures: Mutex<u32>,
        seen: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl LlmClient for FlakyLlm {
        async fn complete(&self, prompt: &Prompt) -> Result<String, ModelError> {
            self.seen.lock().expect("lock").push(prompt.clone());
            let mut failures = self.failures.lock().expect("lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(ModelError::Timeout(30));
            }
            Ok("Pipeline stands at ₹1.2Cr.".to_string())
        }
    }

    fn composer(failures: u32) -> (ResponseComposer, Arc<FlakyLlm>) {
        let llm = Arc::new(FlakyLlm { failures: Mutex::new(failures), seen: Mutex::new(Vec::new()) });
        let composer = ResponseComposer::new(
            llm.clone(),
            BackoffPolicy::new(1, 1, Duration::from_secs(1)),
            ConversationWindow::new(10),
            2048,
        );
        (composer, llm)
    }

    #[test]
    fn inr_formatting_uses_indian_suffixes() {
        assert_eq!(format_inr(12_000_000.0), "₹1.2Cr");
        assert_eq!(format_inr(1_250_000.0), "₹12.5L");
        assert_eq!(format_inr(3_500.0), "₹3.5K");
        assert_eq!(format_inr(950.0), "₹950");
    }

    #[test]
    fn caveats_disclose_percentages_and_exclusions() {
        let mut excluded = metric("avg_deal", MetricValue::NoData, Some("INR"));
        excluded.excluded = 2;
        let caveats = quality_caveats(&quality(), &[excluded]);

        assert_eq!(caveats[0], "12% of items had unparseable dates (3 values)");
        assert_eq!(caveats[1], "2 missing values across 25 items");
        assert!(caveats.iter().any(|caveat| caveat == "avg_deal excludes 2 items with unparseable values"));
        assert!(caveats.iter().any(|caveat| caveat == "avg_deal had no eligible items"));
        assert!(quality_caveats(&QualityReport::default(), &[]).is_empty());
    }

    #[test]
    fn fallback_template_renders_money_breakdowns_and_caveats() {
        let mut by_stage = metric("value_by_stage", MetricValue::Number(1_500_000.0), Some("INR"));
        by_stage.breakdown = Some(BTreeMap::from([("Open".to_string(), 1_000_000.0), ("Won".to_string(), 500_000.0)]));
        let count = metric("deal_count", MetricValue::Number(7.0), Some("items"));
        let caveats = vec!["12% of items had unparseable dates (3 values)".to_string()];

        let text = FallbackRenderer::new().render("how is the pipeline?", &[by_stage, count], &caveats);

        assert!(text.contains("\"how is the pipeline?\""), "{text}");
        assert!(text.contains("- value_by_stage: ₹15.0L"), "{text}");
        assert!(text.contains("  - Open: ₹10.0L"), "{text}");
        assert!(text.contains("- deal_count: 7 items"), "{text}");
        assert!(text.contains("Data quality: 12% of items had unparseable dates (3 values)."), "{text}");
    }

    #[test]
    fn prompt_cites_only_computed_metrics() {
        let (composer, _) = composer(0);
        let metrics = [metric("pipeline_value", MetricValue::Number(12_000_000.0), Some("INR"))];
        let prompt = composer.prompt("pipeline?", &[], &metrics, &quality_caveats(&quality(), &metrics));

        let system = &prompt.messages[0].content;
        assert!(system.contains("Cite ONLY the figures listed under METRICS"));
        assert!(system.contains("12% of items had unparseable dates"));
        let user = prompt.last_user_message().expect("user message");
        assert!(user.contains("\"pipeline_value\""));
        assert!(user.contains("- pipeline_value = ₹1.2Cr"));
    }

    #[tokio::test]
    async fn one_retry_then_model_answer() {
        let (composer, llm) = composer(1);
        let composition = composer.compose("pipeline?", &[], &[], &QualityReport::default()).await;
        assert_eq!(composition.source, AnswerSource::Model);
        assert_eq!(composition.answer, "Pipeline stands at ₹1.2Cr.");
        assert_eq!(llm.seen.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_template() {
        let (composer, llm) = composer(5);
        let metrics = [metric("pipeline_value", MetricValue::Number(12_000_000.0), Some("INR"))];
        let composition = composer.compose("pipeline?", &[], &metrics, &quality()).await;

        assert_eq!(composition.source, AnswerSource::Fallback);
        assert_eq!(composition.model_error, Some(ModelError::Timeout(30)));
        assert!(composition.answer.contains("- pipeline_value: ₹1.2Cr"));
        assert_eq!(llm.seen.lock().expect("lock").len(), 2);
    }
}
