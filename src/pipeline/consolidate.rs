//! Section consolidation: merge every chunk's candidates for a section into
//! one value.
//!
//! ## Fan-in
//!
//! [`group_by_section`] regroups the fan-out's results (which arrive in
//! completion order) by section, each group in chunk order. It refuses to
//! pool results from more than one job.
//!
//! ## Merge heuristics
//!
//! Both strategies follow the same rules:
//!
//! - a value repeated across candidates wins over one seen once
//! - a value seen only once is still usable
//! - empty values and values expressing uncertainty are not candidates
//! - when nothing usable remains, the field is left empty
//!
//! [`ConsolidationStrategy::Llm`] hands the candidates to a model with these
//! rules in the prompt. [`ConsolidationStrategy::Vote`] applies them
//! mechanically: ties go to the earliest chunk and list fields become the
//! ordered union of their distinct entries.
//!
//! ## Grounding
//!
//! Whatever the strategy produced is then checked field by field against the
//! candidates ([`ground`]). A value that does not occur in the corresponding
//! field of at least one candidate is blanked, so the merged section never
//! contains anything no chunk reported.

use crate::config::{AnalysisConfig, ConsolidationStrategy};
use crate::error::{DocReportError, LlmCallError};
use crate::output::{Report, SectionExtractionResult};
use crate::pipeline::llm::{StructuredLlm, StructuredRequest};
use crate::progress::ProgressCallback;
use crate::prompts::{self, PromptSet};
use crate::retry::RetryPolicy;
use crate::sections::{SectionKind, SectionValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Field names that identify an entry inside a list of objects
/// (shareholders, managers).
const IDENTITY_FIELDS: [&str; 2] = ["shareholder_name", "name"];

/// Answers that mean "I don't know" rather than a value.
const UNCERTAIN_MARKERS: &[&str] = &[
    "?",
    "-",
    "--",
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not known",
    "unspecified",
    "not specified",
    "not available",
    "not provided",
    "not found",
    "unclear",
    "desconocido",
    "desconocida",
    "no especificado",
    "no especificada",
    "no disponible",
    "no aplica",
    "no encontrado",
    "sin información",
    "sin informacion",
];

// ── Fan-in ───────────────────────────────────────────────────────────────

/// Group results by section, each group sorted by `chunk_index`.
///
/// Fails with [`DocReportError::JobIdMismatch`] on the first result whose
/// `job_id` is not `job_id`.
pub fn group_by_section(
    job_id: &str,
    results: Vec<SectionExtractionResult>,
) -> Result<BTreeMap<SectionKind, Vec<SectionExtractionResult>>, DocReportError> {
    let mut groups: BTreeMap<SectionKind, Vec<SectionExtractionResult>> = BTreeMap::new();
    for result in results {
        if result.job_id != job_id {
            return Err(DocReportError::JobIdMismatch {
                expected: job_id.to_string(),
                found: result.job_id,
            });
        }
        groups.entry(result.section).or_default().push(result);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.chunk_index);
    }
    Ok(groups)
}

// ── Consolidator ─────────────────────────────────────────────────────────

/// Merges per-chunk candidates into one value per section.
#[derive(Clone)]
pub struct SectionConsolidator {
    llm: Arc<dyn StructuredLlm>,
    prompts: &'static PromptSet,
    retry: RetryPolicy,
    timeout: Duration,
    strategy: ConsolidationStrategy,
    progress: Option<ProgressCallback>,
}

impl SectionConsolidator {
    pub fn new(llm: Arc<dyn StructuredLlm>, config: &AnalysisConfig) -> Self {
        Self {
            llm,
            prompts: config.prompts(),
            retry: config.retry,
            timeout: config.consolidation_timeout(),
            strategy: config.consolidation_strategy,
            progress: config.progress_callback.clone(),
        }
    }

    /// Merge `candidates` (in chunk order) for one section.
    pub async fn consolidate(
        &self,
        section: SectionKind,
        candidates: &[SectionValue],
    ) -> Result<SectionValue, DocReportError> {
        if candidates.is_empty() {
            return Err(DocReportError::ConsolidationFailed {
                section,
                attempts: 0,
                detail: "no candidates to consolidate".into(),
            });
        }
        let values: Vec<Value> = candidates.iter().map(SectionValue::to_json).collect();
        let pool: Vec<&Value> = values.iter().collect();

        let merged = match self.strategy {
            ConsolidationStrategy::Llm => self.ask_model(section, &values).await?,
            ConsolidationStrategy::Vote => vote(&pool),
        };

        let grounded = fill_missing(ground(&merged, &pool), &pool);
        if grounded != merged {
            debug!("{}: adjusted values not backed by the candidates", section);
        }
        SectionValue::from_json(section, grounded).map_err(|e| DocReportError::ReportValidation {
            section: section.to_string(),
            detail: e.to_string(),
        })
    }

    /// Group `results` for `job_id` and consolidate every section present.
    pub async fn consolidate_report(
        &self,
        job_id: &str,
        results: Vec<SectionExtractionResult>,
    ) -> Result<Report, DocReportError> {
        let groups = group_by_section(job_id, results)?;
        let mut report = Report::new();

        for (section, group) in groups {
            let candidates: Vec<SectionValue> = group
                .into_iter()
                .map(|r| r.extracted_information)
                .collect();
            info!(
                "Job {}: consolidating {} from {} candidates ({:?})",
                job_id,
                section,
                candidates.len(),
                self.strategy
            );
            let value = self.consolidate(section, &candidates).await?;
            if let Some(ref cb) = self.progress {
                cb.on_section_consolidated(section, candidates.len());
            }
            report.insert(value);
        }
        Ok(report)
    }

    async fn ask_model(&self, section: SectionKind, candidates: &[Value]) -> Result<Value, DocReportError> {
        let information = serde_json::to_string_pretty(candidates)
            .map_err(|e| DocReportError::Internal(format!("candidate serialisation: {e}")))?;
        let schema = section.json_schema().to_string();
        let (system, user) =
            prompts::render_consolidation(self.prompts, section.as_str(), &schema, &information);
        let request = StructuredRequest {
            label: format!("consolidate / {}", section),
            system,
            user,
        };

        let raw = self
            .retry
            .run(&request.label, Some(self.timeout), |_| self.llm.complete_json(&request))
            .await
            .map_err(|failure| match failure.last_error {
                LlmCallError::InvalidOutput(detail) => DocReportError::ReportValidation {
                    section: section.to_string(),
                    detail,
                },
                err => {
                    warn!("{}: failed after {} attempts", request.label, failure.attempts);
                    DocReportError::ConsolidationFailed {
                        section,
                        attempts: failure.attempts,
                        detail: err.to_string(),
                    }
                }
            })?;

        Ok(unwrap_section_envelope(section, raw))
    }
}

/// Models sometimes answer `{"<section>": {…}}` instead of the bare object.
fn unwrap_section_envelope(section: SectionKind, raw: Value) -> Value {
    match raw {
        Value::Object(mut map) if map.len() == 1 => match map.remove(section.as_str()) {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                map.insert(section.as_str().to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

// ── Vote ─────────────────────────────────────────────────────────────────

/// Merge candidate JSON values mechanically.
pub fn vote(candidates: &[&Value]) -> Value {
    let Some(first) = candidates.iter().find(|v| !v.is_null()) else {
        return Value::Null;
    };

    match *first {
        Value::Object(_) => {
            let mut keys: Vec<&String> = Vec::new();
            for candidate in candidates {
                if let Value::Object(map) = candidate {
                    for key in map.keys() {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }
            }
            let mut out = Map::new();
            for key in keys {
                let field: Vec<&Value> = candidates
                    .iter()
                    .filter_map(|c| c.get(key.as_str()))
                    .collect();
                out.insert(key.clone(), vote(&field));
            }
            Value::Object(out)
        }
        Value::Array(_) => vote_list(candidates),
        Value::String(_) => most_frequent(
            candidates
                .iter()
                .copied()
                .filter(|v| v.as_str().is_some_and(is_usable)),
        )
        .cloned()
        .unwrap_or_else(|| Value::String(String::new())),
        _ => most_frequent(candidates.iter().copied().filter(|v| !v.is_null()))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

/// Ordered union of list entries. Objects are grouped by their identity
/// field and merged per group; entries without an identity are skipped.
fn vote_list(candidates: &[&Value]) -> Value {
    let items: Vec<&Value> = candidates
        .iter()
        .filter_map(|c| c.as_array())
        .flatten()
        .collect();

    let mut groups: Vec<(String, Vec<&Value>)> = Vec::new();
    for item in items {
        let key = match item {
            Value::Object(_) => match identity_of(item) {
                Some(id) => id,
                None => continue,
            },
            Value::String(s) if !is_usable(s) => continue,
            other => match_key(other),
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }

    Value::Array(
        groups
            .into_iter()
            .map(|(_, members)| match members[0] {
                Value::Object(_) => vote(&members),
                _ => members[0].clone(),
            })
            .collect(),
    )
}

/// The most frequent value; the earliest one wins a tie.
fn most_frequent<'a>(values: impl Iterator<Item = &'a Value>) -> Option<&'a Value> {
    let mut tally: Vec<(String, &'a Value, usize)> = Vec::new();
    for value in values {
        let key = match_key(value);
        match tally.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => tally.push((key, value, 1)),
        }
    }

    let mut best: Option<&(String, &'a Value, usize)> = None;
    for entry in &tally {
        if best.map_or(true, |b| entry.2 > b.2) {
            best = Some(entry);
        }
    }
    best.map(|(_, value, _)| *value)
}

// ── Grounding ────────────────────────────────────────────────────────────

/// Blank every part of `value` that no candidate in `pool` backs.
///
/// `pool` holds the candidates' values at the same position as `value`.
/// Strings must match a candidate string (ignoring case and whitespace) and
/// are replaced by that candidate's spelling; uncertain strings are blanked.
/// List entries are matched against every candidate's entries, and object
/// entries whose identity field is blanked are removed. Booleans and numbers
/// no candidate holds become `null`; [`fill_missing`] settles those.
pub fn ground(value: &Value, pool: &[&Value]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, field) in map {
                let field_pool: Vec<&Value> = pool.iter().filter_map(|c| c.get(key.as_str())).collect();
                out.insert(key.clone(), ground(field, &field_pool));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let element_pool: Vec<&Value> = pool
                .iter()
                .filter_map(|c| c.as_array())
                .flatten()
                .collect();
            let kept = items
                .iter()
                .filter_map(|item| ground_entry(item, &element_pool))
                .collect();
            Value::Array(kept)
        }
        Value::String(s) => {
            if !is_usable(s) {
                return Value::String(String::new());
            }
            let key = normalise(s);
            let backed = pool
                .iter()
                .filter_map(|c| c.as_str())
                .find(|c| normalise(c) == key);
            Value::String(backed.unwrap_or_default().to_string())
        }
        Value::Bool(_) => {
            if pool.contains(&value) {
                value.clone()
            } else {
                pool.iter()
                    .find(|c| c.is_boolean())
                    .map(|c| (*c).clone())
                    .unwrap_or(Value::Null)
            }
        }
        Value::Null => Value::Null,
        other => {
            if pool.contains(&other) {
                other.clone()
            } else {
                Value::Null
            }
        }
    }
}

/// Give every top-level field that `value` lacks, or holds as `null`, the
/// candidates' own vote for it.
///
/// Section shapes fill absent fields with defaults on deserialisation, so a
/// field the model left out must be settled here from the candidates.
pub fn fill_missing(value: Value, pool: &[&Value]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    for candidate in pool {
        let Some(fields) = candidate.as_object() else {
            continue;
        };
        for key in fields.keys() {
            if map.get(key).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let field_pool: Vec<&Value> = pool.iter().filter_map(|c| c.get(key.as_str())).collect();
            match ground(&vote(&field_pool), &field_pool) {
                Value::Null => {
                    map.remove(key);
                }
                voted => {
                    map.insert(key.clone(), voted);
                }
            }
        }
    }
    Value::Object(map)
}

fn ground_entry(item: &Value, pool: &[&Value]) -> Option<Value> {
    if !item.is_object() {
        let grounded = ground(item, pool);
        return (!is_blank(&grounded)).then_some(grounded);
    }

    // Prefer the candidate entries describing the same person.
    let same: Vec<&Value> = match identity_of(item) {
        Some(id) => pool
            .iter()
            .copied()
            .filter(|c| identity_of(c).as_deref() == Some(id.as_str()))
            .collect(),
        None => Vec::new(),
    };
    let grounded = ground(item, if same.is_empty() { pool } else { &same });

    let had_identity = IDENTITY_FIELDS.iter().any(|f| item.get(*f).is_some());
    if (had_identity && identity_of(&grounded).is_none()) || is_blank(&grounded) {
        None
    } else {
        Some(grounded)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn identity_of(item: &Value) -> Option<String> {
    IDENTITY_FIELDS
        .iter()
        .filter_map(|f| item.get(*f).and_then(Value::as_str))
        .find(|s| is_usable(s))
        .map(normalise)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        Value::Object(map) => map.values().all(|v| v.is_boolean() || is_blank(v)),
        _ => false,
    }
}

fn is_usable(s: &str) -> bool {
    let n = normalise(s);
    !n.is_empty() && !UNCERTAIN_MARKERS.contains(&n.trim_end_matches('.'))
}

fn normalise(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn match_key(value: &Value) -> String {
    match value {
        Value::String(s) => normalise(s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::{GeneralInformation, LegalRepresentative, ShareCapital, Shareholder};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        answers: Mutex<Vec<Result<Value, LlmCallError>>>,
        calls: Mutex<Vec<StructuredRequest>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Value, LlmCallError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StructuredLlm for Scripted {
        async fn complete_json(&self, request: &StructuredRequest) -> Result<Value, LlmCallError> {
            self.calls.lock().unwrap().push(request.clone());
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Err(LlmCallError::Throttled("429".into()))
            } else {
                answers.remove(0)
            }
        }
    }

    fn consolidator(llm: Arc<Scripted>, strategy: ConsolidationStrategy) -> SectionConsolidator {
        let config = AnalysisConfig::builder()
            .retry(RetryPolicy::immediate(10))
            .consolidation_strategy(strategy)
            .build()
            .unwrap();
        SectionConsolidator::new(llm, &config)
    }

    fn representative(name: &str) -> SectionValue {
        SectionValue::LegalRepresentative(LegalRepresentative {
            name: name.into(),
            position: "Director".into(),
            powers: vec!["sign contracts".into()],
        })
    }

    fn result(job_id: &str, chunk_index: usize, value: SectionValue) -> SectionExtractionResult {
        SectionExtractionResult {
            section: value.kind(),
            chunk_index,
            job_id: job_id.into(),
            confidence_level: 95,
            conclusion: true,
            extracted_information: value,
            thinking: String::new(),
        }
    }

    #[test]
    fn grouping_sorts_by_chunk_and_section() {
        let groups = group_by_section(
            "job-1",
            vec![
                result("job-1", 2, representative("Alice")),
                result(
                    "job-1",
                    1,
                    SectionValue::GeneralInformation(GeneralInformation::default()),
                ),
                result("job-1", 0, representative("Bob")),
            ],
        )
        .unwrap();
        let sections: Vec<_> = groups.keys().copied().collect();
        assert_eq!(
            sections,
            vec![SectionKind::GeneralInformation, SectionKind::LegalRepresentative]
        );
        let order: Vec<usize> = groups[&SectionKind::LegalRepresentative]
            .iter()
            .map(|r| r.chunk_index)
            .collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn grouping_rejects_foreign_job_id() {
        let err = group_by_section(
            "job-1",
            vec![
                result("job-1", 0, representative("Alice")),
                result("job-2", 1, representative("Alice")),
            ],
        )
        .unwrap_err();
        match err {
            DocReportError::JobIdMismatch { expected, found } => {
                assert_eq!(expected, "job-1");
                assert_eq!(found, "job-2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn vote_prefers_the_repeated_value() {
        let c = consolidator(Scripted::new(vec![]), ConsolidationStrategy::Vote);
        let merged = c
            .consolidate(
                SectionKind::LegalRepresentative,
                &[representative("Alice"), representative("Alice"), representative("Bob")],
            )
            .await
            .unwrap();
        assert_eq!(merged, representative("Alice"));
    }

    #[tokio::test]
    async fn vote_ignores_uncertain_values_and_breaks_ties_by_chunk_order() {
        let c = consolidator(Scripted::new(vec![]), ConsolidationStrategy::Vote);
        let merged = c
            .consolidate(
                SectionKind::LegalRepresentative,
                &[
                    representative("Unknown"),
                    representative("Carol"),
                    representative("N/A"),
                    representative("Unknown"),
                    representative("Dave"),
                ],
            )
            .await
            .unwrap();
        match merged {
            SectionValue::LegalRepresentative(r) => assert_eq!(r.name, "Carol"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn vote_unions_shareholders_by_name() {
        let holder = |name: &str, units: &str| Shareholder {
            shareholder_name: name.into(),
            stock_units: units.into(),
            stocks_value: String::new(),
        };
        let a = SectionValue::Shareholders(ShareCapital {
            shareholders: vec![holder("Alice", "500"), holder("Bob", "")],
        });
        let b = SectionValue::Shareholders(ShareCapital {
            shareholders: vec![holder("alice", "500"), holder("Bob", "250"), holder("", "1")],
        });
        let c = consolidator(Scripted::new(vec![]), ConsolidationStrategy::Vote);
        match c.consolidate(SectionKind::Shareholders, &[a, b]).await.unwrap() {
            SectionValue::Shareholders(capital) => {
                assert_eq!(capital.shareholders.len(), 2);
                assert_eq!(capital.shareholders[0].shareholder_name, "Alice");
                assert_eq!(capital.shareholders[1].stock_units, "250");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_answer_after_three_throttles_is_used() {
        let answer = json!({"name": "Alice", "position": "Director", "powers": ["sign contracts"]});
        let llm = Scripted::new(vec![
            Err(LlmCallError::Throttled("ThrottlingException".into())),
            Err(LlmCallError::Throttled("ThrottlingException".into())),
            Err(LlmCallError::Throttled("ThrottlingException".into())),
            Ok(answer),
        ]);
        let c = consolidator(Arc::clone(&llm), ConsolidationStrategy::Llm);
        let merged = c
            .consolidate(
                SectionKind::LegalRepresentative,
                &[representative("Alice"), representative("Alice"), representative("Bob")],
            )
            .await
            .unwrap();
        assert_eq!(merged, representative("Alice"));
        assert_eq!(llm.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn throttling_forever_fails_after_ten_attempts() {
        let llm = Scripted::new(vec![]);
        let c = consolidator(Arc::clone(&llm), ConsolidationStrategy::Llm);
        let err = c
            .consolidate(SectionKind::LegalRepresentative, &[representative("Alice")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocReportError::ConsolidationFailed { attempts: 10, .. }));
        assert_eq!(llm.calls.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn model_cannot_introduce_new_values() {
        let llm = Scripted::new(vec![Ok(json!({
            "name": "Zed Corp",
            "position": "director",
            "powers": ["sign contracts", "sell the building"]
        }))]);
        let c = consolidator(llm, ConsolidationStrategy::Llm);
        match c
            .consolidate(SectionKind::LegalRepresentative, &[representative("Alice")])
            .await
            .unwrap()
        {
            SectionValue::LegalRepresentative(r) => {
                assert_eq!(r.name, "");
                assert_eq!(r.position, "Director");
                assert_eq!(r.powers, vec!["sign contracts".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn section_envelope_is_unwrapped() {
        let llm = Scripted::new(vec![Ok(json!({
            "legal_representative": {"name": "Alice", "position": "Director", "powers": []}
        }))]);
        let c = consolidator(llm, ConsolidationStrategy::Llm);
        match c
            .consolidate(SectionKind::LegalRepresentative, &[representative("Alice")])
            .await
            .unwrap()
        {
            SectionValue::LegalRepresentative(r) => assert_eq!(r.name, "Alice"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unusable_model_output_is_a_validation_error() {
        let llm = Scripted::new(vec![Err(LlmCallError::InvalidOutput("no JSON".into()))]);
        let c = consolidator(llm, ConsolidationStrategy::Llm);
        let err = c
            .consolidate(SectionKind::LegalRepresentative, &[representative("Alice")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocReportError::ReportValidation { .. }));
    }

    #[tokio::test]
    async fn report_keeps_fixed_section_order() {
        let c = consolidator(Scripted::new(vec![]), ConsolidationStrategy::Vote);
        let report = c
            .consolidate_report(
                "job-1",
                vec![
                    result("job-1", 1, representative("Alice")),
                    result(
                        "job-1",
                        0,
                        SectionValue::GeneralInformation(GeneralInformation {
                            name: "ACME".into(),
                            ..Default::default()
                        }),
                    ),
                ],
            )
            .await
            .unwrap();
        let kinds: Vec<_> = report.iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![SectionKind::GeneralInformation, SectionKind::LegalRepresentative]
        );
    }

    #[test]
    fn grounded_output_never_leaves_the_candidates() {
        let candidates = [
            json!({"name": "ACME", "social_object": ["trade", "import"], "open_to_foreigners": false}),
            json!({"name": "ACME S.A.", "social_object": ["export"], "open_to_foreigners": false}),
        ];
        let pool: Vec<&Value> = candidates.iter().collect();
        let proposed = json!({
            "name": "ACME Holdings",
            "social_object": ["trade", "mining", "EXPORT"],
            "open_to_foreigners": true
        });
        let grounded = ground(&proposed, &pool);
        assert_eq!(
            grounded,
            json!({"name": "", "social_object": ["trade", "export"], "open_to_foreigners": false})
        );
    }

    #[tokio::test]
    async fn fields_the_model_leaves_out_come_from_the_candidates() {
        let closed = |name: &str| {
            SectionValue::GeneralInformation(GeneralInformation {
                name: name.into(),
                nationality: "Mexican".into(),
                open_to_foreigners: false,
                ..Default::default()
            })
        };
        let llm = Scripted::new(vec![Ok(json!({"name": "ACME", "nationality": null}))]);
        let c = consolidator(llm, ConsolidationStrategy::Llm);
        match c
            .consolidate(SectionKind::GeneralInformation, &[closed("ACME"), closed("ACME")])
            .await
            .unwrap()
        {
            SectionValue::GeneralInformation(g) => {
                assert_eq!(g.name, "ACME");
                assert_eq!(g.nationality, "Mexican");
                assert!(!g.open_to_foreigners);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unbacked_bool_is_left_for_the_candidates_to_decide() {
        let candidates = [json!({"open_to_foreigners": false, "name": "ACME"})];
        let pool: Vec<&Value> = candidates.iter().collect();

        let grounded = ground(&json!({"flag": true}), &pool);
        assert_eq!(grounded, json!({"flag": null}));

        let filled = fill_missing(json!({"name": "ACME"}), &pool);
        assert_eq!(filled, json!({"name": "ACME", "open_to_foreigners": false}));
    }
}
