//! Intent detection over incoming user messages.
//!
//! The default detector is rule-based: exit signals end the active workflow,
//! registered triggers pull the conversation into a workflow, and simple
//! regex extraction surfaces entities for context hydration. Detection is a
//! pure function of (message, registry, active workflow): the same inputs
//! always produce the same analysis.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::orchestrator::registry::WorkflowRegistry;
use crate::orchestrator::session::UserSession;

/// Messages containing any of these (with a workflow active) exit back to
/// the general context.
const EXIT_SIGNALS: &[&str] = &[
    "done",
    "finished",
    "complete",
    "exit",
    "stop",
    "end session",
    "quit",
];

/// A workflow switch fires only above this confidence.
const SWITCH_THRESHOLD: f64 = 0.7;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());
static CHARACTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:character|person|called|named)\s+([A-Z][A-Za-z]+)").unwrap()
});
static TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:about|involving|featuring)\s+(\w+(?:\s+\w+)?)").unwrap()
});

/// One detected intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub name: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// One extracted entity, with its span in the original message when known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

/// The outcome of analyzing one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAnalysis {
    /// Overall confidence in `[0, 1]`.
    pub confidence: f64,
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    pub should_switch_workflow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Value>,
}

impl IntentAnalysis {
    /// The low-confidence fallback: keep whatever context is current.
    pub fn continue_current() -> Self {
        Self {
            confidence: 0.1,
            intents: vec![Intent {
                name: "continue_current".to_string(),
                confidence: 0.1,
                parameters: None,
            }],
            entities: Vec::new(),
            should_switch_workflow: false,
            target_workflow: None,
            extracted_data: None,
        }
    }
}

/// A function of (message, session) that decides whether to switch workflow.
#[async_trait::async_trait]
pub trait IntentDetector: Send + Sync {
    async fn analyze_message(&self, message: &str, session: &UserSession) -> IntentAnalysis;
}

/// The rule-based baseline detector.
///
/// Fuzzy trigger matches (every word of the trigger somewhere in the
/// message) cap at confidence 0.6; a trigger like "help me" therefore
/// matches any message containing both words, but stays under the 0.7
/// switch threshold, which is the only safety net against spurious
/// switches.
pub struct RuleBasedDetector {
    registry: Arc<WorkflowRegistry>,
}

impl RuleBasedDetector {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self { registry }
    }

    fn is_exit_message(&self, lowered: &str, session: &UserSession) -> bool {
        if EXIT_SIGNALS.iter().any(|s| lowered.contains(s)) {
            return true;
        }
        // Workflow-declared exit signals extend the built-in set.
        session
            .active_workflow
            .as_deref()
            .and_then(|id| self.registry.get(id))
            .and_then(|w| w.exit_signals)
            .is_some_and(|signals| {
                signals.iter().any(|s| lowered.contains(&s.to_lowercase()))
            })
    }

    /// Confidence of one trigger against a lowered message.
    ///
    /// Exact match scores 1.0. A substring match scores within (0.8, 1.0),
    /// scaled by how much of the message the trigger covers, so an explicit
    /// trigger phrase always clears the switch threshold. A fuzzy match
    /// (all trigger words present anywhere) scores 0.6, below it.
    fn trigger_confidence(trigger: &str, lowered: &str) -> f64 {
        let trigger = trigger.to_lowercase();
        if lowered == trigger {
            return 1.0;
        }
        if lowered.contains(&trigger) {
            return 0.8 + (trigger.len() as f64 / lowered.len() as f64) * 0.2;
        }
        let words: Vec<&str> = trigger.split_whitespace().collect();
        if !words.is_empty() && words.iter().all(|w| lowered.contains(w)) {
            return 0.6;
        }
        0.0
    }

    fn extract_entities(message: &str) -> Vec<Entity> {
        let mut entities = Vec::new();
        let mut collect = |kind: &str, re: &Regex| {
            for m in re.find_iter(message) {
                entities.push(Entity {
                    entity_type: kind.to_string(),
                    value: m.as_str().to_string(),
                    confidence: 0.9,
                    start_index: Some(m.start()),
                    end_index: Some(m.end()),
                });
            }
        };
        collect("email", &EMAIL_RE);
        collect("url", &URL_RE);
        collect("number", &NUMBER_RE);
        entities
    }

    /// Workflow-specific extraction keyed off the workflow id.
    fn extract_workflow_data(workflow_id: &str, message: &str, data: &mut Map<String, Value>) {
        if workflow_id.contains("character")
            && let Some(caps) = CHARACTER_RE.captures(message)
        {
            data.insert("characterName".to_string(), json!(caps[1].to_string()));
        }
        if workflow_id.contains("story")
            && let Some(caps) = TOPIC_RE.captures(message)
        {
            data.insert("topic".to_string(), json!(caps[1].to_string()));
        }
    }
}

#[async_trait::async_trait]
impl IntentDetector for RuleBasedDetector {
    async fn analyze_message(&self, message: &str, session: &UserSession) -> IntentAnalysis {
        let lowered = message.to_lowercase();
        let trimmed = lowered.trim().to_string();

        if session.active_workflow.is_some() && self.is_exit_message(&trimmed, session) {
            return IntentAnalysis {
                confidence: 0.9,
                intents: vec![Intent {
                    name: "exit_workflow".to_string(),
                    confidence: 0.9,
                    parameters: None,
                }],
                entities: Vec::new(),
                should_switch_workflow: true,
                target_workflow: None,
                extracted_data: Some(json!({ "reason": "user_requested" })),
            };
        }

        // Candidates are workflows with any trigger scoring above zero
        // (substring or fuzzy); the first in registration order wins.
        let scored = self
            .registry
            .all()
            .into_iter()
            .map(|w| {
                let score = w
                    .triggers
                    .iter()
                    .map(|t| Self::trigger_confidence(t, &trimmed))
                    .fold(0.0f64, f64::max);
                (w, score)
            })
            .find(|(_, score)| *score > 0.0);

        if let Some((workflow, confidence)) = scored {
            let entities = Self::extract_entities(message);
            let mut data = Map::new();
            for entity in &entities {
                let key = format!("{}s", entity.entity_type);
                if let Some(bucket) = data
                    .entry(key)
                    .or_insert_with(|| json!([]))
                    .as_array_mut()
                {
                    bucket.push(json!(entity.value));
                }
            }
            Self::extract_workflow_data(&workflow.id, message, &mut data);

            return IntentAnalysis {
                confidence,
                intents: vec![Intent {
                    name: "start_workflow".to_string(),
                    confidence,
                    parameters: Some(json!({ "workflow": workflow.id.clone() })),
                }],
                entities,
                should_switch_workflow: confidence > SWITCH_THRESHOLD,
                target_workflow: Some(workflow.id),
                extracted_data: if data.is_empty() {
                    None
                } else {
                    Some(Value::Object(data))
                },
            };
        }


        IntentAnalysis::continue_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::registry::WorkflowDefinition;

    fn detector() -> RuleBasedDetector {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(
            WorkflowDefinition::new("character-creation", "Character creation", "Builds characters")
                .with_triggers(&["create character"]),
        );
        registry.register(
            WorkflowDefinition::new("story-planning", "Story planning", "Plans stories")
                .with_triggers(&["plan a story"]),
        );
        RuleBasedDetector::new(registry)
    }

    #[tokio::test]
    async fn exact_trigger_scores_full_confidence() {
        let detector = detector();
        let session = UserSession::new("s", "u", "U");
        let analysis = detector.analyze_message("Create Character", &session).await;
        assert_eq!(analysis.confidence, 1.0);
        assert!(analysis.should_switch_workflow);
        assert_eq!(analysis.target_workflow.as_deref(), Some("character-creation"));
    }

    #[tokio::test]
    async fn substring_match_clears_switch_threshold() {
        let detector = detector();
        let session = UserSession::new("s", "u", "U");
        let message = "please create character now";
        let analysis = detector.analyze_message(message, &session).await;
        let expected = 0.8 + ("create character".len() as f64 / message.len() as f64) * 0.2;
        assert!((analysis.confidence - expected).abs() < 1e-9);
        assert!(analysis.should_switch_workflow);
    }

    #[tokio::test]
    async fn fuzzy_match_stays_below_switch_threshold() {
        let detector = detector();
        let session = UserSession::new("s", "u", "U");
        let analysis = detector
            .analyze_message("I want to plan out a whole story arc", &session)
            .await;
        assert_eq!(analysis.confidence, 0.6);
        assert!(!analysis.should_switch_workflow);
        assert_eq!(analysis.target_workflow.as_deref(), Some("story-planning"));
    }

    #[tokio::test]
    async fn trigger_longer_than_message_scores_zero() {
        let registry = Arc::new(WorkflowRegistry::new());
        registry.register(
            WorkflowDefinition::new("wf", "Wf", "")
                .with_triggers(&["an extremely long trigger phrase"]),
        );
        let detector = RuleBasedDetector::new(registry);
        let session = UserSession::new("s", "u", "U");
        // No candidate matches at all, so the fallback applies.
        let analysis = detector.analyze_message("long trigger", &session).await;
        assert_eq!(analysis.intents[0].name, "continue_current");
        assert_eq!(analysis.confidence, 0.1);
    }

    #[tokio::test]
    async fn exit_signal_requires_active_workflow() {
        let detector = detector();
        let mut session = UserSession::new("s", "u", "U");

        let idle = detector.analyze_message("I'm done", &session).await;
        assert_eq!(idle.intents[0].name, "continue_current");

        session.active_workflow = Some("character-creation".to_string());
        let active = detector.analyze_message("I'm done", &session).await;
        assert_eq!(active.intents[0].name, "exit_workflow");
        assert!(active.should_switch_workflow);
        assert!(active.target_workflow.is_none());
        assert_eq!(
            active.extracted_data.unwrap()["reason"],
            json!("user_requested")
        );
    }

    #[tokio::test]
    async fn entities_and_character_name_are_extracted() {
        let detector = detector();
        let session = UserSession::new("s", "u", "U");
        let analysis = detector
            .analyze_message(
                "create character named Ada, reachable at ada@example.com, age 36",
                &session,
            )
            .await;

        let kinds: Vec<_> = analysis
            .entities
            .iter()
            .map(|e| e.entity_type.as_str())
            .collect();
        assert!(kinds.contains(&"email"));
        assert!(kinds.contains(&"number"));

        let data = analysis.extracted_data.unwrap();
        assert_eq!(data["characterName"], json!("Ada"));
        assert_eq!(data["emails"][0], json!("ada@example.com"));
    }

    #[tokio::test]
    async fn detection_is_deterministic() {
        let detector = detector();
        let session = UserSession::new("s", "u", "U");
        let first = detector.analyze_message("create character", &session).await;
        let second = detector.analyze_message("create character", &session).await;
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.target_workflow, second.target_workflow);
    }
}
