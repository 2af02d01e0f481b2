//! Target semantics and the per-frame semantic filter.
//!
//! A target category maps to an allow-list of labels plus a confidence floor.
//! Labels match case-insensitively, either exactly against `labels` or by
//! substring against `keywords`. A target that names no known category falls
//! back to accepting any label above a stricter floor.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use super::meets;
use crate::detect::Detection;

const DEFAULT_CATEGORY_FLOOR: f32 = 0.75;

fn default_category_floor() -> f32 {
    DEFAULT_CATEGORY_FLOOR
}

/// Allow-list for one target category.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    /// Labels accepted on exact (case-insensitive) match.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Labels containing any of these (case-insensitive) are accepted.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_category_floor")]
    pub min_confidence: f32,
}

impl CategoryRule {
    pub fn new(name: &str, labels: &[&str], keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            min_confidence: DEFAULT_CATEGORY_FLOOR,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn matches_label(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            return false;
        }
        self.labels.iter().any(|l| l.to_lowercase() == label)
            || self
                .keywords
                .iter()
                .any(|k| !k.is_empty() && label.contains(&k.to_lowercase()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("category name must not be empty"));
        }
        if self.labels.is_empty() && self.keywords.is_empty() {
            return Err(anyhow!(
                "category '{}' must declare at least one label or keyword",
                self.name
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!(
                "category '{}' min_confidence must be within 0..=1",
                self.name
            ));
        }
        Ok(())
    }
}

/// The active filter rule for a session. Read-only to the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetSemantics {
    /// A known category with its allow-list.
    Category(CategoryRule),
    /// Unrecognized target: any label is relevant above the floor.
    AnyLabel { name: String, min_confidence: f32 },
}

impl TargetSemantics {
    pub fn name(&self) -> &str {
        match self {
            TargetSemantics::Category(rule) => &rule.name,
            TargetSemantics::AnyLabel { name, .. } => name,
        }
    }

    pub fn min_confidence(&self) -> f32 {
        match self {
            TargetSemantics::Category(rule) => rule.min_confidence,
            TargetSemantics::AnyLabel { min_confidence, .. } => *min_confidence,
        }
    }

    pub fn accepts_label(&self, label: &str) -> bool {
        match self {
            TargetSemantics::Category(rule) => rule.matches_label(label),
            TargetSemantics::AnyLabel { .. } => true,
        }
    }

    /// Label and confidence check with the rule's own floor.
    pub fn accepts(&self, detection: &Detection) -> bool {
        self.accepts_label(&detection.label) && meets(detection.confidence, self.min_confidence())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TargetSemantics::AnyLabel { .. })
    }
}

/// Known target categories.
#[derive(Clone, Debug)]
pub struct CategoryCatalogue {
    rules: Vec<CategoryRule>,
    fallback_min_confidence: f32,
}

impl CategoryCatalogue {
    /// Built-in categories used by the challenge screens.
    pub fn builtin(fallback_min_confidence: f32) -> Self {
        let rules = vec![
            CategoryRule::new("vehicles", &["car", "truck", "van", "bus"], &["vehicle", "automobile"]),
            CategoryRule::new("cats", &["cat"], &["kitten", "feline"]),
            CategoryRule::new("dogs", &["dog"], &["puppy", "canine"]),
            CategoryRule::new("people", &["person"], &["human", "pedestrian"]),
            CategoryRule::new("birds", &["bird"], &["pigeon", "sparrow"]),
            CategoryRule::new("bicycles", &["bicycle", "bike"], &["bicycle"]),
            CategoryRule::new("plants", &["potted plant"], &["plant", "flower"]),
        ];
        Self {
            rules,
            fallback_min_confidence,
        }
    }

    /// Add categories, replacing built-ins with the same (case-insensitive) name.
    pub fn with_rules(mut self, extra: &[CategoryRule]) -> Self {
        for rule in extra {
            self.rules
                .retain(|existing| !existing.name.eq_ignore_ascii_case(&rule.name));
            self.rules.push(rule.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&CategoryRule> {
        let name = name.trim();
        self.rules.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Resolve a target name. Unknown names fall back to `AnyLabel`.
    pub fn resolve(&self, name: &str) -> TargetSemantics {
        match self.get(name) {
            Some(rule) => TargetSemantics::Category(rule.clone()),
            None => TargetSemantics::AnyLabel {
                name: name.trim().to_string(),
                min_confidence: self.fallback_min_confidence,
            },
        }
    }
}

/// Semantic filter applied to raw per-frame candidates.
pub struct DetectionFilter;

impl DetectionFilter {
    /// Keep candidates relevant to the target. Pure and order-preserving.
    pub fn filter(candidates: &[Detection], semantics: &TargetSemantics) -> Vec<Detection> {
        candidates
            .iter()
            .filter(|d| d.confidence.is_finite() && semantics.accepts(d))
            .cloned()
            .collect()
    }
}
