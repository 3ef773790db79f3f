/*
 * Taint Configuration
 *
 * JSON rule document enumerating sources, sinks, pass-throughs and
 * sanitizers keyed by method-signature patterns. Two layers exist: a
 * default document embedded in the crate and an optional user document.
 * Layers merge structurally: rule lists are concatenated and
 * deduplicated by matcher identity.
 *
 * Matchers are string patterns over qualified signatures
 * (`com.example.Cls#name`) with a `*` wildcard allowed at either end.
 * Position matchers name `this`, `argN`, or `return`; rules with an
 * unparseable position are logged and skipped, never fatal.
 */

use crate::errors::{EngineError, Result};
use crate::features::facts::{AccessPath, Mark};
use crate::features::supergraph::CallSite;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

const DEFAULT_RULES: &str = include_str!("default_rules.json");

/// Where a rule applies on a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    This,
    Arg(u16),
    Return,
}

impl Position {
    pub fn parse(text: &str) -> Option<Position> {
        match text {
            "this" => Some(Position::This),
            "return" => Some(Position::Return),
            _ => text
                .strip_prefix("arg")
                .and_then(|n| n.parse::<u16>().ok())
                .map(Position::Arg),
        }
    }

    /// Concrete access path of this position at a call site.
    pub fn resolve(&self, call: &CallSite) -> Option<AccessPath> {
        match self {
            Position::This => call.receiver.clone(),
            Position::Arg(n) => call.args.get(*n as usize).cloned(),
            Position::Return => call.result.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRule {
    pub method_matcher: String,
    pub position_matcher: String,
    pub mark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkRule {
    pub method_matcher: String,
    pub position_matcher: String,
    pub mark: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassThroughRule {
    pub method_matcher: String,
    pub from: String,
    pub to: String,
    pub mark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizerRule {
    pub method_matcher: String,
    pub position_matcher: String,
    pub mark: String,
}

/// One configuration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaintRules {
    pub sources: Vec<SourceRule>,
    pub sinks: Vec<SinkRule>,
    pub pass_through: Vec<PassThroughRule>,
    pub sanitizers: Vec<SanitizerRule>,
}

impl TaintRules {
    pub fn from_json(json: &str) -> Result<TaintRules> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::config(format!("unparseable taint rules: {e}")))
    }

    pub fn load(path: &Path) -> Result<TaintRules> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// `*` at either end of the pattern matches any prefix/suffix.
pub fn matches_signature(pattern: &str, signature: &str) -> bool {
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(rest), _) if pattern.ends_with('*') && pattern.len() >= 2 => {
            let infix = &rest[..rest.len() - 1];
            signature.contains(infix)
        }
        (Some(suffix), _) => signature.ends_with(suffix),
        (_, Some(prefix)) => signature.starts_with(prefix),
        _ => signature == pattern,
    }
}

/// Merged, validated rule set consulted by the flow functions.
#[derive(Debug, Clone, Default)]
pub struct TaintConfig {
    sources: Vec<SourceRule>,
    sinks: Vec<SinkRule>,
    pass_through: Vec<PassThroughRule>,
    sanitizers: Vec<SanitizerRule>,
}

impl TaintConfig {
    /// The embedded default layer.
    pub fn default_rules() -> TaintRules {
        TaintRules::from_json(DEFAULT_RULES).expect("embedded default rules parse")
    }

    /// Merge the default layer with an optional user layer: concatenate
    /// rule lists, dropping duplicates by matcher identity and rules
    /// whose position does not parse.
    pub fn from_layers(mut base: TaintRules, user: Option<TaintRules>) -> TaintConfig {
        if let Some(user) = user {
            base.sources.extend(user.sources);
            base.sinks.extend(user.sinks);
            base.pass_through.extend(user.pass_through);
            base.sanitizers.extend(user.sanitizers);
        }

        let mut config = TaintConfig::default();
        for rule in base.sources {
            if Position::parse(&rule.position_matcher).is_none() {
                warn!(rule = %rule.method_matcher, position = %rule.position_matcher,
                    "skipping source rule with invalid position");
                continue;
            }
            if !config.sources.contains(&rule) {
                config.sources.push(rule);
            }
        }
        for rule in base.sinks {
            if Position::parse(&rule.position_matcher).is_none() {
                warn!(rule = %rule.method_matcher, position = %rule.position_matcher,
                    "skipping sink rule with invalid position");
                continue;
            }
            if !config.sinks.contains(&rule) {
                config.sinks.push(rule);
            }
        }
        for rule in base.pass_through {
            if Position::parse(&rule.from).is_none() || Position::parse(&rule.to).is_none() {
                warn!(rule = %rule.method_matcher, "skipping pass-through rule with invalid position");
                continue;
            }
            if !config.pass_through.contains(&rule) {
                config.pass_through.push(rule);
            }
        }
        for rule in base.sanitizers {
            if Position::parse(&rule.position_matcher).is_none() {
                warn!(rule = %rule.method_matcher, position = %rule.position_matcher,
                    "skipping sanitizer rule with invalid position");
                continue;
            }
            if !config.sanitizers.contains(&rule) {
                config.sanitizers.push(rule);
            }
        }
        config
    }

    /// Default layer only.
    pub fn builtin() -> TaintConfig {
        TaintConfig::from_layers(Self::default_rules(), None)
    }

    /// User layer appended onto the default layer.
    pub fn with_user_rules(user: TaintRules) -> TaintConfig {
        TaintConfig::from_layers(Self::default_rules(), Some(user))
    }

    pub fn sources_for<'a>(&'a self, signature: &'a str) -> impl Iterator<Item = &'a SourceRule> {
        self.sources
            .iter()
            .filter(move |r| matches_signature(&r.method_matcher, signature))
    }

    pub fn sinks_for<'a>(&'a self, signature: &'a str) -> impl Iterator<Item = &'a SinkRule> {
        self.sinks
            .iter()
            .filter(move |r| matches_signature(&r.method_matcher, signature))
    }

    pub fn pass_through_for<'a>(
        &'a self,
        signature: &'a str,
    ) -> impl Iterator<Item = &'a PassThroughRule> {
        self.pass_through
            .iter()
            .filter(move |r| matches_signature(&r.method_matcher, signature))
    }

    pub fn sanitizers_for<'a>(
        &'a self,
        signature: &'a str,
    ) -> impl Iterator<Item = &'a SanitizerRule> {
        self.sanitizers
            .iter()
            .filter(move |r| matches_signature(&r.method_matcher, signature))
    }

    /// Whether a sanitizer covers `(signature, position, mark)`.
    pub fn sanitizes(&self, signature: &str, position: Position, mark: &Mark) -> bool {
        self.sanitizers_for(signature).any(|r| {
            Position::parse(&r.position_matcher) == Some(position) && r.mark == mark.0
        })
    }

    pub fn rule_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.sources.len(),
            self.sinks.len(),
            self.pass_through.len(),
            self.sanitizers.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_parse() {
        assert_eq!(Position::parse("this"), Some(Position::This));
        assert_eq!(Position::parse("return"), Some(Position::Return));
        assert_eq!(Position::parse("arg0"), Some(Position::Arg(0)));
        assert_eq!(Position::parse("arg12"), Some(Position::Arg(12)));
        assert_eq!(Position::parse("argx"), None);
        assert_eq!(Position::parse("self"), None);
    }

    #[test]
    fn test_signature_matching() {
        assert!(matches_signature("com.example.A#f", "com.example.A#f"));
        assert!(matches_signature("com.example.*", "com.example.A#f"));
        assert!(matches_signature("*#executeQuery", "java.sql.Statement#executeQuery"));
        assert!(matches_signature("*Servlet*", "javax.HttpServletRequest#getParameter"));
        assert!(!matches_signature("com.example.A#f", "com.example.A#g"));
    }

    #[test]
    fn test_default_rules_parse() {
        let config = TaintConfig::builtin();
        let (sources, sinks, _, _) = config.rule_counts();
        assert!(sources > 0);
        assert!(sinks > 0);
    }

    #[test]
    fn test_layer_merge_concatenates_and_dedupes() {
        let user = TaintRules {
            sources: vec![
                SourceRule {
                    method_matcher: "com.example.My#input".to_string(),
                    position_matcher: "return".to_string(),
                    mark: "TAINT".to_string(),
                },
                // duplicate of a default rule
                SourceRule {
                    method_matcher: "*#getParameter".to_string(),
                    position_matcher: "return".to_string(),
                    mark: "TAINT".to_string(),
                },
            ],
            ..TaintRules::default()
        };
        let merged = TaintConfig::with_user_rules(user);
        let builtin = TaintConfig::builtin();

        assert_eq!(merged.sources.len(), builtin.sources.len() + 1);
        assert!(merged.sources_for("com.example.My#input").next().is_some());
    }

    #[test]
    fn test_invalid_position_skipped() {
        let rules = TaintRules {
            sinks: vec![SinkRule {
                method_matcher: "com.example.A#sink".to_string(),
                position_matcher: "argument-one".to_string(),
                mark: "TAINT".to_string(),
                cwe: None,
            }],
            ..TaintRules::default()
        };
        let config = TaintConfig::from_layers(rules, None);
        assert_eq!(config.sinks.len(), 0);
    }

    #[test]
    fn test_sanitizes_lookup() {
        let rules = TaintRules {
            sanitizers: vec![SanitizerRule {
                method_matcher: "com.example.Esc#clean".to_string(),
                position_matcher: "return".to_string(),
                mark: "TAINT".to_string(),
            }],
            ..TaintRules::default()
        };
        let config = TaintConfig::from_layers(rules, None);
        assert!(config.sanitizes("com.example.Esc#clean", Position::Return, &Mark::taint()));
        assert!(!config.sanitizes("com.example.Esc#clean", Position::Arg(0), &Mark::taint()));
        assert!(!config.sanitizes(
            "com.example.Esc#clean",
            Position::Return,
            &Mark::nullness()
        ));
    }
}
