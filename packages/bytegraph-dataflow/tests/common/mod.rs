//! Shared fixtures for the end-to-end tests.

use bytegraph_dataflow::features::taint::config::{
    SanitizerRule, SinkRule, SourceRule, TaintRules,
};
use bytegraph_dataflow::TaintConfig;
use std::sync::Arc;

pub fn source_rule(matcher: &str) -> SourceRule {
    SourceRule {
        method_matcher: matcher.to_string(),
        position_matcher: "return".to_string(),
        mark: "TAINT".to_string(),
    }
}

pub fn arg_source_rule(matcher: &str, position: &str) -> SourceRule {
    SourceRule {
        method_matcher: matcher.to_string(),
        position_matcher: position.to_string(),
        mark: "TAINT".to_string(),
    }
}

pub fn sink_rule(matcher: &str) -> SinkRule {
    SinkRule {
        method_matcher: matcher.to_string(),
        position_matcher: "arg0".to_string(),
        mark: "TAINT".to_string(),
        cwe: Some("CWE-89".to_string()),
    }
}

pub fn sanitizer_rule(matcher: &str) -> SanitizerRule {
    SanitizerRule {
        method_matcher: matcher.to_string(),
        position_matcher: "return".to_string(),
        mark: "TAINT".to_string(),
    }
}

/// Hermetic config: only the given rules, no embedded defaults.
pub fn config_of(rules: TaintRules) -> Arc<TaintConfig> {
    Arc::new(TaintConfig::from_layers(rules, None))
}
