/*
 * Report Emission
 *
 * Serializes the run outcome and the sorted findings, each with its
 * reconstructed trace graph. The header distinguishes complete, partial
 * (deadline) and aborted outcomes; findings collected before an abort
 * are still emitted. Output is JSON, or SARIF when the output path
 * carries a `.sarif` extension.
 */

use crate::errors::Result;
use crate::features::supergraph::ApplicationGraph;
use crate::features::trace::{TraceGraph, TraceGraphBuilder};
use crate::features::units::{AnalysisResult, Outcome};
use crate::shared::StatementId;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeader {
    pub analysis: String,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
    pub runners: usize,
    pub path_edges: usize,
    pub summary_edges: usize,
    pub replay_overflow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_diagnostic: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkLocation {
    pub method: String,
    pub statement: StatementId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_rule: Option<String>,
    pub sink: SinkLocation,
    pub trace: TraceGraph,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub header: ReportHeader,
    pub findings: Vec<Finding>,
}

/// Assemble the report: header plus one finding per vulnerability, in
/// the stable order, each with its witness trace.
pub fn build_report(
    analysis: &str,
    result: &AnalysisResult,
    graph: &dyn ApplicationGraph,
) -> Report {
    let builder = TraceGraphBuilder::new(&result.state.reasons);
    let findings = result
        .vulnerabilities
        .iter()
        .map(|v| Finding {
            rule: v.rule.clone(),
            cwe: v.cwe.clone(),
            config_rule: v.config_rule.clone(),
            sink: SinkLocation {
                method: graph.method_signature(v.method),
                statement: v.sink.stmt,
            },
            trace: builder.build(&v.sink),
        })
        .collect();

    Report {
        header: ReportHeader {
            analysis: analysis.to_string(),
            outcome: result.outcome,
            elapsed_ms: result.elapsed.as_millis() as u64,
            runners: result.state.runner_count,
            path_edges: result.state.stats.path_edges,
            summary_edges: result.state.stats.summary_edges,
            replay_overflow: result.replay_overflow,
            abort_diagnostic: result.abort_diagnostic.clone(),
        },
        findings,
    }
}

/// Write the report to disk; `.sarif` selects SARIF 2.1.0.
pub fn write_report(report: &Report, path: &Path) -> Result<()> {
    let is_sarif = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sarif"));
    let body = if is_sarif {
        serde_json::to_string_pretty(&to_sarif(report))?
    } else {
        serde_json::to_string_pretty(report)?
    };
    std::fs::write(path, body)?;
    info!(path = %path.display(), findings = report.findings.len(), "report written");
    Ok(())
}

/// Minimal SARIF 2.1.0 rendering of the findings.
fn to_sarif(report: &Report) -> serde_json::Value {
    let results: Vec<serde_json::Value> = report
        .findings
        .iter()
        .map(|f| {
            json!({
                "ruleId": f.cwe.clone().unwrap_or_else(|| f.rule.clone()),
                "level": "warning",
                "message": {
                    "text": format!(
                        "{}: tainted data reaches sink in {}",
                        f.rule, f.sink.method
                    )
                },
                "locations": [{
                    "logicalLocations": [{
                        "fullyQualifiedName": f.sink.method,
                        "kind": "function"
                    }]
                }]
            })
        })
        .collect();

    json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "bytegraph-taint",
                    "informationUri": "https://github.com/bytegraph/bytegraph",
                    "version": env!("CARGO_PKG_VERSION")
                }
            },
            "invocations": [{
                "executionSuccessful": report.header.outcome != Outcome::Aborted
            }],
            "results": results
        }]
    })
}
