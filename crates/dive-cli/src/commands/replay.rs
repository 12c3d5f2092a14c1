//! `dive replay` and `dive provenance`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use dive_abac::{DecisionReplay, build_provenance, replay};
use dive_types::{AccessRequest, StepResult};
use serde_json::{Map, Value};

pub fn run(request_file: &Path, json: bool) -> Result<()> {
    let request = read_request(request_file)?;
    let trace = replay(&dive_abac::bilateral::normalize_subject_clearance(&request));

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        print!("{}", render(&trace));
    }
    Ok(())
}

pub fn provenance(claims_file: &Path) -> Result<()> {
    let content = fs::read_to_string(claims_file)
        .with_context(|| format!("Failed to read {}", claims_file.display()))?;
    let claims: Map<String, Value> =
        serde_json::from_str(&content).context("Claims must be a JSON object")?;

    println!("{}", serde_json::to_string_pretty(&build_provenance(&claims))?);
    Ok(())
}

fn read_request(path: &Path) -> Result<AccessRequest> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let request: AccessRequest = serde_json::from_str(&content)
        .with_context(|| format!("Invalid access request in {}", path.display()))?;
    if let Err(e) = request.validate() {
        bail!("Invalid access request: {e}");
    }
    Ok(request)
}

fn render(trace: &DecisionReplay) -> String {
    let mut out = String::new();
    for (index, step) in trace.steps.iter().enumerate() {
        let mark = match step.result {
            StepResult::Pass => "PASS",
            StepResult::Fail => "FAIL",
        };
        out.push_str(&format!("{}. [{mark}] {}: {}\n", index + 1, step.rule, step.reason));
    }
    let decision = if trace.allow { "ALLOW" } else { "DENY" };
    out.push_str(&format!("\nDecision: {decision} ({})\n", trace.reason));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REQUEST: &str = r#"{
        "subject": {
            "authenticated": true,
            "uniqueID": "alice",
            "clearance": "SECRET",
            "countryOfAffiliation": "USA",
            "acpCOI": ["FVEY"]
        },
        "action": "view",
        "resource": {
            "resourceId": "doc-1",
            "classification": "TOP_SECRET",
            "releasabilityTo": ["USA", "GBR"],
            "COI": ["FVEY"]
        },
        "context": {
            "currentTime": "2026-01-01T00:00:00Z",
            "requestId": "req-1"
        }
    }"#;

    #[test]
    fn test_render_lists_every_step() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REQUEST.as_bytes()).unwrap();

        let request = read_request(file.path()).unwrap();
        let rendered = render(&replay(&request));

        assert_eq!(rendered.lines().filter(|l| l.contains("] is_")).count(), 6);
        assert!(rendered.contains("[FAIL] is_insufficient_clearance"));
        assert!(rendered.contains("Decision: DENY"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_request(Path::new("/nonexistent/request.json")).is_err());
    }
}
