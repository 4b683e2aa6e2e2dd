use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;

use crate::core::Finding;

/// Renders the findings of one scan into a Markdown report on disk.
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn generate(&self, findings: &[Finding], request_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let path = self.output_dir.join(format!("report_{}.md", request_id));
        fs::write(&path, render(findings, request_id))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn render(findings: &[Finding], request_id: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut md = format!(
        "# Vulnerability Scan Report\n\n\
         **Generated**: {}\n\
         **Task ID**: {}\n\n\
         ---\n\n\
         ## 1. Summary\n\n\
         **{}** potential vulnerability(ies) found.\n\n\
         | Type | Target URL | Parameter | Severity |\n\
         | :--- | :--- | :--- | :--- |\n",
        timestamp,
        request_id,
        findings.len()
    );

    for finding in findings {
        let display_url = if finding.url.len() < 50 {
            finding.url.clone()
        } else {
            format!("{}...", &finding.url[..47])
        };
        md.push_str(&format!(
            "| {} | {} | `{}` | **{}** |\n",
            finding.vuln_type,
            display_url,
            finding.parameter.as_deref().unwrap_or("N/A"),
            finding.severity,
        ));
    }

    md.push_str("\n---\n\n## 2. Detailed Findings\n\n");

    for (i, finding) in findings.iter().enumerate() {
        md.push_str(&format!("### {}. {}\n\n", i + 1, finding.vuln_type));
        md.push_str("#### [ Basics ]\n");
        md.push_str(&format!("- **Target URL**: `{}`\n", finding.url));
        md.push_str(&format!(
            "- **Injected parameter**: `{}`\n",
            finding.parameter.as_deref().unwrap_or("N/A")
        ));
        md.push_str(&format!(
            "- **Payload**: `{}`\n",
            finding.payload.as_deref().unwrap_or("N/A")
        ));
        md.push_str(&format!("- **Evidence**: {}\n\n", finding.evidence));

        let request = &finding.full_request;
        md.push_str("#### [ Original Request ]\n```http\n");
        md.push_str(&format!("{} {}\n", request.method, request.url));
        for (name, value) in &request.headers {
            md.push_str(&format!("{}: {}\n", name, value));
        }
        if let Some(body) = &request.body {
            md.push_str(&format!("\n{}\n", body));
        }
        md.push_str("```\n\n");
    }

    md.push_str("---\n*Report generated automatically by Specter.*\n");
    md
}
