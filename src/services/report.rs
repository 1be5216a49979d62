//! Report rendering: HTML (default), JSON and CSV documents from one audit run.
//!
//! Rendering is a pure function of the run and its catalog. Apart from the run
//! timestamps, the same results always produce the same bytes.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::catalog::Catalog;
use crate::errors::AppError;
use crate::models::audit::{AuditRun, ReportFormat, StatusCounts};
use crate::models::check::{CheckResult, CheckStatus, Classification};

const UNCATEGORIZED: &str = "Uncategorized";

/// A rendered report ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

/// Render `run` in the requested format, grouped by `catalog` sections.
pub fn render(run: &AuditRun, catalog: &Catalog, format: ReportFormat) -> Result<Document, AppError> {
    let bytes = match format {
        ReportFormat::Html => render_html(run, catalog).into_bytes(),
        ReportFormat::Json => render_json(run, catalog)?,
        ReportFormat::Csv => render_csv(run)?,
    };

    Ok(Document {
        bytes,
        content_type: format.content_type(),
        filename: filename(run, format),
    })
}

/// `<engine>_<standard>_audit_<finished>.<ext>`, safe for Content-Disposition.
pub fn filename(run: &AuditRun, format: ReportFormat) -> String {
    let standard: String = run
        .standard
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!(
        "{}_{}_audit_{}.{}",
        run.engine.key(),
        standard,
        run.finished_at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// SHA-256 over the ordered `(check_id, status)` sequence.
pub fn results_digest(results: &[CheckResult]) -> String {
    let mut hasher = Sha256::new();
    for result in results {
        hasher.update(result.check_id.as_bytes());
        hasher.update(b"\t");
        hasher.update(result.status.key().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Minimal HTML escaping for text and attribute values.
pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// "2.2.1" → ["2", "2.2", "2.2.1"]
fn section_chain(id: &str) -> Vec<String> {
    let parts: Vec<&str> = id.split('.').collect();
    (1..=parts.len()).map(|n| parts[..n].join(".")).collect()
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;width:100%;margin-bottom:1em}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left;vertical-align:top}\
th{background:#f0f0f0}\
.passed{color:#1a7f37}.failed{color:#cf222e}.manual{color:#9a6700}\
.no_permission{color:#6e7781}.error{color:#8250df}\
footer{margin-top:2em;font-size:small;color:#6e7781}";

// Infallible: `write!` into a String cannot fail.
fn render_html(run: &AuditRun, catalog: &Catalog) -> String {
    let counts = run.counts();
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n",
        title = escape(&format!("{} audit report", catalog.title))
    );

    let _ = writeln!(html, "<table class=\"meta\">");
    let meta = [
        ("Engine", run.engine.display_name().to_string()),
        ("Standard", format!("{} ({})", run.standard, run.catalog_version)),
        ("Target", run.target.clone()),
        (
            "Server version",
            run.profile.version.clone().unwrap_or_else(|| "unknown".to_string()),
        ),
        ("Started", run.started_at.to_rfc3339()),
        ("Finished", run.finished_at.to_rfc3339()),
    ];
    for (label, value) in meta {
        let _ = writeln!(html, "<tr><th>{label}</th><td>{}</td></tr>", escape(&value));
    }
    let _ = writeln!(html, "</table>");

    render_summary(&mut html, &counts);

    let mut emitted: HashSet<String> = HashSet::new();
    let mut table_open = false;
    let mut current_section: Option<&str> = None;

    for result in &run.results {
        if current_section != Some(result.section.as_str()) {
            if table_open {
                let _ = writeln!(html, "</tbody></table>");
            }
            current_section = Some(result.section.as_str());

            let chain = section_chain(&result.section);
            let known = chain.iter().any(|id| catalog.section(id).is_some());
            if known {
                for id in chain {
                    if emitted.contains(&id) {
                        continue;
                    }
                    if let Some(section) = catalog.section(&id) {
                        let level = (section.depth() + 1).min(6);
                        let _ = writeln!(
                            html,
                            "<h{level}>{} {}</h{level}>",
                            escape(&section.id),
                            escape(&section.title)
                        );
                    }
                    emitted.insert(id);
                }
            } else if emitted.insert(UNCATEGORIZED.to_string()) {
                let _ = writeln!(html, "<h2>{UNCATEGORIZED}</h2>");
            }

            let _ = writeln!(
                html,
                "<table><thead><tr><th>Check</th><th>Title</th><th>Level</th><th>Status</th>\
                 <th>Observed</th><th>Detail</th><th>Remediation</th></tr></thead><tbody>"
            );
            table_open = true;
        }

        let definition = catalog.check(&result.check_id);
        let level = definition.map(|c| c.level.to_string()).unwrap_or_default();
        let privileged = definition
            .is_some_and(|c| c.classification == Classification::Privileged);
        let description = definition
            .and_then(|c| c.description.as_deref())
            .unwrap_or("");
        // remediation is only actionable for failed checks
        let remediation = definition
            .filter(|_| result.status == CheckStatus::Failed)
            .and_then(|c| c.remediation.as_deref())
            .unwrap_or("");

        let _ = writeln!(
            html,
            "<tr><td>{}</td><td title=\"{}\">{}{}</td><td>{}</td><td class=\"{}\">{}</td>\
             <td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&result.check_id),
            escape(description),
            escape(&result.title),
            if privileged { " <em>(privileged)</em>" } else { "" },
            level,
            result.status.key(),
            result.status.label(),
            escape(result.observed.as_deref().unwrap_or("")),
            escape(result.detail.as_deref().unwrap_or("")),
            escape(remediation)
        );
    }
    if table_open {
        let _ = writeln!(html, "</tbody></table>");
    }

    let _ = write!(
        html,
        "<footer>Results digest (SHA-256): <code>{}</code></footer>\n</body>\n</html>\n",
        results_digest(&run.results)
    );
    html
}

fn render_summary(html: &mut String, counts: &StatusCounts) {
    let _ = writeln!(html, "<h2>Summary</h2>\n<table class=\"summary\"><tr>");
    for status in CheckStatus::ALL {
        if status == CheckStatus::Error && counts.error == 0 {
            continue;
        }
        let _ = write!(html, "<th class=\"{}\">{}</th>", status.key(), status.label());
    }
    let _ = writeln!(html, "<th>Total</th></tr><tr>");
    for status in CheckStatus::ALL {
        if status == CheckStatus::Error && counts.error == 0 {
            continue;
        }
        let _ = write!(html, "<td>{}</td>", counts.get(status));
    }
    let _ = writeln!(html, "<td>{}</td></tr></table>", counts.total());
}

#[derive(Serialize)]
struct JsonReport<'a> {
    title: &'a str,
    #[serde(flatten)]
    run: &'a AuditRun,
    counts: StatusCounts,
    digest: String,
}

fn render_json(run: &AuditRun, catalog: &Catalog) -> Result<Vec<u8>, AppError> {
    let report = JsonReport {
        title: &catalog.title,
        run,
        counts: run.counts(),
        digest: results_digest(&run.results),
    };
    serde_json::to_vec_pretty(&report)
        .map_err(|e| AppError::Internal(format!("JSON report serialization failed: {e}")))
}

fn render_csv(run: &AuditRun) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| AppError::Internal(format!("CSV report serialization failed: {e}"));

    writer
        .write_record(["check_id", "section", "title", "status", "observed", "detail"])
        .map_err(csv_err)?;
    for result in &run.results {
        writer
            .write_record([
                result.check_id.as_str(),
                result.section.as_str(),
                result.title.as_str(),
                result.status.label(),
                result.observed.as_deref().unwrap_or(""),
                result.detail.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV report flush failed: {e}")))
}
