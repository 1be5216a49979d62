//! Landing page with the audit form.

use axum::{extract::State, response::Html};

use crate::models::engine::EngineType;
use crate::services::report::escape;
use crate::AppState;

/// GET /
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let mut engines = String::new();
    for engine in EngineType::ALL {
        engines.push_str(&format!(
            "<option value=\"{}\">{} (port {})</option>",
            engine.key(),
            engine.display_name(),
            engine.default_port()
        ));
    }

    let mut standards: Vec<String> = state
        .catalogs
        .summaries()
        .into_iter()
        .map(|s| s.standard)
        .collect();
    standards.sort();
    standards.dedup();
    let standards: String = standards
        .iter()
        .map(|s| {
            let s = escape(s);
            format!("<option value=\"{s}\">{s}</option>")
        })
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Database security audit</title></head>
<body>
<h1>Database security audit</h1>
<form method="post" action="/audit_database">
<p><label>Database type <select name="db_type">{engines}</select></label></p>
<p><label>Host <input name="host" required></label></p>
<p><label>Port <input name="port" inputmode="numeric" placeholder="engine default"></label></p>
<p><label>Database / service name <input name="database" required></label></p>
<p><label>Username <input name="username" required autocomplete="off"></label></p>
<p><label>Password <input name="password" type="password" required autocomplete="off"></label></p>
<p><label>Standard <select name="standard">{standards}</select></label></p>
<p><label>Format <select name="format">
<option value="html">HTML</option><option value="json">JSON</option><option value="csv">CSV</option>
</select></label></p>
<p><button type="submit">Run audit</button></p>
</form>
</body>
</html>
"#
    ))
}
