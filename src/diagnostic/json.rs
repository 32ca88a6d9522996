use super::Diagnostic;

pub fn render(d: &Diagnostic) -> String {
    let labels: Vec<serde_json::Value> = d
        .labels
        .iter()
        .map(|l| {
            let mut obj = serde_json::json!({
                "message": l.message,
            });
            if !l.loc.is_unknown() {
                obj["line"] = l.loc.line.into();
                obj["col"] = l.loc.column.into();
                obj["end_line"] = l.loc.end_line.into();
                obj["end_col"] = l.loc.end_column.into();
            }
            obj
        })
        .collect();

    let mut obj = serde_json::json!({
        "severity": "error",
        "message": d.message,
        "labels": labels,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}
