//! Rendering command results for humans or as JSON.

use portal_session::{ApplicationDirectory, ApplicationRecord, SessionState};
use serde_json::{json, Value};

pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to render JSON: {e}"),
    }
}

pub fn state_json(state: &SessionState) -> Value {
    match state {
        SessionState::Authenticated(endpoints) => json!({
            "authenticated": true,
            "manage_apps_path": endpoints.manage_apps_path,
            "logout_path": endpoints.logout_path,
            "application_list_path": endpoints.application_list_path,
        }),
        SessionState::Unauthenticated | SessionState::Unknown => json!({
            "authenticated": false,
        }),
    }
}

pub fn directory_json(directory: &ApplicationDirectory) -> Value {
    let apps: Vec<&ApplicationRecord> = directory.records().values().collect();
    json!({
        "count": apps.len(),
        "applications": apps,
    })
}

pub fn print_state(state: &SessionState) {
    for line in state_lines(state) {
        println!("{line}");
    }
}

pub fn state_lines(state: &SessionState) -> Vec<String> {
    match state {
        SessionState::Authenticated(endpoints) => {
            let mut lines = vec![
                "  Logged in".to_string(),
                format!("  Manage apps: {}", endpoints.manage_apps_path),
                format!("  Sign out:    {}", endpoints.logout_path),
            ];
            if let Some(path) = &endpoints.application_list_path {
                lines.push(format!("  App list:    {path}"));
            }
            lines
        }
        SessionState::Unauthenticated | SessionState::Unknown => {
            vec!["  Not logged in".to_string()]
        }
    }
}

pub fn print_directory(directory: &ApplicationDirectory) {
    for line in directory_lines(directory) {
        println!("{line}");
    }
}

/// One aligned row per application, sorted by id, then a count.
pub fn directory_lines(directory: &ApplicationDirectory) -> Vec<String> {
    if directory.is_empty() {
        return vec!["  No applications cached.".to_string()];
    }
    let width = directory
        .records()
        .values()
        .map(|app| app.name.len())
        .max()
        .unwrap_or(0);
    let mut lines: Vec<String> = directory
        .records()
        .values()
        .map(|app| format!("  {:>12}  {:<width$}  {}", app.id, app.name, app.detail_path))
        .collect();
    lines.push(format!("  {} application(s)", directory.len()));
    lines
}
