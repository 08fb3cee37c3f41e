//! Rendering of manager responses for the terminal.

use plugwright_plugins::{
    PluginRecord, PluginStatusReport, RemotePluginRecord, Response,
};

use crate::theme::Theme;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Colored tables and messages.
    Pretty,
    /// The serialized [`Response`].
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Keep only plugins whose name contains `needle`.
pub(crate) fn filter_response(response: Response, needle: &str) -> Response {
    match response {
        Response::Local(plugins) => Response::Local(
            plugins
                .into_iter()
                .filter(|p| p.name.contains(needle))
                .collect(),
        ),
        Response::Remote(plugins) => Response::Remote(
            plugins
                .into_iter()
                .filter(|p| p.name().contains(needle))
                .collect(),
        ),
        other => other,
    }
}

/// Render `response` to a printable string.
///
/// `action` describes the command for [`Response::Done`] messages, e.g.
/// `"install sticker"`.
pub(crate) fn render(response: &Response, format: OutputFormat, action: &str) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(response)
            .unwrap_or_else(|e| format!(r#"{{"kind":"error","data":{{"message":"{e}"}}}}"#)),
        OutputFormat::Pretty => render_pretty(response, action),
    }
}

fn render_pretty(response: &Response, action: &str) -> String {
    match response {
        Response::Local(plugins) => local_table(plugins),
        Response::Remote(plugins) => remote_table(plugins),
        Response::LocalPlugin(Some(plugin)) => local_detail(plugin),
        Response::RemotePlugin(Some(plugin)) => remote_detail(plugin),
        Response::LocalPlugin(None) | Response::RemotePlugin(None) => {
            Theme::warning("Plugin not found")
        },
        Response::Done { success: true } => Theme::success(&format!("Done: {action}")),
        Response::Done { success: false } => {
            Theme::error(&format!("Nothing changed: could not {action}"))
        },
        Response::Updated(plugins) if plugins.is_empty() => {
            Theme::info("All plugins are up to date")
        },
        Response::Updated(plugins) => {
            let mut lines: Vec<String> = plugins
                .iter()
                .map(|p| {
                    Theme::success(&format!(
                        "Updated {} to {}",
                        p.name(),
                        Theme::version(p.remote_version())
                    ))
                })
                .collect();
            lines.push(Theme::dimmed(&format!("{} plugin(s) updated", plugins.len())));
            lines.join("\n")
        },
        Response::Status(report) => status_detail(report),
        Response::Error { message } => Theme::error(message),
    }
}

fn local_table(plugins: &[PluginRecord]) -> String {
    if plugins.is_empty() {
        return Theme::info("No plugins installed");
    }

    let mut lines = vec![
        Theme::header("Local Plugins"),
        format!("  {:<24} {:<10} {:<10} VERSION", "NAME", "STATE", "LEDGER"),
        Theme::separator(),
    ];
    for p in plugins {
        let ledger = if p.installed { "yes" } else { "no" };
        lines.push(format!(
            "  {:<24} {:<10} {:<10} {}",
            p.name,
            Theme::plugin_state(p.status),
            ledger,
            Theme::version(p.version)
        ));
    }
    lines.push(String::new());
    lines.push(Theme::dimmed(&format!("{} plugin(s)", plugins.len())));
    lines.join("\n")
}

fn remote_table(plugins: &[RemotePluginRecord]) -> String {
    if plugins.is_empty() {
        return Theme::info("Catalog is empty");
    }

    let mut lines = vec![
        Theme::header("Catalog Plugins"),
        format!(
            "  {:<24} {:<10} {:<12} {:<10} DESCRIPTION",
            "NAME", "VERSION", "SECTION", "INSTALLED"
        ),
        Theme::separator(),
    ];
    for p in plugins {
        let installed = if p.record.installed { "yes" } else { "no" };
        lines.push(format!(
            "  {:<24} {:<10} {:<12} {:<10} {}",
            p.name(),
            Theme::version(p.remote_version()),
            p.section,
            installed,
            Theme::dimmed(&p.description)
        ));
    }
    lines.push(String::new());
    lines.push(Theme::dimmed(&format!("{} plugin(s)", plugins.len())));
    lines.join("\n")
}

fn local_detail(p: &PluginRecord) -> String {
    [
        Theme::header(&p.name),
        Theme::kv("State", &Theme::plugin_state(p.status)),
        Theme::kv("In ledger", if p.installed { "yes" } else { "no" }),
        Theme::kv("Version", &Theme::version(p.version)),
    ]
    .join("\n")
}

fn remote_detail(p: &RemotePluginRecord) -> String {
    let mut lines = vec![
        Theme::header(p.name()),
        Theme::kv("Version", &Theme::version(p.remote_version())),
        Theme::kv("Section", &p.section),
        Theme::kv("Maintainer", &p.maintainer),
        Theme::kv("Size", &p.size),
        Theme::kv("Supported", if p.supported { "yes" } else { "no" }),
        Theme::kv("Installed", if p.record.installed { "yes" } else { "no" }),
        Theme::kv("State", &Theme::plugin_state(p.record.status)),
    ];
    if !p.description.is_empty() {
        lines.push(String::new());
        lines.push(format!("  {}", p.description));
    }
    lines.join("\n")
}

fn status_detail(r: &PluginStatusReport) -> String {
    let update = if r.needs_update {
        Theme::warning("update available")
    } else {
        Theme::dimmed("up to date")
    };
    [
        Theme::header(&r.name),
        Theme::kv("Installed", if r.installed { "yes" } else { "no" }),
        Theme::kv("State", &Theme::plugin_state(r.loaded)),
        Theme::kv("Local version", &Theme::version(r.local_version)),
        Theme::kv("Catalog version", &Theme::version(r.remote_version)),
        Theme::kv("Update", &update),
    ]
    .join("\n")
}
