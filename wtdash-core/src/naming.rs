//! Naming helpers shared by the artifact reader and the probes.

use crate::config::{ComposeStrategy, DashConfig};

/// Values substituted into `{placeholder}` templates
#[derive(Clone, Debug, Default)]
pub struct TemplateVars<'a> {
    pub project: &'a str,
    pub alias: &'a str,
    pub name: &'a str,
    pub branch: &'a str,
}

/// Lowercase, keep `[a-z0-9]`, collapse everything else into single dashes
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Substitute `{project}`, `{alias}`, `{slug}`, `{name}`, `{branch}`.
/// Unknown placeholders are left as written.
pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    template
        .replace("{project}", vars.project)
        .replace("{alias}", vars.alias)
        .replace("{slug}", &slugify(vars.alias))
        .replace("{name}", vars.name)
        .replace("{branch}", vars.branch)
}

fn vars<'a>(config: &'a DashConfig, alias: &'a str, name: &'a str) -> TemplateVars<'a> {
    TemplateVars {
        project: &config.project,
        alias,
        name,
        branch: "",
    }
}

/// Container name from the configured naming template
pub fn template_container_name(config: &DashConfig, alias: &str, name: &str) -> String {
    render(&config.container_template, &vars(config, alias, name))
}

/// `{project}-{slug}-{primary}` name used by the shared compose strategy
pub fn shared_container_name(config: &DashConfig, alias: &str) -> String {
    format!(
        "{}-{}-{}",
        config.project,
        slugify(alias),
        config.primary_service
    )
}

/// Prefix shared by every container of one environment
pub fn container_group_prefix(config: &DashConfig, alias: &str) -> String {
    format!("{}-{}", config.project, slugify(alias))
}

/// Container identifier: manifest name, then the shared-strategy name,
/// then the naming template.
pub fn container_name(
    config: &DashConfig,
    manifest_name: Option<&str>,
    alias: &str,
    name: &str,
) -> String {
    if let Some(found) = manifest_name.filter(|n| !n.is_empty()) {
        return found.to_string();
    }
    if config.compose_strategy == ComposeStrategy::Shared {
        return shared_container_name(config, alias);
    }
    template_container_name(config, alias, name)
}

pub fn db_name(config: &DashConfig, alias: &str, name: &str) -> String {
    render(&config.db_name_template, &vars(config, alias, name)).replace('-', "_")
}

/// Per-environment suffix appended to process-manager names
pub fn service_suffix(config: &DashConfig, alias: &str, name: &str) -> String {
    render(&config.service_suffix, &vars(config, alias, name))
}

pub fn templated_domain(config: &DashConfig, alias: &str, name: &str, branch: &str) -> Option<String> {
    let template = config.domain_template.as_deref()?;
    let vars = TemplateVars {
        project: &config.project,
        alias,
        name,
        branch,
    };
    Some(render(template, &vars))
}

pub fn default_domain(alias: &str) -> String {
    format!("{}.localhost", slugify(alias))
}
