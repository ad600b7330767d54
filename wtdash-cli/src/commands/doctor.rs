use std::path::{Path, PathBuf};

use wtdash_core::config::{ConfigError, DashConfig};

use crate::exec::{CommandRunner, args};

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub async fn run_doctor(
    runner: &dyn CommandRunner,
    config: Result<(PathBuf, DashConfig), ConfigError>,
) -> Result<(), String> {
    println!("wtdash doctor\n");

    println!("Tools:");
    let tools = tool_checks(runner, config.as_ref().ok().map(|(_, c)| c)).await;
    for check in &tools {
        print_check(check);
    }
    println!();

    let config_checks = match &config {
        Ok((path, config)) => {
            println!("Configuration: {}", path.display());
            config_checks(config)
        }
        Err(e) => {
            println!("Configuration: {}", e);
            vec![Check::fail("config", "not loaded")
                .with_hint("Create wtdash.yaml or set WTDASH_CONFIG")]
        }
    };
    for check in &config_checks {
        print_check(check);
    }
    println!();

    let failed: Vec<_> = tools
        .iter()
        .chain(config_checks.iter())
        .filter(|c| !c.passed)
        .collect();
    if failed.is_empty() {
        println!("All checks passed!");
    } else {
        println!("Issues found:");
        for check in &failed {
            println!("  - {}: {}", check.name, check.message);
            if let Some(hint) = &check.hint {
                println!("    Hint: {}", hint);
            }
        }
    }

    Ok(())
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!(
        "  {}{}{} {}: {}",
        color, icon, reset, check.name, check.message
    );

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

/// First line of a tool's version output, or `None` when it can't run
async fn version(runner: &dyn CommandRunner, program: &str, flag: &str) -> Option<String> {
    let output = runner.run(program, &args(&[flag])).await.ok()?;
    Some(output.lines().next().unwrap_or_default().trim().to_string())
}

pub async fn tool_checks(runner: &dyn CommandRunner, config: Option<&DashConfig>) -> Vec<Check> {
    let mut checks = vec![check_docker(runner).await];

    checks.push(match version(runner, "tmux", "-V").await {
        Some(v) => Check::ok("tmux", v),
        None => Check::fail("tmux", "not installed")
            .with_hint("Needed for terminal sessions; install tmux 3.0 or newer"),
    });

    let host_services = config.is_some_and(|c| c.features.host_services);
    checks.push(match version(runner, "pm2", "--version").await {
        Some(v) => Check::ok("pm2", format!("v{}", v)),
        None if host_services => Check::fail("pm2", "not installed")
            .with_hint("features.host_services needs pm2 on the host"),
        None => Check::ok("pm2", "not on host (only used inside containers)"),
    });

    checks.push(match version(runner, "git", "--version").await {
        Some(v) => Check::ok("git", v.replace("git version ", "v")),
        None => Check::fail("git", "not installed"),
    });

    checks
}

async fn check_docker(runner: &dyn CommandRunner) -> Check {
    if runner.run("docker", &args(&["info"])).await.is_err() {
        return match version(runner, "docker", "--version").await {
            Some(_) => Check::fail("docker", "not running")
                .with_hint("Start Docker Desktop or run `dockerd`"),
            None => Check::fail("docker", "not installed").with_hint("Install from https://docker.com"),
        };
    }
    match version(runner, "docker", "--version").await {
        Some(v) => {
            let v = v
                .replace("Docker version ", "")
                .split(',')
                .next()
                .unwrap_or_default()
                .to_string();
            Check::ok("docker", format!("v{}", v))
        }
        None => Check::ok("docker", "running"),
    }
}

pub fn config_checks(config: &DashConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(dir_check("worktrees", &config.worktrees_dir));
    if let Some(proxy_dir) = &config.proxy_dir {
        checks.push(dir_check("proxy", proxy_dir));
    }

    checks.push(match config.validate() {
        Ok(()) => Check::ok(
            "settings",
            format!(
                "project {}, primary service {}",
                config.project, config.primary_service
            ),
        ),
        Err(e) => Check::fail("settings", e.to_string()),
    });

    checks
}

fn dir_check(name: &str, dir: &Path) -> Check {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let count = entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_dir())
                .count();
            Check::ok(name, format!("{} ({} entries)", dir.display(), count))
        }
        Err(_) => Check::fail(name, format!("{} not found", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::exec::fake::FakeRunner;

    #[tokio::test]
    async fn test_tool_checks() {
        let runner = FakeRunner::new(|program, args| match (program, args[0].as_str()) {
            ("docker", "info") => CommandOutput::failed(1, "Cannot connect to the Docker daemon"),
            ("docker", "--version") => CommandOutput::ok("Docker version 27.0.3, build 7d4bcd8\n"),
            ("tmux", _) => CommandOutput::ok("tmux 3.4\n"),
            ("git", _) => CommandOutput::ok("git version 2.45.0\n"),
            _ => CommandOutput::failed(127, "not found"),
        });

        let checks = tool_checks(&runner, None).await;
        let by_name = |name: &str| checks.iter().find(|c| c.name == name).unwrap();

        assert!(!by_name("docker").passed);
        assert_eq!(by_name("docker").message, "not running");
        assert_eq!(by_name("tmux").message, "tmux 3.4");
        assert!(by_name("pm2").passed);
        assert_eq!(by_name("git").message, "v2.45.0");
    }

    #[tokio::test]
    async fn test_pm2_required_for_host_services() {
        let runner = FakeRunner::new(|_, _| CommandOutput::failed(127, "not found"));
        let mut config = DashConfig::default();
        config.features.host_services = true;

        let checks = tool_checks(&runner, Some(&config)).await;
        assert!(!checks.iter().find(|c| c.name == "pm2").unwrap().passed);
    }

    #[test]
    fn test_config_checks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("feat")).unwrap();
        let config = DashConfig {
            worktrees_dir: dir.path().to_path_buf(),
            proxy_dir: Some(dir.path().join("missing")),
            ..Default::default()
        };

        let checks = config_checks(&config);
        assert!(checks[0].passed);
        assert!(checks[0].message.ends_with("(1 entries)"));
        assert!(!checks[1].passed);
        assert!(checks[2].passed);
    }
}
