mod commands;
mod exec;
mod logging;
mod mux;
mod probes;
mod scheduler;
mod ui;

use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    style::Stylize,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, style::Color};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, warn};

use wtdash_core::config::{ConfigError, DashConfig};
use wtdash_core::model::{EnvKind, Environment, Service, format_bytes};
use wtdash_core::session::{Size, Zoom};
use wtdash_core::store::EnvStore;

use exec::{CommandRunner, SystemRunner};
use mux::{Controller, TMUX};
use probes::{ContainerAction, ServiceAction};
use scheduler::Refresher;
use ui::dashboard::Terminals;
use ui::theme::theme;

#[derive(Parser)]
#[command(name = "wtdash")]
#[command(about = "Dashboard for per-branch worktree environments", long_about = None)]
struct Cli {
    /// Config file (default: WTDASH_CONFIG or wtdash.yaml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and probe once, then print every environment
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show the process-manager services of an environment
    Services {
        env: String,
        /// Query host processes instead of the container
        #[arg(long)]
        host: bool,
    },
    /// Start, stop or restart a service (or `all`)
    Service {
        env: String,
        action: ServiceAction,
        #[arg(default_value = "all")]
        name: String,
        #[arg(long)]
        host: bool,
    },
    /// Start, stop or restart an environment's container
    Container {
        env: String,
        action: ContainerAction,
    },
    /// Open a terminal session in an environment
    Shell {
        env: String,
        #[arg(last = true)]
        cmd: Vec<String>,
    },
    Doctor,
    /// Live dashboard (default)
    Dash,
}

fn exit_with(e: impl Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, DashConfig), ConfigError> {
    if let Some(path) = explicit {
        return Ok((path.to_path_buf(), DashConfig::load(path)?));
    }
    let cwd = std::env::current_dir()?;
    DashConfig::discover(&cwd)
}

/// Loaded config, or defaults rooted at the current directory when no file
/// exists
fn config_or_default(explicit: Option<&Path>) -> Arc<DashConfig> {
    match load_config(explicit) {
        Ok((path, config)) => {
            debug!(path = %path.display(), "loaded config");
            Arc::new(config)
        }
        Err(ConfigError::NotFound { .. }) if explicit.is_none() => {
            let mut config = DashConfig::default();
            if let Ok(cwd) = std::env::current_dir() {
                config.worktrees_dir = cwd.join(&config.worktrees_dir);
            }
            debug!("no config file, using defaults");
            Arc::new(config)
        }
        Err(e) => exit_with(e),
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    match cli.command {
        Some(Commands::Dash) | None => {}
        Some(Commands::Doctor) => {
            logging::init_stderr();
            return match commands::run_doctor(runner.as_ref(), load_config(config_path)).await {
                Ok(()) => Ok(()),
                Err(e) => exit_with(e),
            };
        }
        Some(command) => {
            logging::init_stderr();
            let config = config_or_default(config_path);
            return run_cli_command(runner, config, command).await;
        }
    }

    let log_dir = logging::init_file()?;
    debug!(dir = %log_dir.display(), "logging to file");
    let config = config_or_default(config_path);
    run_tui(runner, config).await
}

async fn run_cli_command(
    runner: Arc<dyn CommandRunner>,
    config: Arc<DashConfig>,
    command: Commands,
) -> io::Result<()> {
    let store = EnvStore::new();

    match command {
        Commands::List { json } => {
            scheduler::refresh_once(runner.as_ref(), &config, &store).await;
            let snapshot = store.current();
            if json {
                match serde_json::to_string_pretty(snapshot.environments.as_ref()) {
                    Ok(out) => println!("{}", out),
                    Err(e) => exit_with(e),
                }
            } else {
                print_environments(&snapshot.environments);
            }
        }
        Commands::Services { env, host } => {
            let env = resolve_env(runner.as_ref(), &config, &store, &env).await;
            let services = probes::env_services(runner.as_ref(), &config, &env, host).await;
            print_services(&services);
        }
        Commands::Service {
            env,
            action,
            name,
            host,
        } => {
            let env = resolve_env(runner.as_ref(), &config, &store, &env).await;
            let services = probes::env_services(runner.as_ref(), &config, &env, host).await;
            if let Err(e) =
                probes::service_action(runner.as_ref(), &env, &services, &name, action, host).await
            {
                exit_with(e);
            }
            println!("{} {}: {}", action.as_str(), env.alias, name);
        }
        Commands::Container { env, action } => {
            let env = resolve_env(runner.as_ref(), &config, &store, &env).await;
            if !env.is_container() {
                exit_with(format!("{} has no container", env.alias));
            }
            if let Err(e) = probes::container_action(runner.as_ref(), &env, action).await {
                exit_with(e);
            }
            println!("{} {}", action.as_str(), env.stats_key());
        }
        Commands::Shell { env, cmd } => {
            let env = resolve_env(runner.as_ref(), &config, &store, &env).await;
            let command = (!cmd.is_empty()).then_some(cmd);
            match run_shell(runner, &config, &env, command).await {
                Ok(code) => println!("{} exited with code {}", env.alias, code),
                Err(e) => exit_with(e),
            }
        }
        Commands::Doctor | Commands::Dash => {}
    }

    Ok(())
}

/// Discover and probe once, then look up an environment by alias or name
async fn resolve_env(
    runner: &dyn CommandRunner,
    config: &Arc<DashConfig>,
    store: &EnvStore,
    key: &str,
) -> Environment {
    scheduler::discovery_pass(config, store).await;
    scheduler::status_pass(runner, config, store).await;
    match store.current().find(key) {
        Some(env) => env.clone(),
        None => exit_with(format!("unknown environment '{}'", key)),
    }
}

fn print_environments(envs: &[Environment]) {
    let theme = theme();
    println!(
        "  {:<16} {:<24} {:<9} {:<22} {:<28} {:>7} {:>7} {:>9}",
        "ALIAS", "BRANCH", "KIND", "CONTAINER", "DOMAIN", "UP", "CPU", "MEM"
    );
    for env in envs {
        let kind = match env.kind {
            EnvKind::Container => "container",
            EnvKind::LocalOnly => "local",
        };
        let container = if env.is_container() { env.stats_key() } else { "-" };
        let observed = &env.observed;
        println!(
            "{} {:<16} {:<24} {:<9} {:<22} {:<28} {:>7} {:>7} {:>9}",
            theme.env_icon(env),
            env.alias,
            env.branch,
            kind,
            container,
            env.domain,
            observed.uptime.as_deref().unwrap_or("-"),
            observed.cpu.as_deref().unwrap_or("-"),
            observed.mem.as_deref().unwrap_or("-"),
        );
    }
}

fn print_services(services: &[Service]) {
    if services.is_empty() {
        println!("No services");
        return;
    }
    println!(
        "{:<24} {:<8} {:>6} {:>8} {:>8}",
        "NAME", "STATUS", "CPU", "MEM", "RESTARTS"
    );
    let theme = theme();
    for service in services {
        let status = format!("{:<8}", format!("{:?}", service.status).to_lowercase());
        let color = theme.service_style(service.status).fg.unwrap_or(Color::Reset);
        println!(
            "{:<24} {} {:>5.1}% {:>8} {:>8}",
            service.display_name,
            status.with(color.into()),
            service.cpu_percent,
            format_bytes(service.memory_bytes),
            service.restart_count,
        );
    }
}

/// Host a session in the private tmux server, attach to it, and return the
/// exit code once it ends
async fn run_shell(
    runner: Arc<dyn CommandRunner>,
    config: &DashConfig,
    env: &Environment,
    command: Option<Vec<String>>,
) -> Result<i32, mux::MuxError> {
    let (width, height) = crossterm::terminal::size().unwrap_or((120, 40));
    let mut winch = signal(SignalKind::window_change())?;
    let mut controller = Controller::new(runner, &config.tmux);

    let result = attach_session(
        &mut controller,
        Size::new(width, height),
        env,
        command,
        &mut winch,
    )
    .await;
    if result.is_err() {
        controller.shutdown().await;
    }
    result
}

async fn attach_session(
    controller: &mut Controller,
    total: Size,
    env: &Environment,
    command: Option<Vec<String>>,
    winch: &mut Signal,
) -> Result<i32, mux::MuxError> {
    // The attached client is the whole screen, so there is no control region
    controller.toggle_zoom(Zoom::Native).await?;
    controller.setup_layout(total).await?;
    let id = controller.open(&env.alias, &env.path, command).await?;

    let Some(mut rx) = controller.subscribe(&id) else {
        return Err(mux::MuxError::UnknownSession(id));
    };
    let mut attach = tokio::process::Command::new(TMUX)
        .args(controller.tmux().attach(controller.session_name()))
        .spawn()?;

    // window-size is manual, so client resizes are forwarded by hand
    let code = loop {
        tokio::select! {
            exited = rx.wait_for(|s| s.exited()) => break exited.map(|s| s.exit_code).ok(),
            _ = attach.wait() => break None,
            _ = winch.recv() => {
                if let Ok((width, height)) = crossterm::terminal::size() {
                    forward_resize(controller, Size::new(width, height)).await;
                }
            }
        }
    };

    controller.shutdown().await;
    let _ = attach.wait().await;
    Ok(code.unwrap_or_else(|| rx.borrow().exit_code))
}

/// Re-apply the layout for a resized client. A failure is logged and the
/// session keeps running.
async fn forward_resize(controller: &mut Controller, total: Size) {
    if let Err(e) = controller.resize_layout(total).await {
        warn!(error = %e, "resize forwarding failed");
    }
}

async fn run_tui(runner: Arc<dyn CommandRunner>, config: Arc<DashConfig>) -> io::Result<()> {
    let store = EnvStore::new();
    let mut refresher = Refresher::spawn(runner.clone(), config.clone(), store.clone());
    let mut terminals = Terminals::new(Controller::new(runner, &config.tmux));

    let mut terminal = setup_terminal()?;
    let result = ui::dashboard::run(
        &mut terminal,
        &store,
        &refresher,
        &mut terminals,
        &config.project,
    )
    .await;
    terminals.shutdown().await;
    restore_terminal(terminal)?;
    refresher.shutdown();
    result
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
