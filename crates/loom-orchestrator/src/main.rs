use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loom_orchestrator::buildenv::BuildEnvManager;
use loom_orchestrator::dispatch::{run_dispatch_loop, synthesize_exit, RigActionProvider, DEFAULT_ITERATION_BUDGET};
use loom_orchestrator::model::{Agent, AgentRole, Bead, BeadStore, InMemoryBeadStore, Project, Provider, ReadyFilter};
use loom_orchestrator::router::{LocalFileOps, LocalGitOps, Router, SandboxFileOps, SandboxGitOps};
use loom_orchestrator::sandbox::{get_ready_sandbox, ContainerOrchestrationAdapter};

#[derive(Parser)]
#[command(name = "loom", about = "Bead-driven multi-agent coding dispatcher")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, clap::ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch loop against the next ready bead.
    Run {
        #[arg(long)]
        project: String,
        #[arg(long)]
        work_dir: PathBuf,
        #[arg(long)]
        use_container: bool,
        #[arg(long, default_value_t = DEFAULT_ITERATION_BUDGET)]
        max_iterations: u32,
        #[arg(long, env = "LOOM_PROVIDER_URL")]
        provider_url: String,
        #[arg(long, env = "LOOM_PROVIDER_MODEL")]
        provider_model: String,
        #[arg(long, env = "LOOM_PROVIDER_API_KEY", default_value = "")]
        provider_api_key: String,
    },
    /// Bead lifecycle commands against the in-memory demo store.
    Bead {
        #[command(subcommand)]
        action: BeadCommand,
    },
    /// Ensure a project's build environment is initialized.
    Env {
        #[command(subcommand)]
        action: EnvCommand,
    },
}

#[derive(Subcommand)]
enum BeadCommand {
    Create { #[arg(long)] title: String, #[arg(long)] project: String },
    List { #[arg(long)] project: String },
    Close { #[arg(long)] id: String },
}

#[derive(Subcommand)]
enum EnvCommand {
    Ensure { #[arg(long)] project: String, #[arg(long)] work_dir: PathBuf },
}

fn init_tracing(level: &str, format: &LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format);

    match cli.command {
        Command::Run { project, work_dir, use_container, max_iterations, provider_url, provider_model, provider_api_key } => {
            run_once(project, work_dir, use_container, max_iterations, provider_url, provider_model, provider_api_key).await
        }
        Command::Bead { action } => run_bead_command(action),
        Command::Env { action } => run_env_command(action).await,
    }
}

async fn run_once(
    project_id: String,
    work_dir: PathBuf,
    use_container: bool,
    max_iterations: u32,
    provider_url: String,
    provider_model: String,
    provider_api_key: String,
) -> anyhow::Result<()> {
    let mut project = Project::local(&project_id, &work_dir);
    project.use_container = use_container;

    let beads = InMemoryBeadStore::new();
    let bead = beads.next_ready(&ReadyFilter { project_id: Some(project_id.clone()), role_hint: None });
    let Some(mut bead) = bead else {
        tracing::info!(project_id, "no ready bead; nothing to dispatch");
        return Ok(());
    };

    let agent = Agent::new(format!("agent-{project_id}"), AgentRole::Coder, project_id.clone());
    bead.dispatch(&agent.id);
    beads.save(&bead)?;

    let file_manager_root = work_dir.clone();
    let local_file_ops = LocalFileOps::new(file_manager_root.clone());
    let local_git_ops = LocalGitOps { service: loom_coordination::git::GitService::new(&work_dir, "bead/", &project.id) };
    let git_service = loom_coordination::git::GitService::new(&work_dir, "bead/", &project.id);

    let build_env = BuildEnvManager::new();
    let adapter = ContainerOrchestrationAdapter::new();
    let sandbox = get_ready_sandbox(&adapter, &build_env, &project).await;

    let provider = Provider {
        id: "default".to_string(),
        base_url: provider_url,
        model: provider_model,
        api_key: provider_api_key,
        context_window: 128_000,
    };
    let action_provider = RigActionProvider::new(&provider);

    let working_dir_display = work_dir.to_string_lossy().to_string();

    let report = if let Some(client) = sandbox {
        let sandbox_file_ops = SandboxFileOps { client: Arc::clone(&client) };
        let sandbox_git_ops = SandboxGitOps { client };
        let router = Router { file_ops: &sandbox_file_ops, git_ops: &sandbox_git_ops, git_service: &git_service, beads: &beads };
        run_dispatch_loop(&mut bead, &agent, &router, &action_provider, &working_dir_display, max_iterations).await
    } else {
        let router = Router { file_ops: &local_file_ops, git_ops: &local_git_ops, git_service: &git_service, beads: &beads };
        run_dispatch_loop(&mut bead, &agent, &router, &action_provider, &working_dir_display, max_iterations).await
    };

    tracing::info!(outcome = ?report.outcome, iterations = report.iterations_run, "dispatch finished");
    synthesize_exit(&mut bead, &report, &beads);
    Ok(())
}

fn run_bead_command(action: BeadCommand) -> anyhow::Result<()> {
    let beads = InMemoryBeadStore::new();
    match action {
        BeadCommand::Create { title, project } => {
            let bead = Bead::new(format!("bd-{}", uuid_like(&title)), title, project);
            beads.save(&bead)?;
            println!("{}", bead.id);
        }
        BeadCommand::List { project } => {
            for bead in beads.list(&project) {
                println!("{}\t{:?}\t{}", bead.id, bead.status, bead.title);
            }
        }
        BeadCommand::Close { id } => {
            if let Some(mut bead) = beads.get(&id) {
                bead.close(true);
                beads.save(&bead)?;
            } else {
                anyhow::bail!("bead {id} not found");
            }
        }
    }
    Ok(())
}

async fn run_env_command(action: EnvCommand) -> anyhow::Result<()> {
    match action {
        EnvCommand::Ensure { project: _, work_dir } => {
            let manifests = loom_orchestrator::buildenv::manager::local_manifests(&work_dir)?;
            for manifest in manifests {
                println!("found manifest: {}", manifest.filename);
            }
        }
    }
    Ok(())
}

fn uuid_like(seed: &str) -> String {
    seed.to_lowercase().chars().filter(|c| c.is_ascii_alphanumeric()).take(12).collect()
}
