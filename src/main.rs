use mutfleet::cluster::{ClusterClient, KubectlClient};
use mutfleet::config::{DEFAULT_CONFIG_FILE, PartitionStrategy, PullPolicy, RunConfig};
use mutfleet::dispatch;
use mutfleet::output;
use mutfleet::packager;
use mutfleet::partition;
use mutfleet::project::ProjectDescriptor;
use mutfleet::state::{self, RunBundle};

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mutfleet", version, about = "Distributed mutation testing on a cluster")]
struct Cli {
    /// Debug logging for mutfleet (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProjectArgs {
    /// Project root containing pom.xml
    #[arg(short, long, default_value = ".")]
    project: PathBuf,
    /// Config file, relative to the project root unless absolute
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Comma-separated class globs
    #[arg(long)]
    target_classes: Option<String>,
    /// Comma-separated test globs
    #[arg(long)]
    target_tests: Option<String>,
    /// PACKAGE or DEFAULT
    #[arg(long)]
    strategy: Option<PartitionStrategy>,
    /// Classes per partition for the DEFAULT strategy
    #[arg(long)]
    classes_per_partition: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the project and run every partition on the cluster
    Run {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        max_parallel_units: Option<usize>,
        /// Per-partition wall-clock budget
        #[arg(long)]
        unit_timeout: Option<u64>,
        /// Budget for the whole run
        #[arg(long)]
        run_timeout: Option<u64>,
        #[arg(long, env = "MUTFLEET_NAMESPACE")]
        namespace: Option<String>,
        #[arg(long, env = "MUTFLEET_IMAGE")]
        image: Option<String>,
        #[arg(long)]
        image_pull_policy: Option<PullPolicy>,
        #[arg(long)]
        memory_limit: Option<String>,
        #[arg(long)]
        cpu_limit: Option<String>,
        /// Output the result bundle as JSON
        #[arg(long)]
        json: bool,
        /// Exit code only, no output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show how the project would be partitioned, without touching the cluster
    Plan {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        json: bool,
    },
    /// Rebuild a source tree from a mounted config channel (runs inside the unit)
    Unpack {
        #[arg(long)]
        from: PathBuf,
        #[arg(long)]
        to: PathBuf,
    },
    /// Summary of the last run
    Status {
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Mutations of one class from the last run
    Show {
        /// Fully qualified or simple class name
        class: String,
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Run {
            project,
            max_parallel_units,
            unit_timeout,
            run_timeout,
            namespace,
            image,
            image_pull_policy,
            memory_limit,
            cpu_limit,
            json,
            quiet,
        } => {
            let overrides = RunOverrides {
                max_parallel_units,
                unit_timeout,
                run_timeout,
                namespace,
                image,
                image_pull_policy,
                memory_limit,
                cpu_limit,
            };
            cmd_run(project, overrides, json, quiet)
        }
        Commands::Plan { project, json } => cmd_plan(project, json),
        Commands::Unpack { from, to } => cmd_unpack(&from, &to),
        Commands::Status { project, json } => cmd_status(&project, json),
        Commands::Show {
            class,
            project,
            json,
        } => cmd_show(&class, &project, json),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mutfleet=debug" } else { "mutfleet=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn generate_run_id() -> String {
    format!("{:08x}", fastrand::u32(..))
}

struct RunOverrides {
    max_parallel_units: Option<usize>,
    unit_timeout: Option<u64>,
    run_timeout: Option<u64>,
    namespace: Option<String>,
    image: Option<String>,
    image_pull_policy: Option<PullPolicy>,
    memory_limit: Option<String>,
    cpu_limit: Option<String>,
}

/// Config file first, then command-line flags on top.
fn load_config(args: &ProjectArgs) -> Result<RunConfig, String> {
    let path = if args.config.is_absolute() {
        args.config.clone()
    } else {
        args.project.join(&args.config)
    };
    let mut config = RunConfig::load(&path).map_err(|e| e.to_string())?;
    if let Some(globs) = &args.target_classes {
        config = config.with_target_classes(globs.clone());
    }
    if let Some(globs) = &args.target_tests {
        config = config.with_target_tests(globs.clone());
    }
    if let Some(strategy) = args.strategy {
        config = config.with_strategy(strategy);
    }
    if let Some(size) = args.classes_per_partition {
        config.classes_per_partition = size;
    }
    Ok(config)
}

fn apply_overrides(mut config: RunConfig, o: RunOverrides) -> RunConfig {
    if let Some(units) = o.max_parallel_units {
        config = config.with_max_parallel_units(units);
    }
    if let Some(secs) = o.unit_timeout {
        config = config.with_unit_timeout_seconds(secs);
    }
    if let Some(secs) = o.run_timeout {
        config.run_timeout_seconds = secs;
    }
    if let Some(namespace) = o.namespace {
        config = config.with_namespace(namespace);
    }
    if let Some(image) = o.image {
        config = config.with_image(image);
    }
    if let Some(policy) = o.image_pull_policy {
        config.image_pull_policy = policy;
    }
    if let Some(memory) = o.memory_limit {
        config.memory_limit = memory;
    }
    if let Some(cpu) = o.cpu_limit {
        config.cpu_limit = cpu;
    }
    config
}

fn cmd_run(args: ProjectArgs, overrides: RunOverrides, json_mode: bool, quiet: bool) -> i32 {
    let config = match load_config(&args) {
        Ok(c) => apply_overrides(c, overrides),
        Err(e) => {
            output::print_error(&e);
            return 2;
        }
    };
    if let Err(e) = config.validate() {
        output::print_error(&format!("Invalid configuration: {e}"));
        return 2;
    }
    let project = match ProjectDescriptor::discover(&args.project) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };

    let run_id = generate_run_id();
    let started_at = state::unix_now();
    let client: Arc<dyn ClusterClient> = Arc::new(KubectlClient::new(config.kubectl.clone()));
    let report = match dispatch::run_all(client, Arc::clone(&project), &config, &run_id) {
        Ok(r) => r,
        Err(e) => {
            output::print_error(&format!("Run failed: {e}"));
            return 3;
        }
    };

    if report.partitions.is_empty() {
        if !quiet {
            output::print_success("No classes matched. Nothing to do.");
        }
        return 0;
    }

    let bundle = RunBundle::from_report(&report, &project.coordinates, started_at);
    if let Err(e) = state::save_bundle(&project.root, &bundle) {
        tracing::warn!("result bundle not saved: {e}");
    }

    if !quiet {
        if json_mode {
            match serde_json::to_string(&bundle) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    output::print_error(&e.to_string());
                    return 3;
                }
            }
        } else {
            output::print_run_result(&bundle);
        }
    }

    if !bundle.result.errors.is_empty() {
        3
    } else if bundle.result.survived() > 0 {
        1
    } else {
        0
    }
}

fn cmd_plan(args: ProjectArgs, json_mode: bool) -> i32 {
    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            output::print_error(&e);
            return 2;
        }
    };
    let (class_filter, test_filter) = match (config.class_filter(), config.test_filter()) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => {
            output::print_error(&format!("Invalid configuration: {e}"));
            return 2;
        }
    };
    let project = match ProjectDescriptor::discover(&args.project) {
        Ok(p) => p,
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };

    let classes: Vec<String> = project
        .classes()
        .into_iter()
        .filter(|c| class_filter.matches(c))
        .collect();
    let tests: Vec<String> = project
        .test_classes()
        .into_iter()
        .filter(|t| test_filter.matches(t))
        .collect();
    let partitions = partition::partition(&classes, &tests, &config);

    if json_mode {
        match serde_json::to_string_pretty(&partitions) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                output::print_error(&e.to_string());
                return 3;
            }
        }
    } else {
        output::print_plan(&partitions);
    }
    0
}

fn cmd_unpack(from: &Path, to: &Path) -> i32 {
    let channel = match packager::load_channel_dir(from) {
        Ok(c) => c,
        Err(e) => {
            output::print_error(&format!("Cannot read config channel: {e}"));
            return 3;
        }
    };
    if channel.is_empty() {
        output::print_error(&format!("Config channel at {} is empty", from.display()));
        return 3;
    }
    let written = match packager::reconstruct(&channel, to) {
        Ok(w) => w,
        Err(e) => {
            output::print_error(&format!("Reconstruction failed: {e}"));
            return 3;
        }
    };
    match packager::ensure_descriptor(&channel, to) {
        Ok(synthesized) => {
            if synthesized {
                tracing::info!("no build descriptor shipped, synthesized a minimal one");
            }
            output::print_success(&format!("Reconstructed {} files into {}", written.len(), to.display()));
            0
        }
        Err(e) => {
            output::print_error(&format!("Reconstruction failed: {e}"));
            3
        }
    }
}

fn load_last(project: &Path) -> Option<RunBundle> {
    let bundle = ProjectDescriptor::discover(project)
        .ok()
        .and_then(|p| state::load_bundle(&p.root, &p.coordinates).ok());
    bundle.or_else(|| state::load_latest(project))
}

fn cmd_status(project: &Path, json_mode: bool) -> i32 {
    match load_last(project) {
        Some(bundle) => {
            if json_mode {
                match serde_json::to_string(&bundle) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        output::print_error(&e.to_string());
                        return 3;
                    }
                }
            } else {
                output::print_status(&bundle);
            }
            0
        }
        None => {
            output::print_error("No previous run found. Run `mutfleet run` first.");
            2
        }
    }
}

fn cmd_show(class: &str, project: &Path, json_mode: bool) -> i32 {
    let Some(bundle) = load_last(project) else {
        output::print_error("No previous run found. Run `mutfleet run` first.");
        return 2;
    };

    let result = &bundle.result;
    let found = result.class(class).map(|m| (class, m)).or_else(|| {
        result
            .mutations_by_class
            .iter()
            .find(|(name, _)| mutfleet::mutants::simple_class_name(name) == class)
            .map(|(name, m)| (name.as_str(), m.as_slice()))
    });
    match found {
        Some((name, mutations)) => {
            if json_mode {
                match serde_json::to_string(mutations) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        output::print_error(&e.to_string());
                        return 3;
                    }
                }
            } else {
                output::print_class_detail(name, mutations);
            }
            0
        }
        None => {
            let valid: Vec<&str> = result.mutations_by_class.keys().map(String::as_str).collect();
            output::print_error(&format!(
                "Class {} not found. Known classes: {}",
                class,
                valid.join(", ")
            ));
            2
        }
    }
}
