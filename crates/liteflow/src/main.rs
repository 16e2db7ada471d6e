use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use liteflow::engine::Replay;
use liteflow::jobs::model::{Job, JobState, NewJob};
use liteflow::{Config, Engine};

/// liteflow — durable background job queue for shell commands
#[derive(Debug, Parser)]
#[command(name = "liteflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Add a shell command to the queue
    Enqueue {
        cmd: String,
        /// Attempt cap before the job is declared dead
        #[arg(long, default_value_t = 3)]
        retries: i64,
        /// Delay in seconds before the job becomes eligible
        #[arg(long = "run-at", default_value_t = 0)]
        run_at: i64,
        /// Wall-clock limit per execution in seconds; 0 means unbounded
        #[arg(long, default_value_t = 0)]
        timeout: i64,
        /// Higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// List jobs, newest first
    List {
        #[arg(long)]
        state: Option<String>,
    },
    /// Job counts per state
    Status,
    /// Run worker agents in the foreground until stopped
    #[command(name = "worker:start")]
    WorkerStart {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Ask running workers to exit after their current job
    #[command(name = "worker:stop")]
    WorkerStop,
    /// List dead jobs
    #[command(name = "dlq:list")]
    DlqList,
    /// Return a dead job to the queue
    #[command(name = "dlq:retry")]
    DlqRetry { id: String },
    /// Show one job with its last execution trace
    Show { id: String },
    /// Re-run a job's original command outside the queue
    Replay {
        id: String,
        /// Actually execute; without this flag the command is only printed
        #[arg(long)]
        confirm: bool,
    },
    /// Write an engine setting
    ConfigSet { key: String, value: String },
    /// Read an engine setting
    ConfigGet { key: String },
    /// Enqueue a deterministic batch of succeeding/failing jobs
    Test {
        #[arg(long, default_value_t = 5)]
        count: i64,
        #[arg(long = "fail-rate", default_value_t = 0.5)]
        fail_rate: f64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("liteflow=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let engine = Engine::open(Config::from_env()).await?;

    match cli.command {
        Commands::Enqueue {
            cmd,
            retries,
            run_at,
            timeout,
            priority,
        } => {
            if retries < 0 {
                anyhow::bail!("--retries must not be negative");
            }
            if timeout < 0 {
                anyhow::bail!("--timeout must not be negative");
            }
            let id = engine
                .enqueue(NewJob {
                    command: cmd,
                    max_retries: retries,
                    delay_sec: run_at,
                    timeout_sec: timeout,
                    priority,
                })
                .await?;
            println!("{id}");
        }
        Commands::List { state } => {
            let filter = match state.as_deref() {
                Some(s) => Some(
                    JobState::parse(s)
                        .ok_or_else(|| anyhow::anyhow!("unknown state: {s} (expected one of pending, processing, completed, dead)"))?,
                ),
                None => None,
            };
            print_job_table(&engine.jobs().list_jobs(filter).await?);
        }
        Commands::Status => {
            let counts = engine.jobs().count_by_state().await?;
            for state in JobState::ALL {
                let n = counts
                    .iter()
                    .find(|(s, _)| *s == state)
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                println!("{state:<12} {n}");
            }
        }
        Commands::WorkerStart { count } => {
            if count == 0 {
                anyhow::bail!("--count must be at least 1");
            }
            engine.start_workers(count).await?;
        }
        Commands::WorkerStop => {
            engine.stop_workers().await?;
            println!("stop requested; workers exit after their current job");
        }
        Commands::DlqList => {
            print_job_table(&engine.jobs().list_jobs(Some(JobState::Dead)).await?);
        }
        Commands::DlqRetry { id } => {
            engine.dlq_retry(&id).await?;
            println!("job {id} returned to pending");
        }
        Commands::Show { id } => {
            print_job_detail(&engine.show(&id).await?);
        }
        Commands::Replay { id, confirm } => match engine.replay(&id, confirm).await? {
            Replay::DryRun(cmd) => {
                println!("{cmd}");
                println!("(dry run; pass --confirm to execute)");
            }
            Replay::Executed { exit_code } => match exit_code {
                Some(code) => println!("replay exited with code {code}"),
                None => println!("replay terminated by signal"),
            },
        },
        Commands::ConfigSet { key, value } => {
            engine.settings().set(&key, &value).await?;
        }
        Commands::ConfigGet { key } => match engine.settings().get(&key).await? {
            Some(value) => println!("{value}"),
            None => anyhow::bail!("no such setting: {key}"),
        },
        Commands::Test { count, fail_rate } => {
            let ids = engine.seed_test_jobs(count, fail_rate).await?;
            println!("enqueued {} test jobs", ids.len());
            for id in ids {
                println!("{id}");
            }
        }
    }

    Ok(())
}

fn print_job_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:>4}  {:>8}  command",
        "id", "state", "prio", "attempts"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<10}  {:>4}  {:>5}/{:<2}  {}",
            job.id,
            job.state,
            job.priority,
            job.attempts,
            job.max_retries,
            ellipsize(&job.command, 60)
        );
    }
}

fn print_job_detail(job: &Job) {
    println!("id:           {}", job.id);
    println!("state:        {}", job.state);
    println!("command:      {}", job.command);
    println!("replayable:   {}", job.replayable_cmd);
    println!("priority:     {}", job.priority);
    println!("attempts:     {}/{}", job.attempts, job.max_retries);
    println!("timeout_sec:  {}", job.timeout_sec);
    println!("run_after:    {}", job.run_after);
    println!("created_at:   {}", job.created_at);
    println!("updated_at:   {}", job.updated_at);
    println!(
        "last_error:   {}",
        job.last_error.as_deref().unwrap_or("-")
    );

    match job.trace_created_at {
        None => println!("trace:        (no execution yet)"),
        Some(at) => {
            println!("trace at:     {at}");
            println!(
                "exit_code:    {}",
                job.exit_code.map_or("-".to_string(), |c| c.to_string())
            );
            println!(
                "runtime_sec:  {}",
                job.runtime_sec.map_or("-".to_string(), |r| r.to_string())
            );
            println!("--- stdout ---");
            println!("{}", job.stdout.as_deref().unwrap_or(""));
            println!("--- stderr ---");
            println!("{}", job.stderr.as_deref().unwrap_or(""));
        }
    }
}

fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}
