use clap::{Args, Parser, Subcommand};
use shoal_core::cluster::{self, coordinator, worker};
use shoal_core::error::{Result, ShoalError};
use shoal_core::merge::Merger;
use shoal_core::store::{Archive, writer};
use shoal_core::{ApplyTask, OutputBase, runtime};
use std::io;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "distribute a program over every record of an indexed archive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct JobArgs {
    /// Input archive data file
    data: PathBuf,

    /// Input archive index file
    index: PathBuf,

    /// Output archive data file; together with -i enables output capture
    #[arg(short = 'd', long = "out-data", requires = "index_out")]
    data_out: Option<PathBuf>,

    /// Output archive index file
    #[arg(short = 'i', long = "out-index", requires = "data_out")]
    index_out: Option<PathBuf>,

    /// Merge command for intermediate archives; defaults to this executable's
    /// merge subcommand
    #[arg(long = "merge-with")]
    merge_with: Option<String>,

    /// Program (and arguments) run once per record with the record on stdin
    #[arg(last = true, required = true)]
    program: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a program to every record, distributed over worker processes
    Apply {
        #[command(flatten)]
        job: JobArgs,

        /// Worker process count (the coordinator is not counted)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Chunks per worker; more parts means finer load balancing
        #[arg(short, long, default_value_t = 10)]
        parts: usize,
    },

    /// Additively merge a source archive into a destination archive
    Merge {
        #[arg(short = 'd', long = "out-data")]
        data_out: PathBuf,

        #[arg(short = 'i', long = "out-index")]
        index_out: PathBuf,

        src_data: PathBuf,
        src_index: PathBuf,
    },

    /// Worker rank entry point, spawned by apply
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        rank: usize,

        #[command(flatten)]
        job: JobArgs,
    },
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("ERROR: {e}");
        std::process::exit(e.os_code().unwrap_or(1));
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Commands::Apply {
            job,
            workers,
            parts,
        } => handle_apply(job, workers, parts),
        Commands::Merge {
            data_out,
            index_out,
            src_data,
            src_index,
        } => writer::append_archive(&data_out, &index_out, &src_data, &src_index),
        Commands::Worker { rank, job } => handle_worker(rank, job),
    }
}

fn handle_apply(job: JobArgs, workers: Option<usize>, parts: usize) -> Result<()> {
    let archive = Archive::open(&job.data, &job.index)?;
    let total = archive.index.len();
    let world = workers.unwrap_or_else(default_workers).max(1);
    let chunk = cluster::chunk_len(total, world, parts);
    info!(total, world, chunk, "starting distributed run");

    let exe = std::env::current_exe()?;
    let completions = coordinator::run(world, total, chunk, |rank| {
        let mut cmd = Command::new(&exe);
        cmd.arg("worker").arg("--rank").arg(rank.to_string());
        if let (Some(d), Some(i)) = (&job.data_out, &job.index_out) {
            cmd.arg("-d").arg(d).arg("-i").arg(i);
        }
        if let Some(m) = &job.merge_with {
            cmd.arg("--merge-with").arg(m);
        }
        cmd.arg(&job.data).arg(&job.index);
        cmd.arg("--").args(&job.program);
        cmd
    })?;
    let failed = completions.iter().filter(|c| c.status != 0).count();
    info!(chunks = completions.len(), failed, "run finished");

    if let Some(base) = output_base(&job) {
        let command = merge_command(&job)?;
        Merger {
            command: &command,
            base: &base,
        }
        .merge_ranks(world)?;
    }
    Ok(())
}

fn handle_worker(rank: usize, job: JobArgs) -> Result<()> {
    let archive = Archive::open(&job.data, &job.index)?;
    let base = output_base(&job);
    let (program, args) = job
        .program
        .split_first()
        .ok_or_else(|| ShoalError::Protocol("worker started without a program".into()))?;

    let task = ApplyTask {
        archive: &archive,
        program,
        args,
        output: base.as_ref(),
        rank,
    };
    let stdin = io::stdin();
    let stdout = io::stdout();
    let ledger = worker::serve(&mut stdin.lock(), &mut stdout.lock(), |start, end| {
        runtime::run_chunk(&task, start, end)
    })?;

    if let Some(base) = &base {
        let command = merge_command(&job)?;
        Merger {
            command: &command,
            base,
        }
        .merge_rank_fragments(rank, &ledger)?;
    }
    Ok(())
}

fn output_base(job: &JobArgs) -> Option<OutputBase> {
    match (&job.data_out, &job.index_out) {
        (Some(data), Some(index)) => Some(OutputBase {
            data: data.clone(),
            index: index.clone(),
        }),
        _ => None,
    }
}

fn merge_command(job: &JobArgs) -> Result<Vec<String>> {
    match &job.merge_with {
        Some(s) => Ok(s.split_whitespace().map(String::from).collect()),
        None => {
            let exe = std::env::current_exe()?;
            Ok(vec![exe.display().to_string(), "merge".to_string()])
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Logs go to stderr; worker stdout carries the control protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
