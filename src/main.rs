use anyhow::Context;
use clap::Parser;
use micontrol::config::Config;
use micontrol::console::ConsoleApp;
use micontrol::trace::MiTracer;
use micontrol::Session;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to gdb executable [default: from config file or `gdb` from PATH]
    #[arg(long, env = "MICTL_GDB")]
    gdb: Option<PathBuf>,

    /// Path to config file [default: ~/.config/mictl/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append MI traffic to this file
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Timeout for a single command result
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Program to debug
    program: Option<String>,

    /// Program arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("load config")?;
    if let Some(file) = args.trace_file {
        config.trace.file = Some(file);
    }
    if let Some(ms) = args.timeout_ms {
        config.session.command_timeout_ms = ms;
    }

    let gdb = match args.gdb.or(config.gdb.path.clone()) {
        Some(path) => path,
        None => which::which("gdb").context("gdb not found in PATH")?,
    };

    let mut cmd = std::process::Command::new(&gdb);
    cmd.args(["--interpreter=mi2", "--nx", "-q"])
        .args(&config.gdb.args);
    if let Some(program) = &args.program {
        cmd.arg("--args").arg(program).args(&args.args);
    }
    let mut gdb_proc = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawn {}", gdb.display()))?;
    let stdin = gdb_proc.stdin.take().context("gdb stdin is not piped")?;
    let stdout = gdb_proc.stdout.take().context("gdb stdout is not piped")?;

    let tracer = match &config.trace.file {
        Some(file) => MiTracer::with_file(file).context("open trace file")?,
        None => MiTracer::new(),
    };
    let timeout = config.session.command_timeout();
    let session = Arc::new(Session::start_with(
        stdout,
        stdin,
        config.session.clone(),
        tracer,
    )?);

    let backend = session.negotiate(timeout).context("backend negotiation")?;
    println!("gdb {} ({} features)", backend.version, backend.features.len());

    ConsoleApp::new(session, timeout).run()?;

    gdb_proc.wait().context("wait gdb")?;
    Ok(())
}
