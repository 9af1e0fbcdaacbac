use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use scriptblock::cli::{self, Cli, Command};
use scriptblock::{
    BuildCommand, CancelToken, Config, Engine, ErrorRecord, ExecutableUnit, Interpreter, OutputEvent,
    RunCommand, Sink,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = scriptblock::logging::init_logging(cli.verbose) {
        eprintln!("sb: logging disabled: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sb: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    // Ctrl-C cancels the running invocation; the blocking task notices at the
    // next statement or emitted value.
    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received");
                cancel.cancel();
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || execute(cli.command, config, cancel))
        .await
        .context("script task failed")?;
    watcher.abort();
    result
}

fn load_config(cli: &Cli) -> Result<Config> {
    let Some(path) = cli.config_file().resolve() else {
        return Ok(Config::new());
    };
    let (config, errors) =
        Config::load_file(&path).with_context(|| format!("can't read rc file {}", path.display()))?;
    for e in errors {
        warn!(path = %path.display(), line = e.line, "{}", e.message);
        eprintln!("sb: {}: {e}", path.display());
    }
    Ok(config)
}

fn execute(command: Command, config: Config, cancel: CancelToken) -> Result<()> {
    match command {
        Command::Build { file } => {
            let mut build = BuildCommand::new();
            for line in read_lines(file.as_deref())? {
                build.process(line?);
            }
            let unit = build.end()?;
            if !unit.source().is_empty() {
                println!("{unit}");
            }
            Ok(())
        }

        Command::Run { file, commands, args, no_new_scope, error_action } => {
            let engine = Engine::new(config.engine.clone());
            let mut interp = Interpreter::new();
            config.apply(&mut interp);

            let mut sink = StdoutSink::new(cancel.clone());
            let options = cli::run_options(&args, no_new_scope, error_action);
            let mut run = RunCommand::new(&engine, &mut interp, &mut sink, options).with_cancel(cancel);

            for script in &commands {
                let unit = ExecutableUnit::compile(script).with_context(|| format!("in -c {script:?}"))?;
                run.process(unit)?;
            }
            if file.is_some() || commands.is_empty() {
                for line in read_lines(file.as_deref())? {
                    run.process(line?)?;
                }
            }
            run.end()?;
            Ok(())
        }
    }
}

/// Lines of `path`, or of stdin when `None`.
fn read_lines(path: Option<&Path>) -> Result<io::Lines<Box<dyn BufRead>>> {
    let reader: Box<dyn BufRead> = match path {
        Some(p) => {
            let file = File::open(p).with_context(|| format!("can't open {}", p.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };
    Ok(reader.lines())
}

/// Prints each value on its own line as soon as it is produced.
struct StdoutSink {
    out: io::Stdout,
    cancel: CancelToken,
}

impl StdoutSink {
    fn new(cancel: CancelToken) -> Self {
        Self { out: io::stdout(), cancel }
    }
}

impl Sink for StdoutSink {
    fn output(&mut self, event: OutputEvent) {
        let mut out = self.out.lock();
        if writeln!(out, "{}", event.value).and_then(|()| out.flush()).is_err() {
            // stdout closed (e.g. piped into `head`); nothing more can be shown
            self.cancel.cancel();
        }
    }

    fn error(&mut self, record: &ErrorRecord) {
        eprintln!("sb: error: {record}");
    }

    fn inquire(&mut self, record: &ErrorRecord) -> bool {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return false;
        }
        eprint!("sb: {record}\ncontinue? [y/N] ");
        let mut answer = String::new();
        stdin.read_line(&mut answer).is_ok() && matches!(answer.trim(), "y" | "Y" | "yes")
    }
}
