//! Purpose: `tdlbind` CLI entry point: inspect resolution and drive tdjson from a shell.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty on a terminal, compact otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Diagnostics go through `tracing` to stderr, filtered by `RUST_LOG`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tdlbind::api::{
    ClientOptions, Config, ConfigOptions, Environment, Error, ErrorKind, InterfaceMode, Resolver,
    Target, Tdl, Verbosity, forward_engine_logs_to_tracing, to_exit_code,
};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `tdlbind --help`."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command)
        .map_err(add_load_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

#[derive(Parser)]
#[command(
    name = "tdlbind",
    version,
    about = "Load tdjson at runtime and route its JSON events to clients",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Requests and responses are JSON objects with `_` as the type key.

Mental model:
  - `target`/`resolve` show which native build would be picked (no loading)
  - `execute` runs one synchronous tdjson request
  - `watch` creates a client and prints its updates as JSON lines
"#,
    after_help = r#"EXAMPLES
  $ tdlbind target
  $ tdlbind resolve ./node_modules/tdl --prebuilds-only
  $ tdlbind execute '{"_":"getTextEntities","text":"@tdlib /start"}'
  $ tdlbind watch --multiplexed --send '{"_":"getOption","name":"version"}' --max 3

LEARN MORE
  $ tdlbind <command> --help
  RUST_LOG=debug shows loading and routing diagnostics on stderr."#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug, Default)]
struct LibraryArgs {
    #[arg(long, help = "tdjson file name (default: platform library name)")]
    tdjson: Option<String>,
    #[arg(
        long,
        help = "Directory holding tdjson (default: loader search path)",
        value_hint = ValueHint::DirPath
    )]
    libdir: Option<PathBuf>,
    #[arg(
        long,
        help = "Resolve tdjson from a prebuilt package directory instead",
        value_hint = ValueHint::DirPath,
        conflicts_with_all = ["tdjson", "libdir"]
    )]
    prebuild_dir: Option<PathBuf>,
    #[arg(long, help = "Engine log verbosity applied at load: `default` or an integer")]
    verbosity: Option<Verbosity>,
    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = parse_seconds,
        help = "Timeout for each native receive call (default: 10)"
    )]
    receive_timeout: Option<Duration>,
}

impl LibraryArgs {
    fn config_options(&self, interface: InterfaceMode) -> ConfigOptions {
        let mut options = ConfigOptions::new().interface(interface);
        if let Some(tdjson) = &self.tdjson {
            options = options.tdjson(tdjson.clone());
        }
        if let Some(libdir) = &self.libdir {
            options = options.libdir(libdir.clone());
        }
        if let Some(dir) = &self.prebuild_dir {
            options = options.prebuild_dir(dir.clone());
        }
        if let Some(verbosity) = self.verbosity {
            options = options.verbosity(verbosity);
        }
        if let Some(timeout) = self.receive_timeout {
            options = options.receive_timeout(timeout);
        }
        options
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Print the detected platform target",
        after_help = r#"EXAMPLES
  $ tdlbind target
  $ npm_config_arch=arm64 LIBC=musl tdlbind target

NOTES
  - Honors npm_config_platform, npm_config_arch, LIBC, ARM_VERSION
  - Honors TDLBIND_RUNTIME, TDLBIND_ABI, TDLBIND_UV"#
    )]
    Target,
    #[command(
        arg_required_else_help = true,
        about = "Resolve the native build for this platform",
        after_help = r#"EXAMPLES
  $ tdlbind resolve ./vendor/tdl
  $ tdlbind resolve ./vendor/tdl --prebuilds-only --ext so

NOTES
  - Order: <NAME>_PREBUILD override, build/Release, build/Debug, prebuilds/, executable dir
  - Exit code 4 when nothing matches"#
    )]
    Resolve {
        #[arg(help = "Package directory to search", value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        #[arg(long, help = "Skip build/Release and build/Debug")]
        prebuilds_only: bool,
        #[arg(long, default_value = "node", help = "Module file extension")]
        ext: String,
    },
    #[command(
        arg_required_else_help = true,
        about = "Run one synchronous tdjson request",
        after_help = r#"EXAMPLES
  $ tdlbind execute '{"_":"getTextEntities","text":"@tdlib /start"}'
  $ tdlbind execute --libdir /opt/td/lib '{"_":"setLogVerbosityLevel","new_verbosity_level":1}'"#
    )]
    Execute {
        #[arg(help = "Request JSON object (`_` is the type key)")]
        request: String,
        #[arg(long, help = "Use the multiplexed interface (td_execute)")]
        multiplexed: bool,
        #[command(flatten)]
        library: LibraryArgs,
    },
    #[command(
        about = "Create a client and print its updates as JSON lines",
        after_help = r#"EXAMPLES
  $ tdlbind watch --timeout 5
  $ tdlbind watch --multiplexed --send '{"_":"getOption","name":"version"}' --max 2
  $ tdlbind watch --engine-logs 3 --timeout 2

NOTES
  - Stops after --timeout seconds without an update, or after --max updates
  - --engine-logs forwards engine log lines into RUST_LOG diagnostics"#
    )]
    Watch {
        #[arg(long, help = "Use the multiplexed interface and the shared receive loop")]
        multiplexed: bool,
        #[arg(long = "send", value_name = "REQUEST", help = "Request to send after creation (repeatable)")]
        send: Vec<String>,
        #[arg(
            long,
            value_name = "SECONDS",
            value_parser = parse_seconds,
            default_value = "10",
            help = "Stop after this long without an update"
        )]
        timeout: Duration,
        #[arg(long, help = "Stop after this many updates")]
        max: Option<u64>,
        #[arg(long, value_name = "LEVEL", help = "Forward engine logs up to LEVEL into tracing")]
        engine_logs: Option<i32>,
        #[command(flatten)]
        library: LibraryArgs,
    },
    #[command(about = "Print a shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

fn parse_seconds(input: &str) -> Result<Duration, String> {
    let seconds: f64 = input
        .parse()
        .map_err(|_| format!("invalid seconds value: {input}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("invalid seconds value: {input}"))
}

fn parse_request(input: &str) -> Result<Value, Error> {
    let value: Value = serde_json::from_str(input).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("request is not valid json")
            .with_hint("Pass a JSON object like '{\"_\":\"getOption\",\"name\":\"version\"}'.")
            .with_source(err)
    })?;
    if !value.is_object() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("request must be a json object")
            .with_hint("Wrap the request in an object with a `_` type key."));
    }
    Ok(value)
}

fn open_context(library: &LibraryArgs, interface: InterfaceMode) -> Result<Tdl, Error> {
    let tdl = Tdl::with_config(Config::new());
    tdl.configure(library.config_options(interface))?;
    tdl.init()?;
    Ok(tdl)
}

fn prebuild_resolver(prebuilds_only: bool, ext: &str) -> Resolver {
    let mut environment = Environment::capture();
    if prebuilds_only {
        environment = environment.with_var("PREBUILDS_ONLY", "1");
    }
    let target = Target::detect(&environment);
    Resolver::new(target, environment).with_extension(ext)
}

fn add_load_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Load || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check --libdir/--tdjson, or point --prebuild-dir at a package with prebuilds.")
}

fn add_io_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Io || err.hint().is_some() {
        return err;
    }
    err.with_hint("I/O error. Check the path and permissions.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("tdlbind {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "tdlbind",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

/// One JSON line per value; used for streams regardless of terminal.
fn emit_json_line(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Config => "invalid configuration".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Load => "failed to load tdjson".to_string(),
        ErrorKind::Native => "tdjson error".to_string(),
        ErrorKind::Corrupt => "malformed data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Timeout => "timed out".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(client_id) = err.client_id() {
        inner.insert("client_id".to_string(), json!(client_id.get()));
    }
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(code) = err.code() {
        lines.push(format!("code: {code}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
