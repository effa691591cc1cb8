//! Purpose: Hold top-level CLI command dispatch for `tdlbind`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Contexts opened here are shut down before returning.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "tdlbind", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Target => {
            let target = Target::detect(&Environment::capture());
            let value = serde_json::to_value(&target).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode target")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Resolve {
            dir,
            prebuilds_only,
            ext,
        } => {
            let resolver = prebuild_resolver(prebuilds_only, &ext);
            let path = resolver.resolve(&dir)?;
            emit_json(json!({
                "path": path.display().to_string(),
                "target": resolver.target().describe(),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Execute {
            request,
            multiplexed,
            library,
        } => {
            let request = parse_request(&request)?;
            let tdl = open_context(&library, interface_mode(multiplexed))?;
            let response = tdl.execute(request)?;
            emit_json(response.unwrap_or(Value::Null));
            Ok(RunOutcome::ok())
        }
        Command::Watch {
            multiplexed,
            send,
            timeout,
            max,
            engine_logs,
            library,
        } => {
            let requests = send
                .iter()
                .map(|raw| parse_request(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let tdl = open_context(&library, interface_mode(multiplexed))?;
            if let Some(level) = engine_logs {
                forward_engine_logs_to_tracing(&tdl.native()?, level)?;
            }
            let result = watch(&tdl, requests, timeout, max);
            tdl.shutdown();
            result
        }
    }
}

fn interface_mode(multiplexed: bool) -> InterfaceMode {
    if multiplexed {
        InterfaceMode::Multiplexed
    } else {
        InterfaceMode::Legacy
    }
}

fn watch(
    tdl: &Tdl,
    requests: Vec<Value>,
    timeout: Duration,
    max: Option<u64>,
) -> Result<RunOutcome, Error> {
    let client = tdl.create_client(ClientOptions::new())?;
    if let Some(client_id) = client.id() {
        tracing::info!(%client_id, "watching client");
    }
    for request in requests {
        client.send(request)?;
    }

    let mut received = 0u64;
    let started = Instant::now();
    while max.is_none_or(|max| received < max) {
        match client.next_update(timeout) {
            Some(update) => {
                emit_json_line(&update);
                received += 1;
            }
            None => break,
        }
    }
    tracing::debug!(
        received,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "watch finished"
    );
    client.close();
    Ok(RunOutcome::ok())
}
