use academicd::api::HttpBackend;
use academicd::config::Config;
use academicd::ipc;
use anyhow::Context;
use std::io::{self, BufRead, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

fn spawn_stdin_reader(tx: mpsc::Sender<ipc::Inbound>) -> io::Result<()> {
    thread::Builder::new()
        .name("academicd-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(v) => v,
                    Err(_) => break,
                };
                if tx.send(ipc::Inbound::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(ipc::Inbound::Closed);
        })
        .map(|_| ())
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    // stdout carries the IPC stream; logs go to stderr.
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let backend = HttpBackend::new(&config).context("failed to build HTTP client")?;
    info!(api_base = %config.api_base(), "academicd starting");

    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone()).context("failed to start stdin reader")?;
    let mut state = ipc::AppState::new(config, Arc::new(backend), ipc::Jobs::new(tx));

    let mut stdout = io::stdout();
    for inbound in rx {
        match inbound {
            ipc::Inbound::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let req: ipc::Request = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        // Can't reply without id.
                        warn!(error = %e, "malformed request line");
                        write_line(
                            &mut stdout,
                            &serde_json::json!({
                                "ok": false,
                                "error": { "code": "bad_json", "message": e.to_string() },
                            }),
                        );
                        continue;
                    }
                };
                debug!(id = %req.id, method = %req.method, "request");
                let resp = ipc::handle_request(&mut state, req);
                write_line(&mut stdout, &resp);
            }
            ipc::Inbound::Completion(completion) => {
                if let Some(ev) = ipc::apply_completion(&mut state, completion) {
                    write_line(&mut stdout, &ev);
                }
            }
            ipc::Inbound::Closed => break,
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
