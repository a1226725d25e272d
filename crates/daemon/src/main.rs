// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! gridd - the grid engine daemon.
//!
//! Hosts the mutation engine over a Unix socket. One connection carries one
//! request/response exchange, except `Subscribe`, which keeps the connection
//! open and streams push frames until the client disconnects or the session
//! expires. A housekeeping thread prunes retained events and dead sessions.
//!
//! Usage:
//!   gridd --state-dir <path>

use std::fs;
use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use grid_core::engine::MutationEngine;
use grid_core::events::ChangeEvent;
use grid_core::{Database, EngineConfig};
use grid_ipc::{framing, DaemonRequest, DaemonResponse, PushFrame};

mod server;

/// Socket filename within the state directory.
const SOCKET_NAME: &str = "gridd.sock";
/// PID filename within the state directory.
const PID_NAME: &str = "gridd.pid";
/// Lock filename for the single-instance guarantee.
const LOCK_NAME: &str = "gridd.lock";
/// Database filename within the state directory.
const DB_NAME: &str = "grid.db";
/// Optional engine configuration within the state directory.
const CONFIG_NAME: &str = "config.toml";
/// How often the housekeeping thread runs.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

type SharedEngine = Arc<Mutex<MutationEngine>>;

fn lock_engine(engine: &SharedEngine) -> std::sync::MutexGuard<'_, MutationEngine> {
    engine.lock().unwrap_or_else(|e| e.into_inner())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let state_dir = parse_state_dir(&args);
    if let Err(e) = fs::create_dir_all(&state_dir) {
        eprintln!("failed to create state dir {}: {}", state_dir.display(), e);
        std::process::exit(1);
    }

    let log_path = state_dir.join("gridd.log");
    setup_logging(&log_path);

    tracing::info!("gridd starting, state_dir={}", state_dir.display());

    let lock_path = state_dir.join(LOCK_NAME);
    let lock_file = match acquire_lock(&lock_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to acquire lock: {}", e);
            std::process::exit(1);
        }
    };

    let config = load_config(&state_dir.join(CONFIG_NAME));
    let db = match Database::open(&state_dir.join(DB_NAME)) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    let engine: SharedEngine = Arc::new(Mutex::new(MutationEngine::new(db, config)));

    let pid_path = state_dir.join(PID_NAME);
    if let Err(e) = write_pid_file(&pid_path) {
        tracing::error!("failed to write PID file: {}", e);
        std::process::exit(1);
    }

    let socket_path = state_dir.join(SOCKET_NAME);
    // Remove stale socket if it exists
    let _ = fs::remove_file(&socket_path);

    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind socket: {}", e);
            cleanup(&pid_path, &socket_path);
            std::process::exit(1);
        }
    };

    tracing::info!("listening on {}", socket_path.display());

    // Signal readiness to parent process
    println!("READY");
    let _ = std::io::stdout().flush();

    spawn_housekeeping(Arc::clone(&engine));

    let start_time = Instant::now();

    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
                let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

                match framing::read_request(&mut stream) {
                    Ok(DaemonRequest::Subscribe { project_id, actor }) => {
                        handle_subscribe(Arc::clone(&engine), stream, project_id, actor);
                    }
                    Ok(request) => {
                        let shutdown = matches!(request, DaemonRequest::Shutdown);
                        let response = {
                            let engine = lock_engine(&engine);
                            server::handle_request(&engine, request, &start_time)
                        };
                        let _ = framing::write_response(&mut stream, &response);
                        if shutdown {
                            tracing::info!("shutting down");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to read request: {}", e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("failed to accept connection: {}", e);
            }
        }
    }

    cleanup(&pid_path, &socket_path);
    drop(lock_file);
    tracing::info!("gridd stopped");
}

/// Register the subscription and hand the connection to a writer thread.
fn handle_subscribe(
    engine: SharedEngine,
    mut stream: UnixStream,
    project_id: i64,
    actor: grid_core::Actor,
) {
    let subscribed = {
        let engine = lock_engine(&engine);
        engine.subscribe(project_id, &actor)
    };
    let (session_id, receiver) = match subscribed {
        Ok(pair) => pair,
        Err(e) => {
            let _ = framing::write_response(&mut stream, &server::error_response(&e));
            return;
        }
    };

    if framing::write_response(
        &mut stream,
        &DaemonResponse::Subscribed {
            session_id: session_id.clone(),
        },
    )
    .is_err()
    {
        lock_engine(&engine).unsubscribe(&session_id);
        return;
    }

    std::thread::spawn(move || {
        push_loop(&engine, &mut stream, &session_id, &receiver);
        lock_engine(&engine).unsubscribe(&session_id);
        tracing::debug!(%session_id, "push connection closed");
    });
}

/// Forward events to one subscriber until it disconnects or expires.
fn push_loop(
    engine: &SharedEngine,
    stream: &mut UnixStream,
    session_id: &str,
    receiver: &Receiver<ChangeEvent>,
) {
    loop {
        match receiver.recv_timeout(Duration::from_secs(5)) {
            Ok(event) => {
                if framing::write_frame(stream, &PushFrame::Event(event)).is_err() {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // Expired sessions stop receiving; tell the client to
                // resubscribe.
                if !lock_engine(engine).is_subscribed(session_id) {
                    let _ = framing::write_frame(stream, &PushFrame::Expired);
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn spawn_housekeeping(engine: SharedEngine) {
    std::thread::spawn(move || loop {
        std::thread::sleep(HOUSEKEEPING_INTERVAL);
        let result = {
            let engine = lock_engine(&engine);
            engine.housekeeping()
        };
        match result {
            Ok(report) => {
                if report.pruned_events > 0 || report.expired_sessions > 0 {
                    tracing::info!(
                        pruned_events = report.pruned_events,
                        expired_sessions = report.expired_sessions,
                        "housekeeping pass"
                    );
                }
            }
            Err(e) => tracing::warn!("housekeeping failed: {}", e),
        }
    });
}

/// Load the engine config from TOML, falling back to defaults.
fn load_config(path: &Path) -> EngineConfig {
    match fs::read_to_string(path) {
        Ok(text) => match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("invalid config at {}: {}, using defaults", path.display(), e);
                EngineConfig::default()
            }
        },
        Err(_) => EngineConfig::default(),
    }
}

fn parse_state_dir(args: &[String]) -> PathBuf {
    for i in 0..args.len() {
        if args[i] == "--state-dir" {
            if let Some(dir) = args.get(i + 1) {
                return PathBuf::from(dir);
            }
        }
    }
    if let Ok(dir) = std::env::var("GRIDD_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::state_dir()
        .map(|d| d.join("gridd"))
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state/gridd")))
        .unwrap_or_else(|| PathBuf::from(".local/state/gridd"))
}

fn setup_logging(log_path: &Path) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    if let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn acquire_lock(lock_path: &Path) -> std::io::Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| std::io::Error::other("another gridd instance is already running"))?;
    Ok(file)
}

fn write_pid_file(pid_path: &Path) -> std::io::Result<()> {
    fs::write(pid_path, format!("{}", std::process::id()))
}

fn cleanup(pid_path: &Path, socket_path: &Path) {
    let _ = fs::remove_file(pid_path);
    let _ = fs::remove_file(socket_path);
}
