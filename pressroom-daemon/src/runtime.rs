use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use pressroom_core::{settings, CommitSha, Settings};

use crate::error::{io_err, join_err, DaemonError};
use crate::events::TrackerEvent;
use crate::paths::{pressroom_root, socket_path};
use crate::presenter::Presenter;
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::service::DeploymentService;
use crate::tracker::TrackOutcome;

/// Everything a socket client handler needs.
#[derive(Clone)]
struct Shared {
    home: PathBuf,
    service: DeploymentService,
    presenter: Presenter,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon with the HTTP CI client configured in `~/.pressroom`.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let service = DeploymentService::open(&home)?;
    run_with(home, service).await
}

/// Run the daemon around an existing service.
pub async fn run_with(home: PathBuf, service: DeploymentService) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let banner_settings = service.settings().await.banner;
    let presenter = Presenter::new(service.event_sender(), banner_settings);

    // Subscribe before recovery so adopted runs reach the banner.
    let presenter_handle = {
        let shutdown = shutdown_tx.clone();
        let presenter = presenter.clone();
        let events_rx = service.subscribe();
        tokio::spawn(async move {
            let result = presenter.run(events_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let adopted = service.start().await;
    tracing::info!(home = %home.display(), adopted, "pressroom daemon started");

    let socket_handle = {
        let shared = Shared {
            home: home.clone(),
            service: service.clone(),
            presenter: presenter.clone(),
            shutdown_tx: shutdown_tx.clone(),
            started_at_unix: unix_seconds_now(),
        };
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(shared, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!(
                            "ctrl-c handler failed: {err}"
                        ))),
                    }
                }
            }
        })
    };

    let (presenter_result, socket_result, signal_result) =
        tokio::join!(presenter_handle, socket_handle, signal_handle);

    service.stop().await;
    tracing::info!("pressroom daemon stopped");

    handle_join("presenter", presenter_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    shared: Shared,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, shared).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, shared: Shared) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&shared).await),
            "track" => {
                let sha = CommitSha::from(request.sha.clone().unwrap_or_default());
                let action = request.action.clone().unwrap_or_default();
                let outcome = shared
                    .service
                    .track(sha, action, request.item_id.clone())
                    .await;
                DaemonResponse::ok(track_payload(outcome))
            }
            "history" => match shared.service.history().await {
                Ok(view) => {
                    let active = shared.service.active().await;
                    DaemonResponse::ok(json!({ "history": view, "active": active }))
                }
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "configure" => {
                let key = request.key.as_deref();
                match configure(&shared, key, request.value.as_deref()).await {
                    Ok(settings) => {
                        DaemonResponse::ok(json!({ "applied": true, "settings": redact(settings) }))
                    }
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "watch" => {
                let events_rx = shared.service.subscribe();
                write_response(&mut writer, &DaemonResponse::ok(json!({ "watching": true })))
                    .await?;
                stream_events(&mut writer, events_rx, shared.shutdown_tx.subscribe()).await?;
                break;
            }
            "stop" => {
                let _ = shared.shutdown_tx.send(());
                write_response(&mut writer, &DaemonResponse::ok(json!({ "stopping": true })))
                    .await?;
                break;
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn build_status_payload(shared: &Shared) -> Value {
    let snapshot = shared.service.snapshot().await;
    let active: Vec<_> = snapshot.active.iter().map(|a| a.record.clone()).collect();
    let banner = shared.presenter.banner(&active).await;

    json!({
        "running": true,
        "started_at_unix": shared.started_at_unix,
        "socket": socket_path(&shared.home).display().to_string(),
        "banner": banner,
        "active": snapshot.active,
        "status_poller_running": snapshot.status_poller_running,
        "history_poller_running": snapshot.history_poller_running,
        "remote": snapshot.remote,
        "settings": snapshot.settings,
    })
}

fn track_payload(outcome: TrackOutcome) -> Value {
    match outcome {
        TrackOutcome::Tracked(id) => json!({ "tracked": true, "id": id }),
        TrackOutcome::AlreadyActive(id) => {
            json!({ "tracked": false, "id": id, "reason": "already_active" })
        }
        TrackOutcome::Ignored => json!({ "tracked": false, "reason": "empty_sha" }),
    }
}

fn redact(mut settings: Settings) -> Settings {
    if settings.remote.token.is_some() {
        settings.remote.token = Some("********".to_string());
    }
    settings
}

/// Persist and apply a settings change; with no key, reload from disk.
async fn configure(
    shared: &Shared,
    key: Option<&str>,
    value: Option<&str>,
) -> Result<Settings, DaemonError> {
    let home = shared.home.clone();
    let next = match key {
        Some(key) => {
            let mut next = shared.service.settings().await;
            next.set_field(key, value.unwrap_or_default())?;
            let to_save = next.clone();
            tokio::task::spawn_blocking(move || settings::save_at(&home, &to_save))
                .await
                .map_err(|err| join_err("settings save", err))??;
            next
        }
        None => tokio::task::spawn_blocking(move || settings::load_at(&home))
            .await
            .map_err(|err| join_err("settings load", err))??,
    };
    shared.service.reconfigure(next.clone()).await?;
    shared.presenter.set_banner_settings(next.banner).await;
    Ok(next)
}

async fn stream_events(
    writer: &mut OwnedWriteHalf,
    mut events_rx: broadcast::Receiver<TrackerEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => match event {
                Ok(event) => {
                    if write_json_line(writer, &event).await.is_err() {
                        tracing::debug!("watch client disconnected");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch client lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = pressroom_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_json_line<T: serde::Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(value)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    write_json_line(writer, response).await
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(join_err(task, err)),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PRESSROOM_LOG_FORMAT").is_ok_and(|v| v == "json");
    let _ = if json {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
