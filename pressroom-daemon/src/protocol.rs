use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn connect(home: &Path) -> Result<(UnixStream, PathBuf), DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;
    Ok((stream, socket))
}

fn write_request(
    stream: &mut UnixStream,
    socket: &Path,
    request: &DaemonRequest,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;
    Ok(())
}

fn read_response(
    reader: &mut BufReader<UnixStream>,
    socket: &Path,
) -> Result<DaemonResponse, DaemonError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let (mut stream, socket) = connect(home)?;
    write_request(&mut stream, &socket, request)?;
    let mut reader = BufReader::new(stream);
    read_response(&mut reader, &socket)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

pub fn request_track(
    home: &Path,
    sha: &str,
    action: &str,
    item_id: Option<&str>,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        sha: Some(sha.to_string()),
        action: Some(action.to_string()),
        item_id: item_id.map(str::to_string),
        ..DaemonRequest::new("track")
    };
    response_into_data(send_request(home, &request)?)
}

pub fn request_history(home: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, &DaemonRequest::new("history"))?)
}

/// Set one setting in the running daemon; with no key, reload the file.
pub fn request_configure(
    home: &Path,
    key_value: Option<(&str, &str)>,
) -> Result<Value, DaemonError> {
    let request = DaemonRequest {
        key: key_value.map(|(k, _)| k.to_string()),
        value: key_value.map(|(_, v)| v.to_string()),
        ..DaemonRequest::new("configure")
    };
    response_into_data(send_request(home, &request)?)
}

/// Subscribe to the event stream. `on_event` returns `false` to stop.
pub fn watch(home: &Path, mut on_event: impl FnMut(Value) -> bool) -> Result<(), DaemonError> {
    let (mut stream, socket) = connect(home)?;
    write_request(&mut stream, &socket, &DaemonRequest::new("watch"))?;
    let mut reader = BufReader::new(stream);
    response_into_data(read_response(&mut reader, &socket)?)?;

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(|e| io_err(&socket, e))?;
        if read == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let event: Value = serde_json::from_str(line.trim_end())?;
        if !on_event(event) {
            return Ok(());
        }
    }
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
