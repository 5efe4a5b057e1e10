use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn pressroom_root(home: &Path) -> PathBuf {
    home.join(".pressroom")
}

pub fn socket_path(home: &Path) -> PathBuf {
    pressroom_root(home).join(DAEMON_SOCKET)
}
