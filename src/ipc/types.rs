use std::path::PathBuf;

use chrono::Duration;
use rusqlite::Connection;
use serde::Deserialize;

use crate::notify::NotificationBoard;
use crate::settings::{SettingsService, DEFAULT_TOAST_TIMEOUT_SECONDS};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub board: NotificationBoard,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            board: NotificationBoard::new(Duration::seconds(DEFAULT_TOAST_TIMEOUT_SECONDS)),
        }
    }

    /// Makes `conn` the open workspace. The board starts empty with the
    /// workspace's toast timeout.
    pub fn attach_workspace(&mut self, path: PathBuf, conn: Connection) {
        let timeout = SettingsService::new(&conn)
            .notifications()
            .map(|n| n.toast_timeout_seconds)
            .unwrap_or(DEFAULT_TOAST_TIMEOUT_SECONDS);
        self.board = NotificationBoard::new(Duration::seconds(timeout));
        self.workspace = Some(path);
        self.db = Some(conn);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
