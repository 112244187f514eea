/// Media player queries over the OS scripting bridge.
///
/// ```text
///   Player::facts() / state() / position() / duration()
///         │  builds one AppleScript statement per property
///         ▼
///   PlayerBridge::query(script) -> String      ("" on any failure)
///         │
///         └── OsaScriptBridge: `osascript -e <script>` with a bounded timeout
/// ```
///
/// The bridge never fails observably: spawn errors, non-zero exits and
/// timeouts are logged and turned into an empty answer, which the reconciler
/// reads as "nothing playing / field absent".
use async_trait::async_trait;
use presence_proto::protocol::PlaybackFacts;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// Player state string reported while audio is playing.
pub const PLAYING: &str = "playing";

#[async_trait]
pub trait PlayerBridge: Send + Sync {
    /// Run one scripting command and return its trimmed output, or `""`.
    async fn query(&self, command: &str) -> String;
}

// ── osascript ─────────────────────────────────────────────────────────────────

pub struct OsaScriptBridge {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl OsaScriptBridge {
    pub fn new(timeout: Duration) -> Self {
        let binary = presence_proto::platform::find_osascript_binary();
        if binary.is_none() {
            warn!("player: osascript not found, every query will come back empty");
        }
        Self { binary, timeout }
    }

    async fn run(&self, script: &str) -> Result<String, BridgeError> {
        let binary = self.binary.as_ref().ok_or(BridgeError::NotFound)?;

        let mut cmd = tokio::process::Command::new(binary);
        cmd.arg("-e")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| BridgeError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(BridgeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl PlayerBridge for OsaScriptBridge {
    async fn query(&self, command: &str) -> String {
        match self.run(command).await {
            Ok(out) => out,
            Err(e) => {
                warn!("player: query failed: {}", e);
                String::new()
            }
        }
    }
}

// ── typed queries ─────────────────────────────────────────────────────────────

pub struct Player {
    bridge: Arc<dyn PlayerBridge>,
    app: String,
}

impl Player {
    pub fn new(bridge: Arc<dyn PlayerBridge>, app: impl Into<String>) -> Self {
        Self {
            bridge,
            app: app.into(),
        }
    }

    /// Statement returning `expr`, guarded so a closed player is not launched.
    pub fn script(&self, expr: &str) -> String {
        format!(
            "if application \"{app}\" is running then tell application \"{app}\" to return {expr}",
            app = self.app,
            expr = expr
        )
    }

    async fn get(&self, expr: &str) -> String {
        let out = self.bridge.query(&self.script(expr)).await;
        debug!("player: {} -> {:?}", expr, out);
        out
    }

    /// `"playing"`, `"paused"`, `"stopped"`, or `""` when unknown.
    pub async fn state(&self) -> String {
        self.get("player state as string").await
    }

    pub async fn facts(&self) -> PlaybackFacts {
        PlaybackFacts {
            name: self.get("name of current track").await,
            artist: self.get("artist of current track").await,
            album: self.get("album of current track").await,
        }
    }

    /// Elapsed seconds into the current track.
    pub async fn position(&self) -> Option<f64> {
        parse_seconds(&self.get("player position").await)
    }

    /// Total length of the current track in seconds.
    pub async fn duration(&self) -> Option<f64> {
        parse_seconds(&self.get("duration of current track").await)
    }
}

/// Parse a seconds value as printed by AppleScript.  Decimal commas show up
/// under some locales.
pub fn parse_seconds(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBridge;
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("12.5"), Some(12.5));
        assert_eq!(parse_seconds(" 12,5\n"), Some(12.5));
        assert_eq!(parse_seconds("215"), Some(215.0));
        assert_eq!(parse_seconds(""), None);
        assert_eq!(parse_seconds("missing value"), None);
        assert_eq!(parse_seconds("-1"), None);
    }

    #[test]
    fn test_script_is_guarded() {
        let player = Player::new(Arc::new(ScriptedBridge::default()), "Music");
        assert_eq!(
            player.script("player position"),
            "if application \"Music\" is running then tell application \"Music\" to return player position"
        );
    }

    #[tokio::test]
    async fn test_facts_and_timeline() {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.set("player state as string", "playing");
        bridge.set_facts("Song A", "Artist X", "Album Y");
        bridge.set("player position", "42,25");
        bridge.set("duration of current track", "215.0");

        let player = Player::new(bridge.clone(), "Music");
        assert_eq!(player.state().await, PLAYING);
        assert_eq!(
            player.facts().await,
            PlaybackFacts::new("Song A", "Artist X", "Album Y")
        );
        assert_eq!(player.position().await, Some(42.25));
        assert_eq!(player.duration().await, Some(215.0));
        assert_eq!(bridge.query_count(), 6);
    }

    #[tokio::test]
    async fn test_missing_binary_reads_as_empty() {
        let bridge = OsaScriptBridge {
            binary: None,
            timeout: Duration::from_millis(50),
        };
        assert_eq!(bridge.query("anything").await, "");
    }

    #[cfg(unix)]
    fn fake_osascript(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("osascript");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stuck_query_times_out_empty() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_osascript(dir.path(), "sleep 30");
        std::env::set_var("OSASCRIPT_PATH", &script);

        let bridge = OsaScriptBridge::new(Duration::from_millis(200));
        assert_eq!(bridge.binary.as_deref(), Some(script.as_path()));

        let started = std::time::Instant::now();
        assert_eq!(bridge.query("player state as string").await, "");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            bridge.run("player state as string").await,
            Err(BridgeError::Timeout(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_and_output() {
        let dir = tempfile::tempdir().unwrap();

        let failing = OsaScriptBridge {
            binary: Some(fake_osascript(dir.path(), "echo boom >&2; exit 1")),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(failing.query("anything").await, "");

        let ok_dir = tempfile::tempdir().unwrap();
        let answering = OsaScriptBridge {
            binary: Some(fake_osascript(ok_dir.path(), "echo '  playing  '")),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(answering.query("player state as string").await, PLAYING);
    }
}
