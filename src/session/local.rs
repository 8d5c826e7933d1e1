//! Local browser launch provider.
//!
//! Spawns a local browser process with its devtools server on a fixed port,
//! then dials the debugger endpoint until it accepts or the timeout runs
//! out. Endpoint discovery beyond the port (non-default debugger paths) is
//! the caller's concern via [`LocalSessionProvider::with_debugger_path`].

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};

use super::cdp::{CdpContext, CdpPage, CdpSession};
use super::provider::{
    BrowserHandle, ConnectOptions, ProtocolSession, SessionHandles, SessionProvider,
};

// ============================================================================
// Constants
// ============================================================================

/// Default devtools port for launched browsers.
const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Default debugger endpoint path.
const DEFAULT_DEBUGGER_PATH: &str = "/devtools/browser";

/// Delay between dial attempts while the browser starts up.
const DIAL_RETRY_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// LocalSessionProvider
// ============================================================================

/// Launches a local browser process and attaches to its devtools server.
///
/// # Example
///
/// ```ignore
/// let provider = LocalSessionProvider::new("/usr/bin/chromium")
///     .with_port(9223)
///     .with_arg("--headless=new");
/// ```
#[derive(Debug, Clone)]
pub struct LocalSessionProvider {
    /// Path to the browser binary executable.
    binary: PathBuf,
    /// Devtools port to launch with.
    port: u16,
    /// Debugger endpoint path.
    debugger_path: String,
    /// Additional command-line arguments.
    extra_args: Vec<String>,
}

impl LocalSessionProvider {
    /// Creates a provider for the given browser binary.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            port: DEFAULT_DEBUG_PORT,
            debugger_path: DEFAULT_DEBUGGER_PATH.to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Sets the devtools port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the debugger endpoint path.
    #[inline]
    #[must_use]
    pub fn with_debugger_path(mut self, path: impl Into<String>) -> Self {
        self.debugger_path = path.into();
        self
    }

    /// Adds a custom command-line argument.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Returns the launch arguments for the given profile directory.
    #[must_use]
    fn launch_args(&self, profile_dir: &std::path::Path) -> Vec<String> {
        let mut args = Vec::with_capacity(3 + self.extra_args.len());
        args.push(format!("--remote-debugging-port={}", self.port));
        args.push(format!("--user-data-dir={}", profile_dir.display()));
        args.push("--no-first-run".to_string());
        args.extend(self.extra_args.clone());
        args
    }

    /// Returns the debugger endpoint URL.
    fn debugger_endpoint(&self) -> Result<Url> {
        let raw = format!("ws://127.0.0.1:{}{}", self.port, self.debugger_path);
        Url::parse(&raw).map_err(|e| Error::config(format!("Invalid debugger endpoint {raw}: {e}")))
    }

    /// Spawns the browser process.
    fn spawn_browser(&self, profile_dir: &std::path::Path) -> Result<Child> {
        if !self.binary.exists() {
            return Err(Error::config(format!(
                "Browser binary not found at: {}",
                self.binary.display()
            )));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.launch_args(profile_dir));

        // Suppress stdio
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        cmd.spawn().map_err(Error::process_launch_failed)
    }

    /// Dials the debugger endpoint, retrying until the deadline.
    async fn dial(&self, endpoint: &Url, deadline: Duration) -> Result<CdpSession> {
        let started = Instant::now();

        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::connection_timeout(deadline.as_millis() as u64));
            }

            match CdpSession::connect(endpoint, remaining).await {
                Ok(session) => return Ok(session),
                Err(e) if started.elapsed() < deadline => {
                    debug!(error = %e, "Debugger not accepting yet, retrying");
                    sleep(DIAL_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
    async fn connect(&self, options: &ConnectOptions) -> Result<SessionHandles> {
        let profile = TempDir::new()
            .map_err(|e| Error::session(format!("Profile directory creation failed: {e}")))?;

        let mut child = self.spawn_browser(profile.path())?;
        let pid = child.id();
        info!(pid, port = self.port, "Browser process spawned");

        let endpoint = self.debugger_endpoint()?;
        let session = match self.dial(&endpoint, options.connection_timeout).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                // Failed acquisition must not leak the process
                let _ = child.kill().await;
                return Err(Error::session(format!(
                    "Local session acquisition failed: {e}"
                )));
            }
        };

        Ok(SessionHandles {
            session_id: None,
            browser: Arc::new(LocalBrowser {
                child: Mutex::new(Some(child)),
                profile: Mutex::new(Some(profile)),
                session: Arc::clone(&session),
            }),
            context: Arc::new(CdpContext::new()),
            page: Arc::new(CdpPage::new(Arc::clone(&session))),
            protocol: session,
        })
    }
}

// ============================================================================
// LocalBrowser
// ============================================================================

/// Browser handle owning the launched process and its profile directory.
struct LocalBrowser {
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
    session: Arc<CdpSession>,
}

#[async_trait]
impl BrowserHandle for LocalBrowser {
    async fn close(&self) -> Result<()> {
        if self.session.is_open()
            && let Err(e) = self.session.send("Browser.close", serde_json::json!({})).await
        {
            warn!(error = %e, "Browser.close command failed, killing process");
        }

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.kill().await;
            debug!("Browser process terminated");
        }

        // Dropping the TempDir removes the profile directory.
        drop(self.profile.lock().take());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
