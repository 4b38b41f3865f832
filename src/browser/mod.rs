//! Browser session management on top of the Chrome DevTools Protocol.

mod frame;

pub use frame::{wait_for_app_frame, ContextTracker, FrameContext, TrackedContext};

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A launched browser plus its CDP message pump.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chrome with a persistent profile.
    ///
    /// This is the one unrecoverable setup step: without a browser there is
    /// no run.
    pub async fn launch(profile_dir: &Path, headless: bool) -> Result<Self> {
        let chrome_path = find_chrome().context(
            "Chrome/Chromium not found. Install Chrome or Chromium to run purchase flows.",
        )?;

        std::fs::create_dir_all(profile_dir)
            .with_context(|| format!("Failed to create profile dir: {}", profile_dir.display()))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .user_data_dir(profile_dir)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-site-isolation-trials")
            .arg("--disable-features=BlockThirdPartyCookies,ThirdPartyStoragePartitioning,PrivacySandboxAdsAPIs")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser.new_page(url).await.context("Failed to open page")
    }

    /// Unconditional teardown; safe however far the run got.
    pub async fn close(self) {
        drop(self.browser);
        self.handler_task.abort();
    }
}

/// Forward the page's console output and uncaught errors to tracing.
pub async fn attach_console_logging(page: &Page) -> Result<()> {
    let mut console = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .context("Failed to listen for console events")?;
    tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let text = event
                .args
                .iter()
                .filter_map(|arg| arg.value.as_ref())
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            debug!(kind = ?event.r#type, "[console] {text}");
        }
    });

    let mut exceptions = page
        .event_listener::<EventExceptionThrown>()
        .await
        .context("Failed to listen for page errors")?;
    tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            warn!("[pageerror] {}", event.exception_details.text);
        }
    });

    Ok(())
}

/// Find a Chrome/Chromium executable.
fn find_chrome() -> Option<String> {
    if let Ok(path) = std::env::var("GEMFLOW_CHROME") {
        if !path.is_empty() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // NixOS
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    for candidate in candidates {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
    }
    None
}
