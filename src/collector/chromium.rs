//! Headless Chromium renderer
//!
//! One browser per batch. Each render opens a page, navigates, reads the DOM
//! and closes the page. The open page is also kept in a slot on the renderer,
//! so a render cancelled by its deadline can have its tab closed by
//! [`Renderer::reclaim`] before the next render opens another.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use url::Url;

use super::render::{RenderError, Renderer};

const BROWSER_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-sync",
    "--no-first-run",
    "--ignore-certificate-errors",
];

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        tracing::debug!("Failed to close page: {}", e);
    }
}

async fn load(page: &Page, url: &Url) -> Result<String, RenderError> {
    page.goto(url.as_str()).await.map_err(classify)?;
    page.wait_for_navigation().await.map_err(classify)?;
    page.content().await.map_err(classify)
}

/// [`Renderer`] backed by a headless Chromium instance
pub struct ChromiumRenderer {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Page of the render in progress, if any
    in_flight: Mutex<Option<Page>>,
}

impl ChromiumRenderer {
    /// Launch a browser presenting `user_agent`.
    pub async fn launch(user_agent: &str) -> Result<Self, RenderError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .args(BROWSER_ARGS.iter().copied())
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::debug!("Launched headless browser");
        Ok(Self {
            browser,
            handler,
            in_flight: Mutex::new(None),
        })
    }

    fn track(&self, page: Page) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(page);
    }

    fn untrack(&self) -> Option<Page> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

fn classify(err: chromiumoxide::error::CdpError) -> RenderError {
    let message = err.to_string();
    if message.contains("net::") || message.to_ascii_lowercase().contains("websocket") {
        RenderError::Network(message)
    } else {
        RenderError::Page(message)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn render(&self, url: &Url, _html: &str) -> Result<String, RenderError> {
        let page = self.browser.new_page("about:blank").await.map_err(classify)?;
        self.track(page.clone());

        let result = load(&page, url).await;

        if let Some(page) = self.untrack() {
            close_page(page).await;
        }
        result
    }

    async fn reclaim(&self) {
        if let Some(page) = self.untrack() {
            tracing::debug!("Closing page left open by a cancelled render");
            close_page(page).await;
        }
    }

    async fn shutdown(&mut self) {
        if let Some(page) = self.untrack() {
            close_page(page).await;
        }
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
    }
}
