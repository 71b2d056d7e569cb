//! Capture command implementation.
//!
//! Launches Chrome, turns capture on for a freshly opened tab and streams
//! every new entry until the duration elapses or Ctrl-C, then exports the
//! tab's buffer.

use crate::cli::CaptureArgs;
use crate::error::{CliError, Result};
use crate::output::{self, CategoryCounts};
use crate::ui;
use console_capture::{
    CaptureConfig, CaptureRegistry, CdpHost, CdpHostConfig, LogEntry, NotificationKind, Router,
    StartOutcome, TabId,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Backlog of host events waiting for the router.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How often the buffer is checked for new entries.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Execute the capture command.
///
/// # Steps
///
/// 1. Load configuration and open the log store
/// 2. Launch Chrome and open the page
/// 3. Start capture, then reload so load-time output is caught
/// 4. Stream new entries until the deadline or Ctrl-C
/// 5. Export the (filtered) buffer and print per-category counts
///
/// # Errors
///
/// Returns errors for invalid configuration, launch failures and pages on
/// which capture is refused.
pub async fn execute(args: CaptureArgs, config_path: Option<&Path>, color: bool) -> Result<()> {
    let config = CaptureConfig::load(config_path)?;
    let store = config.store.open()?;

    let mut host_config = CdpHostConfig::new();
    if args.visible {
        host_config = host_config.visible();
    }
    if let Some(chrome) = &args.chrome {
        host_config = host_config.with_chrome_path(chrome.display().to_string());
    }

    ui::info("Launching browser...");
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let host = Arc::new(CdpHost::launch(host_config, tx).await?);

    let registry = CaptureRegistry::new(config, host.clone(), host.clone(), store);
    let router = Router::new(Arc::new(registry));
    let dispatcher = tokio::spawn({
        let router = router.clone();
        async move { router.run(rx).await }
    });

    let session = Session {
        host: &host,
        router: &router,
        color,
        json: args.json,
    };
    let captured = session.run(&args).await;

    dispatcher.abort();
    if let Err(err) = host.close().await {
        warn!("failed to close browser: {}", err);
    }

    let logs = captured?;
    export(&logs, &args)
}

struct Session<'a> {
    host: &'a Arc<CdpHost>,
    router: &'a Router,
    color: bool,
    json: bool,
}

impl Session<'_> {
    /// Captures until the deadline and returns the tab's buffer.
    async fn run(&self, args: &CaptureArgs) -> Result<Vec<LogEntry>> {
        let tab = self.host.open_tab(&args.url).await?;
        let mut notifications = self.router.registry().subscribe();

        match self.router.start_capture(tab).await? {
            StartOutcome::Started | StartOutcome::AlreadyAttached { .. } => {}
            outcome => debug!(%tab, ?outcome, "start did not attach"),
        }
        ui::success(&format!("Capturing {}", args.url));

        // Output produced while the page first loaded was missed.
        self.host.navigate(tab, &args.url).await?;

        let mut printed = 0;
        self.stream(tab, args.duration, &mut notifications, &mut printed)
            .await;
        self.print_new(tab, &mut printed);

        let logs = self.router.registry().logs(tab);
        if let Err(err) = self.router.stop_capture(tab).await {
            warn!(%tab, "failed to stop capture: {}", err);
        }
        Ok(logs)
    }

    async fn stream(
        &self,
        tab: TabId,
        duration: Option<u64>,
        notifications: &mut broadcast::Receiver<console_capture::Notification>,
        printed: &mut usize,
    ) {
        let deadline = async {
            match duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!("failed to listen for Ctrl-C: {}", err);
                    }
                    eprintln!();
                    break;
                }
                _ = poll.tick() => self.print_new(tab, printed),
                received = notifications.recv() => match received {
                    Ok(notification) if notification.tab == tab => match notification.kind {
                        NotificationKind::Info => ui::info(&notification.message),
                        NotificationKind::Warning => ui::warning(&notification.message),
                        NotificationKind::Error => ui::error(&notification.message),
                        NotificationKind::LogsCleared => *printed = 0,
                    },
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "notification backlog overflowed");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Prints entries appended since the last call.
    fn print_new(&self, tab: TabId, printed: &mut usize) {
        let logs = self.router.registry().logs(tab);
        if logs.len() < *printed {
            *printed = 0;
        }
        for entry in &logs[*printed..] {
            if self.json {
                match serde_json::to_string(entry) {
                    Ok(line) => eprintln!("{line}"),
                    Err(err) => warn!("failed to encode entry: {}", err),
                }
            } else {
                eprintln!("{}", output::format_entry(entry, self.color));
            }
        }
        *printed = logs.len();
    }
}

fn export(logs: &[LogEntry], args: &CaptureArgs) -> Result<()> {
    let groups = output::export(logs, &args.categories);
    let json = serde_json::to_string_pretty(&groups)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n")).map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
            let exported: usize = groups.values().map(Vec::len).sum();
            ui::success(&format!(
                "Exported {} entries to {}",
                exported,
                path.display()
            ));
        }
        None => println!("{json}"),
    }

    for (name, entries) in &groups {
        if entries.is_empty() {
            ui::warning(&format!("No {name} captured"));
        }
    }
    ui::print_counts(&CategoryCounts::tally(logs));
    Ok(())
}
