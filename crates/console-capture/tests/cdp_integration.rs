//! End-to-end capture against a real Chrome.
//!
//! These tests require Chrome/Chromium to be installed and are marked #[ignore]
//! by default. Run with: cargo test --package console-capture -- --ignored

use console_capture::{
    CaptureConfig, CaptureRegistry, Category, CdpHost, CdpHostConfig, MemoryStore, Request,
    Response, Router, TabId,
};
use std::sync::Arc;
use std::time::Duration;

/// A page that keeps producing console traffic.
fn noisy_page(marker: &str) -> String {
    let html = format!(
        r#"
    <!DOCTYPE html>
    <html>
    <head><title>{marker}</title></head>
    <body>
        <script>
            setInterval(() => {{
                console.log("{marker} tick", {{ n: 1 }});
                console.warn("{marker} this API is deprecated");
            }}, 100);
            setTimeout(() => Promise.reject({{ code: 42 }}), 150);
        </script>
    </body>
    </html>
    "#
    );
    format!("data:text/html,{}", urlencoding::encode(&html))
}

struct Rig {
    host: Arc<CdpHost>,
    router: Router,
}

async fn rig() -> Rig {
    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let host = Arc::new(
        CdpHost::launch(CdpHostConfig::default(), tx)
            .await
            .expect("failed to launch browser"),
    );
    let registry = Arc::new(CaptureRegistry::new(
        CaptureConfig::default(),
        host.clone(),
        host.clone(),
        Arc::new(MemoryStore::new()),
    ));
    let router = Router::new(registry);
    tokio::spawn({
        let router = router.clone();
        async move { router.run(rx).await }
    });
    Rig { host, router }
}

async fn wait_for(router: &Router, tab: TabId, predicate: impl Fn(&str) -> bool) -> bool {
    for _ in 0..100 {
        if router
            .registry()
            .logs(tab)
            .iter()
            .any(|entry| predicate(&entry.message))
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
#[ignore] // Requires Chrome to be installed
async fn test_capture_classifies_live_console_traffic() {
    let rig = rig().await;
    let tab = rig.host.open_tab(&noisy_page("first")).await.expect("open tab");

    let response = rig
        .router
        .handle_request(Request::ToggleCapture { tab_id: tab })
        .await;
    assert_eq!(response, Response::Status { is_capturing: true });

    assert!(
        wait_for(&rig.router, tab, |m| m.contains("first this API is deprecated")).await,
        "no warning captured"
    );
    assert!(
        wait_for(&rig.router, tab, |m| m.contains("Unhandled Promise Rejection:")
            || m.contains("Uncaught"))
        .await,
        "no rejection captured"
    );

    let logs = rig.router.registry().logs(tab);
    assert!(logs
        .iter()
        .any(|e| e.category == Category::DeprecationWarning));

    rig.host.close().await.expect("failed to close browser");
}

#[tokio::test]
#[ignore]
async fn test_navigation_rearms_capture() {
    let rig = rig().await;
    let tab = rig.host.open_tab(&noisy_page("before")).await.expect("open tab");
    rig.router
        .handle_request(Request::ToggleCapture { tab_id: tab })
        .await;
    assert!(wait_for(&rig.router, tab, |m| m.contains("before tick")).await);

    rig.host
        .navigate(tab, &noisy_page("after"))
        .await
        .expect("navigate");

    assert!(
        wait_for(&rig.router, tab, |m| m.contains("after tick")).await,
        "capture did not survive navigation"
    );

    rig.host.close().await.expect("failed to close browser");
}

#[tokio::test]
#[ignore]
async fn test_stop_and_close_discard_state() {
    let rig = rig().await;
    let tab = rig.host.open_tab(&noisy_page("closing")).await.expect("open tab");
    rig.router
        .handle_request(Request::ToggleCapture { tab_id: tab })
        .await;
    assert!(wait_for(&rig.router, tab, |m| m.contains("closing tick")).await);

    let response = rig
        .router
        .handle_request(Request::ToggleCapture { tab_id: tab })
        .await;
    assert_eq!(response, Response::Status { is_capturing: false });
    assert!(rig.router.registry().logs(tab).is_empty());

    rig.host.close_tab(tab).await.expect("close tab");
    for _ in 0..50 {
        if !rig.router.registry().is_tracked(tab) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!rig.router.registry().is_tracked(tab));

    rig.host.close().await.expect("failed to close browser");
}
