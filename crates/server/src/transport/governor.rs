use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Fixed-window rate limiter: at most `limit` permits per `window`.
///
/// Callers over the limit wait for the next window instead of being rejected.
#[derive(Debug)]
pub struct RateGovernor {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

#[derive(Debug)]
struct WindowState {
    started: Instant,
    used: u32,
}

impl RateGovernor {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Wait until a permit is available in the current or a later window.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.started);
                if elapsed >= self.window {
                    state.started = now;
                    state.used = 0;
                }
                if state.used < self.limit {
                    state.used += 1;
                    return;
                }
                self.window.saturating_sub(elapsed)
            };
            tracing::trace!(
                name = "transport.governor.waiting",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                wait_ms = wait.as_millis() as u64,
                message = "Rate limit reached, waiting for next window"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
