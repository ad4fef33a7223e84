// ── Station notices ──
//
// Short-lived toasts on a broadcast channel and the confirmation
// banner on a watch channel. Both expire on their own timers; the
// station's shutdown token stops every pending timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

pub const TOAST_LIFETIME: Duration = Duration::from_millis(2500);
pub const BANNER_SECONDS: u32 = 10;
const NOTICE_CHANNEL_SIZE: usize = 64;

/// What the UI shell should show or hide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Toast { id: u64, text: String, is_error: bool },
    ToastExpired { id: u64 },
}

/// Confirmation banner counting down to dismissal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub text: String,
    pub seconds_remaining: u32,
}

pub(crate) struct Notifier {
    notices: broadcast::Sender<Notice>,
    banner: watch::Sender<Option<Banner>>,
    banner_timer: Mutex<Option<CancellationToken>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Notifier {
    pub(crate) fn new(shutdown: CancellationToken) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        let (banner, _) = watch::channel(None);
        Self {
            notices,
            banner,
            banner_timer: Mutex::new(None),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub(crate) fn banner(&self) -> watch::Receiver<Option<Banner>> {
        self.banner.subscribe()
    }

    /// Publish a toast and schedule its expiry. Returns the toast id.
    pub(crate) fn toast(&self, text: impl Into<String>, is_error: bool) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine: nobody is looking.
        let _ = self.notices.send(Notice::Toast {
            id,
            text: text.into(),
            is_error,
        });

        let notices = self.notices.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(TOAST_LIFETIME) => {
                    let _ = notices.send(Notice::ToastExpired { id });
                }
            }
        });
        id
    }

    /// Show the banner for [`BANNER_SECONDS`], replacing any banner
    /// already counting down.
    pub(crate) fn show_banner(&self, text: impl Into<String>) {
        let timer = self.shutdown.child_token();
        let previous = self
            .banner_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        self.banner.send_replace(Some(Banner {
            text: text.into(),
            seconds_remaining: BANNER_SECONDS,
        }));

        let banner = self.banner.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            tick.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = timer.cancelled() => break,
                    _ = tick.tick() => {
                        let mut done = false;
                        banner.send_modify(|current| {
                            if let Some(shown) = current {
                                shown.seconds_remaining = shown.seconds_remaining.saturating_sub(1);
                                if shown.seconds_remaining == 0 {
                                    *current = None;
                                }
                            }
                            done = current.is_none();
                        });
                        if done {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub(crate) fn dismiss_banner(&self) {
        if let Some(timer) = self
            .banner_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.cancel();
        }
        self.banner.send_replace(None);
    }
}
