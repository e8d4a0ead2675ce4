use std::sync::Mutex;
use std::time::Duration;

use crate::backend::model::Notification;
use crate::listener::NotificationHandler;
use crate::utils::lock;

/// Handler recording every notification it is given.
pub struct Recorder {
    seen: Mutex<Vec<Notification>>,
    redraw_on: fn(&Notification) -> bool,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::redraw_on(|_| false)
    }
}

impl Recorder {
    pub fn redraw_on(redraw_on: fn(&Notification) -> bool) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            redraw_on,
        }
    }

    pub fn seen(&self) -> Vec<Notification> {
        lock(&self.seen).clone()
    }
}

impl NotificationHandler for Recorder {
    fn on_notification(&self, notification: &Notification) -> bool {
        lock(&self.seen).push(notification.clone());
        (self.redraw_on)(notification)
    }
}

pub fn block_attached(height: u32) -> Notification {
    Notification::BlockAttached {
        wallet_id: 1,
        height,
    }
}

/// Poll `condition` until it holds, giving the spawned tasks time to run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
