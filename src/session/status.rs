//! One wait message and one error message, as shown to the user.

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub wait: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<Status>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> Status {
        self.inner.lock().clone()
    }

    /// True while a wait message is shown; actions are refused meanwhile.
    pub fn is_busy(&self) -> bool {
        self.inner.lock().wait.is_some()
    }

    /// Claim the board for one action. `None` if another action holds it.
    ///
    /// Clears the previous error; the wait message is removed when the guard drops.
    pub fn begin(&self, message: &str) -> Option<WaitGuard<'_>> {
        let mut status = self.inner.lock();
        if status.wait.is_some() {
            return None;
        }
        status.wait = Some(message.to_string());
        status.error = None;
        Some(WaitGuard { board: self })
    }

    pub fn set_wait(&self, message: &str) {
        self.inner.lock().wait = Some(message.to_string());
    }

    pub fn set_error(&self, message: &str) {
        self.inner.lock().error = Some(format!("Error: {}", message));
    }

    pub fn clear_error(&self) {
        self.inner.lock().error = None;
    }
}

#[derive(Debug)]
pub struct WaitGuard<'a> {
    board: &'a StatusBoard,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.board.inner.lock().wait = None;
    }
}
