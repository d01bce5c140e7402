use crossbeam_channel::{unbounded, Receiver, Sender};

/// Host-side sink for user-visible, non-fatal status messages.
pub trait StatusReporter: Send + Sync {
    fn report_status(&self, message: &str);
}

/// Forwards status messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusReporter for LogStatus {
    fn report_status(&self, message: &str) {
        log::warn!("{}", message);
    }
}

/// Queues status messages for a host thread to drain.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    tx: Sender<String>,
}

impl ChannelStatus {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl StatusReporter for ChannelStatus {
    fn report_status(&self, message: &str) {
        // Host may have stopped listening; status is fire-and-forget.
        let _ = self.tx.send(message.to_string());
    }
}
