use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cancellable repeating task that paces position sampling.
///
/// A background thread sends one tick per `interval`; the owner drains them with
/// [`Ticker::take_due`]. Cancelling (explicitly or by dropping) wakes and joins the
/// thread immediately, so a stopped engine never leaves a timer behind.
pub struct Ticker {
    cancel_tx: Option<Sender<()>>,
    rx: Receiver<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(interval: Duration) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();
        let (tx, rx) = std::sync::mpsc::channel();
        let interval = interval.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name("position-ticker".to_string())
            .spawn(move || loop {
                match cancel_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tx.send(Instant::now()).is_err() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            cancel_tx: Some(cancel_tx),
            rx,
            handle: Some(handle),
        })
    }

    /// Consume every pending tick; `true` if at least one fired.
    pub fn take_due(&self) -> bool {
        let mut due = false;
        loop {
            match self.rx.try_recv() {
                Ok(_) => due = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return due,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn cancel(&mut self) {
        // disconnecting the cancel channel wakes the thread right away
        drop(self.cancel_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Position ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}
