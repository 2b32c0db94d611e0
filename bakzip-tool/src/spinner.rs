use std::io::Write;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Frames the spinner cycles through. The leading blank frame gives the
/// rotation a short pause each turn.
pub const FRAMES: [&str; 9] = ["", "|", "|", "/", "/", "-", "-", "\\", "\\"];

/// Written over the start of the progress line once an entry is stored.
pub const DONE_MARKER: &str = "Done:";

enum Command {
    Start(String),
    Stop {
        done: bool,
        ack: oneshot::Sender<()>,
    },
}

/// Cyclic position in [`FRAMES`].
#[derive(Debug, Default)]
struct Frames {
    index: usize,
}

impl Frames {
    fn next(&mut self) -> &'static str {
        self.index = (self.index + 1) % FRAMES.len();
        FRAMES[self.index]
    }
}

/// A single background ticker shared by the whole run.
///
/// The driver calls [`Spinner::start`] before writing an entry and
/// [`Spinner::stop`] after; `stop` returns only once the completion line has
/// been printed, so output for consecutive entries never interleaves.
pub struct Spinner {
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

impl Spinner {
    /// Spinner on stdout. `None` disables the animation but keeps the
    /// progress and completion lines.
    pub fn stdout(interval: Option<Duration>) -> Self {
        Self::with_writer(std::io::stdout(), interval)
    }

    /// Must be called from within a tokio runtime.
    pub fn with_writer<W>(out: W, interval: Option<Duration>) -> Self
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_ticker(rx, out, interval));
        Self { tx, handle }
    }

    pub async fn start(&self, label: impl Into<String>) {
        if self.tx.send(Command::Start(label.into())).await.is_err() {
            tracing::warn!("spinner task is gone, progress output stops");
        }
    }

    /// Stops the animation and prints the completion marker.
    pub async fn stop(&self) {
        self.halt(true).await
    }

    /// Stops the animation after a failed write; the line is ended without
    /// the completion marker.
    pub async fn fail(&self) {
        self.halt(false).await
    }

    async fn halt(&self, done: bool) {
        let (ack, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Stop { done, ack }).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Closes the channel and waits for the ticker to exit.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::warn!("spinner task ended abnormally: {e}");
        }
    }
}

async fn run_ticker<W: Write>(
    mut rx: mpsc::Receiver<Command>,
    mut out: W,
    interval: Option<Duration>,
) {
    let animate = interval.is_some();
    let mut ticker = tokio::time::interval(interval.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut frames = Frames::default();
    let mut active = false;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Start(label)) => {
                    frames = Frames::default();
                    active = true;
                    ticker.reset();
                    let _ = write!(out, "       {label}\r");
                    let _ = out.flush();
                }
                Some(Command::Stop { done, ack }) => {
                    if active {
                        let _ = if done {
                            writeln!(out, "{DONE_MARKER}")
                        } else {
                            writeln!(out)
                        };
                        let _ = out.flush();
                    }
                    active = false;
                    let _ = ack.send(());
                }
                None => break,
            },
            _ = ticker.tick(), if active && animate => {
                let _ = write!(out, " {}\r", frames.next());
                let _ = out.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn frames_cycle_after_the_blank_frame() {
        let mut frames = Frames::default();
        let seen: Vec<_> = (0..10).map(|_| frames.next()).collect();
        assert_eq!(seen, vec!["|", "|", "/", "/", "-", "-", "\\", "\\", "", "|"]);
    }

    #[tokio::test]
    async fn stop_waits_for_the_done_line() {
        let buf = SharedBuf::default();
        let spinner = Spinner::with_writer(buf.clone(), Some(Duration::from_millis(1)));

        spinner.start("Adding proj/a.txt").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        spinner.stop().await;

        let text = buf.text();
        assert!(text.starts_with("       Adding proj/a.txt\r"));
        assert!(text.contains(" |\r"));
        assert!(text.ends_with("Done:\n"));

        spinner.shutdown().await;
    }

    #[tokio::test]
    async fn entries_are_reported_in_order() {
        let buf = SharedBuf::default();
        let spinner = Spinner::with_writer(buf.clone(), None);

        for name in ["one", "two"] {
            spinner.start(name).await;
            spinner.stop().await;
        }
        spinner.shutdown().await;

        assert_eq!(buf.text(), "       one\rDone:\n       two\rDone:\n");
    }

    #[tokio::test]
    async fn failed_entry_ends_line_without_marker() {
        let buf = SharedBuf::default();
        let spinner = Spinner::with_writer(buf.clone(), None);
        spinner.start("Adding proj/locked").await;
        spinner.fail().await;
        spinner.shutdown().await;
        assert_eq!(buf.text(), "       Adding proj/locked\r\n");
    }

    #[tokio::test]
    async fn stop_without_start_prints_nothing() {
        let buf = SharedBuf::default();
        let spinner = Spinner::with_writer(buf.clone(), Some(Duration::from_millis(1)));
        spinner.stop().await;
        spinner.shutdown().await;
        assert_eq!(buf.text(), "");
    }
}
