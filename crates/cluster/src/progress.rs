//! Progress rendering for tracked actions.

use std::io::{stdout, IsTerminal};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::action::ActionEvent;
use crate::provision::ProvisionError;

/// Renders an action's progress and blocks until its terminal event.
///
/// On an interactive stdout a progress bar is drawn and updated per
/// event; otherwise the stream is drained silently. Either way the
/// reporter returns only once the tracker has terminated, with exactly
/// one outcome.
pub struct ProgressReporter {
    interactive: bool,
}

impl ProgressReporter {
    /// Reporter that renders when stdout is a terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interactive: stdout().is_terminal(),
        }
    }

    /// Reporter that never renders. Used by tests and batch callers.
    #[must_use]
    pub fn silent() -> Self {
        Self { interactive: false }
    }

    /// Consume events until the terminal one arrives.
    ///
    /// # Errors
    /// Returns the tracker's failure, or
    /// [`ProvisionError::ActionStreamClosed`] if the stream ends without
    /// a terminal event.
    pub async fn report(
        &self,
        mut events: mpsc::Receiver<ActionEvent>,
    ) -> Result<(), ProvisionError> {
        let bar = if self.interactive {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {percent:>3}%")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            Some(bar)
        } else {
            None
        };

        while let Some(event) = events.recv().await {
            match event {
                ActionEvent::Progress(p) => {
                    if let Some(bar) = &bar {
                        bar.set_position(u64::from(p));
                    }
                }
                ActionEvent::Completed => {
                    if let Some(bar) = &bar {
                        bar.set_position(100);
                        bar.finish();
                    }
                    return Ok(());
                }
                ActionEvent::Failed(err) => {
                    if let Some(bar) = &bar {
                        bar.abandon();
                    }
                    return Err(err.into());
                }
            }
        }

        Err(ProvisionError::ActionStreamClosed)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use kubeforge_cloud::CloudApiError;

    use super::*;

    #[tokio::test]
    async fn test_returns_ok_on_completed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ActionEvent::Progress(50)).await.unwrap();
        tx.send(ActionEvent::Completed).await.unwrap();
        drop(tx);

        assert!(ProgressReporter::silent().report(rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_returns_failure_on_failed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ActionEvent::Failed(CloudApiError::Timeout(600)))
            .await
            .unwrap();
        drop(tx);

        let err = ProgressReporter::silent().report(rx).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Cloud(CloudApiError::Timeout(600))
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_without_terminal_is_an_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ActionEvent::Progress(30)).await.unwrap();
        drop(tx);

        let err = ProgressReporter::silent().report(rx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::ActionStreamClosed));
    }
}
