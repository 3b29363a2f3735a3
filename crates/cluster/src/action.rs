//! Asynchronous action tracking.
//!
//! The provider answers mutations with a fire-and-forget action record.
//! [`ActionTracker`] polls that record until it reaches a terminal state
//! and publishes what it observes as a single event stream: any number of
//! `Progress` events terminated by exactly one `Completed` or `Failed`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::debug;

use kubeforge_cloud::{ActionState, CloudApi, CloudApiError};

/// Interval between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum wall-clock time to wait for a single action.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

/// One event observed while tracking an action.
#[derive(Debug)]
pub enum ActionEvent {
    /// Progress percentage in 0..=100, published as observed.
    Progress(u8),
    /// The action reached terminal success.
    Completed,
    /// The action failed, the deadline passed, or polling broke down.
    Failed(CloudApiError),
}

/// Polls a provider action until it reaches a terminal state.
pub struct ActionTracker {
    api: Arc<dyn CloudApi>,
    poll_interval: Duration,
    deadline: Duration,
}

impl ActionTracker {
    /// Create a tracker with default timing.
    #[must_use]
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self::with_timing(api, DEFAULT_POLL_INTERVAL, DEFAULT_DEADLINE)
    }

    /// Create a tracker with explicit poll interval and deadline.
    #[must_use]
    pub fn with_timing(api: Arc<dyn CloudApi>, poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            api,
            poll_interval,
            deadline,
        }
    }

    /// Start tracking an action.
    ///
    /// The polling loop runs as its own task; events arrive on the
    /// returned channel, terminated by exactly one `Completed` or
    /// `Failed`. Identical progress values are not deduplicated — that
    /// is the consumer's concern.
    pub fn track(&self, action_id: i64) -> mpsc::Receiver<ActionEvent> {
        let (tx, rx) = mpsc::channel(16);
        let api = Arc::clone(&self.api);
        let poll_interval = self.poll_interval;
        let deadline = self.deadline;

        tokio::spawn(async move {
            let started = Instant::now();

            loop {
                let action = match api.action_status(action_id).await {
                    Ok(action) => action,
                    Err(err) => {
                        // A polling transport error terminates tracking.
                        let _ = tx.send(ActionEvent::Failed(err)).await;
                        return;
                    }
                };

                debug!(
                    action_id,
                    status = %action.status,
                    progress = action.progress,
                    "Polled action status"
                );

                match action.status {
                    ActionState::Success => {
                        let _ = tx.send(ActionEvent::Progress(100)).await;
                        let _ = tx.send(ActionEvent::Completed).await;
                        return;
                    }
                    ActionState::Error => {
                        let (code, message) = action.error.map_or_else(
                            || ("unknown".to_string(), format!("action {action_id} failed")),
                            |e| (e.code, e.message),
                        );
                        let _ = tx
                            .send(ActionEvent::Failed(CloudApiError::ActionFailed {
                                code,
                                message,
                            }))
                            .await;
                        return;
                    }
                    ActionState::Running | ActionState::Unknown => {
                        // A dropped receiver ends tracking.
                        if tx.send(ActionEvent::Progress(action.progress)).await.is_err() {
                            return;
                        }
                    }
                }

                if started.elapsed() >= deadline {
                    let _ = tx
                        .send(ActionEvent::Failed(CloudApiError::Timeout(
                            deadline.as_secs(),
                        )))
                        .await;
                    return;
                }

                sleep(poll_interval).await;
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use kubeforge_cloud::{
        Action, ActionError, Server, ServerCreateOpts, ServerCreateResult, SshKey,
    };

    use super::*;

    /// CloudApi fake that replays a scripted sequence of action states.
    struct ScriptedApi {
        statuses: Mutex<VecDeque<Result<Action, CloudApiError>>>,
    }

    impl ScriptedApi {
        fn new(statuses: Vec<Result<Action, CloudApiError>>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
            })
        }
    }

    #[async_trait]
    impl CloudApi for ScriptedApi {
        async fn ssh_key_by_name(&self, name: &str) -> Result<SshKey, CloudApiError> {
            Err(CloudApiError::NotFound(name.to_string()))
        }

        async fn server_by_name(&self, _name: &str) -> Result<Option<Server>, CloudApiError> {
            Ok(None)
        }

        async fn create_server(
            &self,
            opts: ServerCreateOpts,
        ) -> Result<ServerCreateResult, CloudApiError> {
            Err(CloudApiError::Conflict(opts.name))
        }

        async fn action_status(&self, _id: i64) -> Result<Action, CloudApiError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CloudApiError::NotFound("no more statuses".to_string())))
        }
    }

    fn running(progress: u8) -> Result<Action, CloudApiError> {
        Ok(Action {
            id: 1,
            command: "create_server".to_string(),
            status: ActionState::Running,
            progress,
            error: None,
        })
    }

    fn success() -> Result<Action, CloudApiError> {
        Ok(Action {
            id: 1,
            command: "create_server".to_string(),
            status: ActionState::Success,
            progress: 100,
            error: None,
        })
    }

    fn failed(code: &str) -> Result<Action, CloudApiError> {
        Ok(Action {
            id: 1,
            command: "create_server".to_string(),
            status: ActionState::Error,
            progress: 80,
            error: Some(ActionError {
                code: code.to_string(),
                message: "boom".to_string(),
            }),
        })
    }

    fn fast_tracker(api: Arc<dyn CloudApi>) -> ActionTracker {
        ActionTracker::with_timing(api, Duration::from_millis(1), Duration::from_secs(5))
    }

    async fn drain(mut rx: mpsc::Receiver<ActionEvent>) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_progress_then_completed() {
        let api = ScriptedApi::new(vec![running(20), running(60), success()]);
        let events = drain(fast_tracker(api).track(1)).await;

        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ActionEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![20, 60, 100]);
        assert!(matches!(events.last(), Some(ActionEvent::Completed)));
    }

    #[tokio::test]
    async fn test_provider_failure_terminates_with_action_failed() {
        let api = ScriptedApi::new(vec![running(10), failed("server_limit_exceeded")]);
        let events = drain(fast_tracker(api).track(1)).await;

        match events.last() {
            Some(ActionEvent::Failed(CloudApiError::ActionFailed { code, .. })) => {
                assert_eq!(code, "server_limit_exceeded");
            }
            other => panic!("expected ActionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_terminates_tracking() {
        let api = ScriptedApi::new(vec![
            running(10),
            Err(CloudApiError::Api {
                status: 500,
                message: "internal".to_string(),
            }),
        ]);
        let events = drain(fast_tracker(api).track(1)).await;

        assert!(matches!(
            events.last(),
            Some(ActionEvent::Failed(CloudApiError::Api { status: 500, .. }))
        ));
    }

    #[tokio::test]
    async fn test_deadline_yields_timeout() {
        let api = ScriptedApi::new(vec![running(10), running(10), running(10)]);
        let tracker =
            ActionTracker::with_timing(api, Duration::from_millis(1), Duration::from_millis(0));
        let events = drain(tracker.track(1)).await;

        assert!(matches!(
            events.last(),
            Some(ActionEvent::Failed(CloudApiError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event() {
        let api = ScriptedApi::new(vec![success()]);
        let events = drain(fast_tracker(api).track(1)).await;

        let terminals = events
            .iter()
            .filter(|e| matches!(e, ActionEvent::Completed | ActionEvent::Failed(_)))
            .count();
        assert_eq!(terminals, 1);
    }
}
