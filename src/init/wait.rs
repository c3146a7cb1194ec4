// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::error;

pub type TaskResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Resolves when the first task finishes, with its result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<TaskResult>) -> TaskResult {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<TaskResult>,
    timeout: Duration,
) -> TaskResult {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Drains the set, keeping the last task error. Tasks still running at
/// `stop_at` are left behind and reported as a timeout.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut JoinSet<TaskResult>,
    stop_at: Instant,
) -> TaskResult {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(v)) => match v {
                Ok(Ok(())) => {}
                Ok(Err(e)) => result = Err(e),
                e => {
                    error!("Failed to join with task: {:?}", e)
                }
            },
        }
    }

    result
}
