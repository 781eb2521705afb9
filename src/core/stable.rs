//! Polls an eventually consistent listing until its size stops changing.

use crate::utils::error::{ReportError, Result};
use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct StablePollOptions {
    /// Number of consecutive attempts that must agree.
    pub chunk: usize,
    pub max_tries: usize,
    pub retry_pause: Duration,
    /// Allowed shortfall of each attempt against the largest size seen.
    pub tolerance: usize,
}

impl Default for StablePollOptions {
    fn default() -> Self {
        Self {
            chunk: 3,
            max_tries: 20,
            retry_pause: Duration::from_secs(5),
            tolerance: 0,
        }
    }
}

/// What the poller reports after every attempt.
#[derive(Debug)]
pub struct PollProgress<'a, T> {
    pub items: &'a [T],
    /// Zero once the list is stable.
    pub pause: Duration,
    pub duplicates: bool,
    pub message: String,
}

/// Calls `fetch` until the last `chunk` results are within `tolerance` of the
/// largest size observed, then returns the latest result.
pub async fn poll_until_stable<T, F, Fut, P>(
    fetch: F,
    on_progress: P,
    options: &StablePollOptions,
) -> Result<Vec<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    P: FnMut(&PollProgress<'_, T>),
{
    run::<T, (), F, Fut, P>(fetch, None, on_progress, options).await
}

/// Like [`poll_until_stable`], but an attempt whose items repeat a `unique_key`
/// value is reported as a duplicate and kept out of the stability window.
pub async fn poll_until_stable_unique<T, K, KF, F, Fut, P>(
    fetch: F,
    unique_key: KF,
    on_progress: P,
    options: &StablePollOptions,
) -> Result<Vec<T>>
where
    K: Eq + Hash,
    KF: Fn(&T) -> K + Sync,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    P: FnMut(&PollProgress<'_, T>),
{
    run(
        fetch,
        Some(&unique_key as &(dyn Fn(&T) -> K + Sync)),
        on_progress,
        options,
    )
    .await
}

async fn run<T, K, F, Fut, P>(
    mut fetch: F,
    unique_key: Option<&(dyn Fn(&T) -> K + Sync)>,
    mut on_progress: P,
    options: &StablePollOptions,
) -> Result<Vec<T>>
where
    K: Eq + Hash,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    P: FnMut(&PollProgress<'_, T>),
{
    let pause = options.retry_pause;
    let mut history: Vec<usize> = Vec::new();
    let mut max_len = 0;

    for _ in 0..options.max_tries {
        let items = fetch().await?;

        if let Some(key) = unique_key {
            let distinct: HashSet<K> = items.iter().map(key).collect();
            if distinct.len() < items.len() {
                on_progress(&PollProgress {
                    items: &items,
                    pause,
                    duplicates: true,
                    message: format!(
                        "got {}, duplicates found, waiting {:?} and retry...",
                        items.len(),
                        pause
                    ),
                });
                tokio::time::sleep(pause).await;
                continue;
            }
        }

        history.push(items.len());
        max_len = max_len.max(items.len());

        if is_stable(&history, max_len, options.chunk, options.tolerance) {
            on_progress(&PollProgress {
                items: &items,
                pause: Duration::ZERO,
                duplicates: false,
                message: format!("got {}, stable", items.len()),
            });
            return Ok(items);
        }

        on_progress(&PollProgress {
            items: &items,
            pause,
            duplicates: false,
            message: format!("got {}, waiting {:?} and retry...", items.len(), pause),
        });
        tokio::time::sleep(pause).await;
    }

    Err(ReportError::UnstableList {
        tries: options.max_tries,
    })
}

fn is_stable(history: &[usize], max_len: usize, chunk: usize, tolerance: usize) -> bool {
    history.len() >= chunk
        && history[history.len() - chunk..]
            .iter()
            .all(|len| max_len - len <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn options(chunk: usize, max_tries: usize, tolerance: usize) -> StablePollOptions {
        StablePollOptions {
            chunk,
            max_tries,
            retry_pause: Duration::ZERO,
            tolerance,
        }
    }

    /// Fetcher yielding lists of the given lengths, one per call.
    fn sized(lengths: Vec<usize>) -> (RefCell<usize>, Vec<Vec<usize>>) {
        let lists = lengths.into_iter().map(|n| (0..n).collect()).collect();
        (RefCell::new(0), lists)
    }

    #[tokio::test]
    async fn test_constant_lengths_stabilize_after_chunk_calls() {
        let (calls, lists) = sized(vec![5, 5, 5, 5]);
        let fetch = || {
            let i = *calls.borrow();
            *calls.borrow_mut() += 1;
            let list = lists[i].clone();
            async move { Ok(list) }
        };

        let result = poll_until_stable(fetch, |_| {}, &options(3, 10, 0))
            .await
            .unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn test_growth_resets_window() {
        let (calls, lists) = sized(vec![5, 6, 6, 6, 6]);
        let mut messages = Vec::new();
        let fetch = || {
            let i = *calls.borrow();
            *calls.borrow_mut() += 1;
            let list = lists[i].clone();
            async move { Ok(list) }
        };

        let result = poll_until_stable(
            fetch,
            |p| messages.push((p.items.len(), p.pause, p.message.clone())),
            &options(3, 10, 0),
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 6);
        assert_eq!(*calls.borrow(), 4);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].1, Duration::ZERO);
        assert_eq!(messages[3].2, "got 6, stable");
    }

    #[tokio::test]
    async fn test_tolerance_accepts_small_shortfall() {
        let (calls, lists) = sized(vec![6, 5, 6]);
        let fetch = || {
            let i = *calls.borrow();
            *calls.borrow_mut() += 1;
            let list = lists[i].clone();
            async move { Ok(list) }
        };

        let result = poll_until_stable(fetch, |_| {}, &options(3, 10, 1))
            .await
            .unwrap();

        assert_eq!(result.len(), 6);
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept_out_of_window() {
        let responses = vec![
            vec!["a", "b"],
            vec!["a", "a"],
            vec!["a", "b"],
            vec!["a", "b"],
        ];
        let calls = RefCell::new(0);
        let mut duplicate_reports = 0;
        let fetch = || {
            let i = *calls.borrow();
            *calls.borrow_mut() += 1;
            let list: Vec<String> = responses[i].iter().map(|s| s.to_string()).collect();
            async move { Ok(list) }
        };

        let result = poll_until_stable_unique(
            fetch,
            |item: &String| item.clone(),
            |p| {
                if p.duplicates {
                    duplicate_reports += 1;
                }
            },
            &options(3, 10, 0),
        )
        .await
        .unwrap();

        assert_eq!(result, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(*calls.borrow(), 4);
        assert_eq!(duplicate_reports, 1);
    }

    #[tokio::test]
    async fn test_exhausted_tries_fail() {
        let calls = RefCell::new(0usize);
        let fetch = || {
            *calls.borrow_mut() += 1;
            let n = *calls.borrow();
            async move { Ok((0..n).collect::<Vec<usize>>()) }
        };

        let result = poll_until_stable(fetch, |_| {}, &options(2, 4, 0)).await;

        assert!(matches!(result, Err(ReportError::UnstableList { tries: 4 })));
        assert_eq!(*calls.borrow(), 4);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let fetch = || async { Err::<Vec<u8>, _>(ReportError::protocol("boom")) };
        let result = poll_until_stable(fetch, |_| {}, &options(2, 4, 0)).await;
        assert!(matches!(result, Err(ReportError::ProtocolError { .. })));
    }
}
