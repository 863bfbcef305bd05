//! The Cleanup Scheduler: an accumulated-sum linked list of pending
//! teardowns, ticked once a second. Preserves the original's delta
//! representation on purpose (a pairing heap would lose the coalescing
//! behavior scenario E depends on) even though a `BinaryHeap` would be the
//! more obvious Rust reach for a priority queue.

use lazy_static::lazy_static;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

struct Node {
    app_ids: Vec<String>,
    remaining_time: i64,
    next: Option<Box<Node>>,
}

struct CleanupQueue {
    head: Option<Box<Node>>,
}

impl CleanupQueue {
    const fn new() -> Self {
        CleanupQueue { head: None }
    }

    /// Walks the list with a cursor, decrementing the insertion candidate's
    /// remaining time by each traversed node's delta, splicing a new node in
    /// front of the first successor whose delta would overshoot it, or
    /// coalescing onto a node whose delta brings the candidate to exactly
    /// zero. Mirrors `accumulated_sum_linked_list.py`'s `insert`.
    fn insert(&mut self, app_id: String, remaining_time: i64) {
        let head = match self.head.take() {
            None => {
                self.head = Some(Box::new(Node {
                    app_ids: vec![app_id],
                    remaining_time,
                    next: None,
                }));
                return;
            }
            Some(head) => head,
        };

        if head.remaining_time > remaining_time {
            let mut new_head = Box::new(Node {
                app_ids: vec![app_id],
                remaining_time,
                next: None,
            });
            let mut old_head = head;
            old_head.remaining_time -= remaining_time;
            new_head.next = Some(old_head);
            self.head = Some(new_head);
            return;
        }

        self.head = Some(head);
        let mut remaining = remaining_time;
        let mut cursor: &mut Option<Box<Node>> = &mut self.head;

        loop {
            let current = cursor.as_mut().expect("cursor always points at a live node");
            remaining -= current.remaining_time;

            if remaining == 0 {
                current.app_ids.push(app_id);
                return;
            }

            match current.next {
                None => {
                    current.next = Some(Box::new(Node {
                        app_ids: vec![app_id],
                        remaining_time: remaining,
                        next: None,
                    }));
                    return;
                }
                Some(ref mut next) if next.remaining_time > remaining => {
                    let mut spliced = Box::new(Node {
                        app_ids: vec![app_id],
                        remaining_time: remaining,
                        next: None,
                    });
                    next.remaining_time -= remaining;
                    spliced.next = current.next.take();
                    current.next = Some(spliced);
                    return;
                }
                Some(_) => {
                    cursor = &mut current.next;
                }
            }
        }
    }

    /// Pops and returns the head's id list when its `remaining_time` has
    /// reached or passed zero, reparenting the new head's `remaining_time`
    /// unchanged (it is already a delta relative to the popped node).
    fn pop_if_due(&mut self) -> Option<Vec<String>> {
        let due = matches!(&self.head, Some(head) if head.remaining_time <= 0);
        if !due {
            return None;
        }
        let head = self.head.take().expect("checked Some above");
        self.head = head.next;
        Some(head.app_ids)
    }

    fn tick(&mut self) {
        if let Some(head) = self.head.as_mut() {
            head.remaining_time -= 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

lazy_static! {
    static ref QUEUE: Mutex<CleanupQueue> = Mutex::new(CleanupQueue::new());
    static ref TICKING: AtomicBool = AtomicBool::new(false);
}

/// Schedules `app_id` for teardown `seconds` from now. Lazily (re)starts the
/// tick task if it had gone idle; a compare-and-swap keeps concurrent callers
/// from spawning the loop twice.
pub async fn insert(app_id: String, seconds: i64) {
    {
        let mut queue = QUEUE.lock().await;
        queue.insert(app_id, seconds);
    }
    if TICKING.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
        tokio::spawn(tick_loop());
    }
}

async fn tick_loop() {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let due = {
            let mut queue = QUEUE.lock().await;
            queue.tick();
            let due = queue.pop_if_due();
            if due.is_none() && queue.is_empty() {
                TICKING.store(false, Ordering::SeqCst);
                debug!("cleanup queue drained, tick loop exiting");
                return;
            }
            due
        };
        if let Some(app_ids) = due {
            for app_id in app_ids {
                info!("cleanup fired for {}", app_id);
                crate::registry::delete_job_resources(&app_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(queue: &CleanupQueue) -> Vec<(Vec<String>, i64)> {
        let mut out = Vec::new();
        let mut cursor = &queue.head;
        while let Some(node) = cursor {
            out.push((node.app_ids.clone(), node.remaining_time));
            cursor = &node.next;
        }
        out
    }

    #[test]
    fn single_insert_becomes_head() {
        let mut queue = CleanupQueue::new();
        queue.insert("j1".to_string(), 10);
        assert_eq!(ids(&queue), vec![(vec!["j1".to_string()], 10)]);
    }

    #[test]
    fn smaller_deadline_becomes_new_head() {
        let mut queue = CleanupQueue::new();
        queue.insert("j1".to_string(), 10);
        queue.insert("j2".to_string(), 5);
        assert_eq!(
            ids(&queue),
            vec![(vec!["j2".to_string()], 5), (vec!["j1".to_string()], 5)]
        );
    }

    #[test]
    fn equal_deadline_coalesces() {
        let mut queue = CleanupQueue::new();
        queue.insert("j1".to_string(), 10);
        queue.insert("j2".to_string(), 10);
        assert_eq!(ids(&queue), vec![(vec!["j1".to_string(), "j2".to_string()], 10)]);
    }

    #[test]
    fn scenario_e_from_spec() {
        // (j1, 10s), (j2, 10s), (j3, 15s), (j4, 5s), (j5, 100s)
        let mut queue = CleanupQueue::new();
        queue.insert("j1".to_string(), 10);
        queue.insert("j2".to_string(), 10);
        queue.insert("j3".to_string(), 15);
        queue.insert("j4".to_string(), 5);
        queue.insert("j5".to_string(), 100);

        assert_eq!(
            ids(&queue),
            vec![
                (vec!["j4".to_string()], 5),
                (vec!["j1".to_string(), "j2".to_string()], 5),
                (vec!["j3".to_string()], 5),
                (vec!["j5".to_string()], 85),
            ]
        );

        // Drive the tick logic directly (bypassing the 1s sleep) to check the
        // firing schedule matches the scenario's narrative.
        for _ in 0..5 {
            queue.tick();
        }
        let fired = queue.pop_if_due();
        assert_eq!(fired, Some(vec!["j4".to_string()]));

        for _ in 0..5 {
            queue.tick();
        }
        let fired = queue.pop_if_due();
        assert_eq!(fired, Some(vec!["j1".to_string(), "j2".to_string()]));

        for _ in 0..5 {
            queue.tick();
        }
        let fired = queue.pop_if_due();
        assert_eq!(fired, Some(vec!["j3".to_string()]));

        for _ in 0..85 {
            queue.tick();
        }
        let fired = queue.pop_if_due();
        assert_eq!(fired, Some(vec!["j5".to_string()]));
        assert!(queue.is_empty());
    }
}
