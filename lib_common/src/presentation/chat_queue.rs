//! # Chat Queue
//!
//! Single-consumer pacing loop for chat lines. Enqueueing onto an idle queue
//! starts the loop; the loop renders one item, sleeps for the pacing delay and
//! exits once the queue is empty.
//!
//! The visible surface keeps the most recent `chat_retention` lines; rendering
//! a new one evicts the oldest. Follow and share notices bypass the pacing but
//! count toward the same retention.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DisplayLine, LineKind, PresentationItem, PresentationTimings, Surface};
use crate::events::Event;

struct ChatState {
    pending: VecDeque<PresentationItem>,
    running: bool,
    visible: VecDeque<u64>,
}

struct ChatShared {
    state: Mutex<ChatState>,
    next_id: AtomicU64,
    surface: Arc<dyn Surface>,
    timings: PresentationTimings,
}

impl ChatShared {
    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shows the line and records it as visible under one lock, so the
    /// retention order is the order lines reached the surface.
    fn render(&self, item: PresentationItem) {
        let Some(line) = self.to_line(item.payload) else {
            return;
        };
        let mut state = self.lock();
        self.surface.show_line(&line);
        state.visible.push_back(line.id);
        let excess = state.visible.len().saturating_sub(self.timings.chat_retention);
        for id in state.visible.drain(..excess) {
            self.surface.remove_line(id);
        }
    }

    fn to_line(&self, event: Event) -> Option<DisplayLine> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (kind, user, text) = match event {
            Event::Chat { user, text, role } => (LineKind::Chat { role }, user, text),
            Event::Follow { user } => (LineKind::Follow, user, String::new()),
            Event::Share { user } => (LineKind::Share, user, String::new()),
            Event::Gift { .. } => {
                log::warn!("Gift routed to the chat queue; dropping it");
                return None;
            }
        };
        Some(DisplayLine { id, kind, user, text })
    }
}

/// # Chat Queue
#[derive(Clone)]
pub struct ChatQueue {
    shared: Arc<ChatShared>,
}

impl ChatQueue {
    /// Creates an idle queue rendering onto `surface`.
    pub fn new(surface: Arc<dyn Surface>, timings: PresentationTimings) -> Self {
        Self {
            shared: Arc::new(ChatShared {
                state: Mutex::new(ChatState {
                    pending: VecDeque::new(),
                    running: false,
                    visible: VecDeque::new(),
                }),
                next_id: AtomicU64::new(0),
                surface,
                timings,
            }),
        }
    }

    /// Queues a chat line, starting the pacing loop if it is idle.
    pub fn enqueue(&self, item: PresentationItem) {
        let start = {
            let mut state = self.shared.lock();
            state.pending.push_back(item);
            !std::mem::replace(&mut state.running, true)
        };
        if start {
            tokio::spawn(run(Arc::clone(&self.shared)));
        }
    }

    /// Renders a line right away, outside the pacing loop.
    pub fn show_immediate(&self, item: PresentationItem) {
        self.shared.render(item);
    }

    /// Lines waiting to be rendered.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether the pacing loop is active.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Ids of the lines currently kept on the surface, oldest first.
    pub fn visible(&self) -> Vec<u64> {
        self.shared.lock().visible.iter().copied().collect()
    }
}

async fn run(shared: Arc<ChatShared>) {
    loop {
        let item = {
            let mut state = shared.lock();
            match state.pending.pop_front() {
                Some(item) => item,
                None => {
                    state.running = false;
                    break;
                }
            }
        };
        log::trace!(
            "Rendering chat line queued {}ms ago",
            item.enqueued_at.elapsed().as_millis()
        );
        shared.render(item);
        tokio::time::sleep(shared.timings.chat_pacing).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Role;
    use crate::presentation::testing::{Call, RecordingSurface};
    use std::time::Duration;

    fn chat(user: &str) -> PresentationItem {
        PresentationItem::new(Event::Chat {
            user: user.into(),
            text: "hello".into(),
            role: Role::User,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_lines_are_paced() {
        let surface = Arc::new(RecordingSurface::new());
        let queue = ChatQueue::new(surface.clone(), PresentationTimings::default());
        for user in ["a", "b", "c"] {
            queue.enqueue(chat(user));
        }
        assert!(queue.is_running());
        assert_eq!(queue.pending(), 3);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let times: Vec<u64> = surface
            .calls()
            .into_iter()
            .filter(|(_, call)| matches!(call, Call::ShowLine(_)))
            .map(|(at, _)| at)
            .collect();
        assert_eq!(times, vec![0, 300, 600]);
        assert!(!queue.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_evicts_oldest() {
        let surface = Arc::new(RecordingSurface::new());
        let queue = ChatQueue::new(surface.clone(), PresentationTimings::default());
        for user in ["a", "b", "c", "d", "e", "f"] {
            queue.enqueue(chat(user));
        }
        tokio::time::sleep(Duration::from_millis(3000)).await;

        assert_eq!(surface.visible_users(), vec!["c", "d", "e", "f"]);
        assert_eq!(queue.visible().len(), 4);
        let removed = surface
            .calls()
            .iter()
            .filter(|(_, call)| matches!(call, Call::RemoveLine(_)))
            .count();
        assert_eq!(removed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_restarts_after_draining() {
        let surface = Arc::new(RecordingSurface::new());
        let queue = ChatQueue::new(surface.clone(), PresentationTimings::default());
        queue.enqueue(chat("a"));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!queue.is_running());

        queue.enqueue(chat("b"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(surface.visible_users(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_lines_share_retention() {
        let surface = Arc::new(RecordingSurface::new());
        let queue = ChatQueue::new(surface.clone(), PresentationTimings::default());
        for user in ["f1", "f2", "f3", "f4", "f5"] {
            queue.show_immediate(PresentationItem::new(Event::Follow { user: user.into() }));
        }
        assert_eq!(surface.visible_users(), vec!["f2", "f3", "f4", "f5"]);
        assert!(!queue.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renders_keep_retention_in_display_order() {
        let surface = Arc::new(RecordingSurface::new());
        let timings = PresentationTimings {
            chat_pacing: Duration::from_millis(1),
            ..PresentationTimings::default()
        };
        let queue = ChatQueue::new(surface.clone(), timings);

        let mut workers = Vec::new();
        for worker in 0..4 {
            let queue = queue.clone();
            workers.push(tokio::spawn(async move {
                for i in 0..50 {
                    let user = format!("w{}-{}", worker, i);
                    if worker % 2 == 0 {
                        queue.enqueue(chat(&user));
                    } else {
                        queue.show_immediate(PresentationItem::new(Event::Follow { user }));
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for worker in workers {
            worker.await.unwrap();
        }
        while queue.is_running() || queue.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let shown: Vec<u64> = surface
            .calls()
            .into_iter()
            .filter_map(|(_, call)| match call {
                Call::ShowLine(line) => Some(line.id),
                _ => None,
            })
            .collect();
        assert_eq!(shown.len(), 200);
        assert_eq!(queue.visible(), shown[shown.len() - 4..].to_vec());

        // Every eviction removes the oldest line still on screen.
        let mut on_screen: VecDeque<u64> = VecDeque::new();
        for (_, call) in surface.calls() {
            match call {
                Call::ShowLine(line) => on_screen.push_back(line.id),
                Call::RemoveLine(id) => assert_eq!(on_screen.pop_front(), Some(id)),
                _ => {}
            }
        }
        assert_eq!(on_screen.len(), 4);
    }
}
