use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::sources::Track;

/// Cola FIFO de un guild.
///
/// Los comandos empujan sin bloquear y el bucle de reproducción espera en
/// `pop` hasta que haya algo. No tiene límite de tamaño.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: Mutex<VecDeque<Track>>,
    available: Notify,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final; devuelve su posición (desde 1)
    pub fn push(&self, track: Track) -> usize {
        let position = {
            let mut items = self.items.lock();
            info!("➕ Agregado a la cola: {}", track.title());
            items.push_back(track);
            items.len()
        };
        self.available.notify_one();
        position
    }

    /// Espera y saca el siguiente track (FIFO)
    pub async fn pop(&self) -> Track {
        loop {
            let notified = self.available.notified();
            if let Some(track) = self.items.lock().pop_front() {
                debug!("➡️ Siguiente en cola (FIFO): {}", track.title());
                return track;
            }
            notified.await;
        }
    }

    /// Vacía la cola; devuelve cuántos tracks se descartaron
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        if count > 0 {
            info!("🗑️ Cola limpiada ({} canciones)", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copia de los tracks pendientes en orden
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.items.lock().iter().cloned().collect(),
        }
    }
}

/// Vista inmutable de la cola en un instante
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    tracks: Vec<Track>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Líneas "N. título (duración)"; cada llamada empieza de nuevo
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| track.queue_line(index + 1))
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.tracks.iter().map(Track::duration_seconds).sum())
    }

    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.tracks.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;

        QueuePage {
            lines: self.lines().skip(start).take(items_per_page).collect(),
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub lines: Vec<String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_requester;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn track(title: &str, seconds: u64) -> Track {
        Track::new(format!("https://youtu.be/{title}"), title, "YouTube", test_requester())
            .unwrap()
            .with_duration(seconds)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MusicQueue::new();
        assert_eq!(queue.push(track("a", 1)), 1);
        assert_eq!(queue.push(track("b", 1)), 2);
        queue.push(track("c", 1));

        assert_eq!(queue.pop().await.title(), "a");
        assert_eq!(queue.pop().await.title(), "b");
        assert_eq!(queue.pop().await.title(), "c");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(MusicQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });

        tokio::task::yield_now().await;
        queue.push(track("late", 5));

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.title(), "late");
    }

    #[test]
    fn test_clear_and_snapshot() {
        let queue = MusicQueue::new();
        queue.push(track("a", 60));
        queue.push(track("b", 0));

        let snapshot = queue.snapshot();
        let lines: Vec<String> = snapshot.lines().collect();
        assert_eq!(lines, vec!["1. a (0:01:00)", "2. b (En vivo)"]);
        // Reiniciable
        assert_eq!(snapshot.lines().count(), 2);
        assert_eq!(snapshot.total_duration(), Duration::from_secs(60));

        assert_eq!(queue.clear(), 2);
        assert!(queue.snapshot().is_empty());
        // El snapshot anterior no cambia
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_pagination() {
        let queue = MusicQueue::new();
        for i in 0..23 {
            queue.push(track(&format!("t{i}"), 10));
        }
        let snapshot = queue.snapshot();

        let page = snapshot.get_page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.lines.len(), 3);
        assert_eq!(page.lines[0], "21. t20 (0:00:10)");

        let clamped = snapshot.get_page(99, 10);
        assert_eq!(clamped.current_page, 3);

        let empty = QueueSnapshot::default().get_page(1, 10);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.lines.is_empty());
    }
}
