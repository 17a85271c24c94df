use std::collections::VecDeque;

use bridge_runtime::{BuildItem, Point2D, QueuedBuild};
use tracing::trace;

use crate::domain::ProductionManager;

/// In-memory build order.
///
/// `schedule` walks the queue front to back. An entry whose prerequisites are
/// unmet blocks everything behind it unless it is skippable, in which case it
/// stays queued and the walk moves on.
#[derive(Debug, Default)]
pub struct BuildQueue {
    entries: VecDeque<QueuedBuild>,
}

impl BuildQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: QueuedBuild) {
        self.entries.push_back(entry);
    }

    /// Remove and return the next entry that can start now.
    pub fn schedule<F>(&mut self, prerequisites_met: F) -> Option<QueuedBuild>
    where
        F: Fn(&BuildItem) -> bool,
    {
        let mut ready = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if prerequisites_met(&entry.item) {
                ready = Some(index);
                break;
            }
            if !entry.skippable {
                trace!(target: "bridge::production", item = ?entry.item, "build.blocked");
                break;
            }
        }
        ready.and_then(|index| self.entries.remove(index))
    }
}

impl ProductionManager for BuildQueue {
    fn clear_build_order(&mut self) {
        self.entries.clear();
    }

    fn queue_unit(
        &mut self,
        unit_type: u32,
        position: Option<Point2D>,
        spacing: u32,
        skippable: bool,
    ) {
        self.push(QueuedBuild {
            item: BuildItem::Unit {
                unit_type,
                position,
                spacing,
            },
            skippable,
        });
    }

    fn queue_tech(&mut self, upgrade_id: u32, skippable: bool) {
        self.push(QueuedBuild {
            item: BuildItem::Tech { upgrade_id },
            skippable,
        });
    }

    fn build_order(&self) -> Vec<QueuedBuild> {
        self.entries.iter().cloned().collect()
    }
}
