//! Drag-and-drop as two ordered containers plus a `move_piece` command.
//!
//! Any front end (pointer drag, keyboard reordering, a test harness) drives
//! the same board. Every real mutation yields exactly one `TextChanged`.

use std::collections::{HashMap, HashSet};

use tracing::error;

use crate::domain::{Container, Piece, PieceId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("unknown piece {0}")]
    UnknownPiece(PieceId),
}

/// Notification emitted after a mutation so previews can resync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChanged {
    pub revision: u64,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct PieceBoard {
    pieces: HashMap<PieceId, Piece>,
    bucket: Vec<PieceId>,
    solution: Vec<PieceId>,
    revision: u64,
}

impl PieceBoard {
    /// All pieces start in the bucket, in pool order.
    pub fn new(pool: Vec<Piece>) -> Self {
        let bucket = pool.iter().map(|p| p.id).collect();
        let pieces = pool.into_iter().map(|p| (p.id, p)).collect();
        Self { pieces, bucket, solution: Vec::new(), revision: 0 }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bucket(&self) -> impl Iterator<Item = &Piece> {
        self.bucket.iter().filter_map(|id| self.pieces.get(id))
    }

    pub fn solution(&self) -> impl Iterator<Item = &Piece> {
        self.solution.iter().filter_map(|id| self.pieces.get(id))
    }

    pub fn container_of(&self, id: PieceId) -> Option<Container> {
        if self.solution.contains(&id) {
            Some(Container::Solution)
        } else if self.bucket.contains(&id) {
            Some(Container::Bucket)
        } else {
            None
        }
    }

    /// Solution pieces in order, joined by single spaces.
    pub fn assembled_text(&self) -> String {
        self.solution().map(|p| p.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    pub fn move_piece(&mut self, id: PieceId, target: Container) -> Result<Option<TextChanged>, PlacementError> {
        if !self.pieces.contains_key(&id) {
            return Err(PlacementError::UnknownPiece(id));
        }
        if self.container_of(id) == Some(target) {
            return Ok(None);
        }

        self.bucket.retain(|p| *p != id);
        self.solution.retain(|p| *p != id);
        match target {
            Container::Bucket => self.bucket.push(id),
            Container::Solution => self.solution.push(id),
        }

        self.revision += 1;
        Ok(Some(TextChanged { revision: self.revision, text: self.assembled_text() }))
    }

    /// Every pool id must sit in exactly one container. Debug builds stop
    /// here; release builds drop duplicates and return strays to the bucket.
    pub fn audit_and_heal(&mut self) -> bool {
        let mut seen = HashSet::with_capacity(self.pieces.len());
        let before = self.bucket.len() + self.solution.len();
        self.solution.retain(|id| seen.insert(*id));
        self.bucket.retain(|id| seen.insert(*id));
        self.solution.retain(|id| self.pieces.contains_key(id));
        self.bucket.retain(|id| self.pieces.contains_key(id));

        let mut missing: Vec<PieceId> = self.pieces.keys().filter(|id| !seen.contains(id)).copied().collect();
        missing.sort_unstable();
        let healthy = missing.is_empty() && before == self.bucket.len() + self.solution.len();

        if !healthy {
            error!(target: "playground", missing = ?missing, "Piece containers out of sync; healing");
            debug_assert!(healthy, "piece container invariant violated");
            self.bucket.extend(missing);
            self.revision += 1;
        }
        healthy
    }

    #[cfg(test)]
    fn corrupt_for_test(&mut self, id: PieceId) {
        self.bucket.retain(|p| *p != id);
        self.solution.retain(|p| *p != id);
    }
}
