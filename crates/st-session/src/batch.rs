// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Validated per-batch session graphs and the trait that produces them.

use st_tensor::Tensor;

use crate::error::{SessionError, SessionResult};

/// One session converted to graph form.
///
/// `items` holds the unique item ids padded with `0` to the batch-wide node
/// count `L`; `adjacency` is `(L, 2L)` with the normalised incoming half first;
/// `alias[t]` points session position `t` at its row in `items`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSample {
    pub items: Vec<usize>,
    pub adjacency: Tensor,
    pub alias: Vec<usize>,
    pub mask: Vec<u8>,
    /// 1-indexed target item id.
    pub target: usize,
}

impl SessionSample {
    /// Count of real (unmasked) positions.
    pub fn length(&self) -> usize {
        self.mask.iter().filter(|&&m| m == 1).count()
    }

    /// Mask as attention weights.
    pub fn mask_weights(&self) -> Vec<f32> {
        self.mask.iter().map(|&m| f32::from(m)).collect()
    }
}

/// Batch of sessions that share node count `L` and sequence length.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBatch {
    sessions: Vec<SessionSample>,
    nodes: usize,
    seq_len: usize,
}

impl SessionBatch {
    /// Validates shapes, alias ranges, masks and targets.
    pub fn new(sessions: Vec<SessionSample>) -> SessionResult<Self> {
        let first = sessions.first().ok_or(SessionError::EmptyDataset)?;
        let nodes = first.items.len();
        let seq_len = first.alias.len();
        if nodes == 0 || seq_len == 0 {
            return Err(SessionError::BatchShape {
                index: 0,
                what: "items x alias",
                expected: (1, 1),
                got: (nodes, seq_len),
            });
        }
        for (index, session) in sessions.iter().enumerate() {
            validate_session(index, session, nodes, seq_len)?;
        }
        Ok(Self {
            sessions,
            nodes,
            seq_len,
        })
    }

    pub fn sessions(&self) -> &[SessionSample] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Node count `L` shared by every session.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// 1-indexed targets in batch order.
    pub fn targets(&self) -> Vec<usize> {
        self.sessions.iter().map(|s| s.target).collect()
    }

    /// Checks ids and targets against a catalogue of `n_node` ids.
    pub fn check_catalogue(&self, n_node: usize) -> SessionResult<()> {
        for (index, session) in self.sessions.iter().enumerate() {
            if let Some(&item) = session.items.iter().find(|&&item| item >= n_node) {
                return Err(SessionError::ItemOutOfRange {
                    index,
                    item,
                    n_node,
                });
            }
            if session.target >= n_node {
                return Err(SessionError::TargetOutOfRange {
                    index,
                    target: session.target,
                    n_node,
                });
            }
        }
        Ok(())
    }
}

fn validate_session(
    index: usize,
    session: &SessionSample,
    nodes: usize,
    seq_len: usize,
) -> SessionResult<()> {
    let shape_error = |what, expected, got| SessionError::BatchShape {
        index,
        what,
        expected,
        got,
    };
    if session.items.len() != nodes {
        return Err(shape_error("items", (1, nodes), (1, session.items.len())));
    }
    if session.adjacency.shape() != (nodes, 2 * nodes) {
        return Err(shape_error(
            "adjacency",
            (nodes, 2 * nodes),
            session.adjacency.shape(),
        ));
    }
    if session.alias.len() != seq_len {
        return Err(shape_error("alias", (1, seq_len), (1, session.alias.len())));
    }
    if session.mask.len() != seq_len {
        return Err(shape_error("mask", (1, seq_len), (1, session.mask.len())));
    }
    if let Some((position, &alias)) = session
        .alias
        .iter()
        .enumerate()
        .find(|(_, &alias)| alias >= nodes)
    {
        return Err(SessionError::AliasOutOfRange {
            index,
            position,
            alias,
            len: nodes,
        });
    }
    let mut seen_padding = false;
    for (position, &m) in session.mask.iter().enumerate() {
        match (m, seen_padding) {
            (1, false) => {}
            (0, _) => seen_padding = true,
            _ => return Err(SessionError::NonContiguousMask { index, position }),
        }
    }
    if session.mask.first() != Some(&1) {
        return Err(SessionError::EmptySession { index });
    }
    if session.target == 0 {
        return Err(SessionError::TargetOutOfRange {
            index,
            target: session.target,
            n_node: usize::MAX,
        });
    }
    Ok(())
}

/// Produces batches for one pass over a dataset.
///
/// `generate_batch` returns the sample indices of every batch in visiting
/// order; `get_slice` turns one of those index lists into a [`SessionBatch`].
pub trait BatchSource {
    /// Number of sessions in the source.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Partitions the sessions into `ceil(len / batch_size)` batches.
    fn generate_batch(&mut self, batch_size: usize) -> SessionResult<Vec<Vec<usize>>>;

    /// Builds the graph batch for the given sample indices.
    fn get_slice(&self, indices: &[usize]) -> SessionResult<SessionBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mask: Vec<u8>) -> SessionSample {
        SessionSample {
            items: vec![0, 1, 2],
            adjacency: Tensor::zeros(3, 6).unwrap(),
            alias: vec![1, 2, 0],
            mask,
            target: 2,
        }
    }

    #[test]
    fn accepts_prefix_masks() {
        let batch = SessionBatch::new(vec![sample(vec![1, 1, 0]), sample(vec![1, 1, 1])]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.nodes(), 3);
        assert_eq!(batch.seq_len(), 3);
        assert_eq!(batch.sessions()[0].length(), 2);
        assert_eq!(batch.targets(), vec![2, 2]);
    }

    #[test]
    fn rejects_gaps_and_empty_sessions() {
        assert!(matches!(
            SessionBatch::new(vec![sample(vec![1, 0, 1])]),
            Err(SessionError::NonContiguousMask {
                index: 0,
                position: 2
            })
        ));
        assert!(matches!(
            SessionBatch::new(vec![sample(vec![1, 1, 0]), sample(vec![0, 0, 0])]),
            Err(SessionError::EmptySession { index: 1 })
        ));
        assert!(matches!(
            SessionBatch::new(vec![sample(vec![1, 2, 0])]),
            Err(SessionError::NonContiguousMask { position: 1, .. })
        ));
    }

    #[test]
    fn reports_shapes_on_mismatch() {
        let mut bad = sample(vec![1, 1, 0]);
        bad.adjacency = Tensor::zeros(3, 3).unwrap();
        match SessionBatch::new(vec![bad]) {
            Err(SessionError::BatchShape {
                what,
                expected,
                got,
                ..
            }) => {
                assert_eq!(what, "adjacency");
                assert_eq!(expected, (3, 6));
                assert_eq!(got, (3, 3));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut alias = sample(vec![1, 1, 0]);
        alias.alias = vec![0, 3, 0];
        assert!(matches!(
            SessionBatch::new(vec![alias]),
            Err(SessionError::AliasOutOfRange { alias: 3, .. })
        ));
    }

    #[test]
    fn catalogue_check_bounds_items_and_targets() {
        let batch = SessionBatch::new(vec![sample(vec![1, 1, 0])]).unwrap();
        assert!(batch.check_catalogue(3).is_ok());
        assert!(matches!(
            batch.check_catalogue(2),
            Err(SessionError::ItemOutOfRange { item: 2, .. })
        ));
        let mut zero = sample(vec![1, 0, 0]);
        zero.target = 0;
        assert!(matches!(
            SessionBatch::new(vec![zero]),
            Err(SessionError::TargetOutOfRange { target: 0, .. })
        ));
    }
}
