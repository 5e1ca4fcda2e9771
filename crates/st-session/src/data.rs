// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! In-memory session dataset that converts raw item sequences into
//! [`SessionBatch`]es.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use st_tensor::Tensor;
use tracing::debug;

use crate::batch::{BatchSource, SessionBatch, SessionSample};
use crate::error::{SessionError, SessionResult};

/// Raw sequences padded to a common length, plus their 1-indexed targets.
#[derive(Debug)]
pub struct SessionData {
    inputs: Vec<Vec<usize>>,
    masks: Vec<Vec<u8>>,
    targets: Vec<usize>,
    max_len: usize,
    shuffle: bool,
    rng: StdRng,
}

impl SessionData {
    /// Pads every sequence with `0` up to the longest one.
    ///
    /// Empty sequences are accepted here and rejected when their batch is
    /// built, so the failing sample index is reported in context.
    pub fn new(sequences: Vec<Vec<usize>>, targets: Vec<usize>, shuffle: bool) -> SessionResult<Self> {
        if sequences.is_empty() {
            return Err(SessionError::EmptyDataset);
        }
        if sequences.len() != targets.len() {
            return Err(SessionError::BatchShape {
                index: 0,
                what: "targets",
                expected: (sequences.len(), 1),
                got: (targets.len(), 1),
            });
        }
        for (index, sequence) in sequences.iter().enumerate() {
            if let Some(position) = sequence.iter().position(|&item| item == 0) {
                return Err(SessionError::PaddingItem { index, position });
            }
        }
        let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut inputs = Vec::with_capacity(sequences.len());
        let mut masks = Vec::with_capacity(sequences.len());
        for mut sequence in sequences {
            let len = sequence.len();
            let mut mask = vec![1u8; len];
            mask.resize(max_len, 0);
            sequence.resize(max_len, 0);
            inputs.push(sequence);
            masks.push(mask);
        }
        debug!(sessions = inputs.len(), max_len, "session data padded");
        Ok(Self {
            inputs,
            masks,
            targets,
            max_len,
            shuffle,
            rng: spiral_config::rng_for(None, "st-session/data/shuffle"),
        })
    }

    /// Pins the shuffle stream to `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = spiral_config::rng_for(Some(seed), "st-session/data/shuffle");
        self
    }

    /// Padded sequence length.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    fn sample_at(&self, index: usize) -> SessionResult<(&[usize], &[u8], usize)> {
        match (
            self.inputs.get(index),
            self.masks.get(index),
            self.targets.get(index),
        ) {
            (Some(input), Some(mask), Some(&target)) => Ok((input.as_slice(), mask.as_slice(), target)),
            _ => Err(SessionError::Tensor(st_tensor::TensorError::IndexOutOfBounds {
                label: "session_index",
                index,
                len: self.inputs.len(),
            })),
        }
    }
}

/// Sorted unique ids of a padded input; includes `0` when the input is padded.
fn unique_nodes(input: &[usize]) -> Vec<usize> {
    let mut node = input.to_vec();
    node.sort_unstable();
    node.dedup();
    node
}

fn position_of(node: &[usize], item: usize) -> usize {
    node.binary_search(&item).unwrap_or_default()
}

/// Builds the `(L, 2L)` normalised adjacency for one padded input.
///
/// Column block `[0, L)` holds incoming edges scaled by the receiver's
/// in-degree, block `[L, 2L)` outgoing edges scaled by the sender's
/// out-degree. Zero degrees divide by one.
fn normalised_adjacency(input: &[usize], node: &[usize], nodes: usize) -> SessionResult<Tensor> {
    let mut edges = vec![0.0f32; nodes * nodes];
    for pair in input.windows(2) {
        if pair[1] == 0 {
            break;
        }
        let u = position_of(node, pair[0]);
        let v = position_of(node, pair[1]);
        edges[u * nodes + v] = 1.0;
    }
    let mut in_degree = vec![0.0f32; nodes];
    let mut out_degree = vec![0.0f32; nodes];
    for u in 0..nodes {
        for v in 0..nodes {
            let w = edges[u * nodes + v];
            out_degree[u] += w;
            in_degree[v] += w;
        }
    }
    let norm = |d: f32| if d == 0.0 { 1.0 } else { d };
    let adjacency = Tensor::from_fn(nodes, 2 * nodes, |x, y| {
        if y < nodes {
            edges[y * nodes + x] / norm(in_degree[x])
        } else {
            let y = y - nodes;
            edges[x * nodes + y] / norm(out_degree[x])
        }
    })?;
    Ok(adjacency)
}

impl BatchSource for SessionData {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn generate_batch(&mut self, batch_size: usize) -> SessionResult<Vec<Vec<usize>>> {
        if batch_size == 0 {
            return Err(SessionError::InvalidConfig {
                field: "batch_size",
                reason: "must be positive".into(),
            });
        }
        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        Ok(order.chunks(batch_size).map(<[usize]>::to_vec).collect())
    }

    fn get_slice(&self, indices: &[usize]) -> SessionResult<SessionBatch> {
        let mut picked = Vec::with_capacity(indices.len());
        for &index in indices {
            picked.push(self.sample_at(index)?);
        }
        let nodes_per_session: Vec<Vec<usize>> = picked
            .iter()
            .map(|(input, _, _)| unique_nodes(input))
            .collect();
        let nodes = nodes_per_session.iter().map(Vec::len).max().unwrap_or(0);

        let mut sessions = Vec::with_capacity(picked.len());
        for ((input, mask, target), node) in picked.into_iter().zip(nodes_per_session) {
            let adjacency = normalised_adjacency(input, &node, nodes)?;
            let alias = input.iter().map(|&item| position_of(&node, item)).collect();
            let mut items = node;
            items.resize(nodes, 0);
            sessions.push(SessionSample {
                items,
                adjacency,
                alias,
                mask: mask.to_vec(),
                target,
            });
        }
        SessionBatch::new(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_longest_sequence() {
        let data = SessionData::new(vec![vec![3, 1], vec![2, 4, 2]], vec![4, 1], false).unwrap();
        assert_eq!(data.max_len(), 3);
        assert_eq!(data.inputs[0], vec![3, 1, 0]);
        assert_eq!(data.masks[0], vec![1, 1, 0]);
        assert_eq!(data.masks[1], vec![1, 1, 1]);
    }

    #[test]
    fn batches_cover_every_session_once() {
        let sequences = (1..=7).map(|i| vec![i]).collect();
        let mut data = SessionData::new(sequences, vec![1; 7], true)
            .unwrap()
            .with_seed(5);
        let slices = data.generate_batch(3).unwrap();
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[2].len(), 1);
        let mut seen: Vec<usize> = slices.concat();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        assert!(data.generate_batch(0).is_err());
    }

    #[test]
    fn graph_normalises_in_and_out_degrees() {
        // Session 1 -> 2 -> 1 -> 3 padded by the longer second session.
        let data = SessionData::new(vec![vec![1, 2, 1, 3], vec![5, 5, 5, 5, 5]], vec![2, 5], false)
            .unwrap();
        let batch = data.get_slice(&[0, 1]).unwrap();
        let first = &batch.sessions()[0];
        // node = [0, 1, 2, 3]
        assert_eq!(batch.nodes(), 4);
        assert_eq!(first.items, vec![0, 1, 2, 3]);
        assert_eq!(first.alias, vec![1, 2, 1, 3, 0]);
        let a = &first.adjacency;
        let l = 4;
        // Node 1 sends to 2 and 3: out-degree 2.
        assert_eq!(a.row(1).unwrap()[l + 2], 0.5);
        assert_eq!(a.row(1).unwrap()[l + 3], 0.5);
        // Node 1 receives only from 2.
        assert_eq!(a.row(1).unwrap()[2], 1.0);
        // Node 3 receives from 1; padding node has no edges.
        assert_eq!(a.row(3).unwrap()[1], 1.0);
        assert!(a.row(0).unwrap().iter().all(|&v| v == 0.0));

        // Self loop 5 -> 5 on an unpadded session.
        let second = &batch.sessions()[1];
        assert_eq!(second.items, vec![5, 0, 0, 0]);
        assert_eq!(second.adjacency.row(0).unwrap()[0], 1.0);
        assert_eq!(second.adjacency.row(0).unwrap()[l], 1.0);
    }

    #[test]
    fn padding_id_inside_sequence_is_rejected() {
        assert!(matches!(
            SessionData::new(vec![vec![1, 0, 2]], vec![1], false),
            Err(SessionError::PaddingItem {
                index: 0,
                position: 1
            })
        ));
    }

    #[test]
    fn empty_sequence_fails_at_batch_time() {
        let data = SessionData::new(vec![vec![], vec![2]], vec![1, 1], false).unwrap();
        assert!(matches!(
            data.get_slice(&[0, 1]),
            Err(SessionError::EmptySession { index: 0 })
        ));
        assert!(data.get_slice(&[1]).is_ok());
    }
}
