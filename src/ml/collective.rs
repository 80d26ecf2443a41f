// ============================================================
// Layer 5 — Collective Communication Group
// ============================================================
// The only channel between workers. Each worker holds one
// CollectiveHandle; there is no shared mutable state.
//
// Topology: a full mesh of one-directional channels, one per
// ordered (sender, receiver) pair. Receiving from a dedicated
// channel per peer keeps messages from consecutive collectives
// in order even when a fast peer runs ahead.
//
// Operations:
//   join()             initial barrier; fails if a peer never arrives
//   barrier()          all workers reach this point
//   all_reduce_mean()  element-wise mean of one Vec<f32> per worker
//   broadcast()        every worker receives the root's Vec<f32>
//   leave()            final barrier, then release the channels
//
// Contributions are summed in rank order on every worker, so
// every replica sees bit-identical averages.
//
// A worker that fails drops its handle; its peers get
// PeerDisconnected at their next collective. A worker that hangs
// without dropping its handle blocks every peer: there is no
// timeout.

use std::sync::mpsc::{channel, Receiver, Sender};

use burn::{
    module::{ModuleMapper, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::CollectiveError;

pub struct CollectiveGroup;

impl CollectiveGroup {
    /// Build the mesh and return one handle per rank, in rank order.
    pub fn create(world_size: usize) -> Result<Vec<CollectiveHandle>, CollectiveError> {
        if world_size == 0 {
            return Err(CollectiveError::InvalidGroup("world size must be at least 1".into()));
        }

        let mut senders:   Vec<Vec<Option<Sender<Vec<f32>>>>>   = (0..world_size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<f32>>>>> = (0..world_size).map(|_| Vec::new()).collect();

        // senders[from][to], receivers[to][from]
        for from in 0..world_size {
            for to in 0..world_size {
                if from == to {
                    senders[from].push(None);
                    receivers[to].push(None);
                } else {
                    let (tx, rx) = channel();
                    senders[from].push(Some(tx));
                    receivers[to].push(Some(rx));
                }
            }
        }

        Ok(senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (to_peers, from_peers))| CollectiveHandle {
                rank,
                world_size,
                to_peers,
                from_peers,
            })
            .collect())
    }
}

pub struct CollectiveHandle {
    rank:       usize,
    world_size: usize,
    to_peers:   Vec<Option<Sender<Vec<f32>>>>,
    from_peers: Vec<Option<Receiver<Vec<f32>>>>,
}

impl CollectiveHandle {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn join(&self) -> Result<(), CollectiveError> {
        self.barrier()?;
        tracing::info!("Rank {}/{} joined the collective group", self.rank, self.world_size);
        Ok(())
    }

    pub fn barrier(&self) -> Result<(), CollectiveError> {
        self.all_reduce_mean(Vec::new()).map(|_| ())
    }

    /// Element-wise mean across all ranks. Every rank must pass a
    /// vector of the same length.
    pub fn all_reduce_mean(&self, local: Vec<f32>) -> Result<Vec<f32>, CollectiveError> {
        if self.world_size == 1 {
            return Ok(local);
        }

        for (peer, tx) in self.to_peers.iter().enumerate() {
            if let Some(tx) = tx {
                tx.send(local.clone())
                    .map_err(|_| CollectiveError::PeerDisconnected { rank: self.rank, peer })?;
            }
        }

        let mut sum = vec![0.0f32; local.len()];
        let mut local = Some(local);
        for (peer, rx) in self.from_peers.iter().enumerate() {
            let contribution = match rx {
                Some(rx) => rx
                    .recv()
                    .map_err(|_| CollectiveError::PeerDisconnected { rank: self.rank, peer })?,
                None => local.take().unwrap_or_default(),
            };
            if contribution.len() != sum.len() {
                return Err(CollectiveError::LengthMismatch {
                    rank:     self.rank,
                    peer,
                    expected: sum.len(),
                    found:    contribution.len(),
                });
            }
            for (acc, x) in sum.iter_mut().zip(contribution) {
                *acc += x;
            }
        }

        let scale = 1.0 / self.world_size as f32;
        sum.iter_mut().for_each(|x| *x *= scale);
        Ok(sum)
    }

    /// Every rank returns `root`'s vector. Non-root ranks pass their
    /// own vector only to check the length.
    pub fn broadcast(&self, root: usize, local: Vec<f32>) -> Result<Vec<f32>, CollectiveError> {
        if root >= self.world_size {
            return Err(CollectiveError::InvalidGroup(format!(
                "broadcast root {root} outside a group of {}",
                self.world_size
            )));
        }

        if self.rank == root {
            for (peer, tx) in self.to_peers.iter().enumerate() {
                if let Some(tx) = tx {
                    tx.send(local.clone())
                        .map_err(|_| CollectiveError::PeerDisconnected { rank: self.rank, peer })?;
                }
            }
            return Ok(local);
        }

        let received = match &self.from_peers[root] {
            Some(rx) => rx
                .recv()
                .map_err(|_| CollectiveError::PeerDisconnected { rank: self.rank, peer: root })?,
            None => local.clone(),
        };
        if received.len() != local.len() {
            return Err(CollectiveError::LengthMismatch {
                rank:     self.rank,
                peer:     root,
                expected: local.len(),
                found:    received.len(),
            });
        }
        Ok(received)
    }

    /// Wait for every peer to finish, then release the channels.
    pub fn leave(self) -> Result<(), CollectiveError> {
        self.barrier()?;
        tracing::debug!("Rank {} left the collective group", self.rank);
        Ok(())
    }
}

// ─── Gradient synchronisation ─────────────────────────────────────────────────
// Two passes of a ModuleVisitor over the model:
//   Gather  — flatten every parameter gradient, in visit order, into one buffer
//   Scatter — after the all-reduce, cut the averaged buffer back into tensors
//             and re-register them under the same parameter ids
// Visit order is fixed by the module structure, which is identical on
// every replica.

enum Phase {
    Gather,
    Scatter { cursor: usize },
}

struct GradientVisitor<'a> {
    grads:  &'a mut GradientsParams,
    buffer: Vec<f32>,
    phase:  Phase,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientVisitor<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        let n = tensor.shape().num_elements();
        match &mut self.phase {
            Phase::Gather => match self.grads.get::<B::InnerBackend, D>(id) {
                Some(grad) => self.buffer.extend(grad.into_data().iter::<f32>()),
                // No gradient for this parameter: contribute zeros so
                // offsets stay aligned across ranks.
                None => self.buffer.extend(std::iter::repeat(0.0).take(n)),
            },
            Phase::Scatter { cursor } => {
                let start = *cursor;
                *cursor += n;
                if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
                    let values = self.buffer[start..start + n].to_vec();
                    let synced = Tensor::<B::InnerBackend, D>::from_data(
                        TensorData::new(values, grad.dims()),
                        &grad.device(),
                    );
                    self.grads.register::<B::InnerBackend, D>(id, synced);
                }
            }
        }
    }
}

/// Replace every gradient in `grads` with its mean across the group.
pub fn sync_gradients<B: AutodiffBackend, M: Module<B>>(
    model:  &M,
    grads:  GradientsParams,
    handle: &CollectiveHandle,
) -> Result<GradientsParams, CollectiveError> {
    if handle.world_size() == 1 {
        return Ok(grads);
    }

    let mut grads = grads;
    let mut visitor = GradientVisitor { grads: &mut grads, buffer: Vec::new(), phase: Phase::Gather };
    model.visit(&mut visitor);

    visitor.buffer = handle.all_reduce_mean(std::mem::take(&mut visitor.buffer))?;
    visitor.phase  = Phase::Scatter { cursor: 0 };
    model.visit(&mut visitor);

    Ok(grads)
}

// ─── Parameter synchronisation ────────────────────────────────────────────────
// A fresh init draws different random weights on every replica. Right
// after join, rank 0's parameters are flattened in visit order,
// broadcast, and mapped back into every other replica.

struct ParamGather {
    buffer: Vec<f32>,
}

impl<B: Backend> ModuleVisitor<B> for ParamGather {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.buffer.extend(tensor.to_data().iter::<f32>());
    }
}

struct ParamScatter {
    buffer: Vec<f32>,
    cursor: usize,
}

impl<B: Backend> ModuleMapper<B> for ParamScatter {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let n     = tensor.shape().num_elements();
        let start = self.cursor;
        self.cursor += n;

        let synced = Tensor::<B, D>::from_data(
            TensorData::new(self.buffer[start..start + n].to_vec(), tensor.dims()),
            &tensor.device(),
        );
        if tensor.is_require_grad() {
            synced.require_grad()
        } else {
            synced
        }
    }
}

/// Every float parameter of `model`, flattened in visit order.
pub fn param_values<B: Backend, M: Module<B>>(model: &M) -> Vec<f32> {
    let mut gather = ParamGather { buffer: Vec::new() };
    model.visit(&mut gather);
    gather.buffer
}

/// Overwrite every replica's parameters with rank 0's.
pub fn sync_parameters<B: Backend, M: Module<B>>(
    model:  M,
    handle: &CollectiveHandle,
) -> Result<M, CollectiveError> {
    if handle.world_size() == 1 {
        return Ok(model);
    }

    let values = handle.broadcast(0, param_values::<B, M>(&model))?;
    if handle.rank() == 0 {
        return Ok(model);
    }
    Ok(model.map(&mut ParamScatter { buffer: values, cursor: 0 }))
}
