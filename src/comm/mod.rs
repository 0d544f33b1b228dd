//! The message-passing seam of the solver.
//!
//! Every cross-process combination performed by the solver goes through
//! the [`ProcComm`] trait: blocking collectives over the process group.
//! The call sites preserve a strict discipline so that the small dense
//! multiplier state stays bit-identical on every rank:
//!
//! - assemblies finish with a single trailing reduction;
//! - m-sized systems are reduced to the root rank, factored there, and
//!   the factored data broadcast back;
//! - step-length and flag combinations use all-reduce with min/max/or.
//!
//! [`SerialComm`] is the provided single-process implementation; a
//! distributed implementation slots in behind the same trait without
//! touching the solver.

use crate::algebra::FloatT;

/// Blocking collectives over the process group.
///
/// Every process must invoke the same solver operation in the same order,
/// so every collective call appears on every rank.  All methods are
/// synchronisation points.
pub trait ProcComm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Elementwise sum across ranks; result on every rank.
    fn allreduce_sum<T: FloatT>(&self, buf: &mut [T]);

    /// Elementwise min across ranks; result on every rank.
    fn allreduce_min<T: FloatT>(&self, buf: &mut [T]);

    /// Elementwise max across ranks; result on every rank.
    fn allreduce_max<T: FloatT>(&self, buf: &mut [T]);

    /// Bitwise-or of a flag word across ranks.
    fn allreduce_or(&self, flags: u32) -> u32;

    /// Elementwise sum across ranks; result valid on the root rank only.
    fn reduce_sum_root<T: FloatT>(&self, buf: &mut [T]);

    /// Broadcast the root rank's buffer to every rank.
    fn broadcast_root<T: FloatT>(&self, buf: &mut [T]);

    /// Gather one count from every rank, in rank order, on every rank.
    fn allgather_counts(&self, count: usize) -> Vec<usize>;
}

/// Single-process communicator.  All collectives are identities.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        SerialComm
    }
}

impl ProcComm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn allreduce_sum<T: FloatT>(&self, _buf: &mut [T]) {}
    fn allreduce_min<T: FloatT>(&self, _buf: &mut [T]) {}
    fn allreduce_max<T: FloatT>(&self, _buf: &mut [T]) {}
    fn allreduce_or(&self, flags: u32) -> u32 {
        flags
    }
    fn reduce_sum_root<T: FloatT>(&self, _buf: &mut [T]) {}
    fn broadcast_root<T: FloatT>(&self, _buf: &mut [T]) {}
    fn allgather_counts(&self, count: usize) -> Vec<usize> {
        vec![count]
    }
}

/// Partition of the design-variable and sparse-constraint index spaces
/// across ranks, as exclusive prefix sums.  Computed once at solver
/// construction and never rebalanced.
#[derive(Clone, Debug)]
pub struct VarRanges {
    pub var_range: Vec<usize>,
    pub wcon_range: Vec<usize>,
}

impl VarRanges {
    pub fn new<C: ProcComm>(comm: &C, nvars: usize, nwcon: usize) -> Self {
        let var_range = prefix_sums(&comm.allgather_counts(nvars));
        let wcon_range = prefix_sums(&comm.allgather_counts(nwcon));
        Self {
            var_range,
            wcon_range,
        }
    }

    /// Total number of design variables across all ranks.
    pub fn total_vars(&self) -> usize {
        *self.var_range.last().unwrap()
    }

    /// Total number of sparse constraints across all ranks.
    pub fn total_wcon(&self) -> usize {
        *self.wcon_range.last().unwrap()
    }

    /// First global design index owned by `rank`.
    pub fn var_offset(&self, rank: usize) -> usize {
        self.var_range[rank]
    }

    /// First global sparse-constraint index owned by `rank`.
    pub fn wcon_offset(&self, rank: usize) -> usize {
        self.wcon_range[rank]
    }
}

fn prefix_sums(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len() + 1);
    out.push(0);
    for &c in counts {
        out.push(out.last().unwrap() + c);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_serial_ranges() {
        let comm = SerialComm::new();
        let ranges = VarRanges::new(&comm, 7, 3);
        assert_eq!(ranges.total_vars(), 7);
        assert_eq!(ranges.total_wcon(), 3);
        assert_eq!(ranges.var_offset(0), 0);
        assert_eq!(ranges.wcon_offset(0), 0);
    }

    #[test]
    fn test_serial_collectives_are_identity() {
        let comm = SerialComm::new();
        let mut buf = [1.0_f64, -2.0];
        comm.allreduce_sum(&mut buf);
        comm.allreduce_min(&mut buf);
        comm.reduce_sum_root(&mut buf);
        comm.broadcast_root(&mut buf);
        assert_eq!(buf, [1.0, -2.0]);
        assert_eq!(comm.allreduce_or(0b101), 0b101);
    }
}
