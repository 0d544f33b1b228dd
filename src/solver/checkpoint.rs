//! Binary solution files.
//!
//! Layout (native endianness):
//!
//! ```text
//! i32: total design variables     i32: total sparse constraints
//! i32: dense constraints
//! f64: barrier parameter          f64 * ncon: z        f64 * ncon: s
//! f64 * nvars_total: x
//! f64 * nvars_total: zl
//! f64 * nvars_total: zu
//! f64 * nwcon_total: zw           (only when nwcon_total > 0)
//! f64 * nwcon_total: sw           (only when nwcon_total > 0)
//! ```
//!
//! Each rank writes its local slices at byte offsets derived from the
//! variable partition, so the same file layout is produced for any
//! process count.  A size mismatch on read is a fatal file error.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::algebra::*;
use crate::comm::ProcComm;
use crate::solver::*;

const INT_BYTES: u64 = std::mem::size_of::<i32>() as u64;
const SCALAR_BYTES: u64 = std::mem::size_of::<f64>() as u64;

fn write_scalars<T: FloatT>(file: &mut File, vals: &[T]) -> io::Result<()> {
    for v in vals {
        let v = v.real_part().to_f64().unwrap_or_default();
        file.write_all(&v.to_ne_bytes())?;
    }
    Ok(())
}

fn read_scalars<T: FloatT>(file: &mut File, vals: &mut [T]) -> io::Result<()> {
    let mut buf = [0u8; 8];
    for v in vals.iter_mut() {
        file.read_exact(&mut buf)?;
        *v = T::from_f64(f64::from_ne_bytes(buf))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad scalar"))?;
    }
    Ok(())
}

impl<T, P, C> InteriorPoint<'_, T, P, C>
where
    T: FloatT,
    P: Problem<T>,
    C: ProcComm + Clone + 'static,
{
    fn header_bytes(&self) -> u64 {
        3 * INT_BYTES + (2 * self.ncon as u64 + 1) * SCALAR_BYTES
    }

    /// Write the design point, multipliers and slacks to `path`.
    pub fn write_solution_file(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let ntotal = self.ranges.total_vars() as u64;
        let nwtotal = self.ranges.total_wcon() as u64;
        let rank = self.comm.rank();

        if self.comm.is_root() {
            file.write_all(&(ntotal as i32).to_ne_bytes())?;
            file.write_all(&(nwtotal as i32).to_ne_bytes())?;
            file.write_all(&(self.ncon as i32).to_ne_bytes())?;
            write_scalars(&mut file, &[self.barrier_param])?;
            write_scalars(&mut file, &self.vars.z)?;
            write_scalars(&mut file, &self.vars.s)?;
        }

        let mut offset = self.header_bytes();
        let var_off = self.ranges.var_offset(rank) as u64;
        let wcon_off = self.ranges.wcon_offset(rank) as u64;

        for field in [&self.vars.x, &self.vars.zl, &self.vars.zu] {
            file.seek(SeekFrom::Start(offset + var_off * SCALAR_BYTES))?;
            write_scalars(&mut file, field)?;
            offset += ntotal * SCALAR_BYTES;
        }

        if nwtotal > 0 {
            for field in [&self.vars.zw, &self.vars.sw] {
                file.seek(SeekFrom::Start(offset + wcon_off * SCALAR_BYTES))?;
                write_scalars(&mut file, field)?;
                offset += nwtotal * SCALAR_BYTES;
            }
        }

        file.flush()
    }

    /// Restore the design point, multipliers and slacks from a file
    /// written by [`write_solution_file`](Self::write_solution_file).
    /// The stored problem sizes must match exactly.
    pub fn read_solution_file(&mut self, path: &Path) -> Result<(), SolverError> {
        let mut file = File::open(path)?;

        let ntotal = self.ranges.total_vars() as u64;
        let nwtotal = self.ranges.total_wcon() as u64;
        let rank = self.comm.rank();

        let mut sizes = [0i32; 3];
        {
            let mut buf = [0u8; 4];
            for s in sizes.iter_mut() {
                file.read_exact(&mut buf)?;
                *s = i32::from_ne_bytes(buf);
            }
        }
        if sizes[0] as u64 != ntotal
            || sizes[1] as u64 != nwtotal
            || sizes[2] as usize != self.ncon
        {
            return Err(SolverError::SolutionFile(io::Error::new(
                io::ErrorKind::InvalidData,
                "problem size incompatible with solution file",
            )));
        }

        let mut mu = [T::zero()];
        read_scalars(&mut file, &mut mu)?;
        read_scalars(&mut file, &mut self.vars.z)?;
        read_scalars(&mut file, &mut self.vars.s)?;
        self.comm.broadcast_root(&mut mu);
        self.comm.broadcast_root(&mut self.vars.z);
        self.comm.broadcast_root(&mut self.vars.s);
        self.barrier_param = mu[0];

        let mut offset = self.header_bytes();
        let var_off = self.ranges.var_offset(rank) as u64;
        let wcon_off = self.ranges.wcon_offset(rank) as u64;

        {
            let fields = [&mut self.vars.x, &mut self.vars.zl, &mut self.vars.zu];
            for field in fields {
                file.seek(SeekFrom::Start(offset + var_off * SCALAR_BYTES))?;
                read_scalars(&mut file, field)?;
                offset += ntotal * SCALAR_BYTES;
            }
        }

        if nwtotal > 0 {
            let fields = [&mut self.vars.zw, &mut self.vars.sw];
            for field in fields {
                file.seek(SeekFrom::Start(offset + wcon_off * SCALAR_BYTES))?;
                read_scalars(&mut file, field)?;
                offset += nwtotal * SCALAR_BYTES;
            }
        }

        Ok(())
    }
}
