//! Small shared value types mirrored from `include/omniscio.h`'s C enums
//! and structs: the kind of I/O call, the API family it came through, and
//! a file handle identifying which open stream it targets.

use std::fmt;

/// The four tracked operation kinds (`omniscio_op_type` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Open,
    Close,
    Read,
    Write,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpType::Open => "OPEN",
            OpType::Close => "CLOSE",
            OpType::Read => "READ",
            OpType::Write => "WRITE",
        };
        f.write_str(s)
    }
}

/// The I/O API family an operation was issued through
/// (`omniscio_api_type` in the original: POSIX, MPI-IO, or the libc
/// stdio wrappers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiType {
    Posix,
    MpiIo,
    Libc,
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiType::Posix => "POSIX",
            ApiType::MpiIo => "MPIIO",
            ApiType::Libc => "LIBC",
        };
        f.write_str(s)
    }
}

/// Opaque identifier for an open file, supplied by the interception layer
/// (the original stores a raw union of POSIX fd / MPI_File / FILE*; this
/// crate only needs a stable, hashable identity for it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u64);

/// One candidate next-operation prediction, returned by
/// [`crate::tracer::Tracer::predict_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub symbol: u32,
    pub probability: f64,
    pub op_type: Option<OpType>,
    pub size: Option<u64>,
    pub offset: Option<i64>,
    pub predicted_delay: Option<f64>,
}
