//! C-compatible entry points mirroring `include/omniscio.h`, so a thin C
//! shim (the interception layer that intercepts `open`/`read`/`write`/
//! `close` and captures the calling context, both out of scope for this
//! crate) can drive a [`Tracer`] without linking against any Rust types.
//!
//! A single process-wide tracer behind a `Mutex` plays the role of the
//! original's static globals; `omniscio_init` installs it, every other
//! function is a no-op (`OMNISCIO_ERROR`) until it has been called.
//!
//! The original's `omniscio_file` is a tagged union of a POSIX fd, an
//! `MPI_File`, and a libc `FILE*`. Reproducing that union's exact layout
//! would require bindgen-ing MPI's headers for a dependency this crate does
//! not otherwise need; [`OmniscioFile`] keeps the `api` tag but narrows the
//! payload to a single opaque `u64` handle, which is all [`Tracer`] needs.

use crate::config::Config;
use crate::context::CallingContext;
use crate::op::{ApiType, FileHandle, OpType};
use crate::tracer::Tracer;
use once_cell::sync::Lazy;
use std::sync::Mutex;

const OMNISCIO_OK: i32 = 0;
const OMNISCIO_ERROR: i32 = -1;

/// Mirrors `omniscio_file` with a narrowed handle payload (see module docs).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OmniscioFile {
    pub api: u32,
    pub handle: u64,
}

/// Mirrors `omniscio_req`, one row of `omniscio_next`'s output array.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OmniscioReq {
    pub op_type: i32,
    pub offset: i64,
    pub size: u64,
    pub predicted_delay: f64,
    pub probability: f64,
}

static TRACER: Lazy<Mutex<Option<Tracer>>> = Lazy::new(|| Mutex::new(None));

/// Runs `f` behind a panic boundary so a bug on the Rust side (an invariant
/// `.expect()` in the grammar, say) unwinds into `OMNISCIO_ERROR` instead of
/// crossing the `extern "C"` boundary, which the Rust compiler turns into an
/// immediate process abort rather than a catchable unwind.
fn catch_ffi_panic(f: impl FnOnce() -> i32 + std::panic::UnwindSafe) -> i32 {
    std::panic::catch_unwind(f).unwrap_or(OMNISCIO_ERROR)
}

fn api_from_u32(v: u32) -> ApiType {
    match v {
        0 => ApiType::Posix,
        1 => ApiType::MpiIo,
        _ => ApiType::Libc,
    }
}

fn op_type_to_i32(t: OpType) -> i32 {
    match t {
        OpType::Open => 0,
        OpType::Close => 1,
        OpType::Read => 2,
        OpType::Write => 3,
    }
}

/// Safety: `frames` must point to `frames_len` valid, initialized `u64`s
/// (or be null, with `frames_len` zero) for the duration of this call —
/// the same contract as any other `*const T, usize` FFI pair.
unsafe fn context_from_raw(frames: *const u64, frames_len: usize) -> Option<CallingContext> {
    if frames.is_null() || frames_len == 0 {
        return None;
    }
    let slice = std::slice::from_raw_parts(frames, frames_len);
    CallingContext::new(slice.to_vec())
}

#[no_mangle]
pub extern "C" fn omniscio_init(rank: u32, world_size: u32, epoch_unix_secs: u64) -> i32 {
    catch_ffi_panic(|| {
        let config = Config::from_env();
        match Tracer::init(&config, rank, world_size, epoch_unix_secs) {
            Ok(tracer) => {
                *TRACER.lock().unwrap() = Some(tracer);
                OMNISCIO_OK
            }
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

/// # Safety
/// `frames`/`frames_len` must satisfy [`context_from_raw`]'s contract.
#[no_mangle]
pub unsafe extern "C" fn omniscio_open_start(
    frames: *const u64,
    frames_len: usize,
    api: u32,
) -> i32 {
    catch_ffi_panic(|| {
        let Some(ctx) = (unsafe { context_from_raw(frames, frames_len) }) else {
            return OMNISCIO_ERROR;
        };
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.open_start(ctx, api_from_u32(api)) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

#[no_mangle]
pub extern "C" fn omniscio_open_end(success: i32, file: OmniscioFile) -> i32 {
    catch_ffi_panic(|| {
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.open_end(success != 0, FileHandle(file.handle)) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

/// # Safety
/// `frames`/`frames_len` must satisfy [`context_from_raw`]'s contract.
#[no_mangle]
pub unsafe extern "C" fn omniscio_close_start(
    frames: *const u64,
    frames_len: usize,
    file: OmniscioFile,
) -> i32 {
    catch_ffi_panic(|| {
        let Some(ctx) = (unsafe { context_from_raw(frames, frames_len) }) else {
            return OMNISCIO_ERROR;
        };
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.close_start(ctx, api_from_u32(file.api), FileHandle(file.handle)) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

#[no_mangle]
pub extern "C" fn omniscio_close_end(success: i32) -> i32 {
    catch_ffi_panic(|| {
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.close_end(success != 0) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

/// # Safety
/// `frames`/`frames_len` must satisfy [`context_from_raw`]'s contract.
#[no_mangle]
pub unsafe extern "C" fn omniscio_read_start(
    frames: *const u64,
    frames_len: usize,
    file: OmniscioFile,
    offset: i64,
    size: u64,
) -> i32 {
    catch_ffi_panic(|| {
        let Some(ctx) = (unsafe { context_from_raw(frames, frames_len) }) else {
            return OMNISCIO_ERROR;
        };
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.read_start(ctx, api_from_u32(file.api), FileHandle(file.handle), offset, size as i64) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

#[no_mangle]
pub extern "C" fn omniscio_read_end(success: i32) -> i32 {
    catch_ffi_panic(|| {
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.read_end(success != 0) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

/// # Safety
/// `frames`/`frames_len` must satisfy [`context_from_raw`]'s contract.
#[no_mangle]
pub unsafe extern "C" fn omniscio_write_start(
    frames: *const u64,
    frames_len: usize,
    file: OmniscioFile,
    offset: i64,
    size: u64,
) -> i32 {
    catch_ffi_panic(|| {
        let Some(ctx) = (unsafe { context_from_raw(frames, frames_len) }) else {
            return OMNISCIO_ERROR;
        };
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.write_start(ctx, api_from_u32(file.api), FileHandle(file.handle), offset, size as i64) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

#[no_mangle]
pub extern "C" fn omniscio_write_end(success: i32) -> i32 {
    catch_ffi_panic(|| {
        let mut guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_mut() else {
            return OMNISCIO_ERROR;
        };
        match tracer.write_end(success != 0) {
            Ok(()) => OMNISCIO_OK,
            Err(_) => OMNISCIO_ERROR,
        }
    })
}

/// Writes predictions into a heap array and hands ownership to the caller,
/// who must release it with [`omniscio_free`]. `*n` is always set, even on
/// failure (to `0`).
///
/// # Safety
/// `out` and `n` must be valid, writable pointers.
#[no_mangle]
pub unsafe extern "C" fn omniscio_next(out: *mut *mut OmniscioReq, n: *mut i32) -> i32 {
    catch_ffi_panic(|| unsafe {
        let guard = TRACER.lock().unwrap();
        let Some(tracer) = guard.as_ref() else {
            *n = 0;
            return OMNISCIO_ERROR;
        };
        match tracer.predict_next() {
            Ok(predictions) => {
                let mut buf: Vec<OmniscioReq> = predictions
                    .iter()
                    .map(|p| OmniscioReq {
                        op_type: p.op_type.map(op_type_to_i32).unwrap_or(-1),
                        offset: p.offset.unwrap_or(0),
                        size: p.size.unwrap_or(0),
                        predicted_delay: p.predicted_delay.unwrap_or(0.0),
                        probability: p.probability,
                    })
                    .collect();
                *n = buf.len() as i32;
                *out = buf.as_mut_ptr();
                std::mem::forget(buf);
                OMNISCIO_OK
            }
            Err(_) => {
                *n = 0;
                OMNISCIO_ERROR
            }
        }
    })
}

/// # Safety
/// `ptr`/`n` must be exactly the pair returned by a prior [`omniscio_next`]
/// call that has not already been freed.
#[no_mangle]
pub unsafe extern "C" fn omniscio_free(ptr: *mut OmniscioReq, n: i32) {
    let _ = catch_ffi_panic(|| {
        if ptr.is_null() || n <= 0 {
            return OMNISCIO_OK;
        }
        drop(unsafe { Vec::from_raw_parts(ptr, n as usize, n as usize) });
        OMNISCIO_OK
    });
}

/// Declared for parity with the original header; always fails, matching
/// [`Tracer::predict_from`].
///
/// # Safety
/// `n` must be a valid, writable pointer.
#[no_mangle]
pub unsafe extern "C" fn omniscio_predict_from(
    _index: i32,
    _count: i32,
    _out: *mut *mut OmniscioReq,
    n: *mut i32,
) -> i32 {
    catch_ffi_panic(|| unsafe {
        *n = 0;
        OMNISCIO_ERROR
    })
}

#[no_mangle]
pub extern "C" fn omniscio_finalize() -> i32 {
    catch_ffi_panic(|| {
        let mut guard = TRACER.lock().unwrap();
        match guard.as_mut() {
            Some(tracer) => match tracer.finalize() {
                Ok(()) => OMNISCIO_OK,
                Err(_) => OMNISCIO_ERROR,
            },
            None => OMNISCIO_OK,
        }
    })
}

