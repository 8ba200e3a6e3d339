//! Small host binary demonstrating the Rust API against a synthetic,
//! strided I/O trace. Not part of the library; this is the kind of thing
//! an interception shim would do after linking against `omniscio_predictor`
//! (or, for a non-Rust shim, against the `ffi` module instead).
//!
//! Run with `RUST_LOG=debug cargo run --bin omniscio-trace-demo` to see the
//! tracer's own log output alongside the predictions.

use omniscio_predictor::{ApiType, CallingContext, FileHandle, Tracer};

fn main() {
    env_logger::init();

    let mut tracer = Tracer::in_memory();
    let contexts = [
        CallingContext::new(vec![0x4010]).unwrap(),
        CallingContext::new(vec![0x4020]).unwrap(),
        CallingContext::new(vec![0x4030]).unwrap(),
    ];
    let handle = FileHandle(3);

    let mut offset = 0i64;
    for round in 0..5 {
        for ctx in &contexts {
            tracer
                .write_start(ctx.clone(), ApiType::Posix, handle, offset, 4096)
                .expect("well-bracketed write");
            tracer.write_end(true).expect("no operation open yet");
            offset += 4096;
        }
        println!("round {round}: predictions = {:?}", tracer.predict_next());
    }

    tracer.finalize().expect("finalize is infallible once enabled");
}
