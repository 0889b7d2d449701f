//! Serpent Benchmarks
//!
//! Marshalling and call overhead of the bridge.
//! Run with: cargo bench -p serpent-benches

// Cargo needs a lib target; the benchmarks live in benches/.
