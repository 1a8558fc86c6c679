//! Canonical artifact writers.
//!
//! # Submodules
//!
//! - [`json`]: writes the validated clipping to the canonical JSON path
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── diario_sm_atual.pdf   # today's edition (acquisition)
//! ├── clipagem_hoje.json    # today's clipping (analysis)
//! ├── downloads/            # browser staging, emptied every run
//! └── diagnostics/          # snapshots from failed lookups
//! ```

pub mod json;
