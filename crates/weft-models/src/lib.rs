// SPDX-License-Identifier: AGPL-3.0-only

#![deny(unsafe_code)]

//! Parser and in-memory model for Weft weight containers.
//!
//! The accelerator consumes INT4-quantized transformer weights from a binary
//! container (`model.pt.bin`) produced offline by the conversion tool.
//!
//! # Format
//!
//! Little-endian throughout, no padding:
//!
//! - **Header** (36 bytes): magic `"WTNT"`, version, model geometry, and the
//!   byte offset of the checksum trailer (0 when absent)
//! - **Embeddings**: token then position tables, f16
//! - **Layers**: per layer, six INT4 blocks in the order
//!   `q, k, v, o, ffn_up, ffn_down`, then four f16 layer-norm vectors
//! - **Checksum trailer**: named SHA-256 digests over the weight sections
//!
//! # Example
//!
//! ```no_run
//! use weft_models::ModelWeights;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ModelWeights::from_file("model.pt.bin")?;
//! let cfg = model.config();
//! println!("{} layers, hidden {}", cfg.num_layers, cfg.hidden_size);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod container;
mod error;
pub mod fp16;
mod int4;
mod model;

pub use container::{ChecksumRecord, CONTAINER_MAGIC};
pub use error::{ContainerError, Result};
pub use int4::{Int4Block, Int4Builder};
pub use model::{LayerWeights, ModelConfig, ModelWeights};
