//! Backend adapter seam for Flock.
//!
//! The scheduler never touches tensor math directly. It talks to a
//! [`Backend`] through three operations: load a model, run one batched
//! forward pass, release the model. A [`BackendProvider`] creates one
//! backend context per scheduler for the requested [`Device`].
//!
//! [`DenseBackend`] is the reference engine: a single dense layer over the
//! concatenated inputs, with one execution strategy per device.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod dense;
pub mod device;
pub mod hash;
pub mod io;
pub mod model;
pub mod tensor;

mod handle;

pub use backend::{Backend, BackendProvider, LoadedModel, ModelHandle};
pub use dense::{DenseBackend, DenseModel, DenseProvider};
pub use device::{Device, ParseDeviceError};
pub use hash::fingerprint;
pub use io::{BatchInputs, BatchOutputs};
pub use model::{ModelAsset, ModelMetadata};
pub use tensor::BatchTensor;
