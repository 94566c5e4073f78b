//! Wire layer shared by the RPC client and server.
//!
//! - **value**: the transport value model (scalars, blobs, typed nulls, arrays)
//! - **dataset**: N-dimensional numeric arrays carried as values
//! - **protocol**: request and response envelopes
//! - **codec**: length-delimited JSON framing for AsyncRead/AsyncWrite
//! - **staging**: `.dsr` files for arrays too large to inline

pub mod codec;
pub mod dataset;
pub mod protocol;
pub mod staging;
pub mod value;
