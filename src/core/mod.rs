// Core modules implementing the DynGroup wire format, decoding, and error modeling.
pub mod column;
pub mod decode;
pub mod error;
pub mod format;
pub mod source;
pub mod tree;
