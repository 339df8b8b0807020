//! Mount directives: grammar, path resolution, wire codec, conflict checks.
//!
//! Everything here is pure string work and runs in the submitting context,
//! before any node-side state exists.

pub mod codec;
pub mod conflict;
pub mod parser;
pub mod resolver;

pub use codec::{decode, decode_lenient, encode, encode_bounded, DirectiveList};
pub use parser::{parse, Bucket, Directive};
