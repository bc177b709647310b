//! Shared byte-buffer primitives for the `spelunk` crates.
//!
//! The only export is [`ByteView`], a cheaply clonable smart pointer over
//! binary data that can be backed by a memory mapped file, an owned buffer,
//! or a borrowed slice. The parsers in `spelunk-debuginfo` borrow plain
//! `&[u8]` slices from a `ByteView` and rely on its guarantee that the bytes
//! neither move nor change for the lifetime of the view.

#![warn(missing_docs)]

mod byteview;

pub use crate::byteview::*;
