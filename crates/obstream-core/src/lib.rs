//! # obstream-core
//!
//! A library for decoding serialized object streams into an inspectable graph.
//!
//! This crate provides the core functionality for:
//! - Reading the stream header, block-data framing and primitive values
//! - Decoding strings, arrays, enums, class descriptors and instances
//! - Resolving back-references, including circular ones, through a handle table
//! - Plugging in class handlers that interpret custom payloads
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`input`]: The stream decoder and the context handed to class handlers
//! - [`graph`]: The arena of decoded objects and the values that reference them
//! - [`class`]: Class descriptors and the class registry
//! - [`handles`]: The wire handle table
//! - [`builtins`]: Handlers for boxed primitives and common collections
//! - [`render`]: Tree rendering and graph traversal
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use obstream_core::{decode_file, GraphRenderer};
//!
//! let decoded = decode_file("./session.ser")?;
//! print!("{}", GraphRenderer::new(&decoded.heap).render(&decoded.contents));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! The library provides several traits for customization:
//!
//! - [`SerializableHandler`]: Interpret the data of a serializable class
//! - [`ExternalizableHandler`]: Interpret the payload of an externalizable class
//! - [`GraphVisitor`]: Traverse a decoded graph
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod builtins;
pub mod class;
pub mod error;
pub mod graph;
pub mod handles;
pub mod input;
pub mod render;

// Re-export primary types for convenience
pub use class::{
    ClassDesc, ClassFlags, ClassRole, ExternalizableHandler, Registry, SerializableHandler,
    TypeCode,
};
pub use error::{Error, Result};
pub use graph::{Content, Heap, Object, ObjectId, Value};
pub use handles::{HandleTable, BASE_WIRE_HANDLE};
pub use input::{
    decode_bytes, decode_bytes_with_config, decode_file, decode_file_with_config, Decoded,
    DecoderConfig, JavaString, ObjectInputStream, ReadContext,
};
pub use render::{GraphRenderer, GraphVisitor, NullVisitor, RenderConfig, StatsVisitor};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
