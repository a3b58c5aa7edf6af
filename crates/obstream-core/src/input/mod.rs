//! Object stream decoding.
//!
//! [`ObjectInputStream`] reads a serialized object stream from an in-memory
//! buffer. Decoding is single-threaded and synchronous; a stream instance owns
//! its handle table, heap and frame stack and is used by one caller at a time.
//!
//! ## Stream Layout
//!
//! A stream starts with a two-byte magic number and a two-byte version,
//! followed by a sequence of contents. Each content is either a tagged object
//! or a run of block data:
//!
//! ```text
//! AC ED 00 05  77 04 DE AD BE EF  74 00 02 68 69  ...
//! magic ver    block data (4)     string "hi"
//! ```
//!
//! The decoder alternates between two modes. In block-data mode, primitive
//! reads consume bytes from length-prefixed blocks and may span several
//! consecutive blocks. Outside block-data mode they read the raw stream; tags,
//! descriptors and field values are always read that way.
//!
//! The implementation is split across several files:
//!
//! - `block`: mode switching and block framing
//! - `primitive`: fixed-size reads and modified UTF-8
//! - `object`: tag dispatch and the per-tag readers
//! - `callback`: class data, field reads and the [`ReadContext`] handed to handlers

mod block;
mod callback;
mod object;
mod primitive;


pub use callback::ReadContext;
pub use primitive::{decode_modified_utf8, JavaString};

use crate::class::Registry;
use crate::error::{Error, Result};
use crate::graph::{Content, Heap};
use crate::handles::HandleTable;
use bytes::Bytes;
use callback::Frame;
use std::path::Path;
use tracing::debug;

/// Stream magic number
pub const STREAM_MAGIC: u16 = 0xACED;
/// Supported stream version
pub const STREAM_VERSION: u16 = 5;

/// Lowest tag value
pub const TC_BASE: u8 = 0x70;
/// Null reference
pub const TC_NULL: u8 = 0x70;
/// Back-reference to a handle
pub const TC_REFERENCE: u8 = 0x71;
/// Class descriptor
pub const TC_CLASSDESC: u8 = 0x72;
/// Ordinary object
pub const TC_OBJECT: u8 = 0x73;
/// String with a 16-bit length
pub const TC_STRING: u8 = 0x74;
/// Array
pub const TC_ARRAY: u8 = 0x75;
/// Class object
pub const TC_CLASS: u8 = 0x76;
/// Block data with an 8-bit length
pub const TC_BLOCKDATA: u8 = 0x77;
/// End of custom data
pub const TC_ENDBLOCKDATA: u8 = 0x78;
/// Handle table reset
pub const TC_RESET: u8 = 0x79;
/// Block data with a 32-bit length
pub const TC_BLOCKDATALONG: u8 = 0x7A;
/// Exception thrown while writing
pub const TC_EXCEPTION: u8 = 0x7B;
/// String with a 64-bit length
pub const TC_LONGSTRING: u8 = 0x7C;
/// Proxy class descriptor
pub const TC_PROXYCLASSDESC: u8 = 0x7D;
/// Enum constant
pub const TC_ENUM: u8 = 0x7E;
/// Highest tag value
pub const TC_MAX: u8 = 0x7E;

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Install the built-in handlers for boxed primitives and collections
    pub register_builtins: bool,
    /// Maximum object nesting depth
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            register_builtins: true,
            max_depth: 512,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether built-in handlers are installed
    pub fn register_builtins(mut self, enabled: bool) -> Self {
        self.register_builtins = enabled;
        self
    }

    /// Sets the maximum object nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Decoder for one serialized object stream
#[derive(Debug)]
pub struct ObjectInputStream {
    data: Bytes,
    offset: usize,
    block_mode: bool,
    remaining: usize,
    handles: HandleTable,
    heap: Heap,
    registry: Registry,
    frames: Vec<Frame>,
    depth: usize,
    config: DecoderConfig,
}

impl ObjectInputStream {
    /// Opens a stream with the default configuration
    ///
    /// Fails if the header is missing, truncated or not a supported version.
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        Self::with_config(data, DecoderConfig::default())
    }

    /// Opens a stream with a custom configuration
    pub fn with_config(data: impl Into<Bytes>, config: DecoderConfig) -> Result<Self> {
        let registry = if config.register_builtins {
            Registry::with_builtins()
        } else {
            Registry::new()
        };
        Self::with_registry(data, registry, config)
    }

    /// Opens a stream that resolves classes against the given registry
    pub fn with_registry(
        data: impl Into<Bytes>,
        registry: Registry,
        config: DecoderConfig,
    ) -> Result<Self> {
        let mut stream = Self {
            data: data.into(),
            offset: 0,
            block_mode: false,
            remaining: 0,
            handles: HandleTable::new(),
            heap: Heap::new(),
            registry,
            frames: Vec::new(),
            depth: 0,
            config,
        };
        stream.read_header()?;
        stream.set_block_data_mode(true)?;
        Ok(stream)
    }

    fn read_header(&mut self) -> Result<()> {
        let magic = self.read_unsigned_short()?;
        if magic != STREAM_MAGIC {
            return Err(Error::stream_corrupted(
                0,
                format!("invalid stream magic: {:04X}", magic),
            ));
        }
        let version = self.read_unsigned_short()?;
        if version != STREAM_VERSION {
            return Err(Error::stream_corrupted(
                2,
                format!("unsupported stream version: {}", version),
            ));
        }
        debug!("Opened object stream of {} bytes", self.data.len());
        Ok(())
    }

    /// Reads the next content: a run of block data or one object
    ///
    /// Consecutive blocks are merged into a single block-data content.
    /// Returns `Ok(None)` once the input is exhausted.
    pub fn read_content(&mut self) -> Result<Option<Content>> {
        if self.block_mode {
            self.peek1()?;
            if self.remaining > 0 {
                let block = self.read_bytes(usize::MAX)?;
                return Ok(Some(Content::BlockData(block)));
            }
        }
        if self.is_at_end() {
            return Ok(None);
        }
        self.read_object().map(|value| Some(Content::Object(value)))
    }

    /// Iterates the remaining contents of the stream
    ///
    /// The iterator ends after the input is exhausted or after the first
    /// error, which it yields.
    pub fn contents(&mut self) -> Contents<'_> {
        Contents {
            stream: self,
            done: false,
        }
    }

    /// Current byte offset in the input
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether every input byte has been consumed
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Whether primitive reads currently consume block data
    pub fn block_data_mode(&self) -> bool {
        self.block_mode
    }

    /// Objects decoded so far
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Consumes the stream and returns its heap
    pub fn into_heap(self) -> Heap {
        self.heap
    }

    /// Live wire handles
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Class registry used for resolution
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Class registry, for registering handlers before reading
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

/// Iterator over stream contents, created by [`ObjectInputStream::contents`]
#[derive(Debug)]
pub struct Contents<'a> {
    stream: &'a mut ObjectInputStream,
    done: bool,
}

impl Iterator for Contents<'_> {
    type Item = Result<Content>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.stream.read_content() {
            Ok(Some(content)) => Some(Ok(content)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Every top-level content of a stream with the heap they refer into
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Top-level contents in stream order
    pub contents: Vec<Content>,
    /// Objects referenced by the contents
    pub heap: Heap,
}

/// Decode a whole stream held in memory
pub fn decode_bytes(data: impl Into<Bytes>) -> Result<Decoded> {
    decode_bytes_with_config(data, DecoderConfig::default())
}

/// Decode a whole stream held in memory with custom configuration
pub fn decode_bytes_with_config(data: impl Into<Bytes>, config: DecoderConfig) -> Result<Decoded> {
    let mut stream = ObjectInputStream::with_config(data, config)?;
    let contents = stream.read_everything()?;
    debug!(
        "Decoded {} contents, {} objects",
        contents.len(),
        stream.heap().len()
    );
    Ok(Decoded {
        contents,
        heap: stream.into_heap(),
    })
}

/// Decode a stream stored in a file
///
/// This is a convenience function that reads the file and decodes it.
pub fn decode_file(path: impl AsRef<Path>) -> Result<Decoded> {
    decode_file_with_config(path, DecoderConfig::default())
}

/// Decode a stream stored in a file with custom configuration
pub fn decode_file_with_config(path: impl AsRef<Path>, config: DecoderConfig) -> Result<Decoded> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    decode_bytes_with_config(data, config)
}
