//! Human-readable rendering of decoded graphs.
//!
//! [`GraphRenderer`] prints stream contents as an indented tree. Each object
//! is expanded at its first occurrence; later occurrences print only its id,
//! so shared and circular references stay finite and recognizable:
//!
//! ```text
//! object @3 com.example.Node
//!   com.example.Node
//!     value = int 1
//!     next = object @3 (see above)
//! ```
//!
//! ## Extensibility
//!
//! The [`GraphVisitor`] trait and [`walk`] function allow other traversals
//! (statistics, exports) without going through text output.

mod visitor;

pub use visitor::{walk, GraphVisitor, NullVisitor, StatsVisitor};

use crate::class::ClassDesc;
use crate::graph::{Content, Heap, Object, ObjectId, Value};
use std::collections::HashSet;
use std::fmt::{self, Write as FmtWrite};

/// Configuration for graph rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Print ids on first occurrences, not only on back-references
    pub show_ids: bool,
    /// Nesting depth after which objects are no longer expanded
    pub max_depth: usize,
    /// Maximum number of block data bytes printed in hex
    pub max_block_preview: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            show_ids: true,
            max_depth: 64,
            max_block_preview: 32,
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether ids are printed on first occurrences
    pub fn show_ids(mut self, show: bool) -> Self {
        self.show_ids = show;
        self
    }

    /// Sets the expansion depth limit
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets how many block data bytes are printed
    pub fn max_block_preview(mut self, bytes: usize) -> Self {
        self.max_block_preview = bytes;
        self
    }
}

/// Renders decoded contents as an indented tree
#[derive(Debug, Clone)]
pub struct GraphRenderer<'h> {
    heap: &'h Heap,
    config: RenderConfig,
}

impl<'h> GraphRenderer<'h> {
    /// Creates a renderer with default configuration
    pub fn new(heap: &'h Heap) -> Self {
        Self::with_config(heap, RenderConfig::default())
    }

    /// Creates a renderer with custom configuration
    pub fn with_config(heap: &'h Heap, config: RenderConfig) -> Self {
        Self { heap, config }
    }

    /// Renders contents to a string
    pub fn render(&self, contents: &[Content]) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail
        let _ = self.write_to(&mut output, contents);
        output
    }

    /// Renders contents into any formatter sink
    pub fn write_to(&self, writer: &mut impl FmtWrite, contents: &[Content]) -> fmt::Result {
        let mut tree = TreeWriter {
            writer,
            heap: self.heap,
            config: &self.config,
            indent_level: 0,
            seen: HashSet::new(),
        };
        for content in contents {
            tree.write_content(content)?;
        }
        Ok(())
    }
}

struct TreeWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    heap: &'a Heap,
    config: &'a RenderConfig,
    indent_level: usize,
    seen: HashSet<ObjectId>,
}

impl<W: FmtWrite> TreeWriter<'_, W> {
    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_content(&mut self, content: &Content) -> fmt::Result {
        match content {
            Content::BlockData(data) => {
                self.write_indent()?;
                self.write_block(data)
            }
            Content::Object(value) => {
                self.write_indent()?;
                self.write_value(value)
            }
        }
    }

    fn write_block(&mut self, data: &[u8]) -> fmt::Result {
        write!(self.writer, "block ({} bytes)", data.len())?;
        let shown = data.len().min(self.config.max_block_preview);
        for byte in &data[..shown] {
            write!(self.writer, " {:02x}", byte)?;
        }
        if shown < data.len() {
            write!(self.writer, " ...")?;
        }
        writeln!(self.writer)
    }

    fn write_labeled(&mut self, label: &str, value: &Value) -> fmt::Result {
        self.write_indent()?;
        write!(self.writer, "{} = ", label)?;
        self.write_value(value)
    }

    /// Writes the rest of the current line for a value, then its children
    fn write_value(&mut self, value: &Value) -> fmt::Result {
        match value {
            Value::Object(id) => self.write_object(*id),
            Value::Null => writeln!(self.writer, "null"),
            other => writeln!(self.writer, "{} {}", other.type_name(), other),
        }
    }

    fn write_object(&mut self, id: ObjectId) -> fmt::Result {
        let heap = self.heap;
        let Some(object) = heap.get(id) else {
            return writeln!(self.writer, "<dangling {}>", id);
        };
        if self.seen.contains(&id) {
            return writeln!(self.writer, "{} {} (see above)", object.kind(), id);
        }
        if self.indent_level >= self.config.max_depth {
            return writeln!(self.writer, "{} {} ...", object.kind(), id);
        }
        self.seen.insert(id);

        write!(self.writer, "{}", object.kind())?;
        if self.config.show_ids {
            write!(self.writer, " {}", id)?;
        }
        match object {
            Object::String(string) => {
                writeln!(self.writer, " \"{}\"", escape_string(&string.text.to_string_lossy()))
            }
            Object::Class(class) => {
                writeln!(self.writer, " {}", name_of(heap, class.desc))
            }
            Object::ClassDesc(desc) => self.write_class_desc(desc),
            Object::Enum(constant) => {
                writeln!(self.writer, " {}.{}", name_of(heap, constant.desc), constant.name)
            }
            Object::Array(array) => {
                writeln!(
                    self.writer,
                    " {} ({})",
                    name_of(heap, array.desc),
                    array.values.len()
                )?;
                self.indent();
                for (i, value) in array.values.iter().enumerate() {
                    self.write_labeled(&format!("[{}]", i), value)?;
                }
                self.dedent();
                Ok(())
            }
            Object::Instance(instance) => {
                writeln!(self.writer, " {}", name_of(heap, instance.desc))?;
                self.indent();
                for data in &instance.class_data {
                    let name = name_of(heap, data.desc);
                    self.writeln(name)?;
                    self.indent();
                    for (name, value) in data.fields.iter() {
                        self.write_labeled(name, value)?;
                    }
                    for (i, value) in data.values.iter().enumerate() {
                        self.write_labeled(&format!("#{}", i), value)?;
                    }
                    self.write_annotation(&data.annotation)?;
                    self.dedent();
                }
                self.dedent();
                Ok(())
            }
            Object::Collection(collection) => {
                writeln!(
                    self.writer,
                    " {} ({})",
                    collection.class_name,
                    collection.items.len()
                )?;
                self.indent();
                for (i, value) in collection.items.iter().enumerate() {
                    self.write_labeled(&format!("[{}]", i), value)?;
                }
                self.dedent();
                Ok(())
            }
            Object::Map(map) => {
                writeln!(self.writer, " {} ({})", map.class_name, map.entries.len())?;
                self.indent();
                for (key, value) in &map.entries {
                    self.write_labeled("key", key)?;
                    self.write_labeled("value", value)?;
                }
                self.dedent();
                Ok(())
            }
        }
    }

    fn write_class_desc(&mut self, desc: &ClassDesc) -> fmt::Result {
        if desc.is_proxy() {
            writeln!(self.writer, " proxy [{}]", desc.interfaces().join(", "))?;
        } else {
            writeln!(
                self.writer,
                " {} suid={} flags={}",
                desc.display_name(),
                desc.suid().unwrap_or_default(),
                desc.flags()
            )?;
        }
        self.indent();
        for field in desc.fields() {
            let line = match &field.class_name {
                Some(class_name) => format!("field {} {} {}", field.typecode.as_char(), field.name, class_name),
                None => format!("field {} {}", field.typecode.as_char(), field.name),
            };
            self.writeln(&line)?;
        }
        self.write_annotation(desc.annotation())?;
        if let Some(super_desc) = desc.super_desc() {
            self.write_labeled("super", &Value::Object(super_desc))?;
        }
        self.dedent();
        Ok(())
    }

    fn write_annotation(&mut self, annotation: &[Content]) -> fmt::Result {
        if annotation.is_empty() {
            return Ok(());
        }
        self.writeln("annotation:")?;
        self.indent();
        for content in annotation {
            self.write_content(content)?;
        }
        self.dedent();
        Ok(())
    }

}

fn name_of(heap: &Heap, desc: ObjectId) -> &str {
    heap.class_name(desc).unwrap_or("?")
}

/// Escape a string for display inside double quotes
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_control() => {
                result.push_str(&format!("\\u{{{:04x}}}", c as u32));
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Collection, StringForm, StringObject};
    use crate::input::JavaString;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("a\"b\\c\n"), "a\\\"b\\\\c\\n");
        assert_eq!(escape_string("\u{1}"), "\\u{0001}");
    }

    #[test]
    fn test_render_back_reference() {
        let mut heap = Heap::new();
        let s = heap.alloc(Object::String(StringObject {
            text: JavaString::from("hi"),
            form: StringForm::Short,
        }));
        let list = heap.alloc(Object::Collection(Collection {
            class_name: "java.util.ArrayList".into(),
            items: vec![Value::Object(s), Value::Object(s), Value::Null, Value::Int(4)],
        }));
        let contents = vec![
            Content::BlockData(Bytes::from_static(&[0xde, 0xad])),
            Content::Object(Value::Object(list)),
        ];

        let output = GraphRenderer::new(&heap).render(&contents);
        let expected = "\
block (2 bytes) de ad
collection @1 java.util.ArrayList (4)
  [0] = string @0 \"hi\"
  [1] = string @0 (see above)
  [2] = null
  [3] = int 4
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_render_without_ids_and_preview_limit() {
        let heap = Heap::new();
        let contents = vec![Content::BlockData(Bytes::from_static(&[1, 2, 3]))];
        let config = RenderConfig::new().show_ids(false).max_block_preview(2);

        let output = GraphRenderer::with_config(&heap, config).render(&contents);
        assert_eq!(output, "block (3 bytes) 01 02 ...\n");
    }
}
