//! Decoded object graph.
//!
//! Every referenceable object decoded from a stream lives in a [`Heap`], an
//! append-only arena indexed by [`ObjectId`]. Objects point at each other by id
//! rather than by ownership, so shared and circular references are plain
//! copies of the same id. Two values refer to the same object exactly when
//! their ids are equal.

use crate::class::{ClassDesc, TypeCode};
use crate::input::JavaString;
use bytes::Bytes;
use std::collections::HashSet;
use std::fmt;

/// Identity of an object in a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Position of the object in its heap, in allocation order
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A field value, array element or decoded object reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The null reference
    Null,
    /// Reference to an object in the heap
    Object(ObjectId),
    /// `byte`
    Byte(i8),
    /// `char`, a single UTF-16 code unit
    Char(u16),
    /// `double`
    Double(f64),
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `short`
    Short(i16),
    /// `boolean`
    Boolean(bool),
}

impl Value {
    /// Returns the referenced object id, if this is an object reference
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns true for the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value of an `int`
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value of a `long`
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if the value is a primitive rather than a reference
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Null | Value::Object(_))
    }

    /// Name of the value's type as written in the source language
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Object(_) => "object",
            Value::Byte(_) => "byte",
            Value::Char(_) => "char",
            Value::Double(_) => "double",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Short(_) => "short",
            Value::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Object(id) => write!(f, "{id}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) if !c.is_control() => write!(f, "'{c}'"),
                _ => write!(f, "'\\u{:04x}'", v),
            },
            Value::Double(v) => write!(f, "{v:?}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// One element of a stream: an object or a run of block data
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// An object (possibly null)
    Object(Value),
    /// Opaque block-data bytes
    BlockData(Bytes),
}

impl Content {
    /// Returns the object value if this content is an object
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Content::Object(value) => Some(value),
            Content::BlockData(_) => None,
        }
    }

    /// Returns the bytes if this content is block data
    pub fn as_block_data(&self) -> Option<&Bytes> {
        match self {
            Content::BlockData(data) => Some(data),
            Content::Object(_) => None,
        }
    }
}

/// Length encoding used for a string on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringForm {
    /// 16-bit byte length
    Short,
    /// 64-bit byte length
    Long,
}

/// A decoded string object
#[derive(Debug, Clone, PartialEq)]
pub struct StringObject {
    /// UTF-16 text
    pub text: JavaString,
    /// Wire encoding form
    pub form: StringForm,
}

/// A class object, wrapping its descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ClassObject {
    /// The class descriptor
    pub desc: ObjectId,
}

/// A decoded array
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayObject {
    /// The array class descriptor
    pub desc: ObjectId,
    /// Type of every element
    pub element: TypeCode,
    /// Elements in stream order
    pub values: Vec<Value>,
}

/// A decoded enum constant
#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstant {
    /// The enum class descriptor
    pub desc: ObjectId,
    /// Constant name
    pub name: String,
    /// Position in the registered constant table, if the enum is registered
    pub ordinal: Option<usize>,
}

/// Named field values in declared order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    /// Creates an empty field set
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty field set with room for `capacity` fields
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Returns the value of the named field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sets a field, replacing an existing value of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Iterates fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Data decoded for one class of an instance's hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct ClassData {
    /// Descriptor of the class this data belongs to
    pub desc: ObjectId,
    /// Fields assigned by the structural default
    pub fields: Fields,
    /// Values a handler chose to keep from its custom payload
    pub values: Vec<Value>,
    /// Custom payload left unconsumed by the read logic
    pub annotation: Vec<Content>,
}

impl ClassData {
    /// Creates empty class data for a descriptor
    pub fn new(desc: ObjectId) -> Self {
        Self {
            desc,
            fields: Fields::new(),
            values: Vec::new(),
            annotation: Vec::new(),
        }
    }
}

/// An ordinary instance with per-class data, root class first
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Descriptor of the instance's own class
    pub desc: ObjectId,
    /// One entry per class in the hierarchy, root first
    pub class_data: Vec<ClassData>,
}

impl Instance {
    /// Creates an instance with no class data yet
    pub fn new(desc: ObjectId) -> Self {
        Self {
            desc,
            class_data: Vec::new(),
        }
    }

    /// Looks up a field by name, most-derived class first
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.class_data
            .iter()
            .rev()
            .find_map(|data| data.fields.get(name))
    }

    /// Class data of a specific descriptor
    pub fn level(&self, desc: ObjectId) -> Option<&ClassData> {
        self.class_data.iter().find(|data| data.desc == desc)
    }

    /// Handler-kept values across all classes, root first
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.class_data.iter().flat_map(|data| data.values.iter())
    }
}

/// A list or set produced by a collection handler
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    /// Stream class name
    pub class_name: String,
    /// Elements in stream order
    pub items: Vec<Value>,
}

/// A map produced by a map handler
#[derive(Debug, Clone, PartialEq)]
pub struct MapObject {
    /// Stream class name
    pub class_name: String,
    /// Entries in stream order
    pub entries: Vec<(Value, Value)>,
}

/// A referenceable object
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// A class object
    Class(ClassObject),
    /// A class descriptor
    ClassDesc(ClassDesc),
    /// A string
    String(StringObject),
    /// An array
    Array(ArrayObject),
    /// An enum constant
    Enum(EnumConstant),
    /// An ordinary instance
    Instance(Instance),
    /// A list or set substituted by a handler
    Collection(Collection),
    /// A map substituted by a handler
    Map(MapObject),
}

impl Object {
    /// Short name of the object kind
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Class(_) => "class",
            Object::ClassDesc(_) => "classdesc",
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Enum(_) => "enum",
            Object::Instance(_) => "object",
            Object::Collection(_) => "collection",
            Object::Map(_) => "map",
        }
    }
}

/// Arena owning every object decoded from one stream
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    /// Creates an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object and returns its id
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    /// Returns the object with the given id
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.0)
    }

    /// Returns the object with the given id mutably
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(id.0)
    }

    /// Resolves a value to the object it references
    pub fn resolve(&self, value: &Value) -> Option<&Object> {
        value.as_object().and_then(|id| self.get(id))
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no objects were decoded
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates all objects in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, object)| (ObjectId(i), object))
    }

    /// Returns the class descriptor with the given id
    pub fn class_desc(&self, id: ObjectId) -> Option<&ClassDesc> {
        match self.get(id) {
            Some(Object::ClassDesc(desc)) => Some(desc),
            _ => None,
        }
    }

    /// Returns the text of the string with the given id
    pub fn string(&self, id: ObjectId) -> Option<&JavaString> {
        match self.get(id) {
            Some(Object::String(s)) => Some(&s.text),
            _ => None,
        }
    }

    /// Returns the instance with the given id
    pub fn instance(&self, id: ObjectId) -> Option<&Instance> {
        match self.get(id) {
            Some(Object::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Returns the array with the given id
    pub fn array(&self, id: ObjectId) -> Option<&ArrayObject> {
        match self.get(id) {
            Some(Object::Array(array)) => Some(array),
            _ => None,
        }
    }

    /// Returns the display name of a class descriptor
    pub fn class_name(&self, desc: ObjectId) -> Option<&str> {
        self.class_desc(desc).map(ClassDesc::display_name)
    }

    /// Returns the class name of the object a value references
    pub fn class_name_of(&self, value: &Value) -> Option<&str> {
        match self.resolve(value)? {
            Object::Class(class) => self.class_name(class.desc),
            Object::ClassDesc(desc) => Some(desc.display_name()),
            Object::String(_) => Some("java.lang.String"),
            Object::Array(array) => self.class_name(array.desc),
            Object::Enum(constant) => self.class_name(constant.desc),
            Object::Instance(instance) => self.class_name(instance.desc),
            Object::Collection(collection) => Some(&collection.class_name),
            Object::Map(map) => Some(&map.class_name),
        }
    }

    /// Compares two values by content rather than identity
    ///
    /// Objects reached through cycles compare equal when their structure
    /// matches; floating point values compare by bit pattern.
    pub fn structurally_equal(&self, a: &Value, b: &Value) -> bool {
        let mut assumed = HashSet::new();
        self.values_equal(a, b, &mut assumed)
    }

    fn values_equal(&self, a: &Value, b: &Value, assumed: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => self.objects_equal(*x, *y, assumed),
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
            _ => a == b,
        }
    }

    fn all_equal<'v>(
        &self,
        a: impl ExactSizeIterator<Item = &'v Value>,
        b: impl ExactSizeIterator<Item = &'v Value>,
        assumed: &mut HashSet<(ObjectId, ObjectId)>,
    ) -> bool {
        a.len() == b.len() && a.zip(b).all(|(x, y)| self.values_equal(x, y, assumed))
    }

    fn contents_equal(&self, a: &[Content], b: &[Content], assumed: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|pair| match pair {
                (Content::BlockData(x), Content::BlockData(y)) => x == y,
                (Content::Object(x), Content::Object(y)) => self.values_equal(x, y, assumed),
                _ => false,
            })
    }

    fn desc_refs_equal(&self, a: ObjectId, b: ObjectId, assumed: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
        self.objects_equal(a, b, assumed)
    }

    fn objects_equal(&self, a: ObjectId, b: ObjectId, assumed: &mut HashSet<(ObjectId, ObjectId)>) -> bool {
        if a == b || !assumed.insert((a, b)) {
            return true;
        }
        let (Some(x), Some(y)) = (self.get(a), self.get(b)) else {
            return false;
        };
        match (x, y) {
            (Object::Class(x), Object::Class(y)) => self.desc_refs_equal(x.desc, y.desc, assumed),
            (Object::ClassDesc(x), Object::ClassDesc(y)) => {
                x.kind() == y.kind()
                    && self.contents_equal(x.annotation(), y.annotation(), assumed)
                    && match (x.super_desc(), y.super_desc()) {
                        (Some(sx), Some(sy)) => self.desc_refs_equal(sx, sy, assumed),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Object::String(x), Object::String(y)) => x.text == y.text,
            (Object::Array(x), Object::Array(y)) => {
                x.element == y.element
                    && self.desc_refs_equal(x.desc, y.desc, assumed)
                    && self.all_equal(x.values.iter(), y.values.iter(), assumed)
            }
            (Object::Enum(x), Object::Enum(y)) => {
                x.name == y.name && self.desc_refs_equal(x.desc, y.desc, assumed)
            }
            (Object::Instance(x), Object::Instance(y)) => {
                self.desc_refs_equal(x.desc, y.desc, assumed)
                    && x.class_data.len() == y.class_data.len()
                    && x.class_data.iter().zip(&y.class_data).all(|(dx, dy)| {
                        dx.fields.len() == dy.fields.len()
                            && dx.fields.iter().zip(dy.fields.iter()).all(|((nx, vx), (ny, vy))| {
                                nx == ny && self.values_equal(vx, vy, assumed)
                            })
                            && self.all_equal(dx.values.iter(), dy.values.iter(), assumed)
                            && self.contents_equal(&dx.annotation, &dy.annotation, assumed)
                    })
            }
            (Object::Collection(x), Object::Collection(y)) => {
                x.class_name == y.class_name && self.all_equal(x.items.iter(), y.items.iter(), assumed)
            }
            (Object::Map(x), Object::Map(y)) => {
                x.class_name == y.class_name
                    && x.entries.len() == y.entries.len()
                    && x.entries.iter().zip(&y.entries).all(|((kx, vx), (ky, vy))| {
                        self.values_equal(kx, ky, assumed) && self.values_equal(vx, vy, assumed)
                    })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(heap: &mut Heap, text: &str) -> Value {
        Value::Object(heap.alloc(Object::String(StringObject {
            text: JavaString::from(text),
            form: StringForm::Short,
        })))
    }

    #[test]
    fn test_fields_insert_replaces() {
        let mut fields = Fields::new();
        fields.insert("a", Value::Int(1));
        fields.insert("b", Value::Int(2));
        fields.insert("a", Value::Int(3));

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a"), Some(&Value::Int(3)));
        let names: Vec<_> = fields.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_structural_equality_vs_identity() {
        let mut heap = Heap::new();
        let a = string(&mut heap, "same");
        let b = string(&mut heap, "same");
        let c = string(&mut heap, "other");

        assert_ne!(a, b);
        assert!(heap.structurally_equal(&a, &b));
        assert!(!heap.structurally_equal(&a, &c));
    }

    #[test]
    fn test_structural_equality_handles_cycles() {
        let mut heap = Heap::new();
        let x = heap.alloc(Object::Collection(Collection {
            class_name: "list".into(),
            items: vec![],
        }));
        let y = heap.alloc(Object::Collection(Collection {
            class_name: "list".into(),
            items: vec![],
        }));
        // Each list contains itself
        for id in [x, y] {
            if let Some(Object::Collection(c)) = heap.get_mut(id) {
                c.items.push(Value::Object(id));
            }
        }

        assert!(heap.structurally_equal(&Value::Object(x), &Value::Object(y)));
    }

    #[test]
    fn test_nan_compares_by_bits() {
        let heap = Heap::new();
        assert!(heap.structurally_equal(&Value::Double(f64::NAN), &Value::Double(f64::NAN)));
        assert!(!heap.structurally_equal(&Value::Double(0.0), &Value::Double(-0.0)));
    }
}
