//! Graph traversal hooks.
//!
//! This module provides the [`GraphVisitor`] trait and [`walk`], which visits
//! every object reachable from a set of contents exactly once.

use crate::class::ClassDesc;
use crate::graph::{
    ArrayObject, ClassObject, Collection, Content, EnumConstant, Heap, Instance, MapObject,
    Object, ObjectId, StringObject, Value,
};
use std::collections::HashSet;

/// Callbacks for each kind of node in a decoded graph.
///
/// Every method has an empty default, so implementations only override the
/// nodes they care about.
///
/// # Example
///
/// ```
/// use obstream_core::graph::{Instance, ObjectId};
/// use obstream_core::render::GraphVisitor;
///
/// struct InstanceCounter(usize);
///
/// impl GraphVisitor for InstanceCounter {
///     fn visit_instance(&mut self, _id: ObjectId, _instance: &Instance) {
///         self.0 += 1;
///     }
/// }
/// ```
pub trait GraphVisitor {
    /// Visit a run of block data
    fn visit_block_data(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// Visit a class object
    fn visit_class(&mut self, id: ObjectId, class: &ClassObject) {
        let _ = (id, class);
    }

    /// Visit a class descriptor
    fn visit_class_desc(&mut self, id: ObjectId, desc: &ClassDesc) {
        let _ = (id, desc);
    }

    /// Visit a string
    fn visit_string(&mut self, id: ObjectId, string: &StringObject) {
        let _ = (id, string);
    }

    /// Visit an array
    fn visit_array(&mut self, id: ObjectId, array: &ArrayObject) {
        let _ = (id, array);
    }

    /// Visit an enum constant
    fn visit_enum(&mut self, id: ObjectId, constant: &EnumConstant) {
        let _ = (id, constant);
    }

    /// Visit an ordinary instance
    fn visit_instance(&mut self, id: ObjectId, instance: &Instance) {
        let _ = (id, instance);
    }

    /// Visit a list or set
    fn visit_collection(&mut self, id: ObjectId, collection: &Collection) {
        let _ = (id, collection);
    }

    /// Visit a map
    fn visit_map(&mut self, id: ObjectId, map: &MapObject) {
        let _ = (id, map);
    }
}

/// A visitor that ignores everything
pub struct NullVisitor;

impl GraphVisitor for NullVisitor {}

/// A visitor that counts nodes by kind
#[derive(Debug, Default)]
pub struct StatsVisitor {
    /// Number of instances
    pub instance_count: usize,
    /// Number of arrays
    pub array_count: usize,
    /// Number of strings
    pub string_count: usize,
    /// Number of enum constants
    pub enum_count: usize,
    /// Number of class descriptors
    pub class_desc_count: usize,
    /// Number of class objects
    pub class_count: usize,
    /// Number of lists and sets
    pub collection_count: usize,
    /// Number of maps
    pub map_count: usize,
    /// Total block data bytes
    pub block_data_bytes: usize,
}

impl GraphVisitor for StatsVisitor {
    fn visit_block_data(&mut self, data: &[u8]) {
        self.block_data_bytes += data.len();
    }

    fn visit_class(&mut self, _id: ObjectId, _class: &ClassObject) {
        self.class_count += 1;
    }

    fn visit_class_desc(&mut self, _id: ObjectId, _desc: &ClassDesc) {
        self.class_desc_count += 1;
    }

    fn visit_string(&mut self, _id: ObjectId, _string: &StringObject) {
        self.string_count += 1;
    }

    fn visit_array(&mut self, _id: ObjectId, _array: &ArrayObject) {
        self.array_count += 1;
    }

    fn visit_enum(&mut self, _id: ObjectId, _constant: &EnumConstant) {
        self.enum_count += 1;
    }

    fn visit_instance(&mut self, _id: ObjectId, _instance: &Instance) {
        self.instance_count += 1;
    }

    fn visit_collection(&mut self, _id: ObjectId, _collection: &Collection) {
        self.collection_count += 1;
    }

    fn visit_map(&mut self, _id: ObjectId, _map: &MapObject) {
        self.map_count += 1;
    }
}

/// Visit every object reachable from `contents`, each once, depth first
pub fn walk(heap: &Heap, contents: &[Content], visitor: &mut impl GraphVisitor) {
    let mut seen = HashSet::new();
    let mut pending: Vec<&Content> = contents.iter().rev().collect();
    let mut values: Vec<Value> = Vec::new();

    loop {
        if let Some(value) = values.pop() {
            let Some(id) = value.as_object() else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            let Some(object) = heap.get(id) else {
                continue;
            };
            let mut children: Vec<Value> = Vec::new();
            match object {
                Object::Class(class) => {
                    visitor.visit_class(id, class);
                    children.push(Value::Object(class.desc));
                }
                Object::ClassDesc(desc) => {
                    visitor.visit_class_desc(id, desc);
                    children.extend(desc.super_desc().map(Value::Object));
                    pending.extend(desc.annotation().iter().rev());
                }
                Object::String(string) => visitor.visit_string(id, string),
                Object::Array(array) => {
                    visitor.visit_array(id, array);
                    children.push(Value::Object(array.desc));
                    children.extend(array.values.iter().filter(|v| !v.is_primitive()));
                }
                Object::Enum(constant) => {
                    visitor.visit_enum(id, constant);
                    children.push(Value::Object(constant.desc));
                }
                Object::Instance(instance) => {
                    visitor.visit_instance(id, instance);
                    children.push(Value::Object(instance.desc));
                    for data in &instance.class_data {
                        children.extend(data.fields.iter().map(|(_, v)| *v));
                        children.extend(data.values.iter().copied());
                        pending.extend(data.annotation.iter().rev());
                    }
                }
                Object::Collection(collection) => {
                    visitor.visit_collection(id, collection);
                    children.extend(collection.items.iter().copied());
                }
                Object::Map(map) => {
                    visitor.visit_map(id, map);
                    for (key, value) in &map.entries {
                        children.push(*key);
                        children.push(*value);
                    }
                }
            }
            values.extend(children.into_iter().rev());
            continue;
        }

        match pending.pop() {
            Some(Content::BlockData(data)) => visitor.visit_block_data(data),
            Some(Content::Object(value)) => values.push(*value),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StringForm;
    use crate::input::JavaString;
    use bytes::Bytes;

    #[test]
    fn test_null_visitor() {
        let heap = Heap::new();
        walk(&heap, &[Content::Object(Value::Null)], &mut NullVisitor);
    }

    #[test]
    fn test_stats_counts_shared_objects_once() {
        let mut heap = Heap::new();
        let s = heap.alloc(Object::String(StringObject {
            text: JavaString::from("x"),
            form: StringForm::Short,
        }));
        let list = heap.alloc(Object::Collection(Collection {
            class_name: "java.util.ArrayList".into(),
            items: vec![Value::Object(s), Value::Object(s), Value::Int(3)],
        }));
        let contents = vec![
            Content::Object(Value::Object(list)),
            Content::BlockData(Bytes::from_static(&[1, 2, 3])),
            Content::Object(Value::Object(s)),
        ];

        let mut stats = StatsVisitor::default();
        walk(&heap, &contents, &mut stats);

        assert_eq!(stats.collection_count, 1);
        assert_eq!(stats.string_count, 1);
        assert_eq!(stats.block_data_bytes, 3);
    }
}
