//! Built-in handlers for common platform classes.
//!
//! Boxed primitives resolve to their primitive value. Lists, sets and maps
//! read their custom payload and resolve to a [`Collection`] or [`MapObject`]
//! holding the elements in stream order.

use crate::class::{Registry, SerializableHandler};
use crate::error::{Error, Result};
use crate::graph::{Collection, Heap, MapObject, Object, ObjectId, Value};
use crate::input::ReadContext;

const BOXED_PRIMITIVES: &[&str] = &[
    "java.lang.Byte",
    "java.lang.Short",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
    "java.lang.Character",
    "java.lang.Boolean",
];

/// Install every built-in handler into a registry
pub fn register_builtins(registry: &mut Registry) {
    for name in BOXED_PRIMITIVES {
        registry.register_serializable(*name, BoxedPrimitive);
    }
    registry
        .register_serializable("java.util.ArrayList", ListHandler::ArrayList)
        .register_serializable("java.util.LinkedList", ListHandler::Sized)
        .register_serializable("java.util.ArrayDeque", ListHandler::Sized)
        .register_serializable("java.util.HashSet", SetHandler::hash())
        .register_serializable(
            "java.util.LinkedHashSet",
            SetHandler::hash().extending("java.util.HashSet"),
        )
        .register_serializable("java.util.TreeSet", SetHandler::tree())
        .register_serializable("java.util.HashMap", MapHandler::hash())
        .register_serializable(
            "java.util.LinkedHashMap",
            MapHandler::hash().extending("java.util.HashMap"),
        )
        .register_serializable("java.util.TreeMap", MapHandler::tree());
}

/// Resolves a boxed primitive to the value of its `value` field
#[derive(Debug, Clone, Copy)]
pub struct BoxedPrimitive;

impl SerializableHandler for BoxedPrimitive {
    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        Ok(heap
            .instance(this)
            .and_then(|instance| instance.field("value"))
            .copied())
    }
}

fn read_size(ctx: &mut ReadContext<'_>) -> Result<usize> {
    let size = ctx.read_int()?;
    usize::try_from(size).map_err(|_| Error::invalid_object(format!("invalid size: {size}")))
}

fn class_name(heap: &Heap, this: ObjectId) -> String {
    heap.instance(this)
        .and_then(|instance| heap.class_name(instance.desc))
        .unwrap_or_default()
        .to_owned()
}

fn kept_values(heap: &Heap, this: ObjectId) -> Vec<Value> {
    heap.instance(this)
        .map(|instance| instance.values().copied().collect())
        .unwrap_or_default()
}

/// List payload layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListHandler {
    /// Size from the `size` field, then capacity, then elements
    ArrayList,
    /// Size from the payload, then elements
    Sized,
}

impl SerializableHandler for ListHandler {
    fn read_object(&self, ctx: &mut ReadContext<'_>) -> Result<()> {
        let fields = ctx.read_fields()?;
        let size = match self {
            ListHandler::ArrayList => {
                let size = match fields.get("size") {
                    Some(Value::Int(size)) => usize::try_from(*size).ok(),
                    _ => None,
                }
                .ok_or_else(|| {
                    Error::invalid_object(format!("invalid size: {:?}", fields.get("size")))
                })?;
                ctx.read_int()?;
                size
            }
            ListHandler::Sized => read_size(ctx)?,
        };
        for _ in 0..size {
            let item = ctx.read_object()?;
            ctx.push_value(item);
        }
        Ok(())
    }

    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        let collection = Collection {
            class_name: class_name(heap, this),
            items: kept_values(heap, this),
        };
        Ok(Some(Value::Object(heap.alloc(Object::Collection(collection)))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordering {
    Hashed,
    Sorted,
}

/// Set payloads; duplicate elements are kept once
#[derive(Debug, Clone, Copy)]
pub struct SetHandler {
    ordering: Ordering,
    superclass: Option<&'static str>,
}

impl SetHandler {
    /// Capacity, load factor and size, then elements
    pub fn hash() -> Self {
        Self {
            ordering: Ordering::Hashed,
            superclass: None,
        }
    }

    /// Comparator and size, then elements
    pub fn tree() -> Self {
        Self {
            ordering: Ordering::Sorted,
            superclass: None,
        }
    }

    /// Declares the registered superclass
    pub fn extending(mut self, superclass: &'static str) -> Self {
        self.superclass = Some(superclass);
        self
    }
}

impl SerializableHandler for SetHandler {
    fn superclass(&self) -> Option<&str> {
        self.superclass
    }

    fn read_object(&self, ctx: &mut ReadContext<'_>) -> Result<()> {
        ctx.read_fields()?;
        match self.ordering {
            Ordering::Hashed => {
                ctx.read_int()?;
                ctx.read_float()?;
            }
            Ordering::Sorted => {
                // comparator
                ctx.read_object()?;
            }
        }
        let size = read_size(ctx)?;
        for _ in 0..size {
            let item = ctx.read_object()?;
            ctx.push_value(item);
        }
        Ok(())
    }

    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        let mut items = Vec::new();
        for value in kept_values(heap, this) {
            if !items.contains(&value) {
                items.push(value);
            }
        }
        let collection = Collection {
            class_name: class_name(heap, this),
            items,
        };
        Ok(Some(Value::Object(heap.alloc(Object::Collection(collection)))))
    }
}

/// Map payloads; a repeated key keeps its last value
#[derive(Debug, Clone, Copy)]
pub struct MapHandler {
    ordering: Ordering,
    superclass: Option<&'static str>,
}

impl MapHandler {
    /// Bucket count and size, then key/value pairs
    pub fn hash() -> Self {
        Self {
            ordering: Ordering::Hashed,
            superclass: None,
        }
    }

    /// Size, then key/value pairs
    pub fn tree() -> Self {
        Self {
            ordering: Ordering::Sorted,
            superclass: None,
        }
    }

    /// Declares the registered superclass
    pub fn extending(mut self, superclass: &'static str) -> Self {
        self.superclass = Some(superclass);
        self
    }
}

impl SerializableHandler for MapHandler {
    fn superclass(&self) -> Option<&str> {
        self.superclass
    }

    fn read_object(&self, ctx: &mut ReadContext<'_>) -> Result<()> {
        ctx.read_fields()?;
        if self.ordering == Ordering::Hashed {
            ctx.read_int()?;
        }
        let size = read_size(ctx)?;
        for _ in 0..size {
            let key = ctx.read_object()?;
            let value = ctx.read_object()?;
            ctx.push_value(key);
            ctx.push_value(value);
        }
        Ok(())
    }

    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for pair in kept_values(heap, this).chunks_exact(2) {
            let (key, value) = (pair[0], pair[1]);
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        let map = MapObject {
            class_name: class_name(heap, this),
            entries,
        };
        Ok(Some(Value::Object(heap.alloc(Object::Map(map)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::with_builtins();
        for name in BOXED_PRIMITIVES {
            assert!(registry.serializable(name).is_some(), "{name}");
        }
        assert!(registry.contains("java.util.ArrayList"));
        assert_eq!(
            registry.superclass_of("java.util.LinkedHashMap").as_deref(),
            Some("java.util.HashMap")
        );
        assert_eq!(registry.superclass_of("java.util.TreeMap"), None);
    }
}
