//! Registry of known classes.
//!
//! Stream class names are looked up here when a descriptor is read. A
//! registered name binds the descriptor to a handler that decodes (and may
//! substitute) instances; an unknown name gets a fallback class synthesized
//! from the descriptor itself.

use super::{ClassRole, ResolvedClass};
use crate::error::Result;
use crate::graph::{Heap, ObjectId, Value};
use crate::input::ReadContext;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Reads one class level of a serializable instance
///
/// Implement this for classes whose stream descriptor sets the write-method
/// flag and whose custom payload should be interpreted rather than kept as an
/// opaque annotation.
pub trait SerializableHandler: Send + Sync {
    /// Expected serial version identifier; `None` accepts any
    fn serial_version_uid(&self) -> Option<i64> {
        None
    }

    /// Registered name of the nearest serializable superclass
    fn superclass(&self) -> Option<&str> {
        None
    }

    /// Reads this class's data for the instance being decoded
    fn read_object(&self, ctx: &mut ReadContext<'_>) -> Result<()> {
        ctx.default_read_object()
    }

    /// Returns a replacement for the fully decoded instance
    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        let _ = (heap, this);
        Ok(None)
    }
}

/// Reads the whole payload of an externalizable instance
pub trait ExternalizableHandler: Send + Sync {
    /// Expected serial version identifier; `None` accepts any
    fn serial_version_uid(&self) -> Option<i64> {
        None
    }

    /// Reads the instance payload
    fn read_external(&self, ctx: &mut ReadContext<'_>) -> Result<()>;

    /// Returns a replacement for the fully decoded instance
    fn read_resolve(&self, heap: &mut Heap, this: ObjectId) -> Result<Option<Value>> {
        let _ = (heap, this);
        Ok(None)
    }
}

/// Constant names of a registered enum, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumTable {
    constants: Vec<String>,
}

impl EnumTable {
    /// Creates a table from constant names
    pub fn new<I, S>(constants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    /// Position of a constant
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.constants.iter().position(|c| c == name)
    }

    /// All constant names
    pub fn constants(&self) -> &[String] {
        &self.constants
    }
}

/// A registered class
#[derive(Clone)]
pub enum Registration {
    /// Serializable class with a handler
    Serializable(Arc<dyn SerializableHandler>),
    /// Externalizable class with a handler
    Externalizable(Arc<dyn ExternalizableHandler>),
    /// Enum with its constants
    Enum(Arc<EnumTable>),
    /// Plain class known by name only
    Class,
}

impl Registration {
    /// Role of the registered class
    pub fn role(&self) -> ClassRole {
        match self {
            Registration::Serializable(_) => ClassRole::Serializable,
            Registration::Externalizable(_) => ClassRole::Externalizable,
            Registration::Enum(_) => ClassRole::Enum,
            Registration::Class => ClassRole::General,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Enum(table) => f.debug_tuple("Enum").field(table).finish(),
            other => write!(f, "{}", other.role()),
        }
    }
}

/// Class name to handler mapping, plus the proxy class cache
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: HashMap<String, Registration>,
    proxies: Vec<Vec<String>>,
    proxy_index: HashMap<String, usize>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    /// Registers a serializable class
    pub fn register_serializable(
        &mut self,
        name: impl Into<String>,
        handler: impl SerializableHandler + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Registration::Serializable(Arc::new(handler)))
    }

    /// Registers an externalizable class
    pub fn register_externalizable(
        &mut self,
        name: impl Into<String>,
        handler: impl ExternalizableHandler + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Registration::Externalizable(Arc::new(handler)))
    }

    /// Registers an enum and its constant names
    pub fn register_enum<I, S>(&mut self, name: impl Into<String>, constants: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name.into(), Registration::Enum(Arc::new(EnumTable::new(constants))))
    }

    /// Registers a plain class by name
    pub fn register_class(&mut self, name: impl Into<String>) -> &mut Self {
        self.insert(name.into(), Registration::Class)
    }

    fn insert(&mut self, name: String, registration: Registration) -> &mut Self {
        debug!("Registered {} class {}", registration.role(), name);
        self.classes.insert(name, registration);
        self
    }

    /// Removes a registration
    pub fn unregister(&mut self, name: &str) -> Option<Registration> {
        self.classes.remove(name)
    }

    /// Returns the registration of a class
    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.classes.get(name)
    }

    /// Whether a class is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Registered class names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Serializable handler of a class
    pub fn serializable(&self, name: &str) -> Option<Arc<dyn SerializableHandler>> {
        match self.classes.get(name)? {
            Registration::Serializable(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    /// Externalizable handler of a class
    pub fn externalizable(&self, name: &str) -> Option<Arc<dyn ExternalizableHandler>> {
        match self.classes.get(name)? {
            Registration::Externalizable(handler) => Some(Arc::clone(handler)),
            _ => None,
        }
    }

    /// Constant table of an enum
    pub fn enum_table(&self, name: &str) -> Option<Arc<EnumTable>> {
        match self.classes.get(name)? {
            Registration::Enum(table) => Some(Arc::clone(table)),
            _ => None,
        }
    }

    /// Declared superclass of a registered serializable class
    pub fn superclass_of(&self, name: &str) -> Option<String> {
        match self.classes.get(name)? {
            Registration::Serializable(handler) => handler.superclass().map(str::to_owned),
            _ => None,
        }
    }

    /// Binds a stream class name to a registration or a fallback
    pub fn resolve(&self, name: &str, stream_role: ClassRole) -> ResolvedClass {
        match self.classes.get(name) {
            Some(registration) => ResolvedClass::Registered {
                name: name.to_owned(),
                role: registration.role(),
            },
            None => ResolvedClass::Fallback { role: stream_role },
        }
    }

    /// Binds a proxy interface list to its cached proxy class
    pub fn resolve_proxy(&mut self, interfaces: &[String]) -> ResolvedClass {
        let key = interfaces.join(",");
        let index = match self.proxy_index.get(&key) {
            Some(index) => *index,
            None => {
                self.proxies.push(interfaces.to_vec());
                let index = self.proxies.len() - 1;
                debug!("Synthesized proxy class {} for [{}]", index, key);
                self.proxy_index.insert(key, index);
                index
            }
        };
        ResolvedClass::Proxy { index }
    }

    /// Interfaces of a cached proxy class
    pub fn proxy_interfaces(&self, index: usize) -> Option<&[String]> {
        self.proxies.get(index).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Child;

    impl SerializableHandler for Child {
        fn superclass(&self) -> Option<&str> {
            Some("a.Parent")
        }
    }

    #[test]
    fn test_resolve_registered_and_fallback() {
        let mut registry = Registry::new();
        registry.register_serializable("a.Child", Child).register_class("a.Plain");

        assert_eq!(
            registry.resolve("a.Child", ClassRole::Externalizable),
            ResolvedClass::Registered {
                name: "a.Child".into(),
                role: ClassRole::Serializable
            }
        );
        assert_eq!(
            registry.resolve("a.Missing", ClassRole::Serializable),
            ResolvedClass::Fallback {
                role: ClassRole::Serializable
            }
        );
        assert_eq!(registry.superclass_of("a.Child").as_deref(), Some("a.Parent"));
        assert_eq!(registry.superclass_of("a.Plain"), None);
        assert_eq!(registry.names(), vec!["a.Child", "a.Plain"]);
    }

    #[test]
    fn test_enum_table() {
        let mut registry = Registry::new();
        registry.register_enum("a.Color", ["RED", "GREEN"]);

        let table = registry.enum_table("a.Color").unwrap();
        assert_eq!(table.ordinal("GREEN"), Some(1));
        assert_eq!(table.ordinal("BLUE"), None);
        assert!(registry.serializable("a.Color").is_none());
    }

    #[test]
    fn test_proxy_cache() {
        let mut registry = Registry::new();
        let a = vec!["x.I".to_string(), "x.J".to_string()];
        let b = vec!["x.J".to_string()];

        let first = registry.resolve_proxy(&a);
        let other = registry.resolve_proxy(&b);
        let again = registry.resolve_proxy(&a);

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(registry.proxy_interfaces(1), Some(&b[..]));
    }
}
