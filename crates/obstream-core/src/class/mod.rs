//! Class descriptors and class resolution.
//!
//! A [`ClassDesc`] is allocated as soon as its handle is known and completed
//! once its flags, fields, annotation and super descriptor have been read.
//! Descriptors that are still being read can be referenced from inside their
//! own annotation, but they are not usable for decoding until initialized.

pub mod registry;

pub use registry::{
    EnumTable, ExternalizableHandler, Registration, Registry, SerializableHandler,
};

use crate::error::{Error, Result};
use crate::graph::{Content, ObjectId};
use std::fmt;

/// Flag bits of a non-proxy class descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassFlags(u8);

impl ClassFlags {
    /// The class writes custom data after its fields
    pub const WRITE_METHOD: u8 = 0x01;
    /// The class is serializable
    pub const SERIALIZABLE: u8 = 0x02;
    /// The class is externalizable
    pub const EXTERNALIZABLE: u8 = 0x04;
    /// Externalizable data is framed in block data
    pub const BLOCK_DATA: u8 = 0x08;
    /// The class is an enum
    pub const ENUM: u8 = 0x10;

    /// Creates flags from their wire byte
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The wire byte
    pub fn bits(self) -> u8 {
        self.0
    }

    fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Whether the class writes custom data after its fields
    pub fn has_write_method(self) -> bool {
        self.has(Self::WRITE_METHOD)
    }

    /// Whether the class is serializable
    pub fn is_serializable(self) -> bool {
        self.has(Self::SERIALIZABLE)
    }

    /// Whether the class is externalizable
    pub fn is_externalizable(self) -> bool {
        self.has(Self::EXTERNALIZABLE)
    }

    /// Whether externalizable data is framed in block data
    pub fn has_block_data(self) -> bool {
        self.has(Self::BLOCK_DATA)
    }

    /// Whether the class is an enum
    pub fn is_enum(self) -> bool {
        self.has(Self::ENUM)
    }

    /// Role implied by the flags
    pub fn role(self) -> ClassRole {
        if self.is_enum() {
            ClassRole::Enum
        } else if self.is_externalizable() {
            ClassRole::Externalizable
        } else if self.is_serializable() {
            ClassRole::Serializable
        } else {
            ClassRole::General
        }
    }
}

impl fmt::Display for ClassFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// What kind of class a descriptor or registration stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassRole {
    /// Neither serializable nor externalizable
    General,
    /// Serializable, possibly with a custom read method
    Serializable,
    /// Externalizable, reading its own payload
    Externalizable,
    /// An enum type
    Enum,
}

impl ClassRole {
    /// Lowercase role name
    pub fn as_str(self) -> &'static str {
        match self {
            ClassRole::General => "general",
            ClassRole::Serializable => "serializable",
            ClassRole::Externalizable => "externalizable",
            ClassRole::Enum => "enum",
        }
    }
}

impl fmt::Display for ClassRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field and array element type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    /// `byte`
    Byte = b'B',
    /// `char`
    Char = b'C',
    /// `double`
    Double = b'D',
    /// `float`
    Float = b'F',
    /// `int`
    Int = b'I',
    /// `long`
    Long = b'J',
    /// `short`
    Short = b'S',
    /// `boolean`
    Boolean = b'Z',
    /// Array reference
    Array = b'[',
    /// Object reference
    Object = b'L',
}

impl TryFrom<u8> for TypeCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            b'B' => Ok(TypeCode::Byte),
            b'C' => Ok(TypeCode::Char),
            b'D' => Ok(TypeCode::Double),
            b'F' => Ok(TypeCode::Float),
            b'I' => Ok(TypeCode::Int),
            b'J' => Ok(TypeCode::Long),
            b'S' => Ok(TypeCode::Short),
            b'Z' => Ok(TypeCode::Boolean),
            b'[' => Ok(TypeCode::Array),
            b'L' => Ok(TypeCode::Object),
            _ => Err(Error::stream_corrupted(
                0,
                format!("unknown type code: {:#04x}", value),
            )),
        }
    }
}

impl TypeCode {
    /// Whether values of this type are primitives
    pub fn is_primitive(self) -> bool {
        !matches!(self, TypeCode::Array | TypeCode::Object)
    }

    /// The type code character
    pub fn as_char(self) -> char {
        self as u8 as char
    }

    /// Element type of an array class name such as `[I` or `[Ljava.lang.String;`
    pub fn of_array_class(name: &str) -> Option<Self> {
        match name.as_bytes() {
            [b'[', code, ..] => TypeCode::try_from(*code).ok(),
            _ => None,
        }
    }
}

/// A declared serializable field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Field type code
    pub typecode: TypeCode,
    /// Field name
    pub name: String,
    /// Declared type signature for object and array fields
    pub class_name: Option<String>,
}

/// Descriptor content that differs between ordinary and proxy classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassDescKind {
    /// An ordinary named class
    NonProxy {
        /// Class name
        name: String,
        /// Serial version identifier
        suid: i64,
        /// Flag bits
        flags: ClassFlags,
        /// Serializable fields, in stream order
        fields: Vec<FieldDesc>,
    },
    /// A dynamic proxy class
    Proxy {
        /// Implemented interface names
        interfaces: Vec<String>,
    },
}

/// How a descriptor was bound to a local class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolvedClass {
    /// Not bound yet
    #[default]
    Unresolved,
    /// Bound to a registry entry
    Registered {
        /// Registered class name
        name: String,
        /// Role of the registration
        role: ClassRole,
    },
    /// Synthesized from the descriptor because no registration exists
    Fallback {
        /// Role taken from the descriptor flags
        role: ClassRole,
    },
    /// Synthesized proxy class, cached per interface list
    Proxy {
        /// Index in the registry's proxy cache
        index: usize,
    },
}

/// A class descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDesc {
    kind: ClassDescKind,
    annotation: Vec<Content>,
    super_desc: Option<ObjectId>,
    class: ResolvedClass,
    initialized: bool,
}

impl ClassDesc {
    /// Placeholder for a non-proxy descriptor whose body is still being read
    pub(crate) fn non_proxy(name: String, suid: i64) -> Self {
        Self::placeholder(ClassDescKind::NonProxy {
            name,
            suid,
            flags: ClassFlags::default(),
            fields: Vec::new(),
        })
    }

    /// Placeholder for a proxy descriptor whose body is still being read
    pub(crate) fn proxy() -> Self {
        Self::placeholder(ClassDescKind::Proxy {
            interfaces: Vec::new(),
        })
    }

    fn placeholder(kind: ClassDescKind) -> Self {
        Self {
            kind,
            annotation: Vec::new(),
            super_desc: None,
            class: ResolvedClass::Unresolved,
            initialized: false,
        }
    }

    /// Completes a non-proxy descriptor, validating its flags
    pub(crate) fn init_non_proxy(
        &mut self,
        flags: ClassFlags,
        fields: Vec<FieldDesc>,
        annotation: Vec<Content>,
        super_desc: Option<ObjectId>,
        class: ResolvedClass,
    ) -> Result<()> {
        let ClassDescKind::NonProxy {
            name,
            suid,
            flags: slot_flags,
            fields: slot_fields,
        } = &mut self.kind
        else {
            return Err(Error::illegal_state("non-proxy init on a proxy descriptor"));
        };
        if flags.is_serializable() && flags.is_externalizable() {
            return Err(Error::invalid_class(
                name.as_str(),
                "serializable and externalizable flags conflict",
            ));
        }
        if flags.is_enum() && *suid != 0 {
            return Err(Error::invalid_class(
                name.as_str(),
                format!("enum descriptor has non-zero serialVersionUID: {suid}"),
            ));
        }
        if flags.is_enum() && !fields.is_empty() {
            return Err(Error::invalid_class(
                name.as_str(),
                "enum descriptor has non-zero field count",
            ));
        }
        *slot_flags = flags;
        *slot_fields = fields;
        self.finish(annotation, super_desc, class);
        Ok(())
    }

    /// Completes a proxy descriptor
    pub(crate) fn init_proxy(
        &mut self,
        interfaces: Vec<String>,
        annotation: Vec<Content>,
        super_desc: Option<ObjectId>,
        class: ResolvedClass,
    ) -> Result<()> {
        let ClassDescKind::Proxy { interfaces: slot } = &mut self.kind else {
            return Err(Error::illegal_state("proxy init on a non-proxy descriptor"));
        };
        *slot = interfaces;
        self.finish(annotation, super_desc, class);
        Ok(())
    }

    fn finish(&mut self, annotation: Vec<Content>, super_desc: Option<ObjectId>, class: ResolvedClass) {
        self.annotation = annotation;
        self.super_desc = super_desc;
        self.class = class;
        self.initialized = true;
    }

    /// Ordinary or proxy specific content
    pub fn kind(&self) -> &ClassDescKind {
        &self.kind
    }

    /// Class name, absent for proxy descriptors
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ClassDescKind::NonProxy { name, .. } => Some(name),
            ClassDescKind::Proxy { .. } => None,
        }
    }

    /// Class name, or `<proxy>` for proxy descriptors
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("<proxy>")
    }

    /// Serial version identifier, absent for proxy descriptors
    pub fn suid(&self) -> Option<i64> {
        match &self.kind {
            ClassDescKind::NonProxy { suid, .. } => Some(*suid),
            ClassDescKind::Proxy { .. } => None,
        }
    }

    /// Flag bits; proxy classes are serializable without a write method
    pub fn flags(&self) -> ClassFlags {
        match &self.kind {
            ClassDescKind::NonProxy { flags, .. } => *flags,
            ClassDescKind::Proxy { .. } => ClassFlags::from_bits(ClassFlags::SERIALIZABLE),
        }
    }

    /// Declared fields; empty for proxy descriptors
    pub fn fields(&self) -> &[FieldDesc] {
        match &self.kind {
            ClassDescKind::NonProxy { fields, .. } => fields,
            ClassDescKind::Proxy { .. } => &[],
        }
    }

    /// Interface names; empty for non-proxy descriptors
    pub fn interfaces(&self) -> &[String] {
        match &self.kind {
            ClassDescKind::Proxy { interfaces } => interfaces,
            ClassDescKind::NonProxy { .. } => &[],
        }
    }

    /// Whether this is a proxy descriptor
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ClassDescKind::Proxy { .. })
    }

    /// Writer-supplied class annotation
    pub fn annotation(&self) -> &[Content] {
        &self.annotation
    }

    /// Descriptor of the nearest serializable superclass
    pub fn super_desc(&self) -> Option<ObjectId> {
        self.super_desc
    }

    /// Local class binding
    pub fn resolved(&self) -> &ResolvedClass {
        &self.class
    }

    /// Whether the body of the descriptor has been read
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn init(desc: &mut ClassDesc, bits: u8, fields: Vec<FieldDesc>) -> Result<()> {
        desc.init_non_proxy(
            ClassFlags::from_bits(bits),
            fields,
            Vec::new(),
            None,
            ResolvedClass::Fallback {
                role: ClassFlags::from_bits(bits).role(),
            },
        )
    }

    #[test]
    fn test_typecode_try_from() {
        assert_eq!(TypeCode::try_from(b'J').unwrap(), TypeCode::Long);
        assert_eq!(TypeCode::try_from(b'[').unwrap(), TypeCode::Array);
        assert!(matches!(
            TypeCode::try_from(b'X'),
            Err(Error::StreamCorrupted { .. })
        ));
    }

    #[test]
    fn test_array_element_type() {
        assert_eq!(TypeCode::of_array_class("[I"), Some(TypeCode::Int));
        assert_eq!(
            TypeCode::of_array_class("[Ljava.lang.String;"),
            Some(TypeCode::Object)
        );
        assert_eq!(TypeCode::of_array_class("[[B"), Some(TypeCode::Array));
        assert_eq!(TypeCode::of_array_class("["), None);
        assert_eq!(TypeCode::of_array_class("A"), None);
        assert_eq!(TypeCode::of_array_class("[X"), None);
    }

    #[test]
    fn test_flags_role() {
        assert_eq!(ClassFlags::from_bits(0x02).role(), ClassRole::Serializable);
        assert_eq!(ClassFlags::from_bits(0x0C).role(), ClassRole::Externalizable);
        assert_eq!(ClassFlags::from_bits(0x12).role(), ClassRole::Enum);
        assert_eq!(ClassFlags::from_bits(0).role(), ClassRole::General);
        assert!(ClassFlags::from_bits(0x03).has_write_method());
    }

    #[test]
    fn test_init_validation() {
        let mut desc = ClassDesc::non_proxy("A".into(), 0);
        assert!(!desc.is_initialized());
        let err = init(&mut desc, 0x06, vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidClass { .. }));

        let mut desc = ClassDesc::non_proxy("E".into(), 5);
        assert!(init(&mut desc, 0x12, vec![]).is_err());

        let mut desc = ClassDesc::non_proxy("E".into(), 0);
        let field = FieldDesc {
            typecode: TypeCode::Int,
            name: "x".into(),
            class_name: None,
        };
        assert!(init(&mut desc, 0x12, vec![field]).is_err());

        let mut desc = ClassDesc::non_proxy("E".into(), 0);
        init(&mut desc, 0x12, vec![]).unwrap();
        assert!(desc.is_initialized());
        assert_eq!(desc.name(), Some("E"));
    }

    #[test]
    fn test_proxy_descriptor() {
        let mut desc = ClassDesc::proxy();
        desc.init_proxy(
            vec!["a.I".into(), "b.J".into()],
            Vec::new(),
            None,
            ResolvedClass::Proxy { index: 0 },
        )
        .unwrap();

        assert!(desc.is_proxy());
        assert_eq!(desc.name(), None);
        assert_eq!(desc.display_name(), "<proxy>");
        assert!(desc.flags().is_serializable());
        assert!(desc.fields().is_empty());
        assert_eq!(desc.interfaces().len(), 2);
    }
}
