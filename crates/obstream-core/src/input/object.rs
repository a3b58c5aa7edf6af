//! Tag dispatch and per-tag object readers.

use super::{
    ObjectInputStream, TC_ARRAY, TC_BLOCKDATA, TC_BLOCKDATALONG, TC_CLASS, TC_CLASSDESC,
    TC_ENDBLOCKDATA, TC_ENUM, TC_EXCEPTION, TC_LONGSTRING, TC_NULL, TC_OBJECT,
    TC_PROXYCLASSDESC, TC_REFERENCE, TC_RESET, TC_STRING,
};
use crate::class::{ClassDesc, ClassFlags, ClassRole, FieldDesc, ResolvedClass, TypeCode};
use crate::error::{Error, Result};
use crate::graph::{
    ArrayObject, ClassObject, Content, EnumConstant, Instance, Object, ObjectId, StringForm,
    StringObject, Value,
};
use tracing::{debug, trace};

impl ObjectInputStream {
    /// Reads the next object
    ///
    /// In block-data mode, pending block data or the end of the current
    /// custom payload is reported as a recoverable [`Error::OptionalData`].
    pub fn read_object(&mut self) -> Result<Value> {
        let old_mode = self.block_mode;
        if old_mode {
            self.peek1()?;
            if self.remaining > 0 {
                return Err(Error::OptionalData {
                    length: self.remaining,
                    eof: false,
                });
            }
            if self.default_end_data() {
                return Err(Error::OptionalData {
                    length: 0,
                    eof: true,
                });
            }
            self.set_block_data_mode(false)?;
        }
        if self.depth >= self.config.max_depth {
            self.set_block_data_mode(old_mode)?;
            return Err(Error::RecursionLimit {
                limit: self.config.max_depth,
            });
        }

        self.depth += 1;
        let result = self.read_object0(old_mode);
        self.depth -= 1;
        let restored = self.set_block_data_mode(old_mode);
        let value = result?;
        restored?;
        Ok(value)
    }

    fn read_object0(&mut self, old_mode: bool) -> Result<Value> {
        let tc = loop {
            match self.peek_byte()? {
                TC_RESET => self.read_reset()?,
                tc => break tc,
            }
        };
        trace!("Reading object tag {:02X} at offset {}", tc, self.offset);

        match tc {
            TC_NULL => {
                self.read_tc()?;
                Ok(Value::Null)
            }
            TC_REFERENCE => self.read_handle(),
            TC_CLASS => self.read_class(),
            TC_CLASSDESC | TC_PROXYCLASSDESC => {
                Ok(self.read_class_desc()?.map_or(Value::Null, Value::Object))
            }
            TC_STRING | TC_LONGSTRING => self.read_string().map(Value::Object),
            TC_ARRAY => self.read_array(),
            TC_ENUM => self.read_enum(),
            TC_OBJECT => self.read_ordinary_object(),
            TC_EXCEPTION => {
                let exception = self.read_fatal_exception()?;
                Err(Error::WriteAborted { exception })
            }
            TC_ENDBLOCKDATA if old_mode => Err(Error::OptionalData {
                length: 0,
                eof: true,
            }),
            TC_ENDBLOCKDATA => Err(Error::stream_corrupted(
                self.offset,
                "unexpected end of block data",
            )),
            _ => Err(Error::stream_corrupted(
                self.offset,
                format!("invalid type code: {:02X}", tc),
            )),
        }
    }

    /// Reads all remaining block data and objects of the current payload
    ///
    /// Stops at the end of the input or at the end of the current custom
    /// payload. Truncation in the middle of an object is still an error.
    pub fn read_everything(&mut self) -> Result<Vec<Content>> {
        let mut contents = Vec::new();
        loop {
            let block = self.read_bytes(usize::MAX)?;
            if !block.is_empty() {
                contents.push(Content::BlockData(block));
            }
            if self.is_at_end() {
                break;
            }
            match self.read_object() {
                Ok(value) => contents.push(Content::Object(value)),
                Err(Error::OptionalData { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(contents)
    }

    /// Reads a value of the given type in the current mode
    pub(crate) fn read_value(&mut self, typecode: TypeCode) -> Result<Value> {
        Ok(match typecode {
            TypeCode::Object | TypeCode::Array => self.read_object()?,
            TypeCode::Byte => Value::Byte(self.read_byte()?),
            TypeCode::Char => Value::Char(self.read_char()?),
            TypeCode::Double => Value::Double(self.read_double()?),
            TypeCode::Float => Value::Float(self.read_float()?),
            TypeCode::Int => Value::Int(self.read_int()?),
            TypeCode::Long => Value::Long(self.read_long()?),
            TypeCode::Short => Value::Short(self.read_short()?),
            TypeCode::Boolean => Value::Boolean(self.read_boolean()?),
        })
    }

    /// Reads an annotation: contents up to the end-of-custom-data marker
    pub(crate) fn read_annotation(&mut self) -> Result<Vec<Content>> {
        let mut contents = Vec::new();
        loop {
            if self.block_mode {
                let block = self.read_bytes(usize::MAX)?;
                if !block.is_empty() {
                    contents.push(Content::BlockData(block));
                }
                self.set_block_data_mode(false)?;
            }
            match self.peek_byte()? {
                TC_BLOCKDATA | TC_BLOCKDATALONG => {
                    self.set_block_data_mode(true)?;
                }
                TC_ENDBLOCKDATA => {
                    self.read_tc()?;
                    return Ok(contents);
                }
                _ => contents.push(Content::Object(self.read_object()?)),
            }
        }
    }

    fn read_handle(&mut self) -> Result<Value> {
        self.read_tc()?;
        let offset = self.offset;
        let raw = self.read_int()?;
        u32::try_from(raw)
            .ok()
            .and_then(|handle| self.handles.get(handle))
            .ok_or_else(|| {
                Error::stream_corrupted(offset, format!("invalid handle value: {:08X}", raw))
            })
    }

    pub(crate) fn desc(&self, id: ObjectId) -> Result<&ClassDesc> {
        self.heap
            .class_desc(id)
            .ok_or_else(|| Error::illegal_state(format!("{id} is not a class descriptor")))
    }

    fn desc_mut(&mut self, id: ObjectId) -> Result<&mut ClassDesc> {
        match self.heap.get_mut(id) {
            Some(Object::ClassDesc(desc)) => Ok(desc),
            _ => Err(Error::illegal_state(format!("{id} is not a class descriptor"))),
        }
    }

    fn alloc(&mut self, object: Object) -> (ObjectId, u32) {
        let id = self.heap.alloc(object);
        let handle = self.handles.assign(Value::Object(id));
        (id, handle)
    }

    fn read_class(&mut self) -> Result<Value> {
        self.read_tc()?;
        let offset = self.offset;
        let desc = self
            .read_class_desc()?
            .ok_or_else(|| Error::stream_corrupted(offset, "class object with null descriptor"))?;
        let (id, _) = self.alloc(Object::Class(ClassObject { desc }));
        Ok(Value::Object(id))
    }

    /// Reads a class descriptor, a back-reference to one, or null
    pub(crate) fn read_class_desc(&mut self) -> Result<Option<ObjectId>> {
        let offset = self.offset;
        match self.peek_byte()? {
            TC_NULL => {
                self.read_tc()?;
                Ok(None)
            }
            TC_CLASSDESC => self.read_non_proxy_desc().map(Some),
            TC_PROXYCLASSDESC => self.read_proxy_desc().map(Some),
            TC_REFERENCE => {
                let value = self.read_handle()?;
                let desc = value
                    .as_object()
                    .and_then(|id| self.heap.class_desc(id).map(|desc| (id, desc)));
                match desc {
                    Some((_, desc)) if !desc.is_initialized() => Err(Error::invalid_class(
                        desc.display_name(),
                        "class descriptor should be initialized",
                    )),
                    Some((id, _)) => Ok(Some(id)),
                    None => Err(Error::stream_corrupted(
                        offset,
                        "reference to a non-descriptor where a class descriptor was expected",
                    )),
                }
            }
            tc => Err(Error::stream_corrupted(
                offset,
                format!("invalid class descriptor type code: {:02X}", tc),
            )),
        }
    }

    fn read_non_proxy_desc(&mut self) -> Result<ObjectId> {
        self.read_tc()?;
        let name = self.read_utf()?.to_string_lossy();
        let suid = self.read_long()?;
        let (id, handle) = self.alloc(Object::ClassDesc(ClassDesc::non_proxy(name.clone(), suid)));
        debug!("Class descriptor {} (suid {}) at handle {:#x}", name, suid, handle);

        let flags = ClassFlags::from_bits(self.read_unsigned_byte()?);
        let fields = self.read_field_descs(&name)?;
        let annotation = self.read_annotation()?;
        let super_desc = self.read_super_desc()?;
        let class = self.registry.resolve(&name, flags.role());
        self.desc_mut(id)?
            .init_non_proxy(flags, fields, annotation, super_desc, class)?;
        Ok(id)
    }

    fn read_field_descs(&mut self, class_name: &str) -> Result<Vec<FieldDesc>> {
        let offset = self.offset;
        let count = self.read_short()?;
        let count = usize::try_from(count).map_err(|_| {
            Error::stream_corrupted(offset, format!("negative field count for {class_name}: {count}"))
        })?;

        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = self.offset;
            let code = self.read_unsigned_byte()?;
            let name = self.read_utf()?.to_string_lossy();
            let typecode = TypeCode::try_from(code).map_err(|_| {
                Error::stream_corrupted(
                    offset,
                    format!("invalid type code {:02X} for field {}.{}", code, class_name, name),
                )
            })?;
            let field_class = if typecode.is_primitive() {
                None
            } else {
                let sid = self.read_string()?;
                self.heap.string(sid).map(|s| s.to_string_lossy())
            };
            trace!("Field {} {}.{}", typecode.as_char(), class_name, name);
            fields.push(FieldDesc {
                typecode,
                name,
                class_name: field_class,
            });
        }
        Ok(fields)
    }

    /// Super descriptors nest inside their subclass descriptor and count
    /// against the same depth limit as objects
    fn read_super_desc(&mut self) -> Result<Option<ObjectId>> {
        if self.depth >= self.config.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.config.max_depth,
            });
        }
        let offset = self.offset;
        self.depth += 1;
        let super_desc = self.read_class_desc();
        self.depth -= 1;
        let super_desc = super_desc?;
        if let Some(id) = super_desc {
            if self.desc(id)?.is_proxy() {
                return Err(Error::stream_corrupted(
                    offset,
                    "super descriptor must not be a proxy descriptor",
                ));
            }
        }
        Ok(super_desc)
    }

    fn read_proxy_desc(&mut self) -> Result<ObjectId> {
        self.read_tc()?;
        let (id, handle) = self.alloc(Object::ClassDesc(ClassDesc::proxy()));
        let offset = self.offset;
        let count = self.read_int()?;
        let count = usize::try_from(count).map_err(|_| {
            Error::stream_corrupted(offset, format!("negative proxy interface count: {count}"))
        })?;

        let mut interfaces = Vec::with_capacity(count.min(self.data.len() - self.offset));
        for _ in 0..count {
            interfaces.push(self.read_utf()?.to_string_lossy());
        }
        debug!("Proxy descriptor [{}] at handle {:#x}", interfaces.join(", "), handle);

        let class = self.registry.resolve_proxy(&interfaces);
        let annotation = self.read_annotation()?;
        let super_desc = self.read_super_desc()?;
        self.desc_mut(id)?
            .init_proxy(interfaces, annotation, super_desc, class)?;
        Ok(id)
    }

    /// Reads a new string or a back-reference to one
    pub(crate) fn read_string(&mut self) -> Result<ObjectId> {
        let offset = self.offset;
        let (text, form) = match self.peek_byte()? {
            TC_STRING => {
                self.read_tc()?;
                (self.read_utf()?, StringForm::Short)
            }
            TC_LONGSTRING => {
                self.read_tc()?;
                (self.read_long_utf()?, StringForm::Long)
            }
            TC_REFERENCE => {
                let value = self.read_handle()?;
                return value
                    .as_object()
                    .filter(|id| self.heap.string(*id).is_some())
                    .ok_or_else(|| {
                        Error::stream_corrupted(
                            offset,
                            "reference to a non-string where a string was expected",
                        )
                    });
            }
            tc => {
                return Err(Error::stream_corrupted(
                    offset,
                    format!("invalid string type code: {:02X}", tc),
                ))
            }
        };
        let (id, _) = self.alloc(Object::String(StringObject { text, form }));
        Ok(id)
    }

    fn read_array(&mut self) -> Result<Value> {
        self.read_tc()?;
        let offset = self.offset;
        let desc = self.read_class_desc()?;
        let element = desc
            .and_then(|id| self.heap.class_desc(id))
            .and_then(ClassDesc::name)
            .and_then(TypeCode::of_array_class);
        let (Some(desc), Some(element)) = (desc, element) else {
            let name = desc.and_then(|id| self.heap.class_name(id)).unwrap_or("null");
            return Err(Error::stream_corrupted(
                offset,
                format!("invalid array class descriptor: {name}"),
            ));
        };

        let (id, handle) = self.alloc(Object::Array(ArrayObject {
            desc,
            element,
            values: Vec::new(),
        }));
        let offset = self.offset;
        let len = self.read_int()?;
        let len = usize::try_from(len)
            .map_err(|_| Error::stream_corrupted(offset, format!("negative array length: {len}")))?;
        trace!("Array of {} {} at handle {:#x}", len, element.as_char(), handle);

        let mut values = Vec::with_capacity(len.min(self.data.len() - self.offset));
        for _ in 0..len {
            values.push(self.read_value(element)?);
        }
        if let Some(Object::Array(array)) = self.heap.get_mut(id) {
            array.values = values;
        }
        Ok(Value::Object(id))
    }

    fn read_enum(&mut self) -> Result<Value> {
        self.read_tc()?;
        let desc = match self.read_class_desc()? {
            Some(id) if self.desc(id)?.flags().is_enum() => id,
            Some(id) => {
                return Err(Error::invalid_class(
                    self.desc(id)?.display_name(),
                    "non-enum class",
                ))
            }
            None => return Err(Error::invalid_class("null", "non-enum class")),
        };

        let (id, _) = self.alloc(Object::Enum(EnumConstant {
            desc,
            name: String::new(),
            ordinal: None,
        }));
        let name_id = self.read_string()?;
        let name = self
            .heap
            .string(name_id)
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let ordinal = self.enum_ordinal(desc, &name)?;
        if let Some(Object::Enum(constant)) = self.heap.get_mut(id) {
            constant.name = name;
            constant.ordinal = ordinal;
        }
        Ok(Value::Object(id))
    }

    fn enum_ordinal(&self, desc: ObjectId, constant: &str) -> Result<Option<usize>> {
        match self.desc(desc)?.resolved() {
            ResolvedClass::Registered {
                name,
                role: ClassRole::Enum,
            } => {
                let ordinal = self
                    .registry
                    .enum_table(name)
                    .and_then(|table| table.ordinal(constant));
                match ordinal {
                    Some(ordinal) => Ok(Some(ordinal)),
                    None => Err(Error::invalid_class(
                        name.as_str(),
                        format!("enum constant name doesn't exist: {constant}"),
                    )),
                }
            }
            ResolvedClass::Registered { name, role } => Err(Error::invalid_class(
                name.as_str(),
                format!("registered as {role} but the stream declares an enum"),
            )),
            _ => Ok(None),
        }
    }

    fn read_ordinary_object(&mut self) -> Result<Value> {
        self.read_tc()?;
        let offset = self.offset;
        let desc = self
            .read_class_desc()?
            .ok_or_else(|| Error::stream_corrupted(offset, "object with null class descriptor"))?;
        let flags = self.desc(desc)?.flags();
        if !flags.is_serializable() && !flags.is_externalizable() {
            return Err(Error::invalid_class(
                self.desc(desc)?.display_name(),
                "class is neither serializable nor externalizable",
            ));
        }

        let (id, handle) = self.alloc(Object::Instance(Instance::new(desc)));
        trace!("Instance {} at handle {:#x}", id, handle);
        if flags.is_externalizable() {
            self.read_external_data(id, desc)?;
        } else {
            self.read_serial_data(id, desc)?;
        }

        match self.resolve_replacement(id, desc)? {
            Some(replacement) => {
                self.handles.replace(handle, Value::Object(id), replacement)?;
                debug!("Instance {} replaced by {:?}", id, replacement);
                Ok(replacement)
            }
            None => Ok(Value::Object(id)),
        }
    }

    fn resolve_replacement(&mut self, id: ObjectId, desc: ObjectId) -> Result<Option<Value>> {
        let (name, role) = match self.desc(desc)?.resolved() {
            ResolvedClass::Registered { name, role } => (name.clone(), *role),
            _ => return Ok(None),
        };
        match role {
            ClassRole::Serializable => match self.registry.serializable(&name) {
                Some(handler) => handler.read_resolve(&mut self.heap, id),
                None => Ok(None),
            },
            ClassRole::Externalizable => match self.registry.externalizable(&name) {
                Some(handler) => handler.read_resolve(&mut self.heap, id),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn read_fatal_exception(&mut self) -> Result<Value> {
        self.read_tc()?;
        self.handles.reset();
        let offset = self.offset;
        match self.peek_byte()? {
            TC_OBJECT | TC_REFERENCE => {}
            tc => {
                return Err(Error::stream_corrupted(
                    offset,
                    format!("invalid exception type code: {:02X}", tc),
                ))
            }
        }
        let exception = self.read_object()?;
        self.handles.reset();
        debug!("Stream aborted by writer exception {:?}", exception);
        Ok(exception)
    }
}
