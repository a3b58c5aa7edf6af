//! Class data reading and the context handed to class handlers.
//!
//! Every class level of an instance is read inside a [`Frame`] that records
//! which descriptor and target it belongs to. The frame stack is what makes
//! [`ReadContext::read_fields`] legal: it only works inside a serializable
//! frame, once per frame. Frames are popped on every exit path, so a failed
//! nested read never leaves a stale frame behind.

use super::{JavaString, ObjectInputStream};
use crate::class::{ClassDesc, ClassRole, ResolvedClass, SerializableHandler};
use crate::error::{Error, Result};
use crate::graph::{ClassData, Content, Fields, Heap, Object, ObjectId, Value};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Serial { write_method: bool },
    External,
}

/// Read state of one class level
#[derive(Debug)]
pub(crate) struct Frame {
    desc: ObjectId,
    target: ObjectId,
    kind: FrameKind,
    fields_consumed: bool,
    pub(crate) default_end_data: bool,
    data: ClassData,
}

impl Frame {
    fn new(desc: ObjectId, target: ObjectId, kind: FrameKind) -> Self {
        Self {
            desc,
            target,
            kind,
            fields_consumed: false,
            default_end_data: false,
            data: ClassData::new(desc),
        }
    }
}

impl ObjectInputStream {
    fn top_frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::illegal_state("no active class data frame"))
    }

    fn run_in_frame(
        &mut self,
        frame: Frame,
        read: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let depth = self.frames.len();
        self.frames.push(frame);
        let result = read(self);
        self.frames.truncate(depth + 1);
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::illegal_state("class data frame vanished"))?;
        result?;
        self.commit(frame)
    }

    fn commit(&mut self, frame: Frame) -> Result<()> {
        match self.heap.get_mut(frame.target) {
            Some(Object::Instance(instance)) => {
                instance.class_data.push(frame.data);
                Ok(())
            }
            _ => Err(Error::illegal_state(format!(
                "{} is not an instance",
                frame.target
            ))),
        }
    }

    /// Reads the payload of an externalizable instance
    pub(crate) fn read_external_data(&mut self, target: ObjectId, desc: ObjectId) -> Result<()> {
        let (name, suid, block, resolved) = {
            let d = self.desc(desc)?;
            (
                d.display_name().to_owned(),
                d.suid().unwrap_or_default(),
                d.flags().has_block_data(),
                d.resolved().clone(),
            )
        };
        let handler = match resolved {
            ResolvedClass::Registered {
                role: ClassRole::Externalizable,
                ..
            } => self.registry.externalizable(&name),
            ResolvedClass::Registered { role, .. } => {
                return Err(Error::invalid_class(
                    name,
                    format!("registered as {role} but the stream declares an externalizable class"),
                ))
            }
            _ => None,
        };
        if !block && handler.is_none() {
            return Err(Error::class_not_found(
                name,
                "externalizable data without block framing needs a registered handler",
            ));
        }
        if let Some(expected) = handler.as_ref().and_then(|h| h.serial_version_uid()) {
            check_suid(&name, suid, expected)?;
        }
        trace!("Reading external data of {} for {}", name, target);

        self.run_in_frame(Frame::new(desc, target, FrameKind::External), |stream| {
            if block {
                stream.set_block_data_mode(true)?;
            }
            if let Some(handler) = &handler {
                handler.read_external(&mut ReadContext::new(stream))?;
            }
            if block {
                let annotation = stream.read_annotation()?;
                stream.top_frame_mut()?.data.annotation.extend(annotation);
            }
            Ok(())
        })
    }

    /// Reads every class level of a serializable instance, root first
    pub(crate) fn read_serial_data(&mut self, target: ObjectId, desc: ObjectId) -> Result<()> {
        let mut levels = Vec::new();
        let mut current = Some(desc);
        while let Some(id) = current {
            levels.push(id);
            current = self.desc(id)?.super_desc();
        }
        let ancestry = self.registered_ancestry(desc);

        for level in levels.into_iter().rev() {
            let handler = self.level_handler(level, desc, &ancestry)?;
            let write_method = self.desc(level)?.flags().has_write_method();
            let frame = Frame::new(level, target, FrameKind::Serial { write_method });
            self.run_in_frame(frame, |stream| {
                stream.set_block_data_mode(true)?;
                match &handler {
                    Some(handler) if write_method => {
                        handler.read_object(&mut ReadContext::new(stream))?
                    }
                    _ => stream.default_read_object()?,
                }
                if write_method {
                    let annotation = stream.read_annotation()?;
                    stream.top_frame_mut()?.data.annotation.extend(annotation);
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Registered classes the target is an instance of, most derived first
    ///
    /// The walk follows stream descriptors up to the first registered class,
    /// then the superclasses its handler declares.
    fn registered_ancestry(&self, desc: ObjectId) -> Vec<String> {
        let mut ancestry: Vec<String> = Vec::new();
        let mut current = self.heap.class_desc(desc);
        while let Some(d) = current {
            if let ResolvedClass::Registered { name, .. } = d.resolved() {
                let mut next = Some(name.clone());
                while let Some(name) = next {
                    if ancestry.contains(&name) {
                        break;
                    }
                    next = self.registry.superclass_of(&name);
                    ancestry.push(name);
                }
                break;
            }
            current = d.super_desc().and_then(|id| self.heap.class_desc(id));
        }
        ancestry
    }

    fn level_handler(
        &self,
        level: ObjectId,
        target_desc: ObjectId,
        ancestry: &[String],
    ) -> Result<Option<Arc<dyn SerializableHandler>>> {
        let d = self.desc(level)?;
        let ResolvedClass::Registered { name, role } = d.resolved() else {
            return Ok(None);
        };
        match role {
            ClassRole::Serializable => {}
            ClassRole::General => return Ok(None),
            role => {
                return Err(Error::invalid_class(
                    name.as_str(),
                    format!("registered as {role} but the stream declares a serializable class"),
                ))
            }
        }
        if !ancestry.contains(name) {
            let target = self.desc(target_desc)?.display_name();
            return Err(Error::invalid_class(
                target,
                format!("registered class hierarchy does not include '{name}'"),
            ));
        }
        let handler = self.registry.serializable(name);
        if let (Some(expected), Some(suid)) = (
            handler.as_ref().and_then(|h| h.serial_version_uid()),
            d.suid(),
        ) {
            check_suid(name, suid, expected)?;
        }
        Ok(handler)
    }

    /// Reads the declared fields of the current class level
    pub(crate) fn read_fields(&mut self) -> Result<Fields> {
        let frame = self
            .frames
            .last()
            .ok_or_else(|| Error::not_active("not inside a class data callback"))?;
        let write_method = match frame.kind {
            FrameKind::External => {
                return Err(Error::not_active(
                    "externalizable classes have no declared fields",
                ))
            }
            FrameKind::Serial { write_method } => write_method,
        };
        if frame.fields_consumed {
            return Err(Error::not_active("fields already read"));
        }
        let layout = self.desc(frame.desc)?.fields().to_vec();

        self.set_block_data_mode(false)?;
        let mut fields = Fields::with_capacity(layout.len());
        for field in layout {
            let value = self.read_value(field.typecode)?;
            fields.insert(field.name, value);
        }
        self.set_block_data_mode(true)?;

        let frame = self.top_frame_mut()?;
        frame.fields_consumed = true;
        if !write_method {
            frame.default_end_data = true;
        }
        Ok(fields)
    }

    /// Reads the declared fields and assigns them to the current class data
    pub(crate) fn default_read_object(&mut self) -> Result<()> {
        let fields = self.read_fields()?;
        let frame = self.top_frame_mut()?;
        for (name, value) in fields {
            frame.data.fields.insert(name, value);
        }
        Ok(())
    }
}

fn check_suid(name: &str, stream: i64, expected: i64) -> Result<()> {
    if stream == expected {
        return Ok(());
    }
    Err(Error::invalid_class(
        name,
        format!(
            "local class incompatible: stream classdesc serialVersionUID = {stream}, local class serialVersionUID = {expected}"
        ),
    ))
}

macro_rules! delegate_reads {
    ($($(#[$doc:meta])* $name:ident -> $ty:ty;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> Result<$ty> {
                self.stream.$name()
            }
        )*
    };
}

/// Access to the stream from inside a class handler
///
/// A context exists only while a handler runs for one class level of one
/// instance. Primitive reads consume the level's custom payload; object reads
/// decode nested objects, which may run handlers of their own.
pub struct ReadContext<'a> {
    stream: &'a mut ObjectInputStream,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(stream: &'a mut ObjectInputStream) -> Self {
        Self { stream }
    }

    delegate_reads! {
        /// Reads a `boolean`
        read_boolean -> bool;
        /// Reads a signed byte
        read_byte -> i8;
        /// Reads an unsigned byte
        read_unsigned_byte -> u8;
        /// Reads a UTF-16 code unit
        read_char -> u16;
        /// Reads a signed 16-bit integer
        read_short -> i16;
        /// Reads an unsigned 16-bit integer
        read_unsigned_short -> u16;
        /// Reads a signed 32-bit integer
        read_int -> i32;
        /// Reads a signed 64-bit integer
        read_long -> i64;
        /// Reads an IEEE 754 single
        read_float -> f32;
        /// Reads an IEEE 754 double
        read_double -> f64;
        /// Reads a string with a 16-bit byte length
        read_utf -> JavaString;
        /// Reads the next object
        read_object -> Value;
        /// Reads the rest of this class level's payload
        read_everything -> Vec<Content>;
    }

    /// Reads up to `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.stream.read_bytes(len)
    }

    /// Reads exactly `len` bytes
    pub fn read_fully(&mut self, len: usize) -> Result<Bytes> {
        self.stream.read_fully(len)
    }

    /// Reads the declared field values of this class level
    ///
    /// Allowed once per level, and only for serializable classes.
    pub fn read_fields(&mut self) -> Result<Fields> {
        self.stream.read_fields()
    }

    /// Reads the declared fields and assigns them to this class level
    pub fn default_read_object(&mut self) -> Result<()> {
        self.stream.default_read_object()
    }

    /// Keeps a decoded value in this class level's data
    pub fn push_value(&mut self, value: Value) {
        if let Some(frame) = self.stream.frames.last_mut() {
            frame.data.values.push(value);
        }
    }

    /// Assigns a named value to this class level's data
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.stream.frames.last_mut() {
            frame.data.fields.insert(name, value);
        }
    }

    /// Descriptor of the class level being read
    pub fn class_desc(&self) -> Option<&ClassDesc> {
        let frame = self.stream.frames.last()?;
        self.stream.heap.class_desc(frame.desc)
    }

    /// The instance being read
    pub fn target(&self) -> Option<ObjectId> {
        self.stream.frames.last().map(|frame| frame.target)
    }

    /// Objects decoded so far
    pub fn heap(&self) -> &Heap {
        &self.stream.heap
    }
}
