//! Cross-document copy engine.
//!
//! Copies an object graph from one [`Document`] into another. Direct values
//! are copied by value; every indirect object reached through a reference
//! becomes a new indirect object in the target. The target remembers which
//! source objects it already received, keyed by `(source document, object
//! number)`, so shared objects stay shared across calls and cycles terminate.
//!
//! A target identity is reserved and recorded before the source object's
//! contents are copied, and the contents are copied from a work queue rather
//! than by recursion, so arbitrarily long reference chains copy in constant
//! stack depth.

use crate::document::{Document, ObjectHandle};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::VecDeque;
use std::sync::Arc;

/// Options for one copy call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Keys dropped from the top-level dictionary (or stream dictionary)
    pub excluded_keys: Vec<String>,
    /// Copy the top-level object again even if it was copied before
    ///
    /// Objects reached from it are still shared with earlier copies.
    pub allow_duplicates: bool,
}

impl CopyOptions {
    /// Drop `keys` from the top-level dictionary.
    pub fn excluding<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Allow the top-level object to be copied again.
    pub fn with_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// A source object whose target identity is reserved but whose contents are not yet copied.
struct Pending {
    object: Arc<Object>,
    target: ObjectRef,
    top_level: bool,
}

struct CopySession<'a> {
    source: &'a mut Document,
    target: &'a mut Document,
    options: &'a CopyOptions,
    queue: VecDeque<Pending>,
}

impl CopySession<'_> {
    /// Map a source reference to a target value, reserving a new identity if needed.
    fn reference(&mut self, reference: ObjectRef, top_level: bool) -> Object {
        let source_id = self.source.id();
        let reuse = !(top_level && self.options.allow_duplicates);
        if reuse {
            if let Some(existing) = self.target.copied(source_id, reference.id) {
                return Object::Reference(existing);
            }
        }

        let resolved = self.source.resolve(reference);
        if resolved.is_null() {
            log::debug!("{} resolves to null in the source, copying null", reference);
            return Object::Null;
        }
        if self.source.is_root(reference) || resolved.has_type("Catalog") {
            log::warn!("Not copying catalog {}, substituting null", reference);
            return Object::Null;
        }

        let target = self.target.add_indirect_object(Object::Null);
        self.target.record_copy(source_id, reference.id, target);
        self.queue.push_back(Pending {
            object: resolved,
            target,
            top_level,
        });
        Object::Reference(target)
    }

    /// Copy a direct value; references inside it are reserved, not followed.
    fn direct(&mut self, object: &Object, excluded: &[String]) -> Object {
        match object {
            Object::Reference(r) => self.reference(*r, false),
            Object::Array(items) => Object::Array(items.iter().map(|item| self.direct(item, &[])).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.dictionary(dict, excluded)),
            Object::Stream { dict, data } => Object::Stream {
                dict: self.dictionary(dict, excluded),
                data: data.clone(),
            },
            primitive => primitive.clone(),
        }
    }

    fn dictionary(&mut self, dict: &Dictionary, excluded: &[String]) -> Dictionary {
        let mut out = Dictionary::new();
        for (key, value) in dict {
            if excluded.iter().any(|k| k == key) {
                continue;
            }
            let copied = self.direct(value, &[]);
            out.insert(key.clone(), copied);
        }
        out
    }

    /// Copy queued objects until every reserved identity has contents.
    fn drain(&mut self) -> Result<()> {
        let excluded = self.options.excluded_keys.clone();
        while let Some(Pending {
            object,
            target,
            top_level,
        }) = self.queue.pop_front()
        {
            let keys: &[String] = if top_level { &excluded } else { &[] };
            let copied = self.direct(&object, keys);
            self.target.update_object(target, copied)?;
        }
        Ok(())
    }
}

/// Copy `object` from `source` into `target`.
///
/// A top-level reference is copied as a new indirect object and the
/// returned value references it; a direct value is returned copied, with any
/// references inside it mapped into the target. References that resolve to
/// null in the source are copied as direct nulls and not remembered; the
/// source catalog is never copied.
///
/// # Errors
///
/// Fails with [`Error::DocumentClosed`] when either document is closed.
pub fn copy_object_to(
    object: &Object,
    source: &mut Document,
    target: &mut Document,
    options: &CopyOptions,
) -> Result<Object> {
    if source.is_closed() || target.is_closed() {
        return Err(Error::DocumentClosed);
    }
    let mut session = CopySession {
        source,
        target,
        options,
        queue: VecDeque::new(),
    };
    let result = match object {
        Object::Reference(r) => session.reference(*r, true),
        direct => {
            let excluded = options.excluded_keys.clone();
            session.direct(direct, &excluded)
        },
    };
    session.drain()?;
    Ok(result)
}

/// Copy the object named by `handle` from `source` into `target`.
///
/// # Errors
///
/// Fails with [`Error::Copy`] when the handle was issued by a different
/// document or names an object the source does not hold.
pub fn copy_handle_to(
    handle: ObjectHandle,
    source: &mut Document,
    target: &mut Document,
    options: &CopyOptions,
) -> Result<Object> {
    if handle.document() != source.id() {
        return Err(Error::Copy(format!(
            "handle for {} belongs to document {}, not {}",
            handle.reference(),
            handle.document(),
            source.id()
        )));
    }
    if !source.has_live_entry(handle.reference()) {
        return Err(Error::Copy(format!(
            "{} is not an object of document {}",
            handle.reference(),
            source.id()
        )));
    }
    copy_object_to(&Object::Reference(handle.reference()), source, target, options)
}

impl Document {
    /// Copy `object` from this document into `target`.
    ///
    /// See [`copy_object_to`].
    pub fn copy_object_to(&mut self, object: &Object, target: &mut Document, options: &CopyOptions) -> Result<Object> {
        copy_object_to(object, self, target, options)
    }
}
