use std::{cell::Cell, marker::PhantomData};

use crate::ffi::{
    error::FfiError,
    handle::ObjectKind,
    object::{FfiObject, FfiType, with_destroy},
};

/// An [`FfiType`] which the engine can hand back in a collection.
pub trait FfiElement: FfiType {
    const VECTOR_KIND: ObjectKind;
}

/// A native collection of `T`. Each [`at`](Self::at) call returns a fresh
/// owned element wrapper, independent of the collection's own lifetime.
pub struct FfiVector<T> {
    object: FfiObject,
    len: Cell<Option<u32>>,
    _element: PhantomData<fn() -> T>,
}

impl<T: FfiElement> FfiType for FfiVector<T> {
    const KIND: ObjectKind = T::VECTOR_KIND;

    fn from_object(object: FfiObject) -> Self {
        Self {
            object,
            len: Cell::new(None),
            _element: PhantomData,
        }
    }
    fn object(&self) -> &FfiObject {
        &self.object
    }
    fn object_mut(&mut self) -> &mut FfiObject {
        &mut self.object
    }
}

impl<T: FfiElement> FfiVector<T> {
    /// The number of elements. Only asks the engine once.
    pub fn len(&self) -> Result<u32, FfiError> {
        if let Some(len) = self.len.get() {
            return Ok(len);
        }
        let len = self.object.call("vector_len", |engine, vector, err| {
            engine.vector_len(Self::KIND, vector, err)
        })?;
        self.len.set(Some(len));
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool, FfiError> {
        self.len().map(|len| len == 0)
    }

    /// Wrap the element at `index`. The caller owns the returned wrapper.
    pub fn at(&self, index: u32) -> Result<T, FfiError> {
        let len = self.len()?;
        debug_assert!(index < len, "Index {index} out of range (len {len})");
        if index >= len {
            return Err(FfiError::InvalidArgument(format!(
                "{} index {index} out of range (len {len})",
                Self::KIND,
            )));
        }
        self.object.call_wrap("vector_get_at", |engine, vector, err| {
            engine.vector_get_at(Self::KIND, vector, index, err)
        })
    }

    /// Take every element out, then release the collection. On failure, the
    /// elements taken so far are released too.
    pub fn into_elements(self) -> Result<Vec<T>, FfiError> {
        with_destroy(self, |vector| {
            let len = vector.len()?;
            let mut elements = Vec::with_capacity(len as usize);
            for index in 0..len {
                match vector.at(index) {
                    Ok(element) => elements.push(element),
                    Err(e) => {
                        elements.iter_mut().for_each(T::destroy);
                        return Err(e);
                    }
                }
            }
            Ok(elements)
        })
    }

    /// Read every element into a domain value, releasing each element right
    /// after `f` and the collection at the end.
    pub fn map_elements<R>(
        self,
        mut f: impl FnMut(&T) -> Result<R, FfiError>,
    ) -> Result<Vec<R>, FfiError> {
        with_destroy(self, |vector| {
            let len = vector.len()?;
            (0..len)
                .map(|index| with_destroy(vector.at(index)?, &mut f))
                .collect()
        })
    }
}

/// Return the first element matching `pred`, which the caller then owns.
///
/// Every other element is released as soon as it's rejected, so at most one
/// element wrapper is live at a time during the scan. The collection itself
/// is always released.
pub fn find_in_iterable<T: FfiElement>(
    collection: FfiVector<T>,
    mut pred: impl FnMut(&T) -> Result<bool, FfiError>,
) -> Result<Option<T>, FfiError> {
    with_destroy(collection, |vector| {
        for index in 0..vector.len()? {
            let mut element = vector.at(index)?;
            match pred(&element) {
                Ok(true) => return Ok(Some(element)),
                Ok(false) => element.destroy(),
                Err(e) => {
                    element.destroy();
                    return Err(e);
                }
            }
        }
        Ok(None)
    })
}
