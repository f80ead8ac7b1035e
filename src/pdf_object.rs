use crate::Error;
use lopdf::{Document, Object};

pub(crate) trait PdfObjectDeref {
    /// Follow an indirect reference, or return the object itself.
    fn deref<'a>(&'a self, doc: &'a Document) -> Result<&'a Object, Error>;
}

impl PdfObjectDeref for Object {
    fn deref<'a>(&'a self, doc: &'a Document) -> Result<&'a Object, Error> {
        match *self {
            Object::Reference(oid) => doc
                .objects
                .get(&oid)
                .ok_or(Error::PdfInspection(lopdf::Error::ObjectNotFound)),
            _ => Ok(self),
        }
    }
}
