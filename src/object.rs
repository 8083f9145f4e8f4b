//! Remote object handles.
//!
//! An [`ObjectReference`] never owns server-side resources — the server
//! garbage-collects them on disconnect — so dropping one is a no-op here.

use bytes::Bytes;

use crate::connection::Connection;

/// A handle to a remote object: an opaque id, the class it belongs to, and
/// the connection it was materialized on. Equality is by `(connection,
/// class, id)`, matching the server's own notion of object identity.
#[derive(Debug, Clone)]
pub struct ObjectReference {
    pub(crate) id: Bytes,
    pub(crate) service: String,
    pub(crate) class: String,
    pub(crate) connection: Connection,
}

impl ObjectReference {
    pub(crate) fn new(
        id: Bytes,
        service: impl Into<String>,
        class: impl Into<String>,
        connection: Connection,
    ) -> Self {
        ObjectReference {
            id,
            service: service.into(),
            class: class.into(),
            connection,
        }
    }

    /// `true` for the null reference (zero byte id).
    pub fn is_null(&self) -> bool {
        self.id.as_ref() == [0u8]
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn id_bytes(&self) -> &Bytes {
        &self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl PartialEq for ObjectReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.class == other.class
            && self.service == other.service
            && self.connection.is_same(&other.connection)
    }
}

impl Eq for ObjectReference {}
