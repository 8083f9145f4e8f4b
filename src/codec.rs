//! Host-value <-> wire encoding for every type the dynamic API surface can
//! carry. Built on top of [`rpc_link_protocol::scalar`] for the raw scalar
//! conventions and on the generated `CollectionValue`/`DictionaryValue`
//! wrappers for the composite ones.

use std::collections::HashSet;

use bytes::Bytes;
use prost::Message;
use rpc_link_protocol::scalar;
use rpc_link_protocol::{Argument, CollectionValue, DictionaryEntry, DictionaryValue};

use crate::connection::Connection;
use crate::error::Error;
use crate::object::ObjectReference;

/// A tagged description of a wire type, mirroring the API's dynamic type
/// system. Carries just enough structure to encode/decode a [`Value`]; it
/// does not carry human-readable field names (that belongs to generated
/// bindings).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Bool,
    Bytes,
    String,
    Float,
    Double,
    SInt32,
    UInt32,
    UInt64,
    List(Box<TypeDescriptor>),
    Set(Box<TypeDescriptor>),
    Tuple(Vec<TypeDescriptor>),
    Dictionary(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Class { service: String, name: String },
    Enumeration { service: String, name: String },
    ProcedureCall,
    Protobuf { name: String },
}

/// A fully specified, immutable procedure invocation: service, procedure,
/// and pre-encoded argument bytes in their declared positions.
#[derive(Debug, Clone)]
pub struct ProcedureCallSpec {
    pub service: String,
    pub procedure: String,
    pub arguments: Vec<(u32, Bytes)>,
}

/// A decoded (or yet-to-be-encoded) host value.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Bytes(Bytes),
    String(String),
    Float(f32),
    Double(f64),
    SInt32(i32),
    UInt32(u32),
    UInt64(u64),
    List(Vec<Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Dictionary(Vec<(Value, Value)>),
    Class(ObjectReference),
    Enumeration(i32),
    ProcedureCall(ProcedureCallSpec),
    Protobuf(Bytes),
}

/// Encodes `value` under the wire conventions for `ty`.
pub fn encode(value: &Value, ty: &TypeDescriptor) -> Result<Bytes, Error> {
    match (value, ty) {
        (Value::Bool(v), TypeDescriptor::Bool) => Ok(scalar::encode_bool(*v)),
        (Value::Bytes(v), TypeDescriptor::Bytes) => Ok(scalar::encode_length_delimited(v)),
        (Value::String(v), TypeDescriptor::String) => {
            Ok(scalar::encode_length_delimited(v.as_bytes()))
        }
        (Value::Float(v), TypeDescriptor::Float) => Ok(scalar::encode_float(*v)),
        (Value::Double(v), TypeDescriptor::Double) => Ok(scalar::encode_double(*v)),
        (Value::SInt32(v), TypeDescriptor::SInt32) => Ok(scalar::encode_sint32(*v)),
        (Value::UInt32(v), TypeDescriptor::UInt32) => Ok(scalar::encode_uint32(*v)),
        (Value::UInt64(v), TypeDescriptor::UInt64) => Ok(scalar::encode_uint64(*v)),
        (Value::Enumeration(v), TypeDescriptor::Enumeration { .. }) => {
            Ok(scalar::encode_enum(*v))
        }
        (Value::Class(obj), TypeDescriptor::Class { .. }) => {
            if obj.is_null() {
                Ok(Bytes::from_static(&[0u8]))
            } else {
                Ok(obj.id_bytes().clone())
            }
        }
        (Value::List(items), TypeDescriptor::List(item_ty)) => {
            encode_collection(items.iter(), item_ty)
        }
        (Value::Set(items), TypeDescriptor::Set(item_ty)) => {
            encode_collection(items.iter(), item_ty)
        }
        (Value::Tuple(items), TypeDescriptor::Tuple(item_tys)) => {
            if items.len() != item_tys.len() {
                return Err(Error::Protocol(format!(
                    "tuple arity mismatch: value has {} items, type declares {}",
                    items.len(),
                    item_tys.len()
                )));
            }
            let encoded_items = items
                .iter()
                .zip(item_tys)
                .map(|(item, item_ty)| encode(item, item_ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CollectionValue {
                items: encoded_items,
            }
            .encode_to_vec()
            .into())
        }
        (Value::Dictionary(entries), TypeDescriptor::Dictionary(key_ty, value_ty)) => {
            let wire_entries = entries
                .iter()
                .map(|(k, v)| {
                    Ok(DictionaryEntry {
                        key: encode(k, key_ty)?,
                        value: encode(v, value_ty)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            Ok(DictionaryValue {
                entries: wire_entries,
            }
            .encode_to_vec()
            .into())
        }
        (Value::ProcedureCall(spec), TypeDescriptor::ProcedureCall) => {
            Ok(encode_procedure_call(spec).encode_to_vec().into())
        }
        (Value::Protobuf(bytes), TypeDescriptor::Protobuf { .. }) => Ok(bytes.clone()),
        (value, ty) => Err(Error::Protocol(format!(
            "cannot encode {value:?} as {ty:?}: value/type mismatch"
        ))),
    }
}

fn encode_collection<'a>(
    items: impl Iterator<Item = &'a Value>,
    item_ty: &TypeDescriptor,
) -> Result<Bytes, Error> {
    let encoded_items = items
        .map(|item| encode(item, item_ty))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CollectionValue {
        items: encoded_items,
    }
    .encode_to_vec()
    .into())
}

pub(crate) fn encode_procedure_call(spec: &ProcedureCallSpec) -> rpc_link_protocol::ProcedureCall {
    rpc_link_protocol::ProcedureCall {
        service: spec.service.clone(),
        procedure: spec.procedure.clone(),
        arguments: spec
            .arguments
            .iter()
            .map(|(position, value)| Argument {
                position: *position,
                value: value.clone(),
            })
            .collect(),
    }
}

/// Decodes `bytes` under the wire conventions for `ty`. `connection` is only
/// consulted for [`TypeDescriptor::Class`] values, which need a connection
/// handle to become a usable [`ObjectReference`].
pub fn decode(bytes: Bytes, ty: &TypeDescriptor, connection: &Connection) -> Result<Value, Error> {
    match ty {
        TypeDescriptor::Bool => Ok(Value::Bool(scalar::decode_bool(&bytes)?)),
        TypeDescriptor::Bytes => Ok(Value::Bytes(scalar::decode_length_delimited(&bytes)?)),
        TypeDescriptor::String => {
            let raw = scalar::decode_length_delimited(&bytes)?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|e| Error::Protocol(format!("invalid utf-8 in string value: {e}")))?;
            Ok(Value::String(s))
        }
        TypeDescriptor::Float => Ok(Value::Float(scalar::decode_float(&bytes)?)),
        TypeDescriptor::Double => Ok(Value::Double(scalar::decode_double(&bytes)?)),
        TypeDescriptor::SInt32 => Ok(Value::SInt32(scalar::decode_sint32(&bytes)?)),
        TypeDescriptor::UInt32 => Ok(Value::UInt32(scalar::decode_uint32(&bytes)?)),
        TypeDescriptor::UInt64 => Ok(Value::UInt64(scalar::decode_uint64(&bytes)?)),
        TypeDescriptor::Enumeration { .. } => Ok(Value::Enumeration(scalar::decode_enum(&bytes)?)),
        TypeDescriptor::Class { service, name } => {
            let obj = ObjectReference::new(bytes, service.clone(), name.clone(), connection.clone());
            Ok(Value::Class(obj))
        }
        TypeDescriptor::List(item_ty) => {
            let items = decode_collection_items(&bytes, item_ty, connection)?;
            Ok(Value::List(items))
        }
        TypeDescriptor::Set(item_ty) => {
            let collection = CollectionValue::decode(bytes)?;
            let mut seen = HashSet::new();
            let mut items = Vec::new();
            for raw in collection.items {
                if seen.insert(raw.clone()) {
                    items.push(decode(raw, item_ty, connection)?);
                }
            }
            Ok(Value::Set(items))
        }
        TypeDescriptor::Tuple(item_tys) => {
            let collection = CollectionValue::decode(bytes)?;
            if collection.items.len() != item_tys.len() {
                return Err(Error::Protocol(format!(
                    "tuple arity mismatch: wire has {} items, type declares {}",
                    collection.items.len(),
                    item_tys.len()
                )));
            }
            let items = collection
                .items
                .into_iter()
                .zip(item_tys)
                .map(|(raw, item_ty)| decode(raw, item_ty, connection))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(items))
        }
        TypeDescriptor::Dictionary(key_ty, value_ty) => {
            let dict = DictionaryValue::decode(bytes)?;
            let entries = dict
                .entries
                .into_iter()
                .map(|entry| {
                    Ok((
                        decode(entry.key, key_ty, connection)?,
                        decode(entry.value, value_ty, connection)?,
                    ))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            Ok(Value::Dictionary(entries))
        }
        TypeDescriptor::ProcedureCall => {
            let call = rpc_link_protocol::ProcedureCall::decode(bytes)?;
            let arguments = call
                .arguments
                .into_iter()
                .map(|arg| (arg.position, arg.value))
                .collect();
            Ok(Value::ProcedureCall(ProcedureCallSpec {
                service: call.service,
                procedure: call.procedure,
                arguments,
            }))
        }
        TypeDescriptor::Protobuf { .. } => Ok(Value::Protobuf(bytes)),
    }
}

/// A compact, self-describing wire form for a [`TypeDescriptor`], used only
/// where a type itself must travel as an argument (currently
/// [`crate::expr::Expr::cast`]). One tag byte followed by the `service`/
/// `name` pair as length-delimited strings for the variants that carry them.
///
/// There is no generated `Type` message for this in the proto (the real
/// protocol materializes types as their own server-side objects, which is
/// out of scope here — see DESIGN.md), so this encoding is private to this
/// crate and never appears in any message defined in `rpclink.proto`.
pub(crate) fn encode_type_tag(ty: &TypeDescriptor) -> Result<Bytes, Error> {
    let (tag, service, name): (u8, &str, &str) = match ty {
        TypeDescriptor::Bool => (0, "", ""),
        TypeDescriptor::SInt32 => (1, "", ""),
        TypeDescriptor::UInt32 => (2, "", ""),
        TypeDescriptor::UInt64 => (3, "", ""),
        TypeDescriptor::Float => (4, "", ""),
        TypeDescriptor::Double => (5, "", ""),
        TypeDescriptor::String => (6, "", ""),
        TypeDescriptor::Enumeration { service, name } => (7, service, name),
        TypeDescriptor::Class { service, name } => (8, service, name),
        other => {
            return Err(Error::Builder(format!(
                "{other:?} is not a valid expression cast target"
            )))
        }
    };
    let mut out = bytes::BytesMut::new();
    out.extend_from_slice(&[tag]);
    out.extend_from_slice(&scalar::encode_length_delimited(service.as_bytes()));
    out.extend_from_slice(&scalar::encode_length_delimited(name.as_bytes()));
    Ok(out.freeze())
}

fn decode_collection_items(
    bytes: &Bytes,
    item_ty: &TypeDescriptor,
    connection: &Connection,
) -> Result<Vec<Value>, Error> {
    let collection = CollectionValue::decode(bytes.clone())?;
    collection
        .items
        .into_iter()
        .map(|raw| decode(raw, item_ty, connection))
        .collect()
}
