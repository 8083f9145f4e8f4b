//! Server-side expression trees, used to build the boolean conditions that
//! back [`crate::Event`].
//!
//! Construction is strict: every sub-expression is materialized on the
//! server immediately by issuing the matching `Expression_*` RPC against the
//! `KRPC.Expression` service, which hands back a new opaque expression id.
//! Building a tree of N nodes costs N round trips, so trees are expected to
//! stay small. An [`Expr`] only ever holds the remote id plus a handle back
//! to the connection that created it — never a client-side tree.
//!
//! Only [`Expr::call`] carries dynamic semantics; every other constructor
//! bakes a host-side literal in at build time. There is deliberately no
//! blanket `From<i32>`/`From<f64>`/`From<&str>` impl: a bare host number or
//! string is an [`crate::Error::Builder`] waiting to happen in the source
//! API, so callers here are made to write `Expr::int(x)`, `Expr::double(x)`,
//! `Expr::string(s)` explicitly instead.

use bytes::Bytes;

use crate::codec::{self, ProcedureCallSpec, TypeDescriptor};
use crate::connection::Connection;
use crate::error::Error;

/// A handle to a node in a server-side expression tree.
#[derive(Debug, Clone)]
pub struct Expr {
    id: Bytes,
    connection: Connection,
}

impl Expr {
    /// The opaque id the server assigned this node, as returned by the
    /// `Expression_*` call that materialized it.
    pub fn id(&self) -> &Bytes {
        &self.id
    }

    async fn build(
        connection: &Connection,
        procedure: &str,
        args: Vec<(u32, Bytes)>,
    ) -> Result<Expr, Error> {
        let id = connection.expression_call(procedure, args).await?;
        Ok(Expr {
            id,
            connection: connection.clone(),
        })
    }

    fn operand_args(operands: &[&Expr]) -> Vec<(u32, Bytes)> {
        operands
            .iter()
            .enumerate()
            .map(|(position, expr)| (position as u32, expr.id.clone()))
            .collect()
    }

    // -- constants -----------------------------------------------------

    pub async fn bool(connection: &Connection, value: bool) -> Result<Expr, Error> {
        let args = vec![(0, rpc_link_protocol::scalar::encode_bool(value))];
        Self::build(connection, "Expression_ConstantBool", args).await
    }

    pub async fn int(connection: &Connection, value: i32) -> Result<Expr, Error> {
        let args = vec![(0, rpc_link_protocol::scalar::encode_sint32(value))];
        Self::build(connection, "Expression_ConstantInt", args).await
    }

    pub async fn float(connection: &Connection, value: f32) -> Result<Expr, Error> {
        let args = vec![(0, rpc_link_protocol::scalar::encode_float(value))];
        Self::build(connection, "Expression_ConstantFloat", args).await
    }

    pub async fn double(connection: &Connection, value: f64) -> Result<Expr, Error> {
        let args = vec![(0, rpc_link_protocol::scalar::encode_double(value))];
        Self::build(connection, "Expression_ConstantDouble", args).await
    }

    pub async fn string(connection: &Connection, value: &str) -> Result<Expr, Error> {
        let args = vec![(
            0,
            rpc_link_protocol::scalar::encode_length_delimited(value.as_bytes()),
        )];
        Self::build(connection, "Expression_ConstantString", args).await
    }

    /// Wraps a fully specified procedure call as a dynamic expression node:
    /// the only node whose value isn't baked in at build time.
    pub async fn call(connection: &Connection, spec: ProcedureCallSpec) -> Result<Expr, Error> {
        use prost::Message;
        let encoded: Bytes = codec::encode_procedure_call(&spec).encode_to_vec().into();
        Self::build(connection, "Expression_Call", vec![(0, encoded)]).await
    }

    // -- arithmetic ------------------------------------------------------

    pub async fn add(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Add", other).await
    }

    pub async fn subtract(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Subtract", other).await
    }

    pub async fn multiply(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Multiply", other).await
    }

    pub async fn divide(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Divide", other).await
    }

    pub async fn modulo(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Modulo", other).await
    }

    pub async fn power(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Power", other).await
    }

    pub async fn left_shift(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_LeftShift", other).await
    }

    pub async fn right_shift(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_RightShift", other).await
    }

    // -- comparison ------------------------------------------------------

    pub async fn less_than(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_LessThan", other).await
    }

    pub async fn less_than_or_equal(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_LessThanOrEqual", other).await
    }

    pub async fn equal(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Equal", other).await
    }

    pub async fn not_equal(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_NotEqual", other).await
    }

    pub async fn greater_than_or_equal(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_GreaterThanOrEqual", other).await
    }

    pub async fn greater_than(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_GreaterThan", other).await
    }

    // -- boolean ----------------------------------------------------------

    pub async fn and(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_And", other).await
    }

    pub async fn or(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_Or", other).await
    }

    pub async fn exclusive_or(&self, other: &Expr) -> Result<Expr, Error> {
        self.binary_op("Expression_ExclusiveOr", other).await
    }

    pub async fn not(&self) -> Result<Expr, Error> {
        self.unary_op("Expression_Not").await
    }

    // -- numeric conversion and cast --------------------------------------

    pub async fn to_int(&self) -> Result<Expr, Error> {
        self.unary_op("Expression_ToInt").await
    }

    pub async fn to_float(&self) -> Result<Expr, Error> {
        self.unary_op("Expression_ToFloat").await
    }

    pub async fn to_double(&self) -> Result<Expr, Error> {
        self.unary_op("Expression_ToDouble").await
    }

    /// Casts to an arbitrary declared type, rather than one of the fixed
    /// numeric conversions above. Only scalar, enumeration, and class
    /// targets are meaningful cast targets; anything else is a
    /// [`Error::Builder`].
    pub async fn cast(&self, target: &TypeDescriptor) -> Result<Expr, Error> {
        let type_tag = codec::encode_type_tag(target)?;
        let args = vec![(0, self.id.clone()), (1, type_tag)];
        Self::build(&self.connection, "Expression_Cast", args).await
    }

    async fn binary_op(&self, procedure: &str, other: &Expr) -> Result<Expr, Error> {
        let args = Self::operand_args(&[self, other]);
        Self::build(&self.connection, procedure, args).await
    }

    async fn unary_op(&self, procedure: &str) -> Result<Expr, Error> {
        let args = Self::operand_args(&[self]);
        Self::build(&self.connection, procedure, args).await
    }
}
