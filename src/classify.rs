//! Type Classifier (spec 4.1).
//!
//! In the source runtime this inspects an arbitrary dynamically-typed
//! value at every visit. Here the cost is paid once, at [`crate::Value`]
//! construction time: classification is an exhaustive match over the
//! variant the caller already chose.

use crate::value::{ArrayRef, ByteStream, Deferred, ObjectRef, Primitive, RecordStream, Value};

/// One of the six semantic categories spec 4.1 assigns to a value.
pub enum Category {
    Primitive(Primitive),
    Object(ObjectRef),
    Array(ArrayRef),
    Deferred(Deferred),
    ByteStream(ByteStream),
    RecordStream(RecordStream),
}

/// Classify a value. `Value::Custom` must already have been resolved by the
/// replacer pipeline before this is called.
#[must_use]
pub fn classify(value: Value) -> Category {
    match value {
        Value::Primitive(p) => Category::Primitive(p),
        Value::Object(handle) => Category::Object(handle),
        Value::Array(handle) => Category::Array(handle),
        Value::Deferred(handle) => Category::Deferred(handle),
        Value::ByteStream(handle) => Category::ByteStream(handle),
        Value::RecordStream(handle) => Category::RecordStream(handle),
        Value::Custom(_) => {
            unreachable!("Value::Custom must be resolved by the replacer pipeline first")
        }
    }
}
