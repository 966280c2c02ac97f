//! Managed object bodies.
//!
//! Every heap slot holds a [`HeapObject`]: a [`Header`] plus one
//! [`ObjectBody`] variant. Container kinds (tables, arrays, strings) own
//! their backing buffer exclusively.

pub mod arrays;
pub mod bignums;
pub mod classes;
pub mod exceptions;
pub mod floats;
pub mod instances;
pub mod natives;
pub mod strings;
pub mod tables;

pub use arrays::Array;
pub use bignums::BigNum;
pub use classes::Class;
pub use exceptions::Exception;
pub use floats::Float;
pub use instances::Instance;
pub use natives::NativeMethod;
pub use strings::Str;
pub use tables::{Entry, EntryId, IterPosition, Table, TableIterator};

use crate::header::{Header, ObjectType};

pub enum ObjectBody {
    Object(Instance),
    Class(Class),
    Str(Str),
    Array(Array),
    Table(Table),
    TableIterator(TableIterator),
    BigNum(BigNum),
    Float(Float),
    Exception(Exception),
    Native(NativeMethod),
}

impl ObjectBody {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Object(_) => ObjectType::Object,
            Self::Class(_) => ObjectType::Class,
            Self::Str(_) => ObjectType::Str,
            Self::Array(_) => ObjectType::Array,
            Self::Table(_) => ObjectType::Table,
            Self::TableIterator(_) => ObjectType::TableIterator,
            Self::BigNum(_) => ObjectType::BigNum,
            Self::Float(_) => ObjectType::Float,
            Self::Exception(_) => ObjectType::Exception,
            Self::Native(_) => ObjectType::Native,
        }
    }
}

pub struct HeapObject {
    pub header: Header,
    pub body: ObjectBody,
}

/// Typed views into an [`ObjectBody`], used by the heap's checked accessors.
pub trait BodyKind: Sized {
    const TYPE: ObjectType;
    fn from_body(body: &ObjectBody) -> Option<&Self>;
    fn from_body_mut(body: &mut ObjectBody) -> Option<&mut Self>;
}

macro_rules! body_kind {
    ($ty:ty, $variant:ident, $object_type:expr) => {
        impl BodyKind for $ty {
            const TYPE: ObjectType = $object_type;

            #[inline]
            fn from_body(body: &ObjectBody) -> Option<&Self> {
                match body {
                    ObjectBody::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            #[inline]
            fn from_body_mut(body: &mut ObjectBody) -> Option<&mut Self> {
                match body {
                    ObjectBody::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

body_kind!(Instance, Object, ObjectType::Object);
body_kind!(Class, Class, ObjectType::Class);
body_kind!(Str, Str, ObjectType::Str);
body_kind!(Array, Array, ObjectType::Array);
body_kind!(Table, Table, ObjectType::Table);
body_kind!(TableIterator, TableIterator, ObjectType::TableIterator);
body_kind!(BigNum, BigNum, ObjectType::BigNum);
body_kind!(Float, Float, ObjectType::Float);
body_kind!(Exception, Exception, ObjectType::Exception);
body_kind!(NativeMethod, Native, ObjectType::Native);
