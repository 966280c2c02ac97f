//! Error taxonomy.
//!
//! Language-level errors are exception objects travelling as
//! [`Unwind::Raise`]. Corrupted runtime state travels as [`Unwind::Fatal`]
//! and is never intercepted by a `rescue`.

use thiserror::Error;

use crate::header::ObjectType;
use crate::value::Value;

/// Impossible states. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("stale reference {0:?}: slot was freed or reused")]
    StaleReference(Value),
    #[error("expected a heap reference, got {0:?}")]
    NotAReference(Value),
    #[error("expected a fixnum, got {0:?}")]
    NotAFixnum(Value),
    #[error("type tag mismatch: expected {expected}, found {found}")]
    TypeTagMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("table chain is corrupted: {0}")]
    CorruptedTable(&'static str),
    #[error("table modified during iteration")]
    TableModifiedDuringIteration,
    #[error("iterator is not positioned on an entry")]
    IteratorNotPositioned,
    #[error("key strategy `{0}` does not support this operation")]
    UnsupportedStrategy(&'static str),
    #[error("no active frame")]
    NoActiveFrame,
    #[error("{0}")]
    Other(String),
}

impl InvariantViolation {
    pub fn type_mismatch(expected: ObjectType, found: ObjectType) -> Self {
        Self::TypeTagMismatch {
            expected: expected.name(),
            found: found.name(),
        }
    }
}

/// Why a native operation did not return normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unwind {
    /// A raised exception object, caught by the nearest matching `rescue`.
    #[error("exception raised: {0:?}")]
    Raise(Value),
    #[error("fatal: {0}")]
    Fatal(#[from] InvariantViolation),
}

impl Unwind {
    pub fn exception(&self) -> Option<Value> {
        match self {
            Self::Raise(exc) => Some(*exc),
            Self::Fatal(_) => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Built-in exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    Exception = 0,
    TypeError,
    ValueError,
    KeyError,
    /// Division (`/`, `//`, `%`) by a zero of any numeric kind.
    ZeroDivisionError,
    ImportError,
    IOError,
    IndexError,
    ArgumentError,
    AttributeError,
    NameError,
}

impl ErrorKind {
    pub const COUNT: usize = Self::NameError as usize + 1;

    pub const ALL: [ErrorKind; Self::COUNT] = [
        Self::Exception,
        Self::TypeError,
        Self::ValueError,
        Self::KeyError,
        Self::ZeroDivisionError,
        Self::ImportError,
        Self::IOError,
        Self::IndexError,
        Self::ArgumentError,
        Self::AttributeError,
        Self::NameError,
    ];

    pub const fn class_name(self) -> &'static str {
        match self {
            Self::Exception => "Exception",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::KeyError => "KeyError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::ImportError => "ImportError",
            Self::IOError => "IOError",
            Self::IndexError => "IndexError",
            Self::ArgumentError => "ArgumentError",
            Self::AttributeError => "AttributeError",
            Self::NameError => "NameError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_are_listed_in_discriminant_order() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i, "{} out of order", kind.class_name());
        }
    }

    #[test]
    fn fatal_unwinds_carry_no_exception() {
        let fatal: Unwind = InvariantViolation::NoActiveFrame.into();
        assert!(fatal.is_fatal());
        assert_eq!(fatal.exception(), None);
        assert_eq!(fatal.to_string(), "fatal: no active frame");

        let raise = Unwind::Raise(Value::from_i64(3));
        assert_eq!(raise.exception(), Some(Value::from_i64(3)));
    }
}
