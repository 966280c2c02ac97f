use crate::value::Value;

/// Kind tag of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Object = 0,
    Class,
    Str,
    Array,
    Table,
    TableIterator,
    BigNum,
    Float,
    Exception,
    Native,
}

impl ObjectType {
    pub const COUNT: usize = Self::Native as usize + 1;

    pub const fn name(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Class => "Class",
            Self::Str => "String",
            Self::Array => "Array",
            Self::Table => "Dict",
            Self::TableIterator => "DictIterator",
            Self::BigNum => "Bignum",
            Self::Float => "Float",
            Self::Exception => "Exception",
            Self::Native => "NativeFunction",
        }
    }
}

/// Collector / bookkeeping flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    pub const NONE: Self = Self(0);
    pub const MARKED: Self = Self(1 << 0);
    pub const FROZEN: Self = Self(1 << 1);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }
}

/// Two-word identity: the owning runtime instance and a per-runtime serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub upper: u64,
    pub lower: u64,
}

/// Header stored in front of every managed object body.
///
/// `klass` is a regular reference and is traced like any other edge.
#[derive(Clone)]
pub struct Header {
    object_type: ObjectType,
    flags: HeaderFlags,
    klass: Value,
    id: ObjectId,
}

impl Header {
    pub fn new(object_type: ObjectType, klass: Value, id: ObjectId) -> Self {
        Self {
            object_type,
            flags: HeaderFlags::NONE,
            klass,
            id,
        }
    }

    #[inline(always)]
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    #[inline(always)]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline(always)]
    pub fn klass(&self) -> Value {
        self.klass
    }

    #[inline(always)]
    pub fn set_klass(&mut self, klass: Value) {
        self.klass = klass;
    }

    #[inline(always)]
    pub fn klass_mut(&mut self) -> &mut Value {
        &mut self.klass
    }

    // ── flags ──────────────────────────────────────────────────────

    #[inline(always)]
    pub fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[inline(always)]
    pub fn set_flags(&mut self, flags: HeaderFlags) {
        self.flags = flags;
    }

    #[inline(always)]
    pub fn has_flag(&self, flag: HeaderFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline(always)]
    pub fn add_flag(&mut self, flag: HeaderFlags) {
        self.flags = self.flags.with(flag);
    }

    #[inline(always)]
    pub fn remove_flag(&mut self, flag: HeaderFlags) {
        self.flags = self.flags.without(flag);
    }
}

impl core::fmt::Debug for Header {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Header")
            .field("type", &self.object_type)
            .field("flags", &self.flags)
            .field("klass", &self.klass)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_set_and_cleared_independently() {
        let mut header = Header::new(
            ObjectType::Array,
            Value::NIL,
            ObjectId { upper: 1, lower: 2 },
        );
        assert_eq!(header.flags(), HeaderFlags::NONE);

        header.add_flag(HeaderFlags::MARKED);
        header.add_flag(HeaderFlags::FROZEN);
        assert!(header.has_flag(HeaderFlags::MARKED));
        assert!(header.has_flag(HeaderFlags::FROZEN));

        header.remove_flag(HeaderFlags::MARKED);
        assert!(!header.has_flag(HeaderFlags::MARKED));
        assert!(header.has_flag(HeaderFlags::FROZEN));
        assert_eq!(header.object_type(), ObjectType::Array);
    }

    #[test]
    fn object_ids_order_by_instance_then_serial() {
        let a = ObjectId { upper: 1, lower: 9 };
        let b = ObjectId { upper: 2, lower: 0 };
        assert!(a < b);
        assert_ne!(a, ObjectId { upper: 1, lower: 8 });
    }
}
