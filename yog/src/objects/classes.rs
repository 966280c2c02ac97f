use crate::header::ObjectType;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Class {
    /// Symbol naming the class.
    pub name: Value,
    /// Superclass, or `nil` for the root.
    pub superclass: Value,
    /// Symbol-keyed table of native methods.
    pub methods: Value,
    /// Body kind `new` allocates for instances, `None` when the class
    /// cannot be instantiated (immediates, numbers, runtime internals).
    pub instance_type: Option<ObjectType>,
}

impl Default for Class {
    fn default() -> Self {
        Self {
            name: Value::UNDEF,
            superclass: Value::NIL,
            methods: Value::UNDEF,
            instance_type: Some(ObjectType::Object),
        }
    }
}
