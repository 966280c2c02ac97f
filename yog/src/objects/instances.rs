use crate::value::Value;

/// Plain instance of a user-visible class.
///
/// The attribute table is allocated on first write; until then `attrs`
/// is `undef`.
#[derive(Debug, Clone)]
pub struct Instance {
    pub attrs: Value,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            attrs: Value::UNDEF,
        }
    }
}
