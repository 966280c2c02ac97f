use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Exception {
    /// String message, or `nil`.
    pub message: Value,
    /// Array of frame names, innermost first. `nil` until raised.
    pub stack_trace: Value,
    /// Exception that was in flight when this one was raised by a cleanup.
    pub context: Value,
    pub attrs: Value,
}

impl Default for Exception {
    fn default() -> Self {
        Self {
            message: Value::NIL,
            stack_trace: Value::NIL,
            context: Value::NIL,
            attrs: Value::UNDEF,
        }
    }
}
