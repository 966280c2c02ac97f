use num_bigint::BigInt;

/// Arbitrary-precision integer.
///
/// Values that fit the fixnum range are never stored here; see
/// [`crate::numeric::normalize`].
#[derive(Debug, Default, Clone)]
pub struct BigNum {
    value: BigInt,
}

impl BigNum {
    pub fn new(value: BigInt) -> Self {
        Self { value }
    }

    #[inline]
    pub fn value(&self) -> &BigInt {
        &self.value
    }
}
