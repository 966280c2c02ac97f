use crate::interning::SymbolId;

/// Tag constants.
const FIXNUM_MASK: u64 = 0b1;
const TAG_MASK: u64 = 0b11;
const REF_TAG: u64 = 0b01;
const IMMEDIATE_TAG: u64 = 0b11;
const IMMEDIATE_KIND_MASK: u64 = 0b1111;
const SPECIAL_TAG: u64 = 0b0011;
const SYMBOL_TAG: u64 = 0b0111;

const GENERATION_SHIFT: u32 = 2;
const INDEX_SHIFT: u32 = 32;

/// Generations wrap inside the 30 bits between the tag and the slot index.
pub const GENERATION_MASK: u32 = (1 << 30) - 1;

pub const FIXNUM_BITS: u32 = 63;
pub const FIXNUM_MIN: i64 = -(1 << 62);
pub const FIXNUM_MAX: i64 = (1 << 62) - 1;

/// A tagged 64-bit value.
///
/// Encoding:
/// - **Fixnum**:    `...XXXXX0`: 63-bit signed integer (low bit 0).
/// - **Reference**: `iiii..gg01`: heap slot index in the upper 32 bits,
///   slot generation in bits 2..32.
/// - **Special**:   `...XX0011`: `undef`, `nil`, `false`, `true`.
/// - **Symbol**:    `...XX0111`: interned symbol id in bits 4..
///
/// The tag alone decides how the remaining bits are read, so a fixnum can
/// never be mistaken for a reference and vice versa.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    /// Absence of a value. Never visible to the language.
    pub const UNDEF: Value = Value(0x03);
    pub const NIL: Value = Value(0x13);
    pub const FALSE: Value = Value(0x23);
    pub const TRUE: Value = Value(0x33);

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    // ── Fixnum ─────────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_fixnum(self) -> bool {
        self.0 & FIXNUM_MASK == 0
    }

    #[inline(always)]
    pub const fn fits_fixnum(n: i64) -> bool {
        n >= FIXNUM_MIN && n <= FIXNUM_MAX
    }

    #[inline(always)]
    pub fn from_i64(n: i64) -> Self {
        debug_assert!(Self::fits_fixnum(n), "fixnum overflow: {n}");
        Self((n << 1) as u64)
    }

    #[inline(always)]
    pub fn try_from_i64(n: i64) -> Option<Self> {
        Self::fits_fixnum(n).then(|| Self((n << 1) as u64))
    }

    #[inline(always)]
    pub fn to_i64(self) -> i64 {
        debug_assert!(self.is_fixnum());
        (self.0 as i64) >> 1
    }

    #[inline(always)]
    pub fn as_fixnum(self) -> Option<i64> {
        self.is_fixnum().then(|| self.to_i64())
    }

    // ── Reference ──────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_ref(self) -> bool {
        self.0 & TAG_MASK == REF_TAG
    }

    #[inline(always)]
    pub fn from_slot(index: u32, generation: u32) -> Self {
        debug_assert!(generation <= GENERATION_MASK, "generation out of range");
        Self(
            ((index as u64) << INDEX_SHIFT)
                | (((generation & GENERATION_MASK) as u64) << GENERATION_SHIFT)
                | REF_TAG,
        )
    }

    #[inline(always)]
    pub fn slot_index(self) -> u32 {
        debug_assert!(self.is_ref());
        (self.0 >> INDEX_SHIFT) as u32
    }

    #[inline(always)]
    pub fn slot_generation(self) -> u32 {
        debug_assert!(self.is_ref());
        ((self.0 >> GENERATION_SHIFT) as u32) & GENERATION_MASK
    }

    // ── Immediates ─────────────────────────────────────────────────

    #[inline(always)]
    pub const fn is_immediate(self) -> bool {
        self.0 & TAG_MASK == IMMEDIATE_TAG
    }

    #[inline(always)]
    pub const fn is_undef(self) -> bool {
        self.0 == Self::UNDEF.0
    }

    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }

    #[inline(always)]
    pub const fn is_bool(self) -> bool {
        self.0 == Self::TRUE.0 || self.0 == Self::FALSE.0
    }

    #[inline(always)]
    pub const fn from_bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    #[inline(always)]
    pub fn as_bool(self) -> Option<bool> {
        self.is_bool().then_some(self.0 == Self::TRUE.0)
    }

    /// Everything except `nil` and `false` counts as true.
    #[inline(always)]
    pub const fn is_truthy(self) -> bool {
        !(self.is_nil() || self.0 == Self::FALSE.0 || self.is_undef())
    }

    #[inline(always)]
    pub const fn is_special(self) -> bool {
        self.0 & IMMEDIATE_KIND_MASK == SPECIAL_TAG
    }

    #[inline(always)]
    pub const fn is_symbol(self) -> bool {
        self.0 & IMMEDIATE_KIND_MASK == SYMBOL_TAG
    }

    #[inline(always)]
    pub fn from_symbol(id: SymbolId) -> Self {
        Self(((id.0 as u64) << 4) | SYMBOL_TAG)
    }

    #[inline(always)]
    pub fn as_symbol(self) -> Option<SymbolId> {
        self.is_symbol().then(|| SymbolId((self.0 >> 4) as u32))
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::UNDEF
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_fixnum() {
            write!(f, "Fixnum({})", self.to_i64())
        } else if self.is_ref() {
            write!(f, "Ref(#{}@{})", self.slot_index(), self.slot_generation())
        } else if let Some(id) = self.as_symbol() {
            write!(f, "Symbol({})", id.0)
        } else {
            match *self {
                Self::UNDEF => f.write_str("Undef"),
                Self::NIL => f.write_str("Nil"),
                Self::TRUE => f.write_str("True"),
                Self::FALSE => f.write_str("False"),
                _ => write!(f, "Immediate(0x{:016x})", self.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixnum_round_trips_at_the_range_edges() {
        for n in [0, 1, -1, 42, FIXNUM_MAX, FIXNUM_MIN] {
            let v = Value::from_i64(n);
            assert!(v.is_fixnum());
            assert!(!v.is_ref() && !v.is_immediate());
            assert_eq!(v.to_i64(), n);
        }
        assert!(Value::try_from_i64(FIXNUM_MAX + 1).is_none());
        assert!(Value::try_from_i64(FIXNUM_MIN - 1).is_none());
    }

    #[test]
    #[should_panic(expected = "fixnum overflow")]
    #[cfg(debug_assertions)]
    fn from_i64_rejects_out_of_range_in_debug() {
        let _ = Value::from_i64(i64::MAX);
    }

    #[test]
    fn references_keep_index_and_generation_apart() {
        let v = Value::from_slot(123_456, GENERATION_MASK);
        assert!(v.is_ref());
        assert!(!v.is_fixnum());
        assert_eq!(v.slot_index(), 123_456);
        assert_eq!(v.slot_generation(), GENERATION_MASK);
        assert_ne!(v, Value::from_slot(123_456, 0));
    }

    #[test]
    fn specials_are_distinct_and_classified() {
        let specials = [Value::UNDEF, Value::NIL, Value::FALSE, Value::TRUE];
        for (i, a) in specials.iter().enumerate() {
            assert!(a.is_immediate() && a.is_special());
            assert!(!a.is_symbol() && !a.is_fixnum() && !a.is_ref());
            for b in &specials[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(Value::TRUE.is_bool() && Value::FALSE.is_bool());
        assert!(!Value::NIL.is_bool());
        assert_eq!(Value::from_bool(true).as_bool(), Some(true));
        assert_eq!(Value::NIL.as_bool(), None);
    }

    #[test]
    fn truthiness_only_excludes_nil_and_false() {
        assert!(!Value::NIL.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(Value::from_i64(0).is_truthy());
        assert!(Value::from_symbol(SymbolId(0)).is_truthy());
    }

    #[test]
    fn symbols_carry_their_id() {
        let v = Value::from_symbol(SymbolId(77));
        assert!(v.is_symbol() && v.is_immediate());
        assert_eq!(v.as_symbol(), Some(SymbolId(77)));
        assert_eq!(Value::from_i64(77).as_symbol(), None);
        assert_eq!(format!("{v:?}"), "Symbol(77)");
    }
}
