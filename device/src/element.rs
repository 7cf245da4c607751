//! Element tags for typed transfers.

/// Element type carried by every device buffer.
///
/// Transfers check the tag at the boundary instead of trusting the caller,
/// so reading an `F32` buffer as `I64` is rejected rather than reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ElementType {
    F32,
    F64,
    I32,
    I64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 => 4,
            ElementType::F64 | ElementType::I64 => 8,
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
}

/// Scalar types that may cross the host/device boundary.
///
/// Sealed: the tag enum and the impl set must stay in lockstep.
pub trait Element: sealed::Sealed + bytemuck::Pod {
    const ELEMENT_TYPE: ElementType;
}

impl Element for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::F32;
}

impl Element for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::F64;
}

impl Element for i32 {
    const ELEMENT_TYPE: ElementType = ElementType::I32;
}

impl Element for i64 {
    const ELEMENT_TYPE: ElementType = ElementType::I64;
}
