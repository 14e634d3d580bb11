// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Helper macros for declaring wire-format enums and bitmask types.
//!
//! Every enum and flag set that appears in serialized data goes through these
//! macros so that the raw `u32` conversion and its validation are generated in
//! one place.

/// Declares an enum that is stored in archives as a `u32`.
///
/// The generated type implements [`WireEnum`](crate::serializer::WireEnum);
/// reading an unknown raw value fails deserialization instead of producing an
/// invalid enum. `Default` is the first declared variant.
macro_rules! wire_enum {
    (
        $(#[$attr:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_attr:meta])*
                $variant:ident = $value:literal,
            )+
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u32)]
        $vis enum $name {
            $(
                $(#[$variant_attr])*
                $variant = $value,
            )+
        }

        impl $crate::serializer::WireEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            #[inline]
            fn to_raw(self) -> u32 {
                self as u32
            }

            #[inline]
            fn from_raw(value: u32) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                wire_enum!(@first $($variant)+)
            }
        }
    };

    (@first $first:ident $($rest:ident)*) => {
        Self::$first
    };
}

/// Declares a bitmask type stored in archives as a `u32`.
///
/// The generated type carries the usual set operations plus a
/// [`WireEnum`](crate::serializer::WireEnum) implementation that rejects
/// unknown bits when reading.
macro_rules! wire_flags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$flag_attr:meta])*
                const $flag:ident = $value:expr;
            )+
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        $vis struct $name(u32);

        impl $name {
            $(
                $(#[$flag_attr])*
                pub const $flag: Self = Self($value);
            )+

            /// Returns a set with no bits set.
            #[inline]
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Returns a set with every known bit set.
            #[inline]
            pub const fn all() -> Self {
                Self($($value)|+)
            }

            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Returns whether every bit of `other` is also set in `self`.
            #[inline]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns whether `self` and `other` share at least one bit.
            #[inline]
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            #[inline]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            #[inline]
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Reconstructs a set from raw bits, rejecting unknown bits.
            #[inline]
            pub const fn from_bits(bits: u32) -> Option<Self> {
                if bits & !Self::all().0 == 0 {
                    Some(Self(bits))
                } else {
                    None
                }
            }

            /// Iterates over the individual bits that are set.
            #[inline]
            pub fn iter(self) -> impl Iterator<Item = Self> {
                (0..u32::BITS)
                    .map(move |bit| Self(self.0 & (1u32 << bit)))
                    .filter(|flag| !flag.is_empty())
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }

        impl std::ops::BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl $crate::serializer::WireEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            #[inline]
            fn to_raw(self) -> u32 {
                self.0
            }

            #[inline]
            fn from_raw(value: u32) -> Option<Self> {
                Self::from_bits(value)
            }
        }
    };
}

/// Runs one schema function in measure mode and then in write mode, returning
/// the resulting [`SerializedData`](crate::serializer::SerializedData).
///
/// The closure body is expanded twice, once per serializer type, which is what
/// guarantees that both passes traverse the exact same fields.
macro_rules! serialize_to_data {
    (|$ser:ident| $body:expr) => {{
        let mut measure = $crate::serializer::Measure::new();
        {
            let $ser = &mut measure;
            $body?;
        }
        let mut bytes = vec![0u8; measure.size()];
        {
            let mut writer = $crate::serializer::Writer::new(&mut bytes);
            {
                let $ser = &mut writer;
                $body?;
            }
            debug_assert!(writer.is_ended());
        }
        $crate::serializer::SerializedData::from(bytes)
    }};
}
