use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;
use std::ops::Sub;

use serde::Deserialize;
use serde::Serialize;

/// Bitset over the event categories a subject can be watched for.
///
/// The zero value means "no subscription" and is never persisted: a stored
/// concern-state record always carries at least one bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcernType(u64);

/// (bit, name) pairs of the categories known by name.
/// New categories take the next free bit; unnamed bits still round-trip.
const NAMED: &[(ConcernType, &str)] = &[
    (ConcernType::LIVE, "live"),
    (ConcernType::NEWS, "news"),
    (ConcernType::VIDEO, "video"),
];

impl ConcernType {
    pub const EMPTY: ConcernType = ConcernType(0);
    pub const LIVE: ConcernType = ConcernType(1 << 0);
    pub const NEWS: ConcernType = ConcernType(1 << 1);
    pub const VIDEO: ConcernType = ConcernType(1 << 2);

    pub const fn from_bits(bits: u64) -> Self {
        ConcernType(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union.
    pub const fn add(
        self,
        other: ConcernType,
    ) -> ConcernType {
        ConcernType(self.0 | other.0)
    }

    /// Difference: bits of `self` not present in `other`.
    pub const fn remove(
        self,
        other: ConcernType,
    ) -> ConcernType {
        ConcernType(self.0 & !other.0)
    }

    /// True when every bit of `other` is set in `self`.
    /// The empty set is contained in nothing, so an empty request never
    /// reports a duplicate subscription.
    pub const fn contains_all(
        self,
        other: ConcernType,
    ) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn contains_any(
        self,
        other: ConcernType,
    ) -> bool {
        self.0 & other.0 != 0
    }

    /// Decomposes into single-bit values, lowest bit first.
    pub fn split(self) -> Vec<ConcernType> {
        let mut bits = self.0;
        let mut result = Vec::with_capacity(bits.count_ones() as usize);
        while bits != 0 {
            let lowest = bits & bits.wrapping_neg();
            result.push(ConcernType(lowest));
            bits &= !lowest;
        }
        result
    }

    pub fn from_name(name: &str) -> Option<ConcernType> {
        NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(t, _)| *t)
    }

    /// Canonical storage encoding: the decimal bit pattern.
    pub fn encode(self) -> String {
        self.0.to_string()
    }

    pub fn decode(value: &str) -> Option<ConcernType> {
        value.trim().parse::<u64>().ok().map(ConcernType)
    }
}

impl BitOr for ConcernType {
    type Output = ConcernType;

    fn bitor(
        self,
        rhs: ConcernType,
    ) -> ConcernType {
        self.add(rhs)
    }
}

impl BitOrAssign for ConcernType {
    fn bitor_assign(
        &mut self,
        rhs: ConcernType,
    ) {
        *self = self.add(rhs);
    }
}

impl Sub for ConcernType {
    type Output = ConcernType;

    fn sub(
        self,
        rhs: ConcernType,
    ) -> ConcernType {
        self.remove(rhs)
    }
}

impl fmt::Display for ConcernType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("empty");
        }
        let mut first = true;
        for bit in self.split() {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            match NAMED.iter().find(|(t, _)| *t == bit) {
                Some((_, name)) => f.write_str(name)?,
                None => write!(f, "bit{}", bit.0.trailing_zeros())?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConcernType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ConcernType({})", self)
    }
}
