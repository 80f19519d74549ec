//! Field & value model
//!
//! The packet-header universe this compiler reasons about: a closed, totally
//! ordered set of field identifiers ([`Field`]), and a per-field value domain
//! ([`Value`]) discriminated by tag (integers, MAC-like 48-bit words, IPv4
//! prefixes, and symbolic locations). [`Test`] and [`Modification`] are the
//! two places a `(Field, Value)` pair is given meaning: "equals" for a test,
//! "assign" for a modification.
//!
//! ## Ordering
//!
//! Every [`Fdd`](crate::fdd) is built against exactly one [`FieldOrder`]; two
//! diagrams built against different orders must never be combined (the
//! invariant is enforced at the [`crate::cache::Cache`] boundary, not here).

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// One packet header field.
///
/// Declaration order is the **default** field order (`FieldOrderOption::Default`
/// in [`crate::options`]); callers may override it with an explicit
/// [`FieldOrder::from_static`] permutation or a [`FieldOrder::heuristic`] pass
/// over a policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Switch,
    Location,
    VSwitch,
    VPort,
    EthSrc,
    EthDst,
    Vlan,
    VlanPcp,
    EthType,
    IPProto,
    IP4Src,
    IP4Dst,
    TCPSrcPort,
    TCPDstPort,
}

/// All fields, in declaration (default) order.
pub const ALL_FIELDS: [Field; 14] = [
    Field::Switch,
    Field::Location,
    Field::VSwitch,
    Field::VPort,
    Field::EthSrc,
    Field::EthDst,
    Field::Vlan,
    Field::VlanPcp,
    Field::EthType,
    Field::IPProto,
    Field::IP4Src,
    Field::IP4Dst,
    Field::TCPSrcPort,
    Field::TCPDstPort,
];

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Field::Switch => "Switch",
            Field::Location => "Location",
            Field::VSwitch => "VSwitch",
            Field::VPort => "VPort",
            Field::EthSrc => "EthSrc",
            Field::EthDst => "EthDst",
            Field::Vlan => "Vlan",
            Field::VlanPcp => "VlanPcp",
            Field::EthType => "EthType",
            Field::IPProto => "IPProto",
            Field::IP4Src => "IP4Src",
            Field::IP4Dst => "IP4Dst",
            Field::TCPSrcPort => "TCPSrcPort",
            Field::TCPDstPort => "TCPDstPort",
        };
        f.write_str(s)
    }
}

/// A total order over [`Field`], fixed for the lifetime of every diagram built
/// against it.
///
/// Two FDDs may only be combined if they were built against `FieldOrder`s that
/// compare equal (see [`crate::cache::Cache::order`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOrder {
    /// `rank[f as usize]` is the field's position in the order; lower sorts first.
    rank: [u8; ALL_FIELDS.len()],
}

impl Default for FieldOrder {
    fn default() -> Self {
        let mut rank = [0u8; ALL_FIELDS.len()];
        for (i, f) in ALL_FIELDS.iter().enumerate() {
            rank[*f as usize] = i as u8;
        }
        Self { rank }
    }
}

impl FieldOrder {
    /// The default (declaration) order.
    #[must_use]
    pub fn default_order() -> Self {
        Self::default()
    }

    /// Build an explicit order from a permutation of [`ALL_FIELDS`].
    ///
    /// Errors if `fields` is not a permutation (wrong length, duplicate, or
    /// missing entries).
    pub fn from_static(fields: &[Field]) -> Result<Self, FieldError> {
        if fields.len() != ALL_FIELDS.len() {
            return Err(FieldError::BadPermutationLength {
                expected: ALL_FIELDS.len(),
                got: fields.len(),
            });
        }
        let mut rank = [u8::MAX; ALL_FIELDS.len()];
        for (i, f) in fields.iter().enumerate() {
            let slot = &mut rank[*f as usize];
            if *slot != u8::MAX {
                return Err(FieldError::DuplicateField(*f));
            }
            *slot = i as u8;
        }
        Ok(Self { rank })
    }

    /// Build an order from per-field occurrence weights: fields with higher
    /// weight are ranked earlier (branch on the hotter field first), ties
    /// broken by the default declaration order.
    ///
    /// This is the mechanism behind `FieldOrderOption::Heuristic`
    /// (see [`crate::options`]): callers run a static pass over a policy to
    /// produce weights (e.g. number of `Test`/`Mod` occurrences per field)
    /// and hand them here.
    #[must_use]
    pub fn from_weights(weights: &[(Field, u64)]) -> Self {
        let mut weight = [0u64; ALL_FIELDS.len()];
        for (f, w) in weights {
            weight[*f as usize] += w;
        }
        let mut order: Vec<Field> = ALL_FIELDS.to_vec();
        order.sort_by(|a, b| {
            weight[*b as usize]
                .cmp(&weight[*a as usize])
                .then_with(|| (*a as usize).cmp(&(*b as usize)))
        });
        Self::from_static(&order).expect("sorted ALL_FIELDS is always a permutation")
    }

    /// Rank of `field` under this order (lower sorts first).
    #[inline]
    #[must_use]
    pub fn rank(&self, field: Field) -> u8 {
        self.rank[field as usize]
    }

    /// Compare two fields under this order.
    #[inline]
    #[must_use]
    pub fn compare(&self, a: Field, b: Field) -> std::cmp::Ordering {
        self.rank(a).cmp(&self.rank(b))
    }
}

/// Errors constructing a [`FieldOrder`].
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("static field order must name all {expected} fields exactly once (got {got})")]
    BadPermutationLength { expected: usize, got: usize },
    #[error("field {0} appears more than once in the static field order")]
    DuplicateField(Field),
    #[error("value {value:?} is not a legal value for field {field}")]
    BadValueForField { field: Field, value: Value },
}

/// An IPv4 CIDR prefix: the low `32 - mask_bits` bits of `value` are don't-care.
///
/// Any two `IpPrefix`es are either disjoint, equal, or one strictly contains
/// the other — never partially overlapping — which is what lets
/// [`crate::fdd`]'s cofactoring resolve prefix tests without a general
/// interval-arithmetic fallback.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct IpPrefix {
    pub value: u32,
    pub mask_bits: u8,
}

impl IpPrefix {
    /// A single host address (`/32`).
    #[must_use]
    pub fn host(addr: u32) -> Self {
        Self { value: addr, mask_bits: 32 }
    }

    /// The match-everything prefix (`/0`).
    #[must_use]
    pub fn any() -> Self {
        Self { value: 0, mask_bits: 0 }
    }

    /// True if every address matching `other` also matches `self`.
    #[must_use]
    pub fn contains(&self, other: &IpPrefix) -> bool {
        if self.mask_bits > other.mask_bits {
            return false;
        }
        if self.mask_bits == 0 {
            return true;
        }
        let shift = 32 - u32::from(self.mask_bits);
        (self.value >> shift) == (other.value >> shift)
    }
}

impl PartialOrd for IpPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IpPrefix {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.mask_bits, self.value).cmp(&(other.mask_bits, other.value))
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}/{}",
            (self.value >> 24) & 0xff,
            (self.value >> 16) & 0xff,
            (self.value >> 8) & 0xff,
            self.value & 0xff,
            self.mask_bits
        )
    }
}

/// A symbolic packet location carried by [`Field::Location`] values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Location {
    /// A concrete physical switch port.
    Physical(u32),
    /// A named controller-bound pipe (packet-in to a named handler).
    Pipe(String),
    /// A named query sink (packet is counted/sampled under this name, not forwarded).
    Query(String),
    /// A fast-failover group: the first live port in the list is used.
    FastFail(Vec<u32>),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Physical(p) => write!(f, "{p}"),
            Location::Pipe(name) => write!(f, "pipe({name})"),
            Location::Query(name) => write!(f, "query({name})"),
            Location::FastFail(ports) => {
                write!(f, "fast_fail(")?;
                for (i, p) in ports.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A field value, tagged by which kind of field it is legal for.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Value {
    /// A generic fixed-width integer: switch ids, vports, vlans, vlan pcp,
    /// eth-type, ip proto, and TCP ports all use this.
    Const(u64),
    /// A 48-bit MAC-like address (`EthSrc`/`EthDst`).
    Mac(u64),
    /// An IPv4 prefix (`IP4Src`/`IP4Dst`).
    Ip(IpPrefix),
    /// A symbolic location (`Location` only).
    Loc(Location),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(n) => write!(f, "{n}"),
            Value::Mac(m) => write!(f, "{}", format_mac(*m)),
            Value::Ip(p) => write!(f, "{p}"),
            Value::Loc(l) => write!(f, "{l}"),
        }
    }
}

fn format_mac(m: u64) -> String {
    let bytes = m.to_be_bytes();
    // Only the low 6 bytes of the u64 carry the address.
    hex::encode(&bytes[2..8])
        .as_bytes()
        .chunks(2)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join(":")
}

impl Value {
    /// True if `self` and `other` can never both hold for the same packet.
    ///
    /// For non-`Ip` values this is simple inequality (the domain is flat: two
    /// distinct constants are always mutually exclusive). For `Ip` values it
    /// defers to prefix containment, which is exact (see [`IpPrefix`]).
    #[must_use]
    pub fn disjoint_from(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Ip(a), Value::Ip(b)) => !a.contains(b) && !b.contains(a) && a != b,
            _ => self != other,
        }
    }

    /// True if every packet satisfying `self` also satisfies `other`.
    #[must_use]
    pub fn implies(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Ip(a), Value::Ip(b)) => b.contains(a),
            _ => self == other,
        }
    }
}

/// Which [`Value`] variant is legal for a given [`Field`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    Const,
    Mac,
    Ip,
    Loc,
}

impl Field {
    /// The value domain this field accepts.
    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            Field::EthSrc | Field::EthDst => ValueKind::Mac,
            Field::IP4Src | Field::IP4Dst => ValueKind::Ip,
            Field::Location => ValueKind::Loc,
            _ => ValueKind::Const,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self.value_kind(), value),
            (ValueKind::Const, Value::Const(_))
                | (ValueKind::Mac, Value::Mac(_))
                | (ValueKind::Ip, Value::Ip(_))
                | (ValueKind::Loc, Value::Loc(_))
        )
    }
}

/// A test: "packet's `field` equals `value`" (prefix-matched for IP fields).
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Test {
    pub field: Field,
    pub value: Value,
}

impl Test {
    /// Construct a test, validating that `value` is legal for `field`.
    pub fn new(field: Field, value: Value) -> Result<Self, FieldError> {
        if !field.accepts(&value) {
            return Err(FieldError::BadValueForField { field, value });
        }
        Ok(Self { field, value })
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}

/// An assignment: "set packet's `field` to `value`".
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Modification {
    pub field: Field,
    pub value: Value,
}

impl Modification {
    /// Construct a modification, validating that `value` is legal for `field`.
    pub fn new(field: Field, value: Value) -> Result<Self, FieldError> {
        if !field.accepts(&value) {
            return Err(FieldError::BadValueForField { field, value });
        }
        Ok(Self { field, value })
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} := {}", self.field, self.value)
    }
}

/// The three-way relation between two test values on the *same* field, used
/// by [`crate::fdd`]'s cofactoring to decide how an assumption about one test
/// atom affects a different atom on the same field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Relation {
    /// `a == b`.
    Same,
    /// `a` and `b` can never both hold.
    Disjoint,
    /// `a` holding implies `b` holds (but not conversely).
    ContainedBy,
    /// `b` holding implies `a` holds (but not conversely).
    Contains,
}

pub(crate) fn relation(a: &Value, b: &Value) -> Relation {
    if a == b {
        return Relation::Same;
    }
    match (a, b) {
        (Value::Ip(pa), Value::Ip(pb)) => {
            if pa.contains(pb) {
                Relation::Contains
            } else if pb.contains(pa) {
                Relation::ContainedBy
            } else {
                Relation::Disjoint
            }
        }
        _ => Relation::Disjoint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_matches_declaration_order() {
        let order = FieldOrder::default_order();
        for w in ALL_FIELDS.windows(2) {
            assert!(order.rank(w[0]) < order.rank(w[1]));
        }
    }

    #[test]
    fn static_order_rejects_non_permutations() {
        assert!(FieldOrder::from_static(&[Field::Switch]).is_err());
        assert!(FieldOrder::from_static(&[Field::Switch, Field::Switch]).is_err());
    }

    #[test]
    fn heuristic_order_ranks_hot_fields_first() {
        let order = FieldOrder::from_weights(&[(Field::Vlan, 100), (Field::Switch, 1)]);
        assert!(order.rank(Field::Vlan) < order.rank(Field::Switch));
    }

    #[test]
    fn ip_prefix_containment() {
        let net = IpPrefix { value: 0x0a00_0000, mask_bits: 8 }; // 10.0.0.0/8
        let host = IpPrefix { value: 0x0a01_0203, mask_bits: 32 }; // 10.1.2.3/32
        assert!(net.contains(&host));
        assert!(!host.contains(&net));
        assert!(!net.contains(&IpPrefix { value: 0x0b00_0000, mask_bits: 8 }));
    }

    #[test]
    fn value_validation_rejects_mismatched_kind() {
        assert!(Test::new(Field::Vlan, Value::Mac(0)).is_err());
        assert!(Test::new(Field::EthSrc, Value::Mac(0xaabbccddeeff)).is_ok());
    }

    #[test]
    fn relation_is_exact_for_prefixes() {
        let a = Value::Ip(IpPrefix { value: 0x0a00_0000, mask_bits: 8 });
        let b = Value::Ip(IpPrefix { value: 0x0a01_0203, mask_bits: 32 });
        assert_eq!(relation(&a, &b), Relation::Contains);
        assert_eq!(relation(&b, &a), Relation::ContainedBy);
        assert!(a.implies(&a));
        assert!(b.implies(&a));
        assert!(!a.implies(&b));
    }
}
