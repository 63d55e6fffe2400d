//! Typed Identifiers

use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// A UUID tagged with the kind of entity it identifies.
pub struct TypedUuid<T>(Uuid, PhantomData<T>);

impl<T> TypedUuid<T> {
    /// Generate a new time-ordered identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::from_uuid(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid, PhantomData)
    }

    /// Unwrap into the raw UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl<T> Default for TypedUuid<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedUuid<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedUuid<T> {}

impl<T> Debug for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.0, f)
    }
}

impl<T> Display for TypedUuid<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl<T> PartialEq for TypedUuid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for TypedUuid<T> {}

impl<T> Hash for TypedUuid<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T> PartialOrd for TypedUuid<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TypedUuid<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> From<Uuid> for TypedUuid<T> {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

impl<T> From<TypedUuid<T>> for Uuid {
    fn from(value: TypedUuid<T>) -> Self {
        value.into_uuid()
    }
}

impl<T> Serialize for TypedUuid<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for TypedUuid<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

/// Marker for gift rule identifiers.
#[derive(Debug)]
pub enum RuleMarker {}

/// Marker for catalog product identifiers.
#[derive(Debug)]
pub enum ProductMarker {}

/// Marker for catalog category identifiers.
#[derive(Debug)]
pub enum CategoryMarker {}

/// Marker for customer identifiers.
#[derive(Debug)]
pub enum UserMarker {}

/// Marker for condition node identifiers.
#[derive(Debug)]
pub enum ConditionMarker {}

/// Marker for cart line identifiers.
#[derive(Debug)]
pub enum CartLineMarker {}

/// Marker for order identifiers.
#[derive(Debug)]
pub enum OrderMarker {}

/// Marker for usage ledger entry identifiers.
#[derive(Debug)]
pub enum UsageMarker {}

/// Gift rule identifier
pub type RuleId = TypedUuid<RuleMarker>;

/// Catalog product identifier
pub type ProductId = TypedUuid<ProductMarker>;

/// Catalog category identifier
pub type CategoryId = TypedUuid<CategoryMarker>;

/// Customer identifier
pub type UserId = TypedUuid<UserMarker>;

/// Condition node identifier
pub type ConditionId = TypedUuid<ConditionMarker>;

/// Cart line identifier
pub type CartLineId = TypedUuid<CartLineMarker>;

/// Order identifier
pub type OrderId = TypedUuid<OrderMarker>;

/// Usage ledger entry identifier
pub type UsageId = TypedUuid<UsageMarker>;
