//! Delivery identifiers.

use uuid::Uuid;

/// Mint a fresh delivery identifier: a random (v4) UUID in lowercase hyphenated form.
///
/// Nothing checks new identifiers against earlier ones; collisions are left to the 122 bits of
/// randomness.
pub fn new_delivery_id() -> String {
    Uuid::new_v4().to_string()
}
