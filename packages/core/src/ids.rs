//! Monotonic record ids.
//!
//! Queue and list entries are ordered by record id, so ids generated in one
//! process must sort in generation order even within the same millisecond.

use std::sync::{LazyLock, Mutex};

use ulid::{Generator, Ulid};

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Next id from the process-wide monotonic generator.
///
/// Falls back to a fresh random ULID if the generator overflows its random
/// component or its lock is poisoned; ordering is then only by millisecond.
pub fn next_ordered_id() -> Ulid {
    match GENERATOR.lock() {
        Ok(mut generator) => generator.generate().unwrap_or_else(|_| Ulid::new()),
        Err(_) => Ulid::new(),
    }
}
