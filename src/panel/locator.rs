// SPDX-License-Identifier: GPL-3.0-only
//! Child lookup by masked address

use crate::registry::{RegistryEntry, parse_hex};

/// Find the first child of `parent` whose address matches
///
/// A child matches when it has a location, a name following the ACPI naming
/// convention (first character `A`-`Z`, digits or `_`, i.e. at most `'_'`),
/// and `location & mask == address`. Locations that are not hex never match.
pub fn find_by_address<E: RegistryEntry>(parent: &E, address: u64, mask: u64) -> Option<E> {
    parent
        .children()
        .into_iter()
        .find(|child| matches_address(child, address, mask))
}

fn matches_address<E: RegistryEntry>(child: &E, address: u64, mask: u64) -> bool {
    let Some(location) = child.location().filter(|l| !l.is_empty()) else {
        return false;
    };
    let acpi_named = child
        .name()
        .and_then(|name| name.bytes().next())
        .is_some_and(|first| first <= b'_');
    if !acpi_named {
        return false;
    }
    match parse_hex(&location) {
        Some(value) => value & mask == address,
        None => {
            trace!("Ignoring {:?} with malformed location {:?}", child.name(), location);
            false
        }
    }
}
