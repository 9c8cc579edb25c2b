//! Tile path derivation and request coordinate hygiene.

use crate::cache::types::TilePath;
use std::collections::HashMap;
use std::path::Path;

/// Characters stripped from structure parameter values before they are
/// used as directory names.
const UNSAFE_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derive the on-disk location of a tile.
///
/// The directory is built from the cache root, the sanitized values of
/// the structure parameters found in the request query (in declaration
/// order, trimmed, skipped when empty), then `z` and `y`. The file name
/// is `<x>.png`.
///
/// Derivation is deterministic: the same inputs always produce the same
/// path, which is what makes the path usable as the tile key.
pub fn derive_tile_path(
    cache_root: &Path,
    structure_params: &[String],
    query: &HashMap<String, String>,
    x: &str,
    y: &str,
    z: &str,
) -> TilePath {
    let mut dir = cache_root.to_path_buf();

    for name in structure_params {
        let value = query.get(name).map(|v| v.trim()).unwrap_or("");
        if value.is_empty() {
            continue;
        }
        dir.push(sanitize_component(value));
    }

    dir.push(z);
    dir.push(y);

    let full_path = dir.join(format!("{x}.png"));

    TilePath { dir, full_path }
}

/// Replace path-hostile characters with `-`.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// Whether a path segment from the request URL may be used as a tile
/// coordinate.
///
/// Coordinates end up as directory and file names, so only non-empty
/// ASCII digit strings are accepted. This rejects separators, `..` and
/// unicode digit lookalikes in one check.
pub fn is_valid_coordinate(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
