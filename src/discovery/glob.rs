//! Glob pattern utilities

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compile patterns into a case-sensitive [`GlobSet`].
///
/// With `literal_separator` set, `*` and `?` stop at `/` and only `**` crosses
/// directories. Filename patterns leave it off since names contain no separators.
pub fn build_globset(
    patterns: &[String],
    literal_separator: bool,
) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(false)
            .literal_separator(literal_separator)
            .build()?;
        builder.add(glob);
    }
    builder.build()
}
