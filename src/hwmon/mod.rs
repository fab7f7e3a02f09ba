use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub mod devices;
pub mod sensors;

pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

// A hwmon chip directory and the driver name it reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Chip {
    pub dir: PathBuf,
    pub name: String,
}

impl Chip {
    // Directory name, e.g. "hwmon3"
    pub fn address(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

// List the chips under the hwmon root, ordered by hwmon index
pub(crate) fn chips(root: &Path) -> io::Result<Vec<Chip>> {
    let mut chips = Vec::new();

    for entry in fs::read_dir(root)? {
        let dir = entry?.path();

        if !dir.is_dir() {
            continue;
        }

        // Chips without a name file are still listed under their directory
        let name = read_trimmed(dir.join("name")).unwrap_or_else(|_| {
            dir.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        chips.push(Chip { dir, name });
    }

    // "hwmon10" comes after "hwmon2", unnumbered directories first
    chips.sort_by_cached_key(|chip| {
        (extract_index(&chip.address(), "hwmon", ""), chip.dir.clone())
    });

    Ok(chips)
}

// Return the sorted indices of the chip attributes named `{prefix}N{suffix}`
pub(crate) fn attribute_indices(
    dir: &Path,
    prefix: &str,
    suffix: &str,
) -> io::Result<Vec<u32>> {
    let mut indices: Vec<u32> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            extract_index(&entry.file_name().to_string_lossy(), prefix, suffix)
        })
        .collect();

    indices.sort_unstable();
    indices.dedup();

    Ok(indices)
}

pub(crate) fn read_trimmed<P: AsRef<Path>>(path: P) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

pub(crate) fn extract_index(fname: &str, prefix: &str, suffix: &str) -> Option<u32> {
    let mid = fname.strip_prefix(prefix)?.strip_suffix(suffix)?;

    // Reject signs and empty indices which `parse` would accept or miss
    if mid.is_empty() || !mid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    mid.parse().ok()
}
