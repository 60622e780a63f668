//! Firmware identification used to gate activation.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

pub const DMI_BASE: &str = "/sys/class/dmi/id";

/// Identification strings exported by the system firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmiInfo {
    pub sys_vendor: String,
    pub product_name: String,
}

/// One supported machine. Fields match as substrings.
pub struct DmiMatch {
    pub sys_vendor: &'static str,
    pub product_name: &'static str,
    pub description: &'static str,
}

pub const SUPPORTED_SYSTEMS: &[DmiMatch] = &[DmiMatch {
    sys_vendor: "GPD",
    product_name: "G1618-04",
    description: "GPD Win 4 (7840U/8840U)",
}];

impl DmiInfo {
    /// Read the identification strings from a sysfs DMI directory.
    ///
    /// Missing or unreadable entries read as empty and never match.
    pub fn read_from(dmi_dir: &Path) -> Self {
        Self {
            sys_vendor: read_field(dmi_dir.join("sys_vendor")),
            product_name: read_field(dmi_dir.join("product_name")),
        }
    }

    pub fn matching_system(&self) -> Option<&'static DmiMatch> {
        SUPPORTED_SYSTEMS.iter().find(|system| {
            self.sys_vendor.contains(system.sys_vendor)
                && self.product_name.contains(system.product_name)
        })
    }
}

fn read_field(path: PathBuf) -> String {
    match fs::read_to_string(&path) {
        Ok(content) => content.trim().to_string(),
        Err(error) => {
            debug!("cannot read {}: {}", path.display(), error);
            String::new()
        }
    }
}
