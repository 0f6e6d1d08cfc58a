// SPDX-License-Identifier: GPL-3.0-only
//! ACPI device tree snapshot read through udev
//!
//! Every ACPI namespace object the kernel knows about shows up in the `acpi`
//! subsystem with a `path` attribute (`\_SB_.PCI0.GFX0.DD1F`) and, for display
//! output devices, an `adr` attribute holding the `_ADR` value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::ACPI_PATH_PROPERTY;
use super::tree::{DeviceNode, DeviceTree, DeviceTreeBuilder, NodeId, NodeSpec};
use crate::error::Result;
use crate::panel::PlatformVideo;

/// PCI vendor ID of the integrated graphics controllers treated as builtin
const INTEL_VENDOR_ID: &str = "0x8086";

/// Prefix of the sysfs name of ACPI video bus devices
const VIDEO_BUS_PREFIX: &str = "LNXVIDEO";

/// Device tree plus the video controllers found in it
#[derive(Debug)]
pub struct AcpiSnapshot {
    pub tree: DeviceTree,
    pub video: PlatformVideo<DeviceNode>,
}

struct ScannedDevice {
    syspath: PathBuf,
    parent: Option<PathBuf>,
    sysname: String,
    acpi_path: Option<String>,
    adr: Option<String>,
}

/// Take a snapshot of the ACPI namespace
pub fn scan() -> Result<AcpiSnapshot> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem("acpi")?;

    let mut scanned: Vec<ScannedDevice> = enumerator
        .scan_devices()?
        .map(|device| ScannedDevice {
            syspath: device.syspath().to_path_buf(),
            parent: device.parent().map(|p| p.syspath().to_path_buf()),
            sysname: device.sysname().to_string_lossy().into_owned(),
            acpi_path: attribute(&device, "path"),
            adr: attribute(&device, "adr"),
        })
        .collect();

    // Parents sort before their children.
    scanned.sort_by(|a, b| {
        a.syspath
            .components()
            .count()
            .cmp(&b.syspath.components().count())
            .then_with(|| a.syspath.cmp(&b.syspath))
    });

    let mut builder = DeviceTreeBuilder::new();
    let mut ids: HashMap<PathBuf, NodeId> = HashMap::new();
    let mut videos = Vec::new();

    for device in &scanned {
        let spec = node_spec(device);
        let id = match device.parent.as_ref().and_then(|p| ids.get(p)) {
            Some(&parent) => builder.child(parent, spec),
            None => builder.root(spec),
        };
        ids.insert(device.syspath.clone(), id);

        if device.sysname.starts_with(VIDEO_BUS_PREFIX) {
            let vendor = physical_vendor(&device.syspath);
            debug!(
                "ACPI video bus {} ({:?}) vendor {:?}",
                device.sysname, device.acpi_path, vendor
            );
            videos.push((id, vendor));
        }
    }

    let tree = builder.build();
    let (builtin, external) = classify_video(&videos);
    let video = PlatformVideo {
        builtin: builtin.map(|id| tree.node(id)),
        external: external.into_iter().map(|id| tree.node(id)).collect(),
    };

    info!(
        "Scanned {} ACPI node(s), builtin video: {:?}, external video: {}",
        tree.len(),
        video.builtin,
        video.external.len()
    );

    Ok(AcpiSnapshot { tree, video })
}

fn attribute(device: &udev::Device, name: &str) -> Option<String> {
    device
        .attribute_value(name)
        .map(|value| value.to_string_lossy().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn node_spec(device: &ScannedDevice) -> NodeSpec {
    let mut spec = match device.acpi_path.as_deref().and_then(acpi_name) {
        Some(name) => NodeSpec::new(name),
        None => NodeSpec::unnamed(),
    };
    spec = spec.alias(device.sysname.clone());
    if let Some(adr) = &device.adr {
        spec = spec.location(adr.clone());
    }
    if let Some(path) = &device.acpi_path {
        spec = spec
            .property(ACPI_PATH_PROPERTY, path.clone())
            .platform(path.clone());
    }
    spec
}

fn physical_vendor(syspath: &Path) -> Option<String> {
    std::fs::read_to_string(syspath.join("physical_node").join("vendor"))
        .ok()
        .map(|vendor| vendor.trim().to_lowercase())
}

/// Last segment of an ACPI path, e.g. `DD1F` for `\_SB_.PCI0.GFX0.DD1F`
pub fn acpi_name(path: &str) -> Option<&str> {
    path.rsplit('.')
        .next()
        .map(|segment| segment.trim_start_matches(['\\', '^']))
        .filter(|segment| !segment.is_empty())
}

/// Split video buses into the builtin one and the rest
///
/// The Intel controller is builtin; without one the first bus is.
pub fn classify_video(videos: &[(NodeId, Option<String>)]) -> (Option<NodeId>, Vec<NodeId>) {
    let builtin = videos
        .iter()
        .find(|(_, vendor)| vendor.as_deref() == Some(INTEL_VENDOR_ID))
        .or_else(|| videos.first())
        .map(|(id, _)| *id);

    let external = videos
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| Some(*id) != builtin)
        .collect();

    (builtin, external)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acpi_name() {
        assert_eq!(acpi_name("\\_SB_.PCI0.GFX0.DD1F"), Some("DD1F"));
        assert_eq!(acpi_name("\\_SB_"), Some("_SB_"));
        assert_eq!(acpi_name(""), None);
    }

    #[test]
    fn test_classify_prefers_intel() {
        let videos = vec![
            (3, Some("0x10de".to_string())),
            (7, Some("0x8086".to_string())),
            (9, None),
        ];
        assert_eq!(classify_video(&videos), (Some(7), vec![3, 9]));
    }

    #[test]
    fn test_classify_without_intel() {
        let videos = vec![(4, Some("0x1002".to_string())), (5, Some("0x10de".to_string()))];
        assert_eq!(classify_video(&videos), (Some(4), vec![5]));
        assert_eq!(classify_video(&[]), (None, vec![]));
    }
}
