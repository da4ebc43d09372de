// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use lantern_core::LOG_GENERAL;
use std::ffi::{c_char, CStr};
use tracing::{debug, info, warn};

use crate::queues::QueueIndices;
use crate::surface::SurfaceSupport;

pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[swapchain::NAME];

pub const DISQUALIFIED: i32 = -1;

/// What scoring needs to know about one physical device.
#[derive(Clone, Copy, Debug)]
pub struct DeviceTraits {
    pub device_type: vk::PhysicalDeviceType,
    pub has_required_extensions: bool,
    pub surface_adequate: bool,
    pub queues_complete: bool,
}

/// Strictly descending by type: discrete > integrated > virtual > cpu > other.
pub fn type_score(device_type: vk::PhysicalDeviceType) -> i32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1_919_810,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 114_514,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 24,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 1,
    }
}

pub fn score(traits: &DeviceTraits) -> i32 {
    if !traits.has_required_extensions || !traits.surface_adequate || !traits.queues_complete {
        return DISQUALIFIED;
    }
    type_score(traits.device_type)
}

/// Keeps the first candidate whose score strictly beats everything before it,
/// starting from zero; non-positive scores never win.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, i32)>) -> Option<(T, i32)> {
    let mut best: Option<(T, i32)> = None;
    for (candidate, s) in candidates {
        let bar = best.as_ref().map_or(0, |(_, b)| *b);
        if s > bar {
            best = Some((candidate, s));
        }
    }
    best
}

/// # Safety
/// `phys` must come from `instance`.
unsafe fn has_required_extensions(instance: &ash::Instance, phys: vk::PhysicalDevice) -> bool {
    let Ok(props) = (unsafe { instance.enumerate_device_extension_properties(phys) }) else {
        return false;
    };
    REQUIRED_DEVICE_EXTENSIONS.iter().all(|req| {
        props
            .iter()
            .any(|p| p.extension_name_as_c_str().is_ok_and(|name| name == *req))
    })
}

/// Scores every enumerated device against `surface` and returns the winner
/// together with its resolved queue families.
///
/// # Safety
/// `surface` must belong to the instance behind `surf_i`.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueIndices)> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .context("enumerate_physical_devices")?;
    if devices.is_empty() {
        return Err(anyhow!("no GPUs with Vulkan support"));
    }

    let scored = devices.into_iter().map(|phys| {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let indices = unsafe { QueueIndices::query(instance, surf_i, phys, surface) };
        let support = unsafe { SurfaceSupport::query(surf_i, phys, surface) }.unwrap_or_default();
        let traits = DeviceTraits {
            device_type: props.device_type,
            has_required_extensions: unsafe { has_required_extensions(instance, phys) },
            surface_adequate: support.is_adequate(),
            queues_complete: indices.is_complete(),
        };
        let s = score(&traits);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if s == DISQUALIFIED {
            warn!(target: LOG_GENERAL, "skipping {name}: {traits:?}");
        } else {
            debug!(target: LOG_GENERAL, "candidate {name} ({:?}) score={s}", traits.device_type);
        }
        ((phys, indices, name), s)
    });

    let ((phys, indices, name), _) =
        pick_best(scored).ok_or_else(|| anyhow!("no suitable physical device"))?;
    debug!(target: LOG_GENERAL, "chose physical device: {name}");
    Ok((phys, indices))
}

/// # Safety
/// `phys` must come from `instance` and `indices` must be complete for it.
pub unsafe fn create_logical_device(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    indices: &QueueIndices,
) -> Result<ash::Device> {
    let queue_infos = indices.create_infos();
    let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect();
    let features = vk::PhysicalDeviceFeatures::default();

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")?;
    info!(target: LOG_GENERAL, "created logical device ({} queue families)", queue_infos.len());
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualifying(device_type: vk::PhysicalDeviceType) -> DeviceTraits {
        DeviceTraits {
            device_type,
            has_required_extensions: true,
            surface_adequate: true,
            queues_complete: true,
        }
    }

    const ORDER: [vk::PhysicalDeviceType; 5] = [
        vk::PhysicalDeviceType::DISCRETE_GPU,
        vk::PhysicalDeviceType::INTEGRATED_GPU,
        vk::PhysicalDeviceType::VIRTUAL_GPU,
        vk::PhysicalDeviceType::CPU,
        vk::PhysicalDeviceType::OTHER,
    ];

    #[test]
    fn device_types_are_strictly_ordered() {
        let scores: Vec<i32> = ORDER.iter().map(|t| score(&qualifying(*t))).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] > pair[1], "{scores:?}");
        }
        assert!(scores.iter().all(|s| *s > 0));
    }

    #[test]
    fn any_disqualifier_ranks_below_every_qualifying_device() {
        let worst_qualifying = ORDER.iter().map(|t| score(&qualifying(*t))).min().unwrap();
        for t in ORDER {
            let mut d = qualifying(t);
            d.has_required_extensions = false;
            assert_eq!(score(&d), DISQUALIFIED);

            let mut d = qualifying(t);
            d.surface_adequate = false;
            assert_eq!(score(&d), DISQUALIFIED);

            let mut d = qualifying(t);
            d.queues_complete = false;
            assert_eq!(score(&d), DISQUALIFIED);
        }
        assert!(DISQUALIFIED < worst_qualifying);
    }

    #[test]
    fn integrated_beats_discrete_missing_extension() {
        let mut discrete = qualifying(vk::PhysicalDeviceType::DISCRETE_GPU);
        discrete.has_required_extensions = false;
        let integrated = qualifying(vk::PhysicalDeviceType::INTEGRATED_GPU);

        let picked = pick_best([("discrete", score(&discrete)), ("integrated", score(&integrated))]);
        assert_eq!(picked, Some(("integrated", 114_514)));
    }

    #[test]
    fn ties_keep_the_first_device() {
        let picked = pick_best([("a", 24), ("b", 24), ("c", 3)]);
        assert_eq!(picked, Some(("a", 24)));
    }

    #[test]
    fn no_positive_score_selects_nothing() {
        assert_eq!(pick_best([("a", DISQUALIFIED), ("b", DISQUALIFIED)]), None);
        assert_eq!(pick_best(Vec::<(&str, i32)>::new()), None);
    }

    #[test]
    fn best_device_wins_regardless_of_position() {
        let candidates = ORDER
            .iter()
            .rev()
            .map(|t| (*t, score(&qualifying(*t))));
        let (t, _) = pick_best(candidates).unwrap();
        assert_eq!(t, vk::PhysicalDeviceType::DISCRETE_GPU);
    }

    #[test]
    fn swapchain_is_required() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&swapchain::NAME));
    }
}
