// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::vk;
use std::collections::BTreeSet;

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Family indices for graphics submission and presentation, resolved
/// independently. A device is only usable when both are present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueIndices {
    /// Scans `(flags, present_support)` per family in order. Later matching
    /// families overwrite earlier ones until both roles are filled, which
    /// favours a single family that does both.
    pub fn resolve<I>(families: I) -> Self
    where
        I: IntoIterator<Item = (vk::QueueFlags, bool)>,
    {
        let mut indices = QueueIndices::default();
        for (i, (flags, present)) in families.into_iter().enumerate() {
            if flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i as u32);
            }
            if present {
                indices.present = Some(i as u32);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    /// # Safety
    /// `phys` and `surface` must be live handles from the instance behind `surf_i`.
    pub unsafe fn query(
        instance: &ash::Instance,
        surf_i: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Self {
        let props = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        Self::resolve(props.iter().enumerate().map(|(i, q)| {
            let present = unsafe {
                surf_i
                    .get_physical_device_surface_support(phys, i as u32, surface)
                    .unwrap_or(false)
            };
            (q.queue_flags, present)
        }))
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, ascending.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present]
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// One create descriptor per distinct family, one queue each at priority 1.0.
    pub fn create_infos(&self) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
        self.unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: QUEUE_PRIORITIES.len() as u32,
                p_queue_priorities: QUEUE_PRIORITIES.as_ptr(),
                ..Default::default()
            })
            .collect()
    }
}

/// Resolved indices plus the queue handles fetched from the logical device.
pub struct Queues {
    pub indices: QueueIndices,
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

impl Queues {
    /// Returns `None` when the indices are incomplete.
    ///
    /// # Safety
    /// `device` must have been created with `indices.create_infos()`.
    pub unsafe fn fetch(device: &ash::Device, indices: QueueIndices) -> Option<Self> {
        let (g, p) = (indices.graphics?, indices.present?);
        unsafe {
            Some(Queues {
                indices,
                graphics: device.get_device_queue(g, 0),
                present: device.get_device_queue(p, 0),
            })
        }
    }
}
