// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use lantern_core::LOG_GENERAL;
use lantern_render::RenderConfig;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use tracing::{info, warn};

use crate::debug::messenger_create_info;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub fn layer_available(available: &[vk::LayerProperties], wanted: &CStr) -> bool {
    available
        .iter()
        .any(|p| p.layer_name_as_c_str().is_ok_and(|name| name == wanted))
}

/// Creates the instance with the surface extensions for `display`. With
/// validation on, the Khronos layer (when installed) and debug-utils are
/// enabled and a messenger is chained into creation itself.
pub fn create_instance(entry: &ash::Entry, display: RawDisplayHandle, cfg: &RenderConfig) -> Result<ash::Instance> {
    let app_name = CString::new(cfg.app_name.as_str()).unwrap_or_else(|_| CString::from(c"lantern"));

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: c"lantern".as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?
        .to_vec();

    let mut layers: Vec<*const c_char> = Vec::new();
    if cfg.validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        let available = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        if layer_available(&available, VALIDATION_LAYER) {
            layers.push(VALIDATION_LAYER.as_ptr());
        } else {
            warn!(target: LOG_GENERAL, "{VALIDATION_LAYER:?} not installed; continuing without it");
        }
    }

    let mut debug_info = messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        ..Default::default()
    };
    if cfg.validation {
        create_info = create_info.push_next(&mut debug_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?;
    info!(
        target: LOG_GENERAL,
        "created instance ({} extensions, {} layers)",
        extensions.len(),
        layers.len()
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        props
    }

    #[test]
    fn finds_installed_layer() {
        let available = [layer(c"VK_LAYER_MESA_overlay"), layer(VALIDATION_LAYER)];
        assert!(layer_available(&available, VALIDATION_LAYER));
    }

    #[test]
    fn missing_layer_is_reported() {
        let available = [layer(c"VK_LAYER_MESA_overlay")];
        assert!(!layer_available(&available, VALIDATION_LAYER));
        assert!(!layer_available(&[], VALIDATION_LAYER));
    }
}
