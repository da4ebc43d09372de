// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use lantern_core::LOG_GENERAL;
use std::ffi::CStr;
use tracing::info;

use crate::shader::{self, ShaderCode};

const ENTRY: &CStr = c"main";

pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Layout plus the graphics pipelines built from it. Index 0 is the one bound
/// while recording.
#[derive(Debug, Default)]
pub struct Pipeline {
    pub layout: vk::PipelineLayout,
    pub pipelines: Vec<vk::Pipeline>,
}

/// Straight alpha blending on color, alpha written through.
pub fn blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    }
}

impl Pipeline {
    /// # Safety
    /// `device` must be live and `render_pass` created on it.
    pub unsafe fn create(device: &ash::Device, render_pass: vk::RenderPass, code: &ShaderCode) -> Result<Self> {
        let vert = unsafe { shader::create_module(device, &code.vert) }.context("vertex module")?;
        let frag = match unsafe { shader::create_module(device, &code.frag) } {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert, None) };
                return Err(e.context("fragment module"));
            }
        };

        let built = unsafe { Self::build(device, render_pass, vert, frag) };

        // Modules are only needed during creation.
        unsafe {
            device.destroy_shader_module(vert, None);
            device.destroy_shader_module(frag, None);
        }
        built
    }

    unsafe fn build(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        vert: vk::ShaderModule,
        frag: vk::ShaderModule,
    ) -> Result<Self> {
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vert,
                p_name: ENTRY.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: frag,
                p_name: ENTRY.as_ptr(),
                ..Default::default()
            },
        ];

        // Vertices come from gl_VertexIndex.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };
        let viewport = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            depth_clamp_enable: vk::FALSE,
            rasterizer_discard_enable: vk::FALSE,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_bias_enable: vk::FALSE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: vk::FALSE,
            min_sample_shading: 1.0,
            ..Default::default()
        };
        let blend_att = blend_attachment();
        let blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &blend_att,
            ..Default::default()
        };
        let dynamic = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: DYNAMIC_STATES.len() as u32,
            p_dynamic_states: DYNAMIC_STATES.as_ptr(),
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .context("create_pipeline_layout")?;

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &blend,
            p_dynamic_state: &dynamic,
            layout,
            render_pass,
            subpass: 0,
            base_pipeline_index: -1,
            ..Default::default()
        };

        match unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) } {
            Ok(pipelines) => {
                info!(target: LOG_GENERAL, "created {} graphics pipeline(s)", pipelines.len());
                Ok(Pipeline { layout, pipelines })
            }
            Err((partial, e)) => {
                unsafe {
                    for p in partial {
                        device.destroy_pipeline(p, None);
                    }
                    device.destroy_pipeline_layout(layout, None);
                }
                Err(anyhow!(e).context("create_graphics_pipelines"))
            }
        }
    }

    pub fn primary(&self) -> vk::Pipeline {
        self.pipelines.first().copied().unwrap_or_default()
    }

    /// # Safety
    /// Nothing in flight may reference the pipelines.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for p in self.pipelines.drain(..) {
                device.destroy_pipeline(p, None);
            }
            device.destroy_pipeline_layout(self.layout, None);
        }
        self.layout = vk::PipelineLayout::null();
    }
}
