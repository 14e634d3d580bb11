// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Turning archived data back into live device objects.
//!
//! [`Dearchiver`] binds an archive to one backend and a
//! [`DeviceObjectFactory`], and caches every object it unpacks. Unpacking a
//! pipeline resolves its dependencies in order: render pass, signatures,
//! shaders, then the pipeline itself, each step going through the cache.
//!
//! Caches are mutex-guarded maps; the lock is held only around lookup and
//! publication, never across factory calls. When two threads race to unpack
//! the same object, both may create it, and the first to publish wins.

use std::sync::Arc;

use foldhash::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    device::DeviceType,
    pipeline::{
        GraphicsPipelineDesc, PipelineStateData, RayTracingPipelineDesc, TilePipelineDesc,
    },
    render_pass::RenderPassDesc,
    serializer::{Reader, SerializedData},
    shader::{CompiledShader, ShaderStages},
    signature::{ResourceSignatureDesc, SignatureInternalData},
    MAX_RESOURCE_SIGNATURES, SHADER_UNUSED,
};

use super::{
    reader::DeviceObjectArchive, schema, ArchiveError, ArchiveRegion, DataHeader, ResourceKind,
};

/// Non-pipeline dependencies handed to pipeline factory methods.
pub struct PipelineResources<Sig, Rp, Sh> {
    /// Signatures in the pipeline's binding order.
    pub signatures: SmallVec<[Arc<Sig>; MAX_RESOURCE_SIGNATURES]>,
    pub render_pass: Option<Arc<Rp>>,
    /// One shader per active stage.
    pub shaders: Vec<(ShaderStages, Arc<Sh>)>,
}

/// Dependencies of a ray tracing pipeline.
pub struct RayTracingResources<Sig, Sh> {
    pub signatures: SmallVec<[Arc<Sig>; MAX_RESOURCE_SIGNATURES]>,
    /// The pipeline's shader pool by slot; `None` for unused slots.
    pub shaders: Vec<Option<Arc<Sh>>>,
}

/// Creates live device objects from unpacked archive data.
///
/// Implemented per backend by the engine integration; the test suite uses an
/// in-memory mock.
pub trait DeviceObjectFactory {
    type Signature;
    type RenderPass;
    type Shader;
    type Pipeline;

    fn create_signature(
        &self,
        desc: &ResourceSignatureDesc,
        internal: &SignatureInternalData,
        device_data: &SerializedData,
    ) -> Result<Arc<Self::Signature>, ArchiveError>;

    fn create_render_pass(
        &self,
        desc: &RenderPassDesc,
    ) -> Result<Arc<Self::RenderPass>, ArchiveError>;

    fn create_shader(&self, shader: &CompiledShader) -> Result<Arc<Self::Shader>, ArchiveError>;

    fn create_graphics_pipeline(
        &self,
        data: &PipelineStateData<GraphicsPipelineDesc>,
        resources: PipelineResources<Self::Signature, Self::RenderPass, Self::Shader>,
    ) -> Result<Arc<Self::Pipeline>, ArchiveError>;

    fn create_compute_pipeline(
        &self,
        data: &PipelineStateData<()>,
        resources: PipelineResources<Self::Signature, Self::RenderPass, Self::Shader>,
    ) -> Result<Arc<Self::Pipeline>, ArchiveError>;

    fn create_ray_tracing_pipeline(
        &self,
        data: &PipelineStateData<RayTracingPipelineDesc>,
        resources: RayTracingResources<Self::Signature, Self::Shader>,
    ) -> Result<Arc<Self::Pipeline>, ArchiveError>;

    fn create_tile_pipeline(
        &self,
        data: &PipelineStateData<TilePipelineDesc>,
        resources: PipelineResources<Self::Signature, Self::RenderPass, Self::Shader>,
    ) -> Result<Arc<Self::Pipeline>, ArchiveError>;
}

/// Caching unpack layer over a [`DeviceObjectArchive`] for one backend.
pub struct Dearchiver<F: DeviceObjectFactory> {
    archive: Arc<DeviceObjectArchive>,
    factory: F,
    device: DeviceType,

    signatures: Mutex<HashMap<String, Arc<F::Signature>>>,
    render_passes: Mutex<HashMap<String, Arc<F::RenderPass>>>,
    /// Shader cache keyed by dense index into the backend's shader list.
    shaders: Mutex<HashMap<u32, (ShaderStages, Arc<F::Shader>)>>,
    /// Lazily loaded shader region table of the backend.
    shader_regions: Mutex<Option<Arc<Vec<ArchiveRegion>>>>,

    graphics: Mutex<HashMap<String, Arc<F::Pipeline>>>,
    compute: Mutex<HashMap<String, Arc<F::Pipeline>>>,
    ray_tracing: Mutex<HashMap<String, Arc<F::Pipeline>>>,
    tile: Mutex<HashMap<String, Arc<F::Pipeline>>>,
}

impl<F: DeviceObjectFactory> Dearchiver<F> {
    pub fn new(archive: Arc<DeviceObjectArchive>, factory: F, device: DeviceType) -> Self {
        Self {
            archive,
            factory,
            device,
            signatures: Mutex::new(HashMap::default()),
            render_passes: Mutex::new(HashMap::default()),
            shaders: Mutex::new(HashMap::default()),
            shader_regions: Mutex::new(None),
            graphics: Mutex::new(HashMap::default()),
            compute: Mutex::new(HashMap::default()),
            ray_tracing: Mutex::new(HashMap::default()),
            tile: Mutex::new(HashMap::default()),
        }
    }

    pub fn archive(&self) -> &Arc<DeviceObjectArchive> {
        &self.archive
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Unpacks a resource signature, creating it on first use.
    pub fn unpack_signature(&self, name: &str) -> Result<Arc<F::Signature>, ArchiveError> {
        if let Some(signature) = self.signatures.lock().get(name) {
            return Ok(signature.clone());
        }

        let (desc, internal, header) = self.archive.load_signature(name)?;
        let device_data = self.archive.device_data(&header, self.device);
        let signature = self.factory.create_signature(&desc, &internal, &device_data)?;

        Ok(self
            .signatures
            .lock()
            .entry(name.to_owned())
            .or_insert(signature)
            .clone())
    }

    /// Unpacks a render pass, creating it on first use.
    pub fn unpack_render_pass(&self, name: &str) -> Result<Arc<F::RenderPass>, ArchiveError> {
        if let Some(render_pass) = self.render_passes.lock().get(name) {
            return Ok(render_pass.clone());
        }

        let desc = self.archive.load_render_pass(name)?;
        let render_pass = self.factory.create_render_pass(&desc)?;

        Ok(self
            .render_passes
            .lock()
            .entry(name.to_owned())
            .or_insert(render_pass)
            .clone())
    }

    fn shader_regions(&self) -> Result<Arc<Vec<ArchiveRegion>>, ArchiveError> {
        if let Some(regions) = self.shader_regions.lock().as_ref() {
            return Ok(regions.clone());
        }

        let regions = Arc::new(self.archive.shader_regions(self.device)?);

        Ok(self
            .shader_regions
            .lock()
            .get_or_insert(regions)
            .clone())
    }

    fn unpack_shader(&self, index: u32) -> Result<(ShaderStages, Arc<F::Shader>), ArchiveError> {
        if let Some(entry) = self.shaders.lock().get(&index) {
            return Ok(entry.clone());
        }

        let regions = self.shader_regions()?;
        let compiled = self.archive.load_shader(self.device, &regions, index)?;
        let shader = self.factory.create_shader(&compiled)?;

        Ok(self
            .shaders
            .lock()
            .entry(index)
            .or_insert((compiled.shader_type, shader))
            .clone())
    }

    fn unpack_signatures(
        &self,
        names: &[String],
    ) -> Result<SmallVec<[Arc<F::Signature>; MAX_RESOURCE_SIGNATURES]>, ArchiveError> {
        names.iter().map(|name| self.unpack_signature(name)).collect()
    }

    /// Decodes the pipeline's per-backend shader index list.
    fn shader_index_list(
        &self,
        header: &DataHeader,
        name: &str,
    ) -> Result<Vec<u32>, ArchiveError> {
        let device_data = self.archive.device_data(header, self.device);

        if device_data.is_empty() {
            return Err(ArchiveError::MissingDeviceData {
                device: self.device,
                name: name.to_owned(),
            });
        }

        let mut indices = Vec::new();
        let mut reader = Reader::new(device_data.as_bytes());
        schema::shader_indices(&mut reader, &mut indices)?;

        Ok(indices)
    }

    /// Unpacks a graphics or mesh pipeline, creating it and its dependencies
    /// on first use.
    pub fn unpack_graphics_pipeline(&self, name: &str) -> Result<Arc<F::Pipeline>, ArchiveError> {
        if let Some(pipeline) = self.graphics.lock().get(name) {
            return Ok(pipeline.clone());
        }

        let (data, header) = self.archive.load_graphics_pipeline(name)?;

        let render_pass = data
            .desc
            .render_pass_name
            .as_deref()
            .map(|rp_name| self.unpack_render_pass(rp_name))
            .transpose()?;

        let signatures = self.unpack_signatures(&data.base.signature_names)?;

        let shaders = self
            .shader_index_list(&header, name)?
            .into_iter()
            .map(|index| self.unpack_shader(index))
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = self.factory.create_graphics_pipeline(
            &data,
            PipelineResources {
                signatures,
                render_pass,
                shaders,
            },
        )?;

        Ok(self
            .graphics
            .lock()
            .entry(name.to_owned())
            .or_insert(pipeline)
            .clone())
    }

    /// Unpacks a compute pipeline.
    pub fn unpack_compute_pipeline(&self, name: &str) -> Result<Arc<F::Pipeline>, ArchiveError> {
        if let Some(pipeline) = self.compute.lock().get(name) {
            return Ok(pipeline.clone());
        }

        let (data, header) = self.archive.load_compute_pipeline(name)?;

        let signatures = self.unpack_signatures(&data.base.signature_names)?;
        let shaders = self
            .shader_index_list(&header, name)?
            .into_iter()
            .map(|index| self.unpack_shader(index))
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = self.factory.create_compute_pipeline(
            &data,
            PipelineResources {
                signatures,
                render_pass: None,
                shaders,
            },
        )?;

        Ok(self
            .compute
            .lock()
            .entry(name.to_owned())
            .or_insert(pipeline)
            .clone())
    }

    /// Unpacks a ray tracing pipeline. The archived index table maps each
    /// shader pool slot to the backend's shader list; unused slots stay empty.
    pub fn unpack_ray_tracing_pipeline(
        &self,
        name: &str,
    ) -> Result<Arc<F::Pipeline>, ArchiveError> {
        if let Some(pipeline) = self.ray_tracing.lock().get(name) {
            return Ok(pipeline.clone());
        }

        let (data, header) = self.archive.load_ray_tracing_pipeline(name)?;

        let signatures = self.unpack_signatures(&data.base.signature_names)?;

        let shaders = self
            .shader_index_list(&header, name)?
            .into_iter()
            .map(|index| {
                if index == SHADER_UNUSED {
                    Ok(None)
                } else {
                    self.unpack_shader(index).map(|(_, shader)| Some(shader))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = self.factory.create_ray_tracing_pipeline(
            &data,
            RayTracingResources {
                signatures,
                shaders,
            },
        )?;

        Ok(self
            .ray_tracing
            .lock()
            .entry(name.to_owned())
            .or_insert(pipeline)
            .clone())
    }

    /// Unpacks a tile pipeline.
    pub fn unpack_tile_pipeline(&self, name: &str) -> Result<Arc<F::Pipeline>, ArchiveError> {
        if let Some(pipeline) = self.tile.lock().get(name) {
            return Ok(pipeline.clone());
        }

        let (data, header) = self.archive.load_tile_pipeline(name)?;

        let signatures = self.unpack_signatures(&data.base.signature_names)?;
        let shaders = self
            .shader_index_list(&header, name)?
            .into_iter()
            .map(|index| self.unpack_shader(index))
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = self.factory.create_tile_pipeline(
            &data,
            PipelineResources {
                signatures,
                render_pass: None,
                shaders,
            },
        )?;

        Ok(self
            .tile
            .lock()
            .entry(name.to_owned())
            .or_insert(pipeline)
            .clone())
    }

    /// Unpacks a pipeline of any kind by looking the name up across the
    /// pipeline chunks.
    pub fn unpack_pipeline(&self, name: &str) -> Result<Arc<F::Pipeline>, ArchiveError> {
        for kind in [
            ResourceKind::GraphicsPipeline,
            ResourceKind::ComputePipeline,
            ResourceKind::RayTracingPipeline,
            ResourceKind::TilePipeline,
        ] {
            if self.archive.contains(kind, name) {
                return match kind {
                    ResourceKind::GraphicsPipeline => self.unpack_graphics_pipeline(name),
                    ResourceKind::ComputePipeline => self.unpack_compute_pipeline(name),
                    ResourceKind::RayTracingPipeline => self.unpack_ray_tracing_pipeline(name),
                    _ => self.unpack_tile_pipeline(name),
                };
            }
        }

        Err(ArchiveError::ResourceNotFound {
            kind: ResourceKind::GraphicsPipeline,
            name: name.to_owned(),
        })
    }
}
