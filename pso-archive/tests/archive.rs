// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! End-to-end tests: build an archive with mock backends, read it back, unpack
//! device objects, and repack it.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use pso_archive::{
    archive::{
        ArchiveRepacker, Dearchiver, DeviceObjectFactory, PipelineResources, RayTracingResources,
        RepackError, ARCHIVE_VERSION,
    },
    pipeline::{
        ray_tracing::RayTracingGeneralShaderGroup, GraphicsPipelineCreateInfo, PipelineStateData,
        RayTracingPipelineCreateInfo,
    },
    render_pass::{
        AttachmentLoadOp, AttachmentReference, RenderPassAttachmentDesc, RenderPassDesc,
        ResourceStates, SubpassDesc,
    },
    shader::{CompiledShader, ShaderCreateInfo, ShaderDesc, ShaderSource, ShaderStages},
    signature::{
        ResourceDesc, ResourceSignatureDesc, ResourceVariableType, ShaderResourceType,
        SignatureInternalData,
    },
    ArchiveError, Archiver, ArchiverError, DeviceBackend, DeviceFlags, DeviceObjectArchive,
    DeviceType, PipelineArchiveInfo, ResourceKind, SerializationDevice, SerializationDeviceInfo,
    SerializedData,
};

/// Backend that "compiles" shaders by prefixing their source with the device
/// name, so outputs are deterministic and device-distinct.
struct MockBackend {
    device: DeviceType,
}

fn shader_source_text(shader: &ShaderCreateInfo) -> &str {
    match &shader.source {
        ShaderSource::Text(text) => text,
        ShaderSource::Bytecode(_) => "<bytecode>",
    }
}

impl DeviceBackend for MockBackend {
    fn device_type(&self) -> DeviceType {
        self.device
    }

    fn patch_shaders(
        &self,
        shaders: &[ShaderCreateInfo],
        _signatures: &[&ResourceSignatureDesc],
        _pipeline_type: pso_archive::pipeline::PipelineType,
    ) -> Result<Vec<CompiledShader>, ArchiverError> {
        Ok(shaders
            .iter()
            .map(|shader| CompiledShader {
                shader_type: shader.desc.shader_type,
                entry_point: shader.entry_point.clone(),
                source_language: shader.source_language,
                compiler: shader.compiler,
                bytecode: format!("{}:{}", self.device, shader_source_text(shader)).into_bytes(),
            })
            .collect())
    }

    fn reflect_signature(
        &self,
        shaders: &[ShaderCreateInfo],
        _pipeline_type: pso_archive::pipeline::PipelineType,
    ) -> Result<ResourceSignatureDesc, ArchiverError> {
        // Reflection depends only on the shaders, so every backend agrees.
        Ok(ResourceSignatureDesc {
            resources: shaders
                .iter()
                .map(|shader| ResourceDesc {
                    name: format!("cb_{}", shader.desc.name),
                    shader_stages: shader.desc.shader_type,
                    array_size: 1,
                    resource_type: ShaderResourceType::ConstantBuffer,
                    var_type: ResourceVariableType::Static,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })
    }

    fn serialize_signature(
        &self,
        desc: &ResourceSignatureDesc,
        internal: &SignatureInternalData,
    ) -> Result<SerializedData, ArchiverError> {
        let blob = format!(
            "{}|{}|{}",
            self.device,
            desc.resources.len(),
            internal.shader_stages.bits(),
        );

        Ok(SerializedData::from(blob.into_bytes()))
    }
}

fn serialization_device(devices: &[DeviceType]) -> Arc<SerializationDevice> {
    let mut device = SerializationDevice::new(SerializationDeviceInfo {
        api_version: 0,
        git_hash: Some("deadbeef".to_owned()),
    });

    for &backend in devices {
        device.register_backend(Box::new(MockBackend { device: backend }));
    }

    Arc::new(device)
}

fn shader(name: &str, stage: ShaderStages, source: &str) -> ShaderCreateInfo {
    ShaderCreateInfo {
        desc: ShaderDesc {
            name: name.to_owned(),
            shader_type: stage,
        },
        source: ShaderSource::Text(source.to_owned()),
        ..Default::default()
    }
}

fn signature(name: &str) -> ResourceSignatureDesc {
    ResourceSignatureDesc {
        name: name.to_owned(),
        resources: vec![ResourceDesc {
            name: "cbFrame".to_owned(),
            shader_stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
            array_size: 1,
            resource_type: ShaderResourceType::ConstantBuffer,
            var_type: ResourceVariableType::Static,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn render_pass(name: &str) -> RenderPassDesc {
    RenderPassDesc {
        name: name.to_owned(),
        attachments: vec![RenderPassAttachmentDesc {
            load_op: AttachmentLoadOp::Clear,
            final_state: ResourceStates::PRESENT,
            ..Default::default()
        }],
        subpasses: vec![SubpassDesc {
            render_target_attachments: vec![AttachmentReference {
                attachment_index: 0,
                state: ResourceStates::RENDER_TARGET,
            }],
            ..Default::default()
        }],
        dependencies: Vec::new(),
    }
}

fn graphics_pipeline(name: &str) -> GraphicsPipelineCreateInfo {
    GraphicsPipelineCreateInfo {
        name: name.to_owned(),
        signatures: vec![signature("Sig_A")],
        render_pass: Some(render_pass("MainPass")),
        shaders: vec![
            shader("vs_main", ShaderStages::VERTEX, "void vs() {}"),
            shader("ps_main", ShaderStages::PIXEL, "void ps() {}"),
        ],
        ..Default::default()
    }
}

fn archive_info(flags: DeviceFlags) -> PipelineArchiveInfo {
    PipelineArchiveInfo {
        device_flags: flags,
    }
}

fn decode_index_list(data: &SerializedData) -> Vec<u32> {
    let bytes = data.as_bytes();
    let count = u32::from_ne_bytes(bytes[..4].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), 4 + 4 * count);

    bytes[4..]
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[test]
fn graphics_round_trip() {
    let device = serialization_device(&[DeviceType::Vulkan, DeviceType::Direct3D12]);
    let mut archiver = Archiver::new(device);

    let flags = DeviceFlags::VULKAN | DeviceFlags::DIRECT3D12;
    archiver
        .add_graphics_pipeline(&graphics_pipeline("PSO_A"), &archive_info(flags))
        .unwrap();

    let bytes = archiver.serialize_to_vec().unwrap();
    let archive = DeviceObjectArchive::from_bytes(bytes).unwrap();

    assert_eq!(archive.debug_info().git_hash, "deadbeef");
    assert_eq!(archive.debug_info().api_version, pso_archive::API_VERSION);

    assert!(archive.contains(ResourceKind::GraphicsPipeline, "PSO_A"));
    assert!(archive.contains(ResourceKind::Signature, "Sig_A"));
    assert!(archive.contains(ResourceKind::RenderPass, "MainPass"));

    let (data, header) = archive.load_graphics_pipeline("PSO_A").unwrap();
    assert_eq!(data.base.name, "PSO_A");
    assert_eq!(data.base.signature_names, ["Sig_A"]);
    assert_eq!(data.desc.render_pass_name.as_deref(), Some("MainPass"));

    let loaded_rp = archive.load_render_pass("MainPass").unwrap();
    assert_eq!(loaded_rp, render_pass("MainPass"));

    let (sig, _, sig_header) = archive.load_signature("Sig_A").unwrap();
    assert_eq!(sig, signature("Sig_A"));

    // Device data exists exactly for the archived backends.
    for device in [DeviceType::Vulkan, DeviceType::Direct3D12] {
        assert!(!archive.device_data(&header, device).is_empty());
        assert!(!archive.device_data(&sig_header, device).is_empty());
    }
    assert!(archive.device_data(&header, DeviceType::OpenGl).is_empty());
    assert!(archive.device_data(&sig_header, DeviceType::OpenGl).is_empty());

    // Two shaders per backend, loadable through the region table.
    let regions = archive.shader_regions(DeviceType::Vulkan).unwrap();
    assert_eq!(regions.len(), 2);

    let indices = decode_index_list(&archive.device_data(&header, DeviceType::Vulkan));
    assert_eq!(indices, [0, 1]);

    let vs = archive
        .load_shader(DeviceType::Vulkan, &regions, indices[0])
        .unwrap();
    assert_eq!(vs.shader_type, ShaderStages::VERTEX);
    assert_eq!(vs.bytecode, b"Vulkan:void vs() {}");
}

#[test]
fn identical_shaders_are_stored_once() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);
    let flags = DeviceFlags::VULKAN;

    let shared = shader("ps_shared", ShaderStages::PIXEL, "void shared_ps() {}");

    let first = GraphicsPipelineCreateInfo {
        name: "PSO_1".to_owned(),
        signatures: vec![signature("Sig_A")],
        shaders: vec![
            shader("vs_1", ShaderStages::VERTEX, "void vs1() {}"),
            shared.clone(),
        ],
        ..Default::default()
    };
    let second = GraphicsPipelineCreateInfo {
        name: "PSO_2".to_owned(),
        signatures: vec![signature("Sig_A")],
        shaders: vec![
            shader("vs_2", ShaderStages::VERTEX, "void vs2() {}"),
            shared,
        ],
        ..Default::default()
    };

    archiver.add_graphics_pipeline(&first, &archive_info(flags)).unwrap();
    archiver.add_graphics_pipeline(&second, &archive_info(flags)).unwrap();

    let archive = DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap();

    // Three distinct records despite four shader references.
    let regions = archive.shader_regions(DeviceType::Vulkan).unwrap();
    assert_eq!(regions.len(), 3);

    let (_, header_1) = archive.load_graphics_pipeline("PSO_1").unwrap();
    let (_, header_2) = archive.load_graphics_pipeline("PSO_2").unwrap();

    let indices_1 = decode_index_list(&archive.device_data(&header_1, DeviceType::Vulkan));
    let indices_2 = decode_index_list(&archive.device_data(&header_2, DeviceType::Vulkan));

    assert_eq!(indices_1, [0, 1]);
    assert_eq!(indices_2, [2, 1]);
}

#[test]
fn duplicate_names_are_rejected_but_readds_merge() {
    let device = serialization_device(&[DeviceType::Vulkan, DeviceType::Direct3D12]);
    let mut archiver = Archiver::new(device);

    let desc = signature("Sig_A");
    archiver
        .add_resource_signature(&desc, Default::default(), DeviceFlags::VULKAN)
        .unwrap();

    // Identical re-add extends device coverage.
    archiver
        .add_resource_signature(&desc, Default::default(), DeviceFlags::DIRECT3D12)
        .unwrap();

    // Same name, different content.
    let mut other = desc.clone();
    other.resources[0].var_type = ResourceVariableType::Dynamic;
    let err = archiver
        .add_resource_signature(&other, Default::default(), DeviceFlags::VULKAN)
        .unwrap_err();
    assert!(matches!(err, ArchiverError::DuplicateName { .. }));

    assert_eq!(archiver.resource_count(ResourceKind::Signature), 1);

    let archive = DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap();
    let (_, _, header) = archive.load_signature("Sig_A").unwrap();
    assert!(!archive.device_data(&header, DeviceType::Vulkan).is_empty());
    assert!(!archive.device_data(&header, DeviceType::Direct3D12).is_empty());
}

#[test]
fn pipeline_readd_is_idempotent() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);
    let info = graphics_pipeline("PSO_A");

    archiver
        .add_graphics_pipeline(&info, &archive_info(DeviceFlags::VULKAN))
        .unwrap();
    let first = archiver.serialize_to_vec().unwrap();

    archiver
        .add_graphics_pipeline(&info, &archive_info(DeviceFlags::VULKAN))
        .unwrap();
    let second = archiver.serialize_to_vec().unwrap();

    assert_eq!(first, second);
}

#[test]
fn missing_backend_is_rejected() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);

    let err = archiver
        .add_graphics_pipeline(
            &graphics_pipeline("PSO_A"),
            &archive_info(DeviceFlags::VULKAN | DeviceFlags::METAL_IOS),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        ArchiverError::UnsupportedDevice {
            device: DeviceType::MetalIos,
        }
    ));
    assert_eq!(archiver.resource_count(ResourceKind::GraphicsPipeline), 0);
    assert_eq!(archiver.resource_count(ResourceKind::RenderPass), 0);
}

#[test]
fn default_signature_is_synthesized() {
    let device = serialization_device(&[DeviceType::Vulkan, DeviceType::Direct3D12]);
    let mut archiver = Archiver::new(device);

    let info = GraphicsPipelineCreateInfo {
        name: "PSO_D".to_owned(),
        shaders: vec![
            shader("vs_main", ShaderStages::VERTEX, "void vs() {}"),
            shader("ps_main", ShaderStages::PIXEL, "void ps() {}"),
        ],
        ..Default::default()
    };

    archiver
        .add_graphics_pipeline(
            &info,
            &archive_info(DeviceFlags::VULKAN | DeviceFlags::DIRECT3D12),
        )
        .unwrap();

    let archive = DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap();

    let expected = "Default Signature of PSO 'PSO_D'";
    assert!(archive.contains(ResourceKind::Signature, expected));

    let (data, _) = archive.load_graphics_pipeline("PSO_D").unwrap();
    assert_eq!(data.base.signature_names, [expected]);

    let (sig, _, _) = archive.load_signature(expected).unwrap();
    assert_eq!(sig.resources.len(), 2);
}

#[test]
fn emission_is_deterministic() {
    let build = || {
        let device = serialization_device(&[DeviceType::Vulkan]);
        let mut archiver = Archiver::new(device);
        archiver
            .add_graphics_pipeline(&graphics_pipeline("PSO_A"), &archive_info(DeviceFlags::VULKAN))
            .unwrap();
        archiver
            .add_render_pass(&render_pass("AuxPass"))
            .unwrap();
        archiver.serialize_to_vec().unwrap()
    };

    assert_eq!(build(), build());
}

#[test]
fn damaged_archives_fail_validation() {
    let original = build_two_backend_archive();

    let mut bad_magic = original.clone();
    bad_magic[0] ^= 0xFF;
    assert!(matches!(
        DeviceObjectArchive::from_bytes(bad_magic),
        Err(ArchiveError::InvalidMagic { .. })
    ));

    let mut bad_version = original.clone();
    bad_version[4..8].copy_from_slice(&(ARCHIVE_VERSION + 1).to_ne_bytes());
    assert!(matches!(
        DeviceObjectArchive::from_bytes(bad_version),
        Err(ArchiveError::UnsupportedVersion { found }) if found == ARCHIVE_VERSION + 1
    ));

    // Retag the second chunk directory entry (16-byte entries at offset 40)
    // with the first entry's type.
    let mut duplicate_chunk = original.clone();
    let first_type: [u8; 4] = duplicate_chunk[40..44].try_into().unwrap();
    duplicate_chunk[56..60].copy_from_slice(&first_type);
    assert!(matches!(
        DeviceObjectArchive::from_bytes(duplicate_chunk),
        Err(ArchiveError::Corrupt { .. })
    ));

    // Cut inside the file header.
    let mut truncated = original.clone();
    truncated.truncate(20);
    assert!(matches!(
        DeviceObjectArchive::from_bytes(truncated),
        Err(ArchiveError::Io(_))
    ));

    // Cut inside the chunk directory.
    let mut short_directory = original;
    short_directory.truncate(44);
    assert!(matches!(
        DeviceObjectArchive::from_bytes(short_directory),
        Err(ArchiveError::Corrupt { .. })
    ));
}

#[test]
fn device_data_past_its_block_is_ignored() {
    let original = build_two_backend_archive();

    // Stripping a backend shrinks the archive by exactly its block size.
    let mut stripped = ArchiveRepacker::new(&original).unwrap();
    stripped.remove_device_data(DeviceType::Direct3D12).unwrap();
    let block_size = original.len() - stripped.serialize().unwrap().len();

    let archive = DeviceObjectArchive::from_bytes(original).unwrap();
    let (_, header) = archive.load_graphics_pipeline("PSO_A").unwrap();
    assert!(!archive.device_data(&header, DeviceType::Direct3D12).is_empty());

    // A range running one byte past the Direct3D12 block lands inside the
    // Vulkan block that follows it, not past the end of the file. It must
    // still be treated as absent.
    let mut forged = header;
    forged.device_offset[DeviceType::Direct3D12.index()] = 0;
    forged.device_size[DeviceType::Direct3D12.index()] = block_size as u32 + 1;
    assert!(archive.device_data(&forged, DeviceType::Direct3D12).is_empty());
}

#[test]
fn ray_tracing_round_trip() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);

    let mut info = RayTracingPipelineCreateInfo {
        name: "RT".to_owned(),
        signatures: vec![signature("Sig_A")],
        shaders: vec![
            shader("rg", ShaderStages::RAY_GEN, "void rg() {}"),
            shader("miss", ShaderStages::RAY_MISS, "void miss() {}"),
        ],
        ..Default::default()
    };
    info.ray_tracing.max_recursion_depth = 2;
    info.ray_tracing.general_shaders = vec![
        RayTracingGeneralShaderGroup {
            name: "Main".to_owned(),
            shader_index: 0,
        },
        RayTracingGeneralShaderGroup {
            name: "Miss".to_owned(),
            shader_index: 1,
        },
    ];

    archiver
        .add_ray_tracing_pipeline(&info, &archive_info(DeviceFlags::VULKAN))
        .unwrap();

    let archive = DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap();
    let (data, header) = archive.load_ray_tracing_pipeline("RT").unwrap();

    assert_eq!(data.desc.max_recursion_depth, 2);
    assert_eq!(data.desc.general_shaders.len(), 2);
    assert_eq!(data.desc.general_shaders[1].shader_index, 1);

    let indices = decode_index_list(&archive.device_data(&header, DeviceType::Vulkan));
    assert_eq!(indices, [0, 1]);
}

// ------------------------------------------------------------- dearchiver

/// Factory that wraps unpacked descriptions and counts creations.
#[derive(Default)]
struct MockFactory {
    signatures_created: AtomicUsize,
    pipelines_created: AtomicUsize,
}

struct MockPipeline {
    name: String,
    num_signatures: usize,
    has_render_pass: bool,
    shader_stages: Vec<ShaderStages>,
}

impl DeviceObjectFactory for MockFactory {
    type Signature = ResourceSignatureDesc;
    type RenderPass = RenderPassDesc;
    type Shader = CompiledShader;
    type Pipeline = MockPipeline;

    fn create_signature(
        &self,
        desc: &ResourceSignatureDesc,
        _internal: &SignatureInternalData,
        device_data: &SerializedData,
    ) -> Result<Arc<ResourceSignatureDesc>, ArchiveError> {
        if device_data.is_empty() {
            return Err(ArchiveError::ObjectCreation {
                message: format!("no device data for signature `{}`", desc.name),
            });
        }

        self.signatures_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(desc.clone()))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<RenderPassDesc>, ArchiveError> {
        Ok(Arc::new(desc.clone()))
    }

    fn create_shader(&self, shader: &CompiledShader) -> Result<Arc<CompiledShader>, ArchiveError> {
        Ok(Arc::new(shader.clone()))
    }

    fn create_graphics_pipeline(
        &self,
        data: &PipelineStateData<pso_archive::pipeline::GraphicsPipelineDesc>,
        resources: PipelineResources<ResourceSignatureDesc, RenderPassDesc, CompiledShader>,
    ) -> Result<Arc<MockPipeline>, ArchiveError> {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockPipeline {
            name: data.base.name.clone(),
            num_signatures: resources.signatures.len(),
            has_render_pass: resources.render_pass.is_some(),
            shader_stages: resources.shaders.iter().map(|(stage, _)| *stage).collect(),
        }))
    }

    fn create_compute_pipeline(
        &self,
        data: &PipelineStateData<()>,
        resources: PipelineResources<ResourceSignatureDesc, RenderPassDesc, CompiledShader>,
    ) -> Result<Arc<MockPipeline>, ArchiveError> {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockPipeline {
            name: data.base.name.clone(),
            num_signatures: resources.signatures.len(),
            has_render_pass: false,
            shader_stages: resources.shaders.iter().map(|(stage, _)| *stage).collect(),
        }))
    }

    fn create_ray_tracing_pipeline(
        &self,
        data: &PipelineStateData<pso_archive::pipeline::RayTracingPipelineDesc>,
        resources: RayTracingResources<ResourceSignatureDesc, CompiledShader>,
    ) -> Result<Arc<MockPipeline>, ArchiveError> {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockPipeline {
            name: data.base.name.clone(),
            num_signatures: resources.signatures.len(),
            has_render_pass: false,
            shader_stages: Vec::new(),
        }))
    }

    fn create_tile_pipeline(
        &self,
        data: &PipelineStateData<pso_archive::pipeline::TilePipelineDesc>,
        resources: PipelineResources<ResourceSignatureDesc, RenderPassDesc, CompiledShader>,
    ) -> Result<Arc<MockPipeline>, ArchiveError> {
        self.pipelines_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockPipeline {
            name: data.base.name.clone(),
            num_signatures: resources.signatures.len(),
            has_render_pass: false,
            shader_stages: resources.shaders.iter().map(|(stage, _)| *stage).collect(),
        }))
    }
}

#[test]
fn dearchiver_unpacks_and_caches() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);
    archiver
        .add_graphics_pipeline(&graphics_pipeline("PSO_A"), &archive_info(DeviceFlags::VULKAN))
        .unwrap();

    let archive =
        Arc::new(DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap());
    let dearchiver = Dearchiver::new(archive, MockFactory::default(), DeviceType::Vulkan);

    let pipeline = dearchiver.unpack_graphics_pipeline("PSO_A").unwrap();
    assert_eq!(pipeline.name, "PSO_A");
    assert_eq!(pipeline.num_signatures, 1);
    assert!(pipeline.has_render_pass);
    assert_eq!(
        pipeline.shader_stages,
        [ShaderStages::VERTEX, ShaderStages::PIXEL]
    );

    // Second unpack comes from the cache.
    let again = dearchiver.unpack_pipeline("PSO_A").unwrap();
    assert!(Arc::ptr_eq(&pipeline, &again));
    assert_eq!(dearchiver.factory().pipelines_created.load(Ordering::Relaxed), 1);
    assert_eq!(dearchiver.factory().signatures_created.load(Ordering::Relaxed), 1);

    assert!(matches!(
        dearchiver.unpack_graphics_pipeline("missing"),
        Err(ArchiveError::ResourceNotFound { .. })
    ));
}

#[test]
fn dearchiver_fails_for_backend_without_data() {
    let device = serialization_device(&[DeviceType::Vulkan]);
    let mut archiver = Archiver::new(device);
    archiver
        .add_graphics_pipeline(&graphics_pipeline("PSO_A"), &archive_info(DeviceFlags::VULKAN))
        .unwrap();

    let archive =
        Arc::new(DeviceObjectArchive::from_bytes(archiver.serialize_to_vec().unwrap()).unwrap());
    let dearchiver = Dearchiver::new(archive, MockFactory::default(), DeviceType::OpenGl);

    assert!(dearchiver.unpack_graphics_pipeline("PSO_A").is_err());
}

// --------------------------------------------------------------- repacker

fn build_two_backend_archive() -> Vec<u8> {
    let device = serialization_device(&[DeviceType::Vulkan, DeviceType::Direct3D12]);
    let mut archiver = Archiver::new(device);
    archiver
        .add_graphics_pipeline(
            &graphics_pipeline("PSO_A"),
            &archive_info(DeviceFlags::VULKAN | DeviceFlags::DIRECT3D12),
        )
        .unwrap();

    archiver.serialize_to_vec().unwrap()
}

#[test]
fn remove_then_append_restores_the_archive() {
    let original = build_two_backend_archive();

    let mut repacker = ArchiveRepacker::new(&original).unwrap();
    repacker.remove_device_data(DeviceType::Direct3D12).unwrap();
    let stripped = repacker.serialize().unwrap();
    assert!(stripped.len() < original.len());

    // The stripped archive still validates, with Vulkan data intact.
    let archive = DeviceObjectArchive::from_bytes(stripped.clone()).unwrap();
    let (_, header) = archive.load_graphics_pipeline("PSO_A").unwrap();
    assert!(archive.device_data(&header, DeviceType::Direct3D12).is_empty());
    assert!(!archive.device_data(&header, DeviceType::Vulkan).is_empty());
    assert!(archive.shader_regions(DeviceType::Direct3D12).unwrap().is_empty());
    assert_eq!(archive.shader_regions(DeviceType::Vulkan).unwrap().len(), 2);

    // Transplanting the block back from the original restores it byte for
    // byte.
    let donor = ArchiveRepacker::new(&original).unwrap();
    let mut restored = ArchiveRepacker::new(&stripped).unwrap();
    restored.append_device_data(&donor, DeviceType::Direct3D12).unwrap();

    assert_eq!(restored.serialize().unwrap(), original);
}

#[test]
fn append_rejects_mismatched_archives() {
    let original = build_two_backend_archive();
    let mut stripped_repacker = ArchiveRepacker::new(&original).unwrap();
    stripped_repacker.remove_device_data(DeviceType::Direct3D12).unwrap();
    let stripped = stripped_repacker.serialize().unwrap();

    // Donor with an extra resource the destination lacks.
    let donor_bytes = {
        let device = serialization_device(&[DeviceType::Vulkan, DeviceType::Direct3D12]);
        let mut archiver = Archiver::new(device);
        archiver
            .add_graphics_pipeline(
                &graphics_pipeline("PSO_A"),
                &archive_info(DeviceFlags::VULKAN | DeviceFlags::DIRECT3D12),
            )
            .unwrap();
        archiver
            .add_render_pass(&render_pass("ExtraPass"))
            .unwrap();
        archiver.serialize_to_vec().unwrap()
    };

    let donor = ArchiveRepacker::new(&donor_bytes).unwrap();
    let mut destination = ArchiveRepacker::new(&stripped).unwrap();

    let err = destination
        .append_device_data(&donor, DeviceType::Direct3D12)
        .unwrap_err();
    assert!(matches!(err, RepackError::MissingResource { .. }));

    // Appending a backend the destination already has is refused.
    let donor_ok = ArchiveRepacker::new(&build_two_backend_archive()).unwrap();
    let mut full = ArchiveRepacker::new(&build_two_backend_archive()).unwrap();
    let err = full
        .append_device_data(&donor_ok, DeviceType::Vulkan)
        .unwrap_err();
    assert!(matches!(err, RepackError::DeviceDataPresent { .. }));

    // Removing an absent block is an error too.
    let mut missing = ArchiveRepacker::new(&stripped).unwrap();
    let err = missing.remove_device_data(DeviceType::OpenGl).unwrap_err();
    assert!(matches!(err, RepackError::NoDeviceData { .. }));
}
