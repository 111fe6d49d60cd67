//! Materials and the MTL description grammar.
//!
//! A [`Material`] carries the classic color channels plus per-channel texture
//! maps with mix factors. Materials are keyed by the concatenation of their
//! library name and material name; a library redefining a name overwrites the
//! earlier entry.
//!
//! `apply` is the `usemtl` operation: bind each non-empty texture map at its
//! fixed per-slot unit, set the matching sampler uniform and push every
//! scalar/vector parameter the active render config actually declares.

use std::collections::HashMap;

use cgmath::Vector3;
use log::debug;

use crate::{
    device::{GpuDevice, TextureId},
    parse,
    render_config::RenderConfig,
};

/// Fixed texture units for the four material slots.
pub const DIFFUSE_UNIT: u32 = 0;
pub const SPECULAR_UNIT: u32 = 1;
pub const NORMAL_UNIT: u32 = 2;
pub const TRANSMISSION_UNIT: u32 = 3;

#[derive(Clone, Debug)]
pub struct Material {
    pub diffuse: Vector3<f32>,
    pub ambient: Vector3<f32>,
    pub specular: Vector3<f32>,
    pub transmission: Vector3<f32>,

    pub diffuse_map: String,
    pub specular_map: String,
    pub normal_map: String,
    pub transmission_map: String,
    pub diffuse_map_mix: f32,
    pub specular_map_mix: f32,
    pub normal_map_mix: f32,
    pub transmission_map_mix: f32,

    pub specular_roughness: f32,
    pub diffuse_roughness: f32,
    pub ior: f32,
    pub absorption: f32,
    pub dissolve: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vector3::new(1.0, 1.0, 1.0),
            ambient: Vector3::new(0.0, 0.0, 0.0),
            specular: Vector3::new(0.0, 0.0, 0.0),
            transmission: Vector3::new(0.0, 0.0, 0.0),
            diffuse_map: String::new(),
            specular_map: String::new(),
            normal_map: String::new(),
            transmission_map: String::new(),
            diffuse_map_mix: 1.0,
            specular_map_mix: 1.0,
            normal_map_mix: 1.0,
            transmission_map_mix: 1.0,
            specular_roughness: 0.5,
            diffuse_roughness: 0.0,
            ior: 1.5,
            absorption: 0.0,
            dissolve: 1.0,
        }
    }
}

/// Convert a legacy Phong specular exponent into a roughness value.
///
/// `Ns` ranges over 0..1000; higher exponents mean tighter highlights, i.e.
/// lower roughness.
fn roughness_from_exponent(ns: f32) -> f32 {
    (2.0 / (ns.max(0.0) + 2.0)).sqrt().clamp(0.0, 1.0)
}

/// Parse an MTL text into `(name, material)` pairs plus the texture URLs the
/// library references. Unknown keywords are ignored so forward-compatible
/// files keep loading.
pub fn parse_mtl(text: &str) -> (Vec<(String, Material)>, Vec<String>) {
    let mut materials: Vec<(String, Material)> = Vec::new();
    let mut textures: Vec<String> = Vec::new();

    let mut push_texture = |url: &str| {
        if !url.is_empty() && !textures.iter().any(|t| t == url) {
            textures.push(url.to_string());
        }
    };

    for tokens in parse::parse(text) {
        let keyword = tokens[0].as_str();
        if keyword == "newmtl" {
            let name = tokens.get(1).cloned().unwrap_or_default();
            materials.push((name, Material::default()));
            continue;
        }
        let Some((_, material)) = materials.last_mut() else {
            debug!("mtl statement {} before any newmtl, ignoring", keyword);
            continue;
        };
        let scalar = || {
            tokens
                .get(1)
                .and_then(|t| t.parse::<f32>().ok())
                .unwrap_or(0.0)
        };
        match keyword {
            "Kd" => material.diffuse = parse::parse_vector3(&tokens),
            "Ka" => material.ambient = parse::parse_vector3(&tokens),
            "Ks" => material.specular = parse::parse_vector3(&tokens),
            "Tf" => material.transmission = parse::parse_vector3(&tokens),
            "map_Kd" => {
                material.diffuse_map = tokens.get(1).cloned().unwrap_or_default();
                push_texture(&material.diffuse_map);
            }
            "map_Ks" => {
                material.specular_map = tokens.get(1).cloned().unwrap_or_default();
                push_texture(&material.specular_map);
            }
            "map_normal" => {
                material.normal_map = tokens.get(1).cloned().unwrap_or_default();
                push_texture(&material.normal_map);
            }
            "map_Tf" => {
                material.transmission_map = tokens.get(1).cloned().unwrap_or_default();
                push_texture(&material.transmission_map);
            }
            "MapKdMix" => material.diffuse_map_mix = scalar(),
            "MapKsMix" => material.specular_map_mix = scalar(),
            "MapNormalMix" => material.normal_map_mix = scalar(),
            "MapTfMix" => material.transmission_map_mix = scalar(),
            // Ns is the legacy encoding of specular roughness.
            "Ns" => material.specular_roughness = roughness_from_exponent(scalar()),
            "PBKsm" | "SpecularRoughness" => material.specular_roughness = scalar(),
            "PBKdm" | "DiffuseRoughness" => material.diffuse_roughness = scalar(),
            "Ni" | "PBn2" => material.ior = scalar(),
            "Nk" | "PBk2" => material.absorption = scalar(),
            "d" => material.dissolve = scalar(),
            other => debug!("unknown mtl keyword {}, ignoring", other),
        }
    }
    (materials, textures)
}

/// All materials and loaded textures, keyed for `usemtl` lookup.
#[derive(Default)]
pub struct MaterialStore {
    materials: HashMap<String, Material>,
    pub textures: HashMap<String, TextureId>,
}

impl MaterialStore {
    fn key(library: &str, name: &str) -> String {
        format!("{}{}", library, name)
    }

    /// Insert or overwrite a material under `(library, name)`.
    pub fn insert(&mut self, library: &str, name: &str, material: Material) {
        self.materials.insert(Self::key(library, name), material);
    }

    pub fn get(&self, library: &str, name: &str) -> Option<&Material> {
        self.materials.get(&Self::key(library, name))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Activate a material on the current config: the `usemtl` operation.
    ///
    /// An unknown pair is a safe no-op ("no material bound"). Uniforms the
    /// config does not declare are skipped by the config itself.
    pub fn apply(
        &self,
        device: &mut dyn GpuDevice,
        config: &mut RenderConfig,
        library: &str,
        name: &str,
    ) {
        if library.is_empty() && name.is_empty() {
            return;
        }
        let Some(material) = self.get(library, name) else {
            debug!("material {}{} not loaded, rendering unbound", library, name);
            return;
        };

        let slots = [
            (&material.diffuse_map, DIFFUSE_UNIT, "diffuseMap"),
            (&material.specular_map, SPECULAR_UNIT, "specularMap"),
            (&material.normal_map, NORMAL_UNIT, "normalMap"),
            (&material.transmission_map, TRANSMISSION_UNIT, "transmissionMap"),
        ];
        for (map, unit, sampler) in slots {
            if map.is_empty() {
                continue;
            }
            match self.textures.get(map) {
                Some(&id) => {
                    device.bind_texture(unit, Some(id));
                    config.uniform1i(device, sampler, unit as i32);
                }
                None => debug!("texture {} for {} not loaded yet", map, sampler),
            }
        }

        let d = material.diffuse;
        config.uniform3f(device, "diffuseColor", d.x, d.y, d.z);
        let a = material.ambient;
        config.uniform3f(device, "ambientColor", a.x, a.y, a.z);
        let s = material.specular;
        config.uniform3f(device, "specularColor", s.x, s.y, s.z);
        let t = material.transmission;
        config.uniform3f(device, "transmissionColor", t.x, t.y, t.z);
        config.uniform1f(device, "diffuseMapMix", material.diffuse_map_mix);
        config.uniform1f(device, "specularMapMix", material.specular_map_mix);
        config.uniform1f(device, "normalMapMix", material.normal_map_mix);
        config.uniform1f(device, "transmissionMapMix", material.transmission_map_mix);
        config.uniform1f(device, "specularRoughness", material.specular_roughness);
        config.uniform1f(device, "diffuseRoughness", material.diffuse_roughness);
        config.uniform1f(device, "ior", material.ior);
        config.uniform1f(device, "absorption", material.absorption);
        config.uniform1f(device, "dissolve", material.dissolve);
    }
}
