//! In-process decode module run by the dispatcher's compute units.
//!
//! Payloads are little-endian `f32` position triples. Decoding reports the
//! vertex count and the bounds of the positions.

use meridian_dispatch::{ComputeModule, ModuleConfig, RemoteError, TaskEnvelope};
use serde::{Deserialize, Serialize};

/// Magic prefix every precompiled module must start with.
pub const MODULE_MAGIC: &[u8] = b"\0asm";

/// Module bytes used when no module path is configured.
pub const BUILTIN_MODULE: &[u8] = b"\0asm\x01\0\0\0";

/// Parameters of a decode task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecodeParameters {
    /// Grid coordinate of the tile being decoded.
    pub tile: [usize; 2],
}

/// Result of a decode task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecodedMesh {
    /// Grid coordinate of the decoded tile.
    pub tile: [usize; 2],
    /// Number of vertices.
    pub vertex_count: usize,
    /// Component-wise minimum position.
    pub min: [f32; 3],
    /// Component-wise maximum position.
    pub max: [f32; 3],
}

/// Encode positions the way [`MeshDecoder`] expects them.
pub fn encode_positions(positions: &[[f32; 3]]) -> Vec<u8> {
    positions
        .iter()
        .flat_map(|p| p.iter().flat_map(|c| c.to_le_bytes()))
        .collect()
}

/// Decoder state for one compute unit.
#[derive(Default)]
pub struct MeshDecoder {
    configured: bool,
}

impl ComputeModule for MeshDecoder {
    fn configure(&mut self, config: &ModuleConfig) -> Result<(), RemoteError> {
        match &config.binary {
            Some(binary) if !binary.starts_with(MODULE_MAGIC) => {
                return Err(RemoteError::new("CompileError", "module is missing its magic header"));
            }
            None if config.fallback_module_path.is_none() => {
                return Err(RemoteError::new("RuntimeError", "no module to load"));
            }
            _ => {}
        }
        self.configured = true;
        Ok(())
    }

    fn execute(&mut self, task: &TaskEnvelope) -> Result<serde_json::Value, RemoteError> {
        if !self.configured {
            return Err(RemoteError::new("RuntimeError", "decoder used before configuration"));
        }
        let parameters: DecodeParameters = serde_json::from_value(task.request().parameters.clone())
            .map_err(|e| RemoteError::new("TypeError", e.to_string()))?;
        let payload = task
            .buffers()
            .first()
            .ok_or_else(|| RemoteError::new("RuntimeError", "missing position buffer"))?;
        if payload.len() % 12 != 0 {
            return Err(RemoteError::new(
                "RuntimeError",
                format!("position buffer length {} is not a multiple of 12", payload.len()),
            ));
        }

        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for vertex in payload.chunks_exact(12) {
            for (axis, component) in vertex.chunks_exact(4).enumerate() {
                let value = f32::from_le_bytes([component[0], component[1], component[2], component[3]]);
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }

        let mesh = DecodedMesh {
            tile: parameters.tile,
            vertex_count: payload.len() / 12,
            min,
            max,
        };
        serde_json::to_value(mesh).map_err(|e| RemoteError::new("RuntimeError", e.to_string()))
    }
}
